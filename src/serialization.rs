/// serialization support for plans
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::installment::Installment;
use crate::plan::InstallmentPlan;
use crate::types::{InstallmentId, InstallmentStatus, PlanId, PlanStatus, TransactionId};

/// serializable view of a plan as seen on a given day
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub id: PlanId,
    pub card_id: String,
    pub user_id: String,
    pub transaction_id: Option<TransactionId>,
    pub status: PlanStatus,
    pub as_of: NaiveDate,
    pub financial: FinancialView,
    pub progress: ProgressView,
    pub metadata: MetadataView,
    pub installments: Vec<InstallmentView>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialView {
    pub total_amount: Money,
    pub installments_count: u32,
    pub installment_amount: Money,
    pub interest_rate: Decimal,
    pub total_interest: Money,
    pub admin_fee: Money,
    pub total_to_pay: Money,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub paid_installments: u32,
    pub remaining_amount: Money,
    pub total_paid: Money,
    pub overdue_installments: u32,
    pub next_due_date: Option<NaiveDate>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataView {
    pub description: String,
    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// one installment with its status derived for the view date
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentView {
    pub id: InstallmentId,
    pub number: u32,
    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: InstallmentStatus,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
}

impl InstallmentView {
    pub fn from_installment(installment: &Installment, today: NaiveDate) -> Self {
        InstallmentView {
            id: installment.id,
            number: installment.number,
            amount: installment.amount,
            principal: installment.principal,
            interest: installment.interest,
            fee: installment.fee,
            paid_amount: installment.paid_amount,
            remaining_amount: installment.remaining_amount,
            status: installment.effective_status(today),
            due_date: installment.due_date,
            paid_date: installment.paid_date,
            payment_method: installment.payment_method.clone(),
            payment_reference: installment.payment_reference.clone(),
        }
    }
}

impl PlanView {
    pub fn from_plan(plan: &InstallmentPlan, today: NaiveDate) -> Self {
        let installments: Vec<InstallmentView> = plan
            .installments()
            .iter()
            .map(|i| InstallmentView::from_installment(i, today))
            .collect();
        let overdue = installments
            .iter()
            .filter(|i| i.status == InstallmentStatus::Overdue)
            .count() as u32;

        PlanView {
            id: plan.id,
            card_id: plan.card_id.clone(),
            user_id: plan.user_id.clone(),
            transaction_id: plan.transaction_id,
            status: plan.status,
            as_of: today,
            financial: FinancialView {
                total_amount: plan.total_amount,
                installments_count: plan.installments_count,
                installment_amount: plan.installment_amount,
                interest_rate: plan.interest_rate.as_percentage(),
                total_interest: plan.total_interest,
                admin_fee: plan.admin_fee,
                total_to_pay: plan.total_to_pay,
                currency: plan.currency.to_string(),
            },
            progress: ProgressView {
                paid_installments: plan.paid_installments,
                remaining_amount: plan.remaining_amount,
                total_paid: plan.total_paid(),
                overdue_installments: overdue,
                next_due_date: plan.open_installments().map(|i| i.due_date).min(),
                cancellation_reason: plan.cancellation_reason.clone(),
                completed_at: plan.completed_at,
                cancelled_at: plan.cancelled_at,
            },
            metadata: MetadataView {
                description: plan.description.clone(),
                merchant_name: plan.merchant_name.clone(),
                merchant_id: plan.merchant_id.clone(),
                start_date: plan.start_date,
                created_at: plan.created_at,
                updated_at: plan.updated_at,
            },
            installments,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::amortization::{AmortizationCalculator, ScheduleTerms};
    use crate::decimal::Rate;
    use crate::plan::PlanMetadata;
    use chrono::TimeZone;
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;

    #[test]
    fn test_plan_view_derives_overdue() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()));
        let terms = ScheduleTerms {
            amount: Money::from_major(90_000),
            installments_count: 3,
            interest_rate: Rate::from_percentage(dec!(15.5)),
            admin_fee: Money::from_major(2_250),
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        };
        let schedule = AmortizationCalculator::new().compute(&terms, &time).unwrap();
        let plan = InstallmentPlan::create(&schedule, PlanMetadata::new("card-1", "user-1", "tv"), &time).unwrap();

        let view = PlanView::from_plan(&plan, NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
        assert_eq!(view.progress.overdue_installments, 1);
        assert_eq!(view.installments[0].status, InstallmentStatus::Overdue);
        assert_eq!(view.progress.next_due_date, NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(view.financial.interest_rate, dec!(15.5));

        let json = view.to_json_pretty().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["financial"]["installmentsCount"], 3);
        assert!(json.contains("\"status\": \"overdue\""));
    }
}
