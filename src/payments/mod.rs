pub mod allocation;
pub mod amortization;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::installment::Installment;
use crate::plan::{InstallmentPlan, PlanMetadata, PlanSnapshot};
use crate::types::{AccountType, AllocationStrategy, InstallmentId, PlanId, TransactionId};

pub use allocation::{AllocationLine, AllocationResult, PaymentAllocator};
pub use amortization::{split_evenly, AmortizationCalculator, Schedule, ScheduleTerms, ScheduledInstallment};

/// accept a boundary amount only if it has at most two fraction digits
pub fn ensure_minor_units(field: &'static str, value: Decimal) -> Result<Money> {
    if !Money::fits_minor_units(value) {
        return Err(EngineError::validation(
            field,
            format!("{} has more than 2 decimal places", value.normalize()),
        ));
    }
    Ok(Money::from_decimal(value))
}

fn ensure_present(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// schedule preview request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub amount: Decimal,
    pub installments_count: u32,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_fee: Option<Decimal>,
}

impl PreviewRequest {
    pub fn new(amount: Decimal, installments_count: u32, start_date: NaiveDate) -> Self {
        Self {
            amount,
            installments_count,
            start_date,
            interest_rate: None,
            admin_fee: None,
        }
    }

    pub fn with_interest_rate(mut self, rate: Decimal) -> Self {
        self.interest_rate = Some(rate);
        self
    }

    pub fn with_admin_fee(mut self, fee: Decimal) -> Self {
        self.admin_fee = Some(fee);
        self
    }

    /// calculator inputs; omitted rate and fee come from the supplied defaults
    pub fn to_terms(&self, default_rate: Rate, default_fee: Money) -> Result<ScheduleTerms> {
        let amount = ensure_minor_units("amount", self.amount)?;
        let admin_fee = match self.admin_fee {
            Some(fee) => ensure_minor_units("admin_fee", fee)?,
            None => default_fee,
        };
        let interest_rate = self.interest_rate.map(Rate::from_percentage).unwrap_or(default_rate);

        Ok(ScheduleTerms {
            amount,
            installments_count: self.installments_count,
            interest_rate,
            admin_fee,
            start_date: self.start_date,
        })
    }
}

/// one row of a preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInstallment {
    pub number: u32,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
}

/// schedule preview response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub total_amount: Money,
    pub installments_count: u32,
    pub installment_amount: Money,
    pub start_date: NaiveDate,
    pub interest_rate: Decimal,
    pub total_interest: Money,
    pub admin_fee: Money,
    pub total_to_pay: Money,
    pub installments: Vec<PreviewInstallment>,
}

impl From<&Schedule> for PreviewResponse {
    fn from(schedule: &Schedule) -> Self {
        Self {
            total_amount: schedule.principal,
            installments_count: schedule.installments_count,
            installment_amount: schedule.installment_amount,
            start_date: schedule.start_date,
            interest_rate: schedule.interest_rate.as_percentage(),
            total_interest: schedule.total_interest,
            admin_fee: schedule.admin_fee,
            total_to_pay: schedule.total_to_pay,
            installments: schedule
                .installments
                .iter()
                .map(|line| PreviewInstallment {
                    number: line.number,
                    amount: line.amount,
                    due_date: line.due_date,
                    principal: line.principal,
                    interest: line.interest,
                    fee: line.fee,
                })
                .collect(),
        }
    }
}

/// plan creation request: preview inputs plus card and purchase details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    #[serde(flatten)]
    pub terms: PreviewRequest,
    pub card_id: String,
    pub user_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    /// idempotency key for the purchase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl CreatePlanRequest {
    pub fn validate(&self) -> Result<()> {
        ensure_present("card_id", &self.card_id)?;
        ensure_present("user_id", &self.user_id)?;
        ensure_present("description", &self.description)?;
        Ok(())
    }

    pub fn metadata(&self) -> PlanMetadata {
        let metadata = PlanMetadata::new(&self.card_id, &self.user_id, &self.description);
        match &self.merchant_name {
            Some(name) => metadata.with_merchant(name, self.merchant_id.clone()),
            None => metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanResponse {
    pub plan: InstallmentPlan,
    pub first_installment_charged: bool,
    pub transaction_id: TransactionId,
}

/// pay one installment from an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayInstallmentRequest {
    pub installment_id: InstallmentId,
    pub amount: Decimal,
    pub payment_method: String,
    /// idempotency key
    pub reference: String,
    pub account_id: String,
    pub account_type: AccountType,
}

impl PayInstallmentRequest {
    /// validated payment amount
    pub fn validate(&self) -> Result<Money> {
        let amount = ensure_minor_units("amount", self.amount)?;
        if !amount.is_positive() {
            return Err(EngineError::validation("amount", "payment amount must be greater than 0"));
        }
        ensure_present("payment_method", &self.payment_method)?;
        ensure_present("reference", &self.reference)?;
        ensure_present("account_id", &self.account_id)?;
        Ok(amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayInstallmentResponse {
    pub installment: Installment,
    pub applied: Money,
    pub plan: PlanSnapshot,
    pub debit_transaction_id: TransactionId,
}

/// distribute a payment over a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatePaymentRequest {
    pub plan_id: PlanId,
    pub amount: Decimal,
    pub strategy: AllocationStrategy,
    /// idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl AllocatePaymentRequest {
    pub fn new(plan_id: PlanId, amount: Decimal, strategy: AllocationStrategy) -> Self {
        Self {
            plan_id,
            amount,
            strategy,
            reference: None,
            payment_method: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPlanRequest {
    pub plan_id: PlanId,
    pub reason: String,
}

impl CancelPlanRequest {
    pub fn validate(&self) -> Result<()> {
        ensure_present("reason", &self.reason)
    }
}
