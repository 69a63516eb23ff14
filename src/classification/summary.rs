use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::plan::InstallmentPlan;
use crate::types::{InstallmentId, InstallmentStatus, PlanId, PlanStatus};

use super::{ClassifiedInstallment, ScheduleClassifier};

/// the next installment a user has to pay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPayment {
    pub plan_id: PlanId,
    pub installment_id: InstallmentId,
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// dashboard totals across a user's plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub user_id: String,
    pub as_of: NaiveDate,

    pub total_plans: u32,
    pub active_plans: u32,
    pub suspended_plans: u32,
    pub completed_plans: u32,
    pub cancelled_plans: u32,

    pub total_installments: u32,
    pub pending_installments: u32,
    pub paid_installments: u32,
    pub overdue_installments: u32,

    pub total_amount_owed: Money,
    pub total_amount_paid: Money,
    pub total_overdue: Money,

    pub next_payment: Option<NextPayment>,
    pub upcoming: Vec<ClassifiedInstallment>,
}

impl PortfolioSummary {
    /// summarize `plans` as of `today`, listing installments due within `horizon_days`
    pub fn build<'a, I>(
        user_id: &str,
        plans: I,
        classifier: &ScheduleClassifier,
        today: NaiveDate,
        horizon_days: i64,
    ) -> Self
    where
        I: IntoIterator<Item = &'a InstallmentPlan>,
    {
        let mut summary = Self {
            user_id: user_id.to_string(),
            as_of: today,
            total_plans: 0,
            active_plans: 0,
            suspended_plans: 0,
            completed_plans: 0,
            cancelled_plans: 0,
            total_installments: 0,
            pending_installments: 0,
            paid_installments: 0,
            overdue_installments: 0,
            total_amount_owed: Money::ZERO,
            total_amount_paid: Money::ZERO,
            total_overdue: Money::ZERO,
            next_payment: None,
            upcoming: Vec::new(),
        };

        let plans: Vec<&InstallmentPlan> = plans.into_iter().collect();
        for plan in &plans {
            summary.total_plans += 1;
            match plan.status {
                PlanStatus::Active => summary.active_plans += 1,
                PlanStatus::Suspended => summary.suspended_plans += 1,
                PlanStatus::Completed => summary.completed_plans += 1,
                PlanStatus::Cancelled => summary.cancelled_plans += 1,
            }
            summary.total_amount_owed += plan.remaining_amount;
            summary.total_amount_paid += plan.total_paid();

            for inst in plan.installments() {
                summary.total_installments += 1;
                match inst.effective_status(today) {
                    InstallmentStatus::Paid => summary.paid_installments += 1,
                    InstallmentStatus::Overdue => {
                        summary.overdue_installments += 1;
                        summary.total_overdue += inst.remaining_amount;
                    }
                    InstallmentStatus::Pending | InstallmentStatus::Partial => {
                        summary.pending_installments += 1
                    }
                    InstallmentStatus::Cancelled => {}
                }
            }
        }

        // suspended plans still owe money but are not collectable until resumed
        let collectable = || {
            plans
                .iter()
                .filter(|p| p.is_active())
                .flat_map(|p| p.installments().iter())
        };

        summary.next_payment = classifier.next_due(collectable(), today).map(|inst| NextPayment {
            plan_id: inst.plan_id,
            installment_id: inst.id,
            due_date: inst.due_date,
            amount: inst.remaining_amount,
        });
        summary.upcoming = classifier
            .upcoming(collectable(), today, horizon_days)
            .into_iter()
            .map(|inst| classifier.classify(inst, today))
            .collect();

        summary
    }
}

/// installments falling due on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLoad {
    pub date: NaiveDate,
    pub installments: u32,
    pub amount: Money,
}

/// what falls due in one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyLoad {
    pub year: i32,
    pub month: u32,
    pub total_installments: u32,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub pending_amount: Money,
    pub overdue_amount: Money,
    pub by_day: Vec<DailyLoad>,
}

impl MonthlyLoad {
    /// cancelled installments are left out; they are no longer owed
    pub fn build<'a, I>(plans: I, year: i32, month: u32, today: NaiveDate) -> Result<Self>
    where
        I: IntoIterator<Item = &'a InstallmentPlan>,
    {
        if !(1..=12).contains(&month) {
            return Err(EngineError::validation("month", format!("{} is not a calendar month", month)));
        }

        let mut load = Self {
            year,
            month,
            total_installments: 0,
            total_amount: Money::ZERO,
            paid_amount: Money::ZERO,
            pending_amount: Money::ZERO,
            overdue_amount: Money::ZERO,
            by_day: Vec::new(),
        };
        let mut days: BTreeMap<NaiveDate, DailyLoad> = BTreeMap::new();

        let due_this_month = plans
            .into_iter()
            .flat_map(|p| p.installments().iter())
            .filter(|i| !i.is_cancelled())
            .filter(|i| i.due_date.year() == year && i.due_date.month() == month);

        for inst in due_this_month {
            load.total_installments += 1;
            load.total_amount += inst.amount;
            load.paid_amount += inst.paid_amount;
            load.pending_amount += inst.remaining_amount;
            if inst.is_overdue_on(today) {
                load.overdue_amount += inst.remaining_amount;
            }

            let day = days.entry(inst.due_date).or_insert(DailyLoad {
                date: inst.due_date,
                installments: 0,
                amount: Money::ZERO,
            });
            day.installments += 1;
            day.amount += inst.amount;
        }

        load.by_day = days.into_values().collect();
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::amortization::{AmortizationCalculator, ScheduleTerms};
    use crate::plan::PlanMetadata;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::{SafeTimeProvider, TimeSource};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan(amount: i64, count: u32, start: NaiveDate, time: &SafeTimeProvider) -> InstallmentPlan {
        let terms = ScheduleTerms {
            amount: Money::from_major(amount),
            installments_count: count,
            interest_rate: Rate::ZERO,
            admin_fee: Money::ZERO,
            start_date: start,
        };
        let schedule = AmortizationCalculator::new().compute(&terms, time).unwrap();
        InstallmentPlan::create(&schedule, PlanMetadata::new("card", "user-7", "purchase"), time).unwrap()
    }

    fn clock() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 5, 8, 0, 0).unwrap()))
    }

    #[test]
    fn test_portfolio_summary() {
        let time = clock();
        let mut tv = plan(3_000, 3, date(2025, 1, 10), &time);
        let mut fridge = plan(1_200, 2, date(2025, 1, 20), &time);
        let mut sofa = plan(600, 3, date(2025, 2, 15), &time);

        let first = tv.installment_by_number(1).unwrap().clone();
        tv.mark_paid(first.id, first.amount, first.due_date, &time).unwrap();
        fridge.cancel("returned", &time).unwrap();
        sofa.suspend("dispute", &time).unwrap();

        let classifier = ScheduleClassifier::default();
        let today = date(2025, 2, 12);
        let summary = PortfolioSummary::build("user-7", [&tv, &fridge, &sofa], &classifier, today, 30);

        assert_eq!(summary.total_plans, 3);
        assert_eq!(summary.active_plans, 1);
        assert_eq!(summary.suspended_plans, 1);
        assert_eq!(summary.cancelled_plans, 1);
        assert_eq!(summary.paid_installments, 1);
        // tv #2 fell due on Feb 10
        assert_eq!(summary.overdue_installments, 1);
        assert_eq!(summary.total_overdue, Money::from_major(1_000));
        assert_eq!(summary.pending_installments, 4);
        assert_eq!(summary.total_amount_owed, Money::from_major(2_600));
        assert_eq!(summary.total_amount_paid, Money::from_major(1_000));

        let next = summary.next_payment.unwrap();
        assert_eq!(next.plan_id, tv.id);
        assert_eq!(next.due_date, date(2025, 3, 10));
        assert_eq!(summary.upcoming.len(), 1);
    }

    #[test]
    fn test_monthly_load() {
        let time = clock();
        let a = plan(3_000, 3, date(2025, 1, 10), &time);
        let mut b = plan(1_200, 2, date(2025, 2, 10), &time);
        let first = b.installment_by_number(1).unwrap().clone();
        b.mark_paid(first.id, Money::from_major(200), first.due_date, &time).unwrap();

        let load = MonthlyLoad::build([&a, &b], 2025, 2, date(2025, 2, 20)).unwrap();
        assert_eq!(load.total_installments, 2);
        assert_eq!(load.total_amount, Money::from_major(1_600));
        assert_eq!(load.paid_amount, Money::from_major(200));
        assert_eq!(load.pending_amount, Money::from_major(1_400));
        assert_eq!(load.overdue_amount, Money::from_major(1_400));
        assert_eq!(load.by_day.len(), 1);
        assert_eq!(load.by_day[0].installments, 2);

        assert!(MonthlyLoad::build([&a], 2025, 13, date(2025, 2, 20)).is_err());
    }
}
