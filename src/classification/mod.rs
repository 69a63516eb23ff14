pub mod summary;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::UrgencyThresholds;
use crate::decimal::Money;
use crate::installment::Installment;
use crate::types::{InstallmentId, InstallmentStatus, PlanId, Urgency};

pub use summary::{DailyLoad, MonthlyLoad, NextPayment, PortfolioSummary};

/// installment as seen on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedInstallment {
    pub installment_id: InstallmentId,
    pub plan_id: PlanId,
    pub number: u32,
    pub status: InstallmentStatus,
    pub due_date: NaiveDate,
    pub remaining_amount: Money,
    pub days_until_due: i64,
    pub days_overdue: i64,
    pub urgency: Urgency,
}

/// read-only views over installments relative to a date
///
/// Nothing here mutates; overdue is derived from the due date rather than
/// read from the stored status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleClassifier {
    thresholds: UrgencyThresholds,
}

impl ScheduleClassifier {
    pub fn new(thresholds: UrgencyThresholds) -> Self {
        Self { thresholds }
    }

    /// open installments past their due date, oldest first
    pub fn overdue<'a, I>(&self, installments: I, today: NaiveDate) -> Vec<&'a Installment>
    where
        I: IntoIterator<Item = &'a Installment>,
    {
        let mut overdue: Vec<_> = installments
            .into_iter()
            .filter(|i| i.is_overdue_on(today))
            .collect();
        overdue.sort_by_key(|i| (i.due_date, i.number));
        overdue
    }

    /// earliest open installment due today or later, else the oldest overdue one
    pub fn next_due<'a, I>(&self, installments: I, today: NaiveDate) -> Option<&'a Installment>
    where
        I: IntoIterator<Item = &'a Installment>,
    {
        let open: Vec<_> = installments.into_iter().filter(|i| i.can_pay()).collect();
        open.iter()
            .filter(|i| i.due_date >= today)
            .min_by_key(|i| (i.due_date, i.number))
            .or_else(|| open.iter().min_by_key(|i| (i.due_date, i.number)))
            .copied()
    }

    /// open installments due within `days` of today, inclusive on both ends
    pub fn upcoming<'a, I>(&self, installments: I, today: NaiveDate, days: i64) -> Vec<&'a Installment>
    where
        I: IntoIterator<Item = &'a Installment>,
    {
        let horizon = today + Duration::days(days.max(0));
        let mut upcoming: Vec<_> = installments
            .into_iter()
            .filter(|i| i.can_pay() && i.due_date >= today && i.due_date <= horizon)
            .collect();
        upcoming.sort_by_key(|i| (i.due_date, i.number));
        upcoming
    }

    pub fn days_until_due(&self, installment: &Installment, today: NaiveDate) -> i64 {
        installment.days_until_due(today)
    }

    pub fn days_overdue(&self, installment: &Installment, today: NaiveDate) -> i64 {
        installment.days_overdue(today)
    }

    /// presentation urgency; settled installments are always normal
    pub fn urgency(&self, installment: &Installment, today: NaiveDate) -> Urgency {
        if !installment.can_pay() {
            return Urgency::Normal;
        }
        if installment.is_overdue_on(today) {
            return Urgency::Overdue;
        }
        self.urgency_for_days(installment.days_until_due(today))
    }

    pub fn urgency_for_days(&self, days_until_due: i64) -> Urgency {
        match days_until_due {
            d if d < 0 => Urgency::Overdue,
            d if d <= self.thresholds.urgent_days => Urgency::Urgent,
            d if d <= self.thresholds.warning_days => Urgency::Warning,
            _ => Urgency::Normal,
        }
    }

    pub fn classify(&self, installment: &Installment, today: NaiveDate) -> ClassifiedInstallment {
        ClassifiedInstallment {
            installment_id: installment.id,
            plan_id: installment.plan_id,
            number: installment.number,
            status: installment.effective_status(today),
            due_date: installment.due_date,
            remaining_amount: installment.remaining_amount,
            days_until_due: installment.days_until_due(today),
            days_overdue: installment.days_overdue(today),
            urgency: self.urgency(installment, today),
        }
    }
}
