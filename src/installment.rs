use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::payments::amortization::ScheduledInstallment;
use crate::types::{InstallmentId, InstallmentStatus, PlanId};

/// one scheduled payment of a plan
///
/// Amount and due date are fixed at creation; only the paid columns and the
/// status move afterwards, and only through the owning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installment {
    pub id: InstallmentId,
    pub plan_id: PlanId,
    pub number: u32,

    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
    pub paid_amount: Money,
    pub remaining_amount: Money,

    pub status: InstallmentStatus,
    pub due_date: NaiveDate,
    /// set only once the installment is paid in full
    pub paid_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// outcome of applying money to one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPayment {
    pub applied: Money,
    pub previous_paid: Money,
    pub status: InstallmentStatus,
}

impl Installment {
    pub(crate) fn from_schedule(plan_id: PlanId, line: &ScheduledInstallment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            number: line.number,
            amount: line.amount,
            principal: line.principal,
            interest: line.interest,
            fee: line.fee,
            paid_amount: Money::ZERO,
            remaining_amount: line.amount,
            status: InstallmentStatus::Pending,
            due_date: line.due_date,
            paid_date: None,
            payment_method: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// pending, partial or overdue
    pub fn can_pay(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == InstallmentStatus::Cancelled
    }

    /// status as seen on `today`
    ///
    /// Cancelled and paid are final. Anything else still owing money past its
    /// due date reads as overdue, whatever the stored status says.
    pub fn effective_status(&self, today: NaiveDate) -> InstallmentStatus {
        match self.status {
            InstallmentStatus::Cancelled | InstallmentStatus::Paid => self.status,
            _ if self.due_date < today => InstallmentStatus::Overdue,
            _ if self.paid_amount.is_positive() => InstallmentStatus::Partial,
            _ => InstallmentStatus::Pending,
        }
    }

    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.effective_status(today) == InstallmentStatus::Overdue
    }

    /// negative once the due date has passed
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        calendar::days_between(today, self.due_date)
    }

    /// zero unless overdue
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.is_overdue_on(today) {
            calendar::days_between(self.due_date, today)
        } else {
            0
        }
    }

    /// apply up to `amount`; returns what was actually taken
    ///
    /// Covering the remaining amount pays the installment off, anything less
    /// leaves it partial. Money beyond the remaining amount is not absorbed.
    pub(crate) fn apply_payment(
        &mut self,
        amount: Money,
        paid_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AppliedPayment> {
        if !self.can_pay() {
            return Err(EngineError::InstallmentNotPayable {
                id: self.id,
                status: self.status,
            });
        }
        if !amount.is_positive() {
            return Err(EngineError::validation("amount", "payment amount must be greater than 0"));
        }

        let previous_paid = self.paid_amount;
        let applied = amount.min(self.remaining_amount);

        self.paid_amount += applied;
        self.remaining_amount -= applied;
        if self.remaining_amount.is_zero() {
            self.status = InstallmentStatus::Paid;
            self.paid_date = Some(paid_date);
        } else {
            self.status = InstallmentStatus::Partial;
        }
        self.updated_at = now;

        Ok(AppliedPayment {
            applied,
            previous_paid,
            status: self.status,
        })
    }

    /// cancel unless already paid; returns whether anything changed
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paid() || self.is_cancelled() {
            return false;
        }
        self.status = InstallmentStatus::Cancelled;
        self.updated_at = now;
        true
    }

    /// persist the derived overdue flag; returns whether anything changed
    pub(crate) fn mark_overdue(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        let flaggable = matches!(self.status, InstallmentStatus::Pending | InstallmentStatus::Partial);
        if flaggable && self.due_date < today {
            self.status = InstallmentStatus::Overdue;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// balance and status consistency of this line
    pub fn check_consistency(&self) -> Result<()> {
        if self.paid_amount.is_negative() || self.remaining_amount.is_negative() {
            return Err(EngineError::invariant(
                "installment_balance",
                format!("installment #{} has a negative balance", self.number),
            ));
        }
        if self.remaining_amount != self.amount - self.paid_amount {
            return Err(EngineError::invariant(
                "installment_balance",
                format!(
                    "installment #{}: remaining {} != amount {} - paid {}",
                    self.number, self.remaining_amount, self.amount, self.paid_amount
                ),
            ));
        }

        let consistent = match self.status {
            InstallmentStatus::Cancelled => true,
            InstallmentStatus::Paid => self.remaining_amount.is_zero() && self.paid_date.is_some(),
            InstallmentStatus::Pending => self.paid_amount.is_zero() && self.paid_date.is_none(),
            InstallmentStatus::Partial => {
                self.paid_amount.is_positive()
                    && self.remaining_amount.is_positive()
                    && self.paid_date.is_none()
            }
            InstallmentStatus::Overdue => {
                self.remaining_amount.is_positive() && self.paid_date.is_none()
            }
        };
        if !consistent {
            return Err(EngineError::invariant(
                "installment_status",
                format!(
                    "installment #{} is {} with paid {} of {}",
                    self.number, self.status, self.paid_amount, self.amount
                ),
            ));
        }
        Ok(())
    }
}
