use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::decimal::{Currency, Money, Rate};
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::installment::{AppliedPayment, Installment};
use crate::payments::amortization::Schedule;
use crate::types::{InstallmentId, PlanId, PlanStatus, TransactionId};

/// descriptive data attached to a plan at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    pub card_id: String,
    pub user_id: String,
    pub transaction_id: Option<TransactionId>,
    pub description: String,
    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub currency: Currency,
}

impl PlanMetadata {
    pub fn new(card_id: impl Into<String>, user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            user_id: user_id.into(),
            transaction_id: None,
            description: description.into(),
            merchant_name: None,
            merchant_id: None,
            currency: Currency::default(),
        }
    }

    pub fn with_merchant(mut self, name: impl Into<String>, id: Option<String>) -> Self {
        self.merchant_name = Some(name.into());
        self.merchant_id = id;
        self
    }

    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }
}

/// how a payment was made, stamped onto the installment it pays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTag {
    pub method: Option<String>,
    pub reference: Option<String>,
}

/// plan-level totals after a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    pub paid_installments: u32,
    pub remaining_amount: Money,
}

/// result of paying one installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentPayment {
    pub installment: Installment,
    pub applied: Money,
    pub plan: PlanSnapshot,
}

/// installment plan aggregate
///
/// Owns its installments. Every public mutator runs on a draft copy, checks
/// the balance rules on the draft and only then replaces `self`, so a failed
/// operation leaves the plan untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentPlan {
    // identification
    pub id: PlanId,
    pub card_id: String,
    pub user_id: String,
    pub transaction_id: Option<TransactionId>,

    // financial terms
    pub total_amount: Money,
    pub installments_count: u32,
    pub installment_amount: Money,
    pub interest_rate: Rate,
    pub total_interest: Money,
    pub admin_fee: Money,
    pub total_to_pay: Money,
    pub currency: Currency,

    // lifecycle
    pub status: PlanStatus,
    pub paid_installments: u32,
    pub remaining_amount: Money,
    pub cancellation_reason: Option<String>,

    // dates
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    // descriptive
    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub description: String,

    installments: Vec<Installment>,

    #[serde(skip)]
    pub events: EventStore,
}

impl InstallmentPlan {
    /// materialize a plan and its installments from a computed schedule
    pub fn create(schedule: &Schedule, metadata: PlanMetadata, time_provider: &SafeTimeProvider) -> Result<Self> {
        let now = time_provider.now();
        let id = Uuid::new_v4();

        let installments = schedule
            .installments
            .iter()
            .map(|line| Installment::from_schedule(id, line, now))
            .collect();

        let mut plan = Self {
            id,
            card_id: metadata.card_id,
            user_id: metadata.user_id,
            transaction_id: metadata.transaction_id,
            total_amount: schedule.principal,
            installments_count: schedule.installments_count,
            installment_amount: schedule.installment_amount,
            interest_rate: schedule.interest_rate,
            total_interest: schedule.total_interest,
            admin_fee: schedule.admin_fee,
            total_to_pay: schedule.total_to_pay,
            currency: metadata.currency,
            status: PlanStatus::Active,
            paid_installments: 0,
            remaining_amount: schedule.total_to_pay,
            cancellation_reason: None,
            start_date: schedule.start_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            merchant_name: metadata.merchant_name,
            merchant_id: metadata.merchant_id,
            description: metadata.description,
            installments,
            events: EventStore::new(),
        };

        plan.verify_invariants().inspect_err(|e| log_violation(id, "create", e))?;

        plan.events.emit(Event::PlanCreated {
            plan_id: id,
            transaction_id: plan.transaction_id,
            total_amount: plan.total_amount,
            total_to_pay: plan.total_to_pay,
            installments_count: plan.installments_count,
            timestamp: now,
        });

        info!(
            plan_id = %id,
            card_id = %plan.card_id,
            installments = plan.installments_count,
            total_to_pay = %plan.total_to_pay,
            "installment plan created"
        );

        Ok(plan)
    }

    // accessors

    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn installment(&self, id: InstallmentId) -> Option<&Installment> {
        self.installments.iter().find(|i| i.id == id)
    }

    pub fn installment_by_number(&self, number: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.number == number)
    }

    pub fn contains(&self, id: InstallmentId) -> bool {
        self.installment(id).is_some()
    }

    /// installments that still owe money, in schedule order
    pub fn open_installments(&self) -> impl Iterator<Item = &Installment> {
        self.installments.iter().filter(|i| i.can_pay())
    }

    pub fn total_paid(&self) -> Money {
        self.installments.iter().map(|i| i.paid_amount).sum()
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: self.id,
            status: self.status,
            paid_installments: self.paid_installments,
            remaining_amount: self.remaining_amount,
        }
    }

    // mutators

    /// pay `amount` against one installment
    pub fn mark_paid(
        &mut self,
        installment_id: InstallmentId,
        amount: Money,
        paid_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<InstallmentPayment> {
        self.mark_paid_tagged(installment_id, amount, paid_date, PaymentTag::default(), time_provider)
    }

    /// `mark_paid`, recording payment method and reference on the installment
    pub fn mark_paid_tagged(
        &mut self,
        installment_id: InstallmentId,
        amount: Money,
        paid_date: NaiveDate,
        tag: PaymentTag,
        time_provider: &SafeTimeProvider,
    ) -> Result<InstallmentPayment> {
        let now = time_provider.now();
        self.atomically("mark_paid", |plan| {
            let outcome = plan.apply_installment_payment(installment_id, amount, paid_date, &tag, now)?;
            let installment = plan
                .installment(installment_id)
                .cloned()
                .ok_or(EngineError::InstallmentNotFound { id: installment_id })?;
            Ok(InstallmentPayment {
                installment,
                applied: outcome.applied,
                plan: plan.snapshot(),
            })
        })
    }

    /// cancel the plan and every installment not yet paid
    pub fn cancel(&mut self, reason: &str, time_provider: &SafeTimeProvider) -> Result<PlanSnapshot> {
        let now = time_provider.now();
        self.atomically("cancel", |plan| {
            if !matches!(plan.status, PlanStatus::Active | PlanStatus::Suspended) {
                return Err(EngineError::PlanNotCancellable { status: plan.status });
            }

            let plan_id = plan.id;
            let mut cancelled = 0u32;
            let mut written_off = Money::ZERO;
            let mut cascade = Vec::new();
            for inst in plan.installments.iter_mut() {
                let outstanding = inst.remaining_amount;
                if inst.cancel(now) {
                    cancelled += 1;
                    written_off += outstanding;
                    cascade.push(Event::InstallmentCancelled {
                        plan_id,
                        installment_id: inst.id,
                        number: inst.number,
                        timestamp: now,
                    });
                }
            }
            for event in cascade {
                plan.events.emit(event);
            }

            plan.transition(PlanStatus::Cancelled, now);
            plan.cancelled_at = Some(now);
            plan.cancellation_reason = Some(reason.to_string());
            plan.remaining_amount = Money::ZERO;

            plan.events.emit(Event::PlanCancelled {
                plan_id,
                reason: reason.to_string(),
                cancelled_installments: cancelled,
                written_off,
                timestamp: now,
            });

            info!(plan_id = %plan_id, cancelled, written_off = %written_off, reason, "plan cancelled");
            Ok(plan.snapshot())
        })
    }

    /// put an active plan on hold; payments are refused until resumed
    pub fn suspend(&mut self, reason: &str, time_provider: &SafeTimeProvider) -> Result<PlanSnapshot> {
        let now = time_provider.now();
        self.atomically("suspend", |plan| {
            if plan.status != PlanStatus::Active {
                return Err(EngineError::PlanNotSuspendable { status: plan.status });
            }
            plan.transition(PlanStatus::Suspended, now);
            plan.events.emit(Event::PlanSuspended {
                plan_id: plan.id,
                reason: reason.to_string(),
                timestamp: now,
            });
            info!(plan_id = %plan.id, reason, "plan suspended");
            Ok(plan.snapshot())
        })
    }

    pub fn resume(&mut self, reason: &str, time_provider: &SafeTimeProvider) -> Result<PlanSnapshot> {
        let now = time_provider.now();
        self.atomically("resume", |plan| {
            if plan.status != PlanStatus::Suspended {
                return Err(EngineError::PlanNotSuspended { status: plan.status });
            }
            plan.transition(PlanStatus::Active, now);
            plan.events.emit(Event::PlanResumed {
                plan_id: plan.id,
                reason: reason.to_string(),
                timestamp: now,
            });
            info!(plan_id = %plan.id, reason, "plan resumed");
            Ok(plan.snapshot())
        })
    }

    /// store the overdue flag on open installments past their due date
    ///
    /// Reads never need this; it exists for sweep jobs that index overdue
    /// installments. Returns how many installments were flagged.
    pub fn materialize_overdue(&mut self, time_provider: &SafeTimeProvider) -> Result<u32> {
        let now = time_provider.now();
        let today = now.date_naive();
        self.atomically("materialize_overdue", |plan| {
            if plan.status.is_terminal() {
                return Ok(0);
            }
            let plan_id = plan.id;
            let mut flagged = Vec::new();
            for inst in plan.installments.iter_mut() {
                if inst.mark_overdue(today, now) {
                    flagged.push(Event::InstallmentMarkedOverdue {
                        plan_id,
                        installment_id: inst.id,
                        number: inst.number,
                        due_date: inst.due_date,
                        timestamp: now,
                    });
                }
            }
            let count = flagged.len() as u32;
            for event in flagged {
                plan.events.emit(event);
            }
            if count > 0 {
                plan.updated_at = now;
            }
            Ok(count)
        })
    }

    /// record the card charge that funded the plan
    pub(crate) fn attach_transaction(&mut self, transaction_id: TransactionId) {
        self.transaction_id = Some(transaction_id);
        for mut event in self.events.take_events() {
            if let Event::PlanCreated { transaction_id: recorded, .. } = &mut event {
                *recorded = Some(transaction_id);
            }
            self.events.emit(event);
        }
    }

    /// run `op` on a draft and commit only if it succeeds and the draft is consistent
    pub(crate) fn atomically<T, F>(&mut self, operation: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut draft = self.clone();
        let out = op(&mut draft)?;
        let plan_id = self.id;
        draft
            .verify_invariants()
            .inspect_err(|e| log_violation(plan_id, operation, e))?;
        *self = draft;
        Ok(out)
    }

    /// unguarded single-installment payment; callers wrap it in `atomically`
    pub(crate) fn apply_installment_payment(
        &mut self,
        installment_id: InstallmentId,
        amount: Money,
        paid_date: NaiveDate,
        tag: &PaymentTag,
        now: DateTime<Utc>,
    ) -> Result<AppliedPayment> {
        if self.status != PlanStatus::Active {
            return Err(EngineError::PlanNotActive { status: self.status });
        }

        let plan_id = self.id;
        let inst = self
            .installments
            .iter_mut()
            .find(|i| i.id == installment_id)
            .ok_or(EngineError::InstallmentNotInPlan { plan_id, installment_id })?;

        let outcome = inst.apply_payment(amount, paid_date, now)?;
        if tag.method.is_some() {
            inst.payment_method = tag.method.clone();
        }
        if tag.reference.is_some() {
            inst.payment_reference = tag.reference.clone();
        }
        let event = Event::InstallmentPaymentApplied {
            plan_id,
            installment_id,
            number: inst.number,
            amount: outcome.applied,
            previous_paid: outcome.previous_paid,
            current_paid: inst.paid_amount,
            status: inst.status,
            paid_date,
            timestamp: now,
        };
        self.events.emit(event);

        self.refresh_totals(now);
        Ok(outcome)
    }

    /// recompute paid count and remaining balance; completes the plan when all are paid
    fn refresh_totals(&mut self, now: DateTime<Utc>) {
        self.paid_installments = self.installments.iter().filter(|i| i.is_paid()).count() as u32;
        self.remaining_amount = self.total_to_pay - self.total_paid();
        self.updated_at = now;

        if self.status == PlanStatus::Active && self.paid_installments == self.installments_count {
            self.transition(PlanStatus::Completed, now);
            self.completed_at = Some(now);
            self.events.emit(Event::PlanCompleted {
                plan_id: self.id,
                total_paid: self.total_paid(),
                timestamp: now,
            });
            info!(plan_id = %self.id, total_paid = %self.total_paid(), "plan completed");
        }
    }

    fn transition(&mut self, new_status: PlanStatus, now: DateTime<Utc>) {
        let old_status = self.status;
        self.status = new_status;
        self.updated_at = now;
        self.events.emit(Event::StatusChanged {
            plan_id: self.id,
            old_status,
            new_status,
            timestamp: now,
        });
    }

    /// check every balance and status rule of the aggregate
    pub fn verify_invariants(&self) -> Result<()> {
        if self.installments.len() != self.installments_count as usize {
            return Err(EngineError::invariant(
                "installment_set",
                format!("{} installments for a count of {}", self.installments.len(), self.installments_count),
            ));
        }
        for (idx, inst) in self.installments.iter().enumerate() {
            if inst.number != idx as u32 + 1 || inst.plan_id != self.id {
                return Err(EngineError::invariant(
                    "installment_set",
                    format!("installment at position {} is #{} of plan {}", idx + 1, inst.number, inst.plan_id),
                ));
            }
            inst.check_consistency()?;
        }

        let scheduled: Money = self.installments.iter().map(|i| i.amount).sum();
        let tolerance = Money::CENT * rust_decimal::Decimal::from(self.installments_count);
        if (scheduled - self.total_to_pay).abs() > tolerance {
            return Err(EngineError::invariant(
                "schedule_total",
                format!("installments sum to {} but total to pay is {}", scheduled, self.total_to_pay),
            ));
        }

        let paid = self.installments.iter().filter(|i| i.is_paid()).count() as u32;
        if paid != self.paid_installments {
            return Err(EngineError::invariant(
                "paid_count",
                format!("paid count {} but {} installments are paid", self.paid_installments, paid),
            ));
        }

        let expected_remaining = match self.status {
            PlanStatus::Cancelled => Money::ZERO,
            _ => self.total_to_pay - self.total_paid(),
        };
        if self.remaining_amount != expected_remaining {
            return Err(EngineError::invariant(
                "remaining_balance",
                format!("remaining {} but expected {}", self.remaining_amount, expected_remaining),
            ));
        }

        let open = self.installments.iter().filter(|i| i.can_pay()).count();
        let status_ok = match self.status {
            PlanStatus::Completed => paid == self.installments_count && self.remaining_amount.is_zero(),
            PlanStatus::Cancelled => open == 0,
            PlanStatus::Active | PlanStatus::Suspended => paid < self.installments_count,
        };
        if !status_ok {
            return Err(EngineError::invariant(
                "plan_status",
                format!("plan is {} with {} of {} installments paid", self.status, paid, self.installments_count),
            ));
        }

        Ok(())
    }
}

fn log_violation(plan_id: PlanId, operation: &'static str, err: &EngineError) {
    if let EngineError::InvariantViolation { invariant, detail } = err {
        error!(plan_id = %plan_id, operation, invariant, detail = %detail, "plan invariant violated; mutation aborted");
    }
}
