use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{InstallmentId, InstallmentStatus, PlanId, PlanStatus, TransactionId};

/// audit events emitted by plan mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    PlanCreated {
        plan_id: PlanId,
        transaction_id: Option<TransactionId>,
        total_amount: Money,
        total_to_pay: Money,
        installments_count: u32,
        timestamp: DateTime<Utc>,
    },
    PlanCompleted {
        plan_id: PlanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    PlanCancelled {
        plan_id: PlanId,
        reason: String,
        cancelled_installments: u32,
        written_off: Money,
        timestamp: DateTime<Utc>,
    },
    PlanSuspended {
        plan_id: PlanId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PlanResumed {
        plan_id: PlanId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // installment events
    InstallmentPaymentApplied {
        plan_id: PlanId,
        installment_id: InstallmentId,
        number: u32,
        amount: Money,
        previous_paid: Money,
        current_paid: Money,
        status: InstallmentStatus,
        paid_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    InstallmentCancelled {
        plan_id: PlanId,
        installment_id: InstallmentId,
        number: u32,
        timestamp: DateTime<Utc>,
    },
    InstallmentMarkedOverdue {
        plan_id: PlanId,
        installment_id: InstallmentId,
        number: u32,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    // allocation events
    PaymentAllocated {
        plan_id: PlanId,
        reference: Option<String>,
        amount: Money,
        allocated: Money,
        unallocated: Money,
        installments_touched: u32,
        timestamp: DateTime<Utc>,
    },

    StatusChanged {
        plan_id: PlanId,
        old_status: PlanStatus,
        new_status: PlanStatus,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn plan_id(&self) -> PlanId {
        match self {
            Event::PlanCreated { plan_id, .. }
            | Event::PlanCompleted { plan_id, .. }
            | Event::PlanCancelled { plan_id, .. }
            | Event::PlanSuspended { plan_id, .. }
            | Event::PlanResumed { plan_id, .. }
            | Event::InstallmentPaymentApplied { plan_id, .. }
            | Event::InstallmentCancelled { plan_id, .. }
            | Event::InstallmentMarkedOverdue { plan_id, .. }
            | Event::PaymentAllocated { plan_id, .. }
            | Event::StatusChanged { plan_id, .. } => *plan_id,
        }
    }

    /// short action name, as stored in audit tables
    pub fn action(&self) -> &'static str {
        match self {
            Event::PlanCreated { .. } => "created",
            Event::PlanCompleted { .. } => "completed",
            Event::PlanCancelled { .. } => "cancelled",
            Event::PlanSuspended { .. } => "suspended",
            Event::PlanResumed { .. } => "reactivated",
            Event::InstallmentPaymentApplied { .. } => "installment_paid",
            Event::InstallmentCancelled { .. } => "installment_cancelled",
            Event::InstallmentMarkedOverdue { .. } => "installment_overdue",
            Event::PaymentAllocated { .. } => "payment_allocated",
            Event::StatusChanged { .. } => "status_changed",
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// events concerning one installment
    pub fn for_installment(&self, id: InstallmentId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| match e {
                Event::InstallmentPaymentApplied { installment_id, .. }
                | Event::InstallmentCancelled { installment_id, .. }
                | Event::InstallmentMarkedOverdue { installment_id, .. } => *installment_id == id,
                _ => false,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
