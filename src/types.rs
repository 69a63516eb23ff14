use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for an installment plan
pub type PlanId = Uuid;

/// unique identifier for a single installment
pub type InstallmentId = Uuid;

/// originating purchase transaction on the card
pub type TransactionId = Uuid;

/// plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// accepting payments
    Active,
    /// every installment paid
    Completed,
    /// cancelled; unpaid installments cancelled with it
    Cancelled,
    /// externally held; payments rejected until resumed
    Suspended,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Suspended => "suspended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// installment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    /// nothing paid yet
    Pending,
    /// some amount paid, remainder outstanding
    Partial,
    /// paid in full
    Paid,
    /// due date passed without full payment
    Overdue,
    /// cancelled with its plan
    Cancelled,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    /// statuses that still owe money
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Partial | Self::Overdue)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// how an incoming payment picks the installments it pays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// overdue first, then ascending due date
    OldestDueFirst,
    /// only these installments; overdue ones are still retired first
    Selected(Vec<InstallmentId>),
}

/// urgency of an upcoming installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Overdue,
    Urgent,
    Warning,
    Normal,
}

/// kind of account a payment is debited from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
    Wallet,
}
