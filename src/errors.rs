use thiserror::Error;

use crate::decimal::Money;
use crate::types::{InstallmentId, InstallmentStatus, PlanId, PlanStatus};

/// broad error class, used by callers to map errors onto transport codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// client-fixable input problem, rejected before any mutation
    Validation,
    /// business rule refused the operation
    Conflict,
    /// the referenced plan or installment does not exist
    NotFound,
    /// stale optimistic version; re-read and retry
    Concurrency,
    /// post-mutation consistency check failed; programming defect
    InvariantViolation,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("plan not active: current status is {status:?}")]
    PlanNotActive {
        status: PlanStatus,
    },

    #[error("plan cannot be cancelled from status {status:?}")]
    PlanNotCancellable {
        status: PlanStatus,
    },

    #[error("only active plans can be suspended: current status is {status:?}")]
    PlanNotSuspendable {
        status: PlanStatus,
    },

    #[error("only suspended plans can be resumed: current status is {status:?}")]
    PlanNotSuspended {
        status: PlanStatus,
    },

    #[error("installment {id} cannot be paid in status {status:?}")]
    InstallmentNotPayable {
        id: InstallmentId,
        status: InstallmentStatus,
    },

    #[error("installment {installment_id} does not belong to plan {plan_id}")]
    InstallmentNotInPlan {
        plan_id: PlanId,
        installment_id: InstallmentId,
    },

    #[error("insufficient credit: available {available}, requested {requested}")]
    InsufficientCredit {
        available: Money,
        requested: Money,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("payment reference {reference} was already used for a different request")]
    IdempotencyKeyReused {
        reference: String,
    },

    #[error("plan not found: {id}")]
    PlanNotFound {
        id: PlanId,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: InstallmentId,
    },

    #[error("version mismatch on plan {plan_id}: expected {expected}, found {found}")]
    VersionMismatch {
        plan_id: PlanId,
        expected: u64,
        found: u64,
    },

    #[error("invariant {invariant} violated: {detail}")]
    InvariantViolation {
        invariant: &'static str,
        detail: String,
    },

    #[error("account gateway error: {message}")]
    Gateway {
        message: String,
    },
}

impl EngineError {
    /// field-tagged validation error
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invariant(invariant: &'static str, detail: impl Into<String>) -> Self {
        EngineError::InvariantViolation {
            invariant,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation { .. } => ErrorKind::Validation,
            EngineError::PlanNotFound { .. } | EngineError::InstallmentNotFound { .. } => {
                ErrorKind::NotFound
            }
            EngineError::VersionMismatch { .. } => ErrorKind::Concurrency,
            EngineError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            EngineError::PlanNotActive { .. }
            | EngineError::PlanNotCancellable { .. }
            | EngineError::PlanNotSuspendable { .. }
            | EngineError::PlanNotSuspended { .. }
            | EngineError::InstallmentNotPayable { .. }
            | EngineError::InstallmentNotInPlan { .. }
            | EngineError::InsufficientCredit { .. }
            | EngineError::InsufficientFunds { .. }
            | EngineError::IdempotencyKeyReused { .. }
            | EngineError::Gateway { .. } => ErrorKind::Conflict,
        }
    }

    /// only optimistic version conflicts are worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }

    /// field name for validation errors
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EngineError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
