pub mod accounts;
pub mod calendar;
pub mod classification;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod installment;
pub mod ledger;
pub mod payments;
pub mod plan;
pub mod policy;
pub mod serialization;
pub mod types;

// re-export key types
pub use accounts::{AccountGateway, InMemoryAccounts};
pub use classification::{ClassifiedInstallment, MonthlyLoad, PortfolioSummary, ScheduleClassifier};
pub use config::EngineConfig;
pub use decimal::{Currency, Money, Rate};
pub use errors::{EngineError, ErrorKind, Result};
pub use events::{Event, EventStore};
pub use installment::Installment;
pub use ledger::{PlanLedger, VersionedPlan};
pub use payments::{
    AllocatePaymentRequest, AllocationResult, AmortizationCalculator, CancelPlanRequest,
    CreatePlanRequest, CreatePlanResponse, PayInstallmentRequest, PayInstallmentResponse,
    PaymentAllocator, PreviewRequest, PreviewResponse, Schedule, ScheduleTerms,
};
pub use plan::{InstallmentPlan, PlanMetadata};
pub use policy::{CreditPolicy, InstallmentOption, PricingPolicy};
pub use serialization::PlanView;
pub use types::{
    AccountType, AllocationStrategy, InstallmentId, InstallmentStatus, PlanId, PlanStatus,
    TransactionId, Urgency,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
