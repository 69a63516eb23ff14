pub mod credit;
pub mod pricing;

pub use credit::CreditPolicy;
pub use pricing::{InstallmentOption, PricingPolicy};
