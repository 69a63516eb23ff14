use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Currency, Money, Rate};
use crate::errors::{EngineError, Result};

/// hard ceiling on installments per plan
pub const MAX_INSTALLMENTS: u32 = 24;

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub installments: InstallmentTerms,
    pub pricing: PricingConfig,
    pub credit: CreditPolicyConfig,
    pub urgency: UrgencyThresholds,
}

/// limits applied when a plan is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentTerms {
    pub allowed_counts: Vec<u32>,
    pub max_count: u32,
    pub min_amount: Money,
    pub max_amount: Money,
    pub currency: Currency,
}

/// one step of a threshold table
///
/// tables are read top to bottom and the first matching row wins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub threshold: Decimal,
    pub rate: Rate,
}

/// pricing used for previews when the caller omits rate or fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// rate by installment count: first row with `count <= threshold`
    pub count_tiers: Vec<RateTier>,
    /// rate for counts above every tier
    pub fallback_rate: Rate,
    pub admin_fee_percentage: Decimal,
    pub admin_fee_minimum: Money,
}

/// credit account rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPolicyConfig {
    pub minimum_payment_percentage: Decimal,
    pub minimum_payment_floor: Money,
    pub base_rate: Rate,
    pub floor_rate: Rate,
    /// discount by credit limit: first row with `limit >= threshold`
    pub limit_tiers: Vec<RateTier>,
    /// discount by credit score: first row with `score >= threshold`
    pub score_tiers: Vec<RateTier>,
    pub grace_period_days: u32,
    pub max_closing_to_due_days: u32,
    pub max_billing_horizon_days: u32,
}

/// day thresholds for urgency classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    pub urgent_days: i64,
    pub warning_days: i64,
}

impl Default for InstallmentTerms {
    fn default() -> Self {
        Self {
            allowed_counts: vec![3, 6, 9, 12, 15, 18, 21, 24],
            max_count: MAX_INSTALLMENTS,
            min_amount: Money::from_major(1_000),
            max_amount: Money::from_major(500_000),
            currency: Currency::default(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            count_tiers: vec![
                RateTier { threshold: dec!(6), rate: Rate::from_percentage(dec!(12.5)) },
                RateTier { threshold: dec!(12), rate: Rate::from_percentage(dec!(15.5)) },
                RateTier { threshold: dec!(18), rate: Rate::from_percentage(dec!(18.0)) },
            ],
            fallback_rate: Rate::from_percentage(dec!(21.5)),
            admin_fee_percentage: dec!(2.5),
            admin_fee_minimum: Money::from_major(50),
        }
    }
}

impl Default for CreditPolicyConfig {
    fn default() -> Self {
        Self {
            minimum_payment_percentage: dec!(3),
            minimum_payment_floor: Money::from_major(50),
            base_rate: Rate::from_percentage(dec!(25)),
            floor_rate: Rate::from_percentage(dec!(12)),
            limit_tiers: vec![
                RateTier { threshold: dec!(100000), rate: Rate::from_percentage(dec!(5)) },
                RateTier { threshold: dec!(50000), rate: Rate::from_percentage(dec!(2)) },
            ],
            score_tiers: vec![
                RateTier { threshold: dec!(800), rate: Rate::from_percentage(dec!(8)) },
                RateTier { threshold: dec!(700), rate: Rate::from_percentage(dec!(5)) },
                RateTier { threshold: dec!(600), rate: Rate::from_percentage(dec!(2)) },
            ],
            grace_period_days: 15,
            max_closing_to_due_days: 45,
            max_billing_horizon_days: 730,
        }
    }
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            urgent_days: 3,
            warning_days: 7,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            installments: InstallmentTerms::default(),
            pricing: PricingConfig::default(),
            credit: CreditPolicyConfig::default(),
            urgency: UrgencyThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// promotional setup: interest-free plans with no admin fee
    pub fn interest_free() -> Self {
        let mut config = Self::default();
        config.pricing = PricingConfig {
            count_tiers: Vec::new(),
            fallback_rate: Rate::ZERO,
            admin_fee_percentage: Decimal::ZERO,
            admin_fee_minimum: Money::ZERO,
        };
        config
    }

    /// parse and validate a json document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::validation("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        let terms = &self.installments;

        if terms.max_count == 0 || terms.max_count > MAX_INSTALLMENTS {
            return Err(EngineError::validation(
                "installments.max_count",
                format!("must be between 1 and {}", MAX_INSTALLMENTS),
            ));
        }
        if terms.allowed_counts.is_empty() {
            return Err(EngineError::validation(
                "installments.allowed_counts",
                "at least one installment count must be allowed",
            ));
        }
        if let Some(bad) = terms
            .allowed_counts
            .iter()
            .find(|c| **c == 0 || **c > terms.max_count)
        {
            return Err(EngineError::validation(
                "installments.allowed_counts",
                format!("{} is outside 1..={}", bad, terms.max_count),
            ));
        }
        if !terms.min_amount.is_positive() || terms.max_amount < terms.min_amount {
            return Err(EngineError::validation(
                "installments.min_amount",
                format!("invalid amount range {}..{}", terms.min_amount, terms.max_amount),
            ));
        }

        let pricing = &self.pricing;
        check_tiers("pricing.count_tiers", &pricing.count_tiers, true)?;
        if pricing.fallback_rate.is_negative()
            || pricing.admin_fee_percentage < Decimal::ZERO
            || pricing.admin_fee_minimum.is_negative()
        {
            return Err(EngineError::validation(
                "pricing",
                "rates and fees cannot be negative",
            ));
        }

        let credit = &self.credit;
        check_tiers("credit.limit_tiers", &credit.limit_tiers, false)?;
        check_tiers("credit.score_tiers", &credit.score_tiers, false)?;
        if credit.floor_rate > credit.base_rate {
            return Err(EngineError::validation(
                "credit.floor_rate",
                "floor rate cannot exceed the base rate",
            ));
        }
        if credit.minimum_payment_percentage < Decimal::ZERO || credit.minimum_payment_floor.is_negative() {
            return Err(EngineError::validation(
                "credit.minimum_payment_percentage",
                "minimum payment rule cannot be negative",
            ));
        }

        if self.urgency.urgent_days < 0 || self.urgency.warning_days < self.urgency.urgent_days {
            return Err(EngineError::validation(
                "urgency",
                "warning window must contain the urgent window",
            ));
        }

        Ok(())
    }
}

// ascending tables match on `<=`, descending ones on `>=`
fn check_tiers(field: &'static str, tiers: &[RateTier], ascending: bool) -> Result<()> {
    for pair in tiers.windows(2) {
        let ordered = if ascending {
            pair[0].threshold < pair[1].threshold
        } else {
            pair[0].threshold > pair[1].threshold
        };
        if !ordered {
            return Err(EngineError::validation(field, "tiers must be strictly ordered"));
        }
    }
    if tiers.iter().any(|t| t.rate.is_negative()) {
        return Err(EngineError::validation(field, "tier rates cannot be negative"));
    }
    Ok(())
}
