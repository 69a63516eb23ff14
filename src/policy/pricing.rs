use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::payments::amortization::{AmortizationCalculator, Schedule, ScheduleTerms};
use crate::payments::PreviewRequest;

/// one row of a "choose your plan" comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentOption {
    pub installments_count: u32,
    pub interest_rate: Decimal,
    pub installment_amount: Money,
    pub total_interest: Money,
    pub admin_fee: Money,
    pub total_to_pay: Money,
}

/// default rate and fee for previews that leave them out
#[derive(Debug, Clone, Default)]
pub struct PricingPolicy {
    config: PricingConfig,
    calculator: AmortizationCalculator,
}

impl PricingPolicy {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            config,
            calculator: AmortizationCalculator::new(),
        }
    }

    /// first tier whose threshold covers `count`, else the fallback rate
    pub fn rate_for_count(&self, count: u32) -> Rate {
        let count = Decimal::from(count);
        self.config
            .count_tiers
            .iter()
            .find(|t| count <= t.threshold)
            .map(|t| t.rate)
            .unwrap_or(self.config.fallback_rate)
    }

    /// `max(amount * pct, minimum)`
    pub fn admin_fee_for_amount(&self, amount: Money) -> Money {
        amount
            .percentage(self.config.admin_fee_percentage)
            .max(self.config.admin_fee_minimum)
    }

    /// calculator inputs with tiered defaults filled in
    pub fn terms_for(&self, request: &PreviewRequest) -> Result<ScheduleTerms> {
        let amount = Money::from_decimal(request.amount);
        request.to_terms(
            self.rate_for_count(request.installments_count),
            self.admin_fee_for_amount(amount),
        )
    }

    pub fn preview(&self, request: &PreviewRequest, today: NaiveDate) -> Result<Schedule> {
        let terms = self.terms_for(request)?;
        self.calculator.compute_as_of(&terms, today)
    }

    /// price the same purchase at several installment counts
    pub fn installment_options(
        &self,
        amount: Decimal,
        counts: &[u32],
        start_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<InstallmentOption>> {
        counts
            .iter()
            .map(|count| {
                let schedule = self.preview(&PreviewRequest::new(amount, *count, start_date), today)?;
                Ok(InstallmentOption {
                    installments_count: schedule.installments_count,
                    interest_rate: schedule.interest_rate.as_percentage(),
                    installment_amount: schedule.installment_amount,
                    total_interest: schedule.total_interest,
                    admin_fee: schedule.admin_fee,
                    total_to_pay: schedule.total_to_pay,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rate_tiers() {
        let pricing = PricingPolicy::default();
        assert_eq!(pricing.rate_for_count(3), Rate::from_percentage(dec!(12.5)));
        assert_eq!(pricing.rate_for_count(6), Rate::from_percentage(dec!(12.5)));
        assert_eq!(pricing.rate_for_count(9), Rate::from_percentage(dec!(15.5)));
        assert_eq!(pricing.rate_for_count(18), Rate::from_percentage(dec!(18)));
        assert_eq!(pricing.rate_for_count(24), Rate::from_percentage(dec!(21.5)));
    }

    #[test]
    fn test_admin_fee() {
        let pricing = PricingPolicy::default();
        assert_eq!(pricing.admin_fee_for_amount(Money::from_major(90_000)), Money::from_major(2_250));
        assert_eq!(pricing.admin_fee_for_amount(Money::from_major(1_000)), Money::from_major(50));
    }

    #[test]
    fn test_preview_uses_defaults_unless_given() {
        let pricing = PricingPolicy::default();
        let today = date(2025, 1, 15);

        let schedule = pricing
            .preview(&PreviewRequest::new(dec!(90000), 3, date(2025, 2, 1)), today)
            .unwrap();
        assert_eq!(schedule.interest_rate, Rate::from_percentage(dec!(12.5)));
        assert_eq!(schedule.admin_fee, Money::from_major(2_250));
        // 90000 * 12.5 * 3 / 1200
        assert_eq!(schedule.total_interest, Money::from_decimal(dec!(2812.50)));

        let explicit = PreviewRequest::new(dec!(90000), 3, date(2025, 2, 1))
            .with_interest_rate(dec!(15.5))
            .with_admin_fee(dec!(2250));
        let schedule = pricing.preview(&explicit, today).unwrap();
        assert_eq!(schedule.total_to_pay, Money::from_decimal(dec!(95737.50)));
    }

    #[test]
    fn test_installment_options() {
        let pricing = PricingPolicy::default();
        let options = pricing
            .installment_options(dec!(12000), &[3, 12, 24], date(2025, 2, 1), date(2025, 1, 15))
            .unwrap();

        assert_eq!(options.len(), 3);
        assert_eq!(options[0].interest_rate, dec!(12.5));
        assert_eq!(options[2].interest_rate, dec!(21.5));
        assert!(options.windows(2).all(|w| w[0].total_to_pay < w[1].total_to_pay));
        assert!(options.iter().all(|o| o.admin_fee == Money::from_major(300)));

        let err = pricing
            .installment_options(dec!(12000), &[3, 30], date(2025, 2, 1), date(2025, 1, 15))
            .unwrap_err();
        assert_eq!(err.field(), Some("installments_count"));
    }
}
