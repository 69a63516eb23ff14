use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::calendar;
use crate::config::{CreditPolicyConfig, RateTier};
use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};

/// credit account rules: minimum payment, tiered rate and billing dates
#[derive(Debug, Clone, Default)]
pub struct CreditPolicy {
    config: CreditPolicyConfig,
}

impl CreditPolicy {
    pub fn new(config: CreditPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CreditPolicyConfig {
        &self.config
    }

    /// `max(used * pct, floor)`
    pub fn minimum_payment(&self, used_credit: Money) -> Money {
        used_credit
            .percentage(self.config.minimum_payment_percentage)
            .max(self.config.minimum_payment_floor)
    }

    /// base rate less the limit discount and the score discount, never below the floor
    pub fn interest_rate(&self, credit_limit: Money, credit_score: Option<u32>) -> Rate {
        let mut rate = self.config.base_rate;
        if let Some(discount) = first_at_least(&self.config.limit_tiers, credit_limit.as_decimal()) {
            rate = rate.less(discount.as_percentage());
        }
        if let Some(score) = credit_score.filter(|s| *s > 0) {
            if let Some(discount) = first_at_least(&self.config.score_tiers, Decimal::from(score)) {
                rate = rate.less(discount.as_percentage());
            }
        }
        rate.max(self.config.floor_rate)
    }

    /// one month after the current closing date, two if that is not after today
    ///
    /// Without a current closing date the cycle closes at the end of this month.
    pub fn next_closing_date(&self, current: Option<NaiveDate>, today: NaiveDate) -> Result<NaiveDate> {
        match current {
            Some(current) => {
                let next = calendar::add_months(current, 1)?;
                if next <= today {
                    calendar::add_months(current, 2)
                } else {
                    Ok(next)
                }
            }
            None => Ok(calendar::end_of_month(today)),
        }
    }

    /// closing date plus the configured grace period
    pub fn next_due_date(&self, closing_date: NaiveDate) -> NaiveDate {
        self.next_due_date_with_grace(closing_date, self.config.grace_period_days)
    }

    pub fn next_due_date_with_grace(&self, closing_date: NaiveDate, grace_period_days: u32) -> NaiveDate {
        closing_date + Duration::days(i64::from(grace_period_days))
    }

    /// check a closing/due pair before it is stored on an account
    ///
    /// Each date must fall between today and the billing horizon; the due date
    /// must come after closing by no more than the allowed gap.
    pub fn validate_billing_dates(
        &self,
        closing_date: Option<NaiveDate>,
        due_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<()> {
        if let Some(closing) = closing_date {
            self.check_billing_date("closing_date", closing, today)?;
        }
        if let Some(due) = due_date {
            self.check_billing_date("due_date", due, today)?;
        }
        if let (Some(closing), Some(due)) = (closing_date, due_date) {
            if due <= closing {
                return Err(EngineError::validation("due_date", "due date must be after the closing date"));
            }
            let gap = calendar::days_between(closing, due);
            if gap > i64::from(self.config.max_closing_to_due_days) {
                return Err(EngineError::validation(
                    "due_date",
                    format!(
                        "due date cannot be more than {} days after the closing date",
                        self.config.max_closing_to_due_days
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_billing_date(&self, field: &'static str, date: NaiveDate, today: NaiveDate) -> Result<()> {
        if date < today {
            return Err(EngineError::validation(field, format!("{} is in the past", date)));
        }
        let horizon = today + Duration::days(i64::from(self.config.max_billing_horizon_days));
        if date > horizon {
            return Err(EngineError::validation(
                field,
                format!("{} is more than {} days ahead", date, self.config.max_billing_horizon_days),
            ));
        }
        Ok(())
    }
}

// tables are descending: first threshold the value reaches wins
fn first_at_least(tiers: &[RateTier], value: Decimal) -> Option<Rate> {
    tiers.iter().find(|t| value >= t.threshold).map(|t| t.rate)
}
