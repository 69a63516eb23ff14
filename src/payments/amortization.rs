use chrono::{Duration, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar;
use crate::config::MAX_INSTALLMENTS;
use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};

/// inputs of a schedule computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTerms {
    pub amount: Money,
    pub installments_count: u32,
    pub interest_rate: Rate,
    pub admin_fee: Money,
    pub start_date: NaiveDate,
}

/// one line of a payment schedule
///
/// `principal`, `interest` and `fee` attribute the plan totals to installments;
/// each column sums exactly to its plan total, but a single row's components
/// need not add up to its `amount` because the fee is loaded onto #1 while the
/// amounts stay level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledInstallment {
    pub number: u32,
    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
    pub due_date: NaiveDate,
}

/// immutable payment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub principal: Money,
    pub installments_count: u32,
    /// regular installment amount; the last one may differ by the rounding remainder
    pub installment_amount: Money,
    pub interest_rate: Rate,
    pub total_interest: Money,
    pub admin_fee: Money,
    pub total_to_pay: Money,
    pub start_date: NaiveDate,
    pub installments: Vec<ScheduledInstallment>,
}

impl Schedule {
    /// get installment by 1-based number
    pub fn get_installment(&self, number: u32) -> Option<&ScheduledInstallment> {
        if number == 0 {
            return None;
        }
        self.installments.get((number - 1) as usize)
    }

    pub fn last_due_date(&self) -> Option<NaiveDate> {
        self.installments.last().map(|i| i.due_date)
    }

    pub fn terms(&self) -> ScheduleTerms {
        ScheduleTerms {
            amount: self.principal,
            installments_count: self.installments_count,
            interest_rate: self.interest_rate,
            admin_fee: self.admin_fee,
            start_date: self.start_date,
        }
    }
}

/// amortization calculator
///
/// Interest is simple interest over the life of the plan, not compounded:
/// `total_interest = amount * annual_rate% * count / 1200`, i.e. one month of
/// the annual percentage per installment. The admin fee is charged once and
/// attributed to installment #1. Amounts are level at `round(total / count)`
/// and the last installment absorbs the rounding remainder so the schedule sums
/// to the cent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmortizationCalculator;

impl AmortizationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// compute a schedule, validating the start date against the provider's clock
    pub fn compute(&self, terms: &ScheduleTerms, time_provider: &SafeTimeProvider) -> Result<Schedule> {
        self.compute_as_of(terms, time_provider.now().date_naive())
    }

    /// compute a schedule as seen from `today`
    pub fn compute_as_of(&self, terms: &ScheduleTerms, today: NaiveDate) -> Result<Schedule> {
        validate_terms(terms, today)?;

        let count = terms.installments_count;
        let months = Decimal::from(count);

        let total_interest = Money::from_decimal(
            terms.amount.as_decimal() * terms.interest_rate.monthly_fraction() * months,
        );
        let total_to_pay = terms.amount + total_interest + terms.admin_fee;
        if total_to_pay < Money::CENT * months {
            return Err(EngineError::validation(
                "amount",
                format!("{} cannot be split into {} installments of at least {}", total_to_pay, count, Money::CENT),
            ));
        }

        let amounts = split_evenly(total_to_pay, count);
        let principals = split_evenly(terms.amount, count);
        let interests = split_evenly(total_interest, count);

        let mut installments = Vec::with_capacity(count as usize);
        for i in 0..count {
            let idx = i as usize;
            installments.push(ScheduledInstallment {
                number: i + 1,
                amount: amounts[idx],
                principal: principals[idx],
                interest: interests[idx],
                fee: if i == 0 { terms.admin_fee } else { Money::ZERO },
                due_date: calendar::add_months(terms.start_date, i)?,
            });
        }

        debug!(
            amount = %terms.amount,
            installments = count,
            rate = %terms.interest_rate,
            total_to_pay = %total_to_pay,
            "computed installment schedule"
        );

        Ok(Schedule {
            principal: terms.amount,
            installments_count: count,
            installment_amount: amounts[0],
            interest_rate: terms.interest_rate,
            total_interest,
            admin_fee: terms.admin_fee,
            total_to_pay,
            start_date: terms.start_date,
            installments,
        })
    }
}

fn validate_terms(terms: &ScheduleTerms, today: NaiveDate) -> Result<()> {
    if !terms.amount.is_positive() {
        return Err(EngineError::validation("amount", "amount must be greater than 0"));
    }
    if terms.installments_count == 0 || terms.installments_count > MAX_INSTALLMENTS {
        return Err(EngineError::validation(
            "installments_count",
            format!("installments count must be between 1 and {}", MAX_INSTALLMENTS),
        ));
    }
    if terms.interest_rate.is_negative() {
        return Err(EngineError::validation("interest_rate", "interest rate cannot be negative"));
    }
    if terms.admin_fee.is_negative() {
        return Err(EngineError::validation("admin_fee", "admin fee cannot be negative"));
    }
    let tomorrow = today + Duration::days(1);
    if terms.start_date < tomorrow {
        return Err(EngineError::validation(
            "start_date",
            format!("start date {} must be on or after {}", terms.start_date, tomorrow),
        ));
    }
    Ok(())
}

/// split `total` into `count` level parts; the last part absorbs the remainder
///
/// The level part is rounded to the nearest cent unless that would leave the
/// last part negative, in which case it is truncated instead.
pub fn split_evenly(total: Money, count: u32) -> Vec<Money> {
    if count == 0 {
        return Vec::new();
    }
    let divisor = Decimal::from(count);
    let others = Decimal::from(count - 1);

    let mut base = total / divisor;
    if base.as_decimal() * others > total.as_decimal() {
        base = Money::from_decimal(
            (total.as_decimal() / divisor).round_dp_with_strategy(2, RoundingStrategy::ToZero),
        );
    }

    let mut parts = vec![base; count as usize];
    parts[(count - 1) as usize] = total - Money::from_decimal(base.as_decimal() * others);
    parts
}
