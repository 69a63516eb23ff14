//! calendar arithmetic shared by schedules and billing dates

use chrono::{Datelike, Months, NaiveDate};

use crate::errors::{EngineError, Result};

/// add calendar months, clamping to the last day of the target month
///
/// Jan 31 + 1 month is Feb 28 (Feb 29 in leap years), never Mar 3.
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        EngineError::validation("start_date", format!("{} + {} months is out of range", date, months))
    })
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// last calendar day of the month containing `date`
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let last = days_in_month(date.year(), date.month());
    date.with_day(last).unwrap_or(date)
}

/// signed whole days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// parse an ISO `YYYY-MM-DD` date, tagging failures with `field`
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        EngineError::validation(field, format!("'{}' is not a valid YYYY-MM-DD date", value))
    })
}
