//! Calendar-month arithmetic for billing periods.
//!
//! An invoice belongs to the calendar month of its billing date. Installment
//! `i` of a purchase lands in the month `i` months after the anchor date, on
//! the same day of month clamped to the length of the target month.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// A calendar month, the identity of a billing period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> ResultEngine<Self> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::Validation(format!(
                "invalid month: {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The month `date` falls in.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Storage key, `YYYY-MM`.
    pub fn key(self) -> String {
        self.to_string()
    }

    pub fn first_day(self) -> ResultEngine<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or_else(|| EngineError::Validation(format!("date out of range: {self}")))
    }

    pub fn last_day(self) -> ResultEngine<NaiveDate> {
        let first = self.first_day()?;
        first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| EngineError::Validation(format!("date out of range: {self}")))
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for BillingMonth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::Validation(format!("invalid billing month: {s:?}"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

/// `anchor` moved forward by `offset` months, day clamped to the target
/// month's last day (Jan 31 + 1 → Feb 28/29).
pub fn shift_months(anchor: NaiveDate, offset: u32) -> ResultEngine<NaiveDate> {
    // chrono clamps the day of month when the target month is shorter.
    anchor
        .checked_add_months(Months::new(offset))
        .ok_or_else(|| EngineError::Validation(format!("date out of range: {anchor} + {offset} months")))
}

/// Where installment `offset` of a purchase anchored on `anchor` lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodTarget {
    pub month: BillingMonth,
    pub billing_date: NaiveDate,
}

impl PeriodTarget {
    pub fn resolve(anchor: NaiveDate, offset: u32) -> ResultEngine<Self> {
        let billing_date = shift_months(anchor, offset)?;
        Ok(Self {
            month: BillingMonth::of(billing_date),
            billing_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_31_clamps_into_30_day_month() {
        assert_eq!(shift_months(date(2025, 3, 31), 1).unwrap(), date(2025, 4, 30));
    }

    #[test]
    fn day_31_clamps_into_february() {
        assert_eq!(shift_months(date(2025, 1, 31), 1).unwrap(), date(2025, 2, 28));
        assert_eq!(shift_months(date(2024, 1, 31), 1).unwrap(), date(2024, 2, 29));
    }

    #[test]
    fn clamping_does_not_stick_to_later_offsets() {
        // Each offset is computed from the anchor, not from the previous one.
        assert_eq!(shift_months(date(2025, 1, 31), 2).unwrap(), date(2025, 3, 31));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let target = PeriodTarget::resolve(date(2025, 12, 15), 1).unwrap();
        assert_eq!(target.billing_date, date(2026, 1, 15));
        assert_eq!(target.month, BillingMonth::new(2026, 1).unwrap());
    }

    #[test]
    fn offset_zero_is_the_anchor() {
        let target = PeriodTarget::resolve(date(2025, 1, 15), 0).unwrap();
        assert_eq!(target.billing_date, date(2025, 1, 15));
        assert_eq!(target.month.key(), "2025-01");
    }

    #[test]
    fn month_bounds() {
        let nov = BillingMonth::new(2025, 11).unwrap();
        assert_eq!(nov.last_day().unwrap(), date(2025, 11, 30));
        assert_eq!(
            BillingMonth::new(2024, 2).unwrap().last_day().unwrap(),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn parse_month_key() {
        assert_eq!("2025-03".parse::<BillingMonth>().unwrap(), BillingMonth::new(2025, 3).unwrap());
        assert!("2025-13".parse::<BillingMonth>().is_err());
        assert!("2025/03".parse::<BillingMonth>().is_err());
        assert!("25-03".parse::<BillingMonth>().is_err());
    }
}
