//! Calendar arithmetic for recurring rules.
//!
//! Next occurrences are always computed from the previous due date, never
//! from "today", so a rule that missed ticks catches up one period at a time.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Returns the occurrence following `previous`.
    ///
    /// `anchor_day` is the day-of-month of the rule's start date. Monthly and
    /// yearly steps clamp to the last day of a short month and return to the
    /// anchor day once a month is long enough again.
    ///
    /// Returns `None` only past the end of the supported calendar.
    pub fn next_after(self, previous: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        match self {
            Self::Daily => previous.checked_add_days(Days::new(1)),
            Self::Weekly => previous.checked_add_days(Days::new(7)),
            Self::Monthly => previous
                .checked_add_months(Months::new(1))
                .map(|date| reanchor(date, anchor_day)),
            Self::Yearly => previous
                .checked_add_months(Months::new(12))
                .map(|date| reanchor(date, anchor_day)),
        }
    }
}

impl TryFrom<&str> for Frequency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(EngineError::InvalidValue(format!(
                "invalid frequency: {other}"
            ))),
        }
    }
}

/// Moves `date` forward to `anchor_day`, clamped to the month length.
fn reanchor(date: NaiveDate, anchor_day: u32) -> NaiveDate {
    let target = anchor_day.min(days_in_month(date.year(), date.month()));
    if target > date.day() {
        date.with_day(target).unwrap_or(date)
    } else {
        date
    }
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// First day of the month containing `date`.
pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after the one containing `date`.
pub(crate) fn next_month_start(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .unwrap_or(date)
}

/// Every occurrence in `[from, to)` of a schedule whose next due date is
/// `next`, stopping after `end` (inclusive) when set.
pub(crate) fn occurrences_in(
    frequency: Frequency,
    next: NaiveDate,
    anchor_day: u32,
    end: Option<NaiveDate>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = Some(next);
    while let Some(date) = current {
        if date >= to || end.is_some_and(|end| date > end) {
            break;
        }
        if date >= from {
            out.push(date);
        }
        current = frequency.next_after(date, anchor_day);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_and_weekly_add_fixed_days() {
        assert_eq!(
            Frequency::Daily.next_after(date(2025, 12, 31), 31),
            Some(date(2026, 1, 1))
        );
        assert_eq!(
            Frequency::Weekly.next_after(date(2025, 2, 25), 25),
            Some(date(2025, 3, 4))
        );
    }

    #[test]
    fn monthly_clamps_to_end_of_february() {
        assert_eq!(
            Frequency::Monthly.next_after(date(2025, 1, 31), 31),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            Frequency::Monthly.next_after(date(2024, 1, 31), 31),
            Some(date(2024, 2, 29))
        );
    }

    #[test]
    fn monthly_returns_to_anchor_day_after_short_month() {
        assert_eq!(
            Frequency::Monthly.next_after(date(2025, 2, 28), 31),
            Some(date(2025, 3, 31))
        );
        assert_eq!(
            Frequency::Monthly.next_after(date(2025, 3, 31), 31),
            Some(date(2025, 4, 30))
        );
        assert_eq!(
            Frequency::Monthly.next_after(date(2025, 2, 28), 28),
            Some(date(2025, 3, 28))
        );
    }

    #[test]
    fn yearly_handles_leap_day() {
        assert_eq!(
            Frequency::Yearly.next_after(date(2024, 2, 29), 29),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            Frequency::Yearly.next_after(date(2027, 2, 28), 29),
            Some(date(2028, 2, 29))
        );
    }

    #[test]
    fn occurrences_respect_window_and_end_date() {
        let weekly = occurrences_in(
            Frequency::Weekly,
            date(2025, 2, 25),
            25,
            None,
            date(2025, 3, 1),
            date(2025, 4, 1),
        );
        assert_eq!(
            weekly,
            vec![
                date(2025, 3, 4),
                date(2025, 3, 11),
                date(2025, 3, 18),
                date(2025, 3, 25)
            ]
        );

        let ended = occurrences_in(
            Frequency::Daily,
            date(2025, 3, 1),
            1,
            Some(date(2025, 3, 3)),
            date(2025, 3, 1),
            date(2025, 4, 1),
        );
        assert_eq!(ended.len(), 3);
    }

    #[test]
    fn month_helpers() {
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(month_start(date(2025, 7, 19)), date(2025, 7, 1));
        assert_eq!(next_month_start(date(2025, 12, 19)), date(2026, 1, 1));
    }
}
