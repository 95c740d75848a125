//! Recurrence rules: the compact description of which dates are selected.
//!
//! Weekdays are numbered ISO-style, Monday = 0 through Sunday = 6, no matter
//! what the host platform or the persisted source considers the first day.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Highest valid weekday index (Sunday).
pub const MAX_WEEKDAY: u8 = 6;
/// Highest valid day-of-month number.
pub const MAX_MONTH_DAY: u8 = 31;

/// Frequency classifier of a [`RecurrenceRule`], as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OneOffSingle,
    OneOffMulti,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::OneOffSingle => "one_off_single",
            Frequency::OneOffMulti => "one_off_multi",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Weekly and monthly rules need a closed fence to enumerate dates.
    pub fn needs_bounded_fence(&self) -> bool {
        matches!(self, Frequency::Weekly | Frequency::Monthly)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which dates a schedule selects.
///
/// An empty day set is valid and expands to nothing ("nothing selected yet").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceRule {
    /// Exactly one date.
    OneOffSingle { date: NaiveDate },
    /// Explicitly enumerated dates (ad-hoc calendar).
    OneOffMulti { dates: BTreeSet<NaiveDate> },
    /// Weekday indexes, Monday = 0 .. Sunday = 6, applied across the fence.
    Weekly { days_of_week: BTreeSet<u8> },
    /// Day-of-month numbers 1..=31; numbers past a month's length are skipped.
    Monthly { days_of_month: BTreeSet<u8> },
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        RecurrenceRule::OneOffMulti {
            dates: BTreeSet::new(),
        }
    }
}

impl RecurrenceRule {
    pub fn single(date: NaiveDate) -> Self {
        RecurrenceRule::OneOffSingle { date }
    }

    pub fn dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        RecurrenceRule::OneOffMulti {
            dates: dates.into_iter().collect(),
        }
    }

    /// Weekly rule; indexes above 6 are dropped.
    pub fn weekly(days: impl IntoIterator<Item = u8>) -> Self {
        RecurrenceRule::Weekly {
            days_of_week: sanitize_days(days, 0, MAX_WEEKDAY, "weekday"),
        }
    }

    /// Monthly rule; day numbers outside 1..=31 are dropped.
    pub fn monthly(days: impl IntoIterator<Item = u8>) -> Self {
        RecurrenceRule::Monthly {
            days_of_month: sanitize_days(days, 1, MAX_MONTH_DAY, "day of month"),
        }
    }

    /// An empty rule of the given frequency. A single one-off has no empty
    /// form and falls back to an empty ad-hoc date set.
    pub fn empty(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Weekly => RecurrenceRule::Weekly {
                days_of_week: BTreeSet::new(),
            },
            Frequency::Monthly => RecurrenceRule::Monthly {
                days_of_month: BTreeSet::new(),
            },
            Frequency::OneOffSingle | Frequency::OneOffMulti => RecurrenceRule::default(),
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            RecurrenceRule::OneOffSingle { .. } => Frequency::OneOffSingle,
            RecurrenceRule::OneOffMulti { .. } => Frequency::OneOffMulti,
            RecurrenceRule::Weekly { .. } => Frequency::Weekly,
            RecurrenceRule::Monthly { .. } => Frequency::Monthly,
        }
    }

    /// True when the rule cannot select any date.
    pub fn is_empty(&self) -> bool {
        match self {
            RecurrenceRule::OneOffSingle { .. } => false,
            RecurrenceRule::OneOffMulti { dates } => dates.is_empty(),
            RecurrenceRule::Weekly { days_of_week } => days_of_week.is_empty(),
            RecurrenceRule::Monthly { days_of_month } => days_of_month.is_empty(),
        }
    }

    /// Whether `date` satisfies the rule, ignoring any fence.
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            RecurrenceRule::OneOffSingle { date: d } => *d == date,
            RecurrenceRule::OneOffMulti { dates } => dates.contains(&date),
            RecurrenceRule::Weekly { days_of_week } => days_of_week.contains(&weekday_index(date)),
            RecurrenceRule::Monthly { days_of_month } => {
                u8::try_from(date.day()).is_ok_and(|day| days_of_month.contains(&day))
            }
        }
    }
}

/// Weekday index of a date, Monday = 0 .. Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    // num_days_from_monday is always 0..=6
    date.weekday().num_days_from_monday() as u8
}

/// Saturday and Sunday.
pub fn is_weekend_index(index: u8) -> bool {
    index >= 5
}

fn sanitize_days(
    days: impl IntoIterator<Item = u8>,
    lo: u8,
    hi: u8,
    what: &'static str,
) -> BTreeSet<u8> {
    days.into_iter()
        .filter(|day| {
            let ok = (lo..=hi).contains(day);
            if !ok {
                tracing::warn!(value = *day, kind = what, "dropping out-of-range day selector");
            }
            ok
        })
        .collect()
}
