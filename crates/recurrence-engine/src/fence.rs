//! Date fences: the inclusive range every generated occurrence must fall in.
//!
//! A fence is resolved from two raw boundary strings (typically the active
//! period of an event). Parsing is lenient: anything that cannot be read as a
//! date leaves that side of the fence open instead of failing the caller.
//!
//! # Accepted formats
//!
//! - ISO `YYYY-MM-DD`, optionally followed by a time (`2025-03-01T10:00:00Z`)
//! - Slash or dash separated two-number forms with a trailing four-digit year
//!   (`03/14/2025`, `14/03/2025`, `14-03-2025`). Which number is the month is
//!   decided by whichever component exceeds 12; when neither does, the
//!   configured [`DateOrder`] breaks the tie (month-first by default).
//! - A handful of generic spellings (`2025/03/14`, `14.03.2025`, `March 14, 2025`,
//!   `14 Mar 2025`, RFC 3339 datetimes).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How to read an ambiguous two-number date such as `03/04/2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// `MM/DD/YYYY` wins ties.
    #[default]
    MonthFirst,
    /// `DD/MM/YYYY` wins ties.
    DayFirst,
}

/// Inclusive date range. Either bound may be open (`None`).
///
/// When both bounds are present `min <= max` always holds: [`DateFence::new`]
/// swaps reversed input rather than rejecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateFence {
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
}

impl DateFence {
    pub fn new(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        match (min, max) {
            (Some(a), Some(b)) if a > b => Self {
                min: Some(b),
                max: Some(a),
            },
            _ => Self { min, max },
        }
    }

    /// A fence spanning exactly `min..=max`.
    pub fn bounded(min: NaiveDate, max: NaiveDate) -> Self {
        Self::new(Some(min), Some(max))
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// Both bounds, if the fence is closed on both sides.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.min?, self.max?))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min.is_none_or(|min| date >= min) && self.max.is_none_or(|max| date <= max)
    }

    /// Every day of a closed fence in ascending order, or `None` if a bound is open.
    pub fn days(&self) -> Option<impl Iterator<Item = NaiveDate>> {
        let (min, max) = self.bounds()?;
        Some(min.iter_days().take_while(move |d| *d <= max))
    }
}

/// Resolve a fence from raw boundary strings using month-first tie-breaking.
///
/// Unparseable input leaves that bound open; reversed bounds are swapped.
///
/// # Examples
///
/// ```
/// use recurrence_engine::fence::resolve_fence;
///
/// let fence = resolve_fence(Some("2025-03-31"), Some("03/01/2025"));
/// assert_eq!(fence.min.unwrap().to_string(), "2025-03-01");
/// assert_eq!(fence.max.unwrap().to_string(), "2025-03-31");
/// ```
pub fn resolve_fence(raw_min: Option<&str>, raw_max: Option<&str>) -> DateFence {
    resolve_fence_with_order(raw_min, raw_max, DateOrder::default())
}

/// Resolve a fence with an explicit tie-break order for ambiguous dates.
pub fn resolve_fence_with_order(
    raw_min: Option<&str>,
    raw_max: Option<&str>,
    order: DateOrder,
) -> DateFence {
    let min = raw_min.and_then(|s| parse_fence_date(s, order));
    let max = raw_max.and_then(|s| parse_fence_date(s, order));
    DateFence::new(min, max)
}

/// Tracks the last resolved fence so unchanged upstream bounds can skip a rebuild.
#[derive(Debug, Clone, Default)]
pub struct FenceResolver {
    order: DateOrder,
    current: Option<DateFence>,
}

impl FenceResolver {
    pub fn new(order: DateOrder) -> Self {
        Self {
            order,
            current: None,
        }
    }

    /// The most recently resolved fence (unbounded before the first update).
    pub fn current(&self) -> DateFence {
        self.current.unwrap_or_default()
    }

    /// Re-resolve the fence. Returns `Some(fence)` when it differs from the
    /// previous resolution and `None` when nothing changed.
    pub fn update(&mut self, raw_min: Option<&str>, raw_max: Option<&str>) -> Option<DateFence> {
        let fence = resolve_fence_with_order(raw_min, raw_max, self.order);
        if self.current == Some(fence) {
            tracing::trace!(?fence, "fence unchanged");
            return None;
        }
        tracing::debug!(min = ?fence.min, max = ?fence.max, "fence resolved");
        self.current = Some(fence);
        Some(fence)
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Parse one fence boundary. Returns `None` for anything not understood.
pub fn parse_fence_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = parse_iso_prefix(s)
        .or_else(|| parse_two_number_form(s, '/', order))
        .or_else(|| parse_two_number_form(s, '-', order))
        .or_else(|| parse_generic(s));

    if parsed.is_none() {
        tracing::debug!(input = %s, "unparseable fence date, leaving bound open");
    }
    parsed
}

/// `YYYY-MM-DD`, with or without a trailing time component.
fn parse_iso_prefix(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10)?;
    let date = NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()?;
    match s.as_bytes().get(10) {
        None | Some(b'T') | Some(b't') | Some(b' ') => Some(date),
        _ => None,
    }
}

/// `A<sep>B<sep>YYYY` where A/B are one or two digit month/day numbers.
fn parse_two_number_form(s: &str, sep: char, order: DateOrder) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    let [first, second, year] = parts.as_slice() else {
        return None;
    };
    if !is_short_number(first) || !is_short_number(second) {
        return None;
    }
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let first: u32 = first.parse().ok()?;
    let second: u32 = second.parse().ok()?;
    let year: i32 = year.parse().ok()?;

    let (month, day) = if second > 12 && first <= 12 {
        (first, second)
    } else if first > 12 && second <= 12 {
        (second, first)
    } else {
        match order {
            DateOrder::MonthFirst => (first, second),
            DateOrder::DayFirst => (second, first),
        }
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn is_short_number(s: &str) -> bool {
    (1..=2).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

const GENERIC_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
    "%a, %d %b %Y",
];

const GENERIC_DATETIME_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"];

fn parse_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            GENERIC_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

// ── Tests ───────────────────────────────────────────────────────────────────
