//! Materialise a date→windows map into absolute intervals.
//!
//! Each complete window on each selected date becomes one [`Occurrence`]
//! anchored in an IANA timezone. A window whose end is earlier than its start
//! runs past midnight and ends on the following day.
//!
//! Local times that fall in a DST gap do not exist and are skipped with a
//! warning. Ambiguous local times (the repeated hour when clocks go back)
//! resolve to the earlier instant.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::window::{DateWindowMap, TimeWindow, WindowId};

/// One concrete availability interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    /// The selected date the window belongs to.
    pub date: NaiveDate,
    #[serde(skip)]
    pub window_id: WindowId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `true` if the interval ends on the day after `date`.
    pub overnight: bool,
}

/// Convert every complete window in `windows` into UTC intervals in `timezone`.
///
/// Incomplete windows (either time unset) are ignored. Output is ordered by
/// date, then by window position.
///
/// # Errors
///
/// Returns [`EngineError::InvalidTimezone`] if `timezone` is not an IANA name.
pub fn materialize(windows: &DateWindowMap, timezone: &str) -> Result<Vec<Occurrence>> {
    let tz = parse_timezone(timezone)?;
    let mut out = Vec::new();
    for (date, list) in windows.iter() {
        for window in list {
            if let Some(occurrence) = materialize_window(date, window, &tz) {
                out.push(occurrence);
            }
        }
    }
    tracing::debug!(timezone, count = out.len(), "materialised occurrences");
    Ok(out)
}

fn materialize_window(date: NaiveDate, window: &TimeWindow, tz: &Tz) -> Option<Occurrence> {
    let (start_time, end_time) = match (window.start_time, window.end_time) {
        (Some(s), Some(e)) => (s, e),
        _ => return None,
    };
    let overnight = window.is_overnight();
    let end_date = if overnight {
        date.checked_add_days(Days::new(1))?
    } else {
        date
    };

    let start = localize(date, start_time, tz)?;
    let end = localize(end_date, end_time, tz)?;
    Some(Occurrence {
        date,
        window_id: window.id,
        start,
        end,
        overnight,
    })
}

// ── Internal helpers ────────────────────────────────────────────────────────

fn localize(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            tracing::warn!(
                %date,
                %time,
                timezone = %tz,
                "local time falls in a DST gap, skipping window"
            );
            None
        }
    }
}

fn parse_timezone(s: &str) -> Result<Tz> {
    s.parse::<Tz>()
        .map_err(|_| EngineError::InvalidTimezone(format!("'{}'", s)))
}
