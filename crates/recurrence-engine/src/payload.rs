//! Persisted schedule payloads and their round trip to in-memory state.
//!
//! Two JSON shapes are in use and both are read and written:
//!
//! - **Explicit dates**: a JSON array, one entry per selected date, ascending:
//!   `[{"date": "2025-03-03", "windows": [{"start_time": "09:00", "end_time": "17:00"}]}]`
//! - **Rule**: a JSON object describing the rule and one window list shared
//!   by every date the rule expands to:
//!   `{"frequency": "weekly", "starts_on": "2025-03-01", "ends_on": "2025-03-31",
//!     "windows": [...], "weekly_days": [0, 2, 4]}`
//!
//! Reading never fails the caller: malformed or missing input yields the
//! empty [`Schedule`] and a warning.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EngineError, Result};
use crate::expander::expand;
use crate::fence::{parse_fence_date, DateFence, DateOrder};
use crate::rule::{Frequency, RecurrenceRule};
use crate::window::{DateWindowMap, TimeWindow};

/// The persisted document. A JSON array is the explicit-dates shape, a JSON
/// object is the rule shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    ExplicitDates(Vec<DatedWindows>),
    Rule(RulePayload),
}

/// One entry of the explicit-dates shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedWindows {
    pub date: NaiveDate,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

/// The rule shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePayload {
    pub frequency: Frequency,
    #[serde(default, deserialize_with = "lenient_date")]
    pub starts_on: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub ends_on: Option<NaiveDate>,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info_fields: Vec<InfoField>,
}

/// A titled note carried next to a schedule.
///
/// Older payloads spell the pair `key`/`value`; both spellings are read and
/// `title`/`description` is always written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoField {
    #[serde(alias = "key")]
    pub title: String,
    #[serde(default, alias = "value")]
    pub description: String,
}

impl Payload {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

/// In-memory state recovered from (or destined for) a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub rule: RecurrenceRule,
    /// Fence persisted by the rule shape; unbounded for explicit dates.
    pub fence: DateFence,
    pub windows: DateWindowMap,
    /// Windows shared by every date of a rule-shape schedule.
    pub shared_windows: Vec<TimeWindow>,
    pub info_fields: Vec<InfoField>,
}

impl Schedule {
    /// Nothing selected, default frequency.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rule.is_empty() && self.windows.is_empty()
    }

    /// Serialize this schedule, attaching its info fields and falling back to
    /// the shared windows when no date is currently selected.
    pub fn to_payload(&self) -> Payload {
        match serialize(&self.rule, &self.fence, &self.windows) {
            Payload::Rule(mut rule) => {
                if rule.windows.is_empty() {
                    rule.windows = self.shared_windows.clone();
                }
                rule.info_fields = self.info_fields.clone();
                Payload::Rule(rule)
            }
            explicit => explicit,
        }
    }
}

// ── serialize ───────────────────────────────────────────────────────────────

/// Serialize a rule, its fence and its windows.
///
/// Ad-hoc date sets are written in the explicit-dates shape; every other rule
/// is written in the rule shape with the windows of its first selected date.
pub fn serialize(rule: &RecurrenceRule, fence: &DateFence, windows: &DateWindowMap) -> Payload {
    let first_windows = || {
        windows
            .iter()
            .next()
            .map(|(_, w)| w.to_vec())
            .unwrap_or_default()
    };

    match rule {
        RecurrenceRule::OneOffMulti { .. } => Payload::ExplicitDates(explicit_dates(windows)),
        RecurrenceRule::OneOffSingle { date } => Payload::Rule(RulePayload {
            frequency: Frequency::OneOffSingle,
            starts_on: Some(*date),
            ends_on: Some(*date),
            windows: windows.get(*date).map(<[_]>::to_vec).unwrap_or_default(),
            weekly_days: None,
            monthly_days: None,
            info_fields: Vec::new(),
        }),
        RecurrenceRule::Weekly { days_of_week } => Payload::Rule(RulePayload {
            frequency: Frequency::Weekly,
            starts_on: fence.min,
            ends_on: fence.max,
            windows: first_windows(),
            weekly_days: Some(widen(days_of_week)),
            monthly_days: None,
            info_fields: Vec::new(),
        }),
        RecurrenceRule::Monthly { days_of_month } => Payload::Rule(RulePayload {
            frequency: Frequency::Monthly,
            starts_on: fence.min,
            ends_on: fence.max,
            windows: first_windows(),
            weekly_days: None,
            monthly_days: Some(widen(days_of_month)),
            info_fields: Vec::new(),
        }),
    }
}

/// The explicit-dates shape for any window map, ascending by date.
pub fn explicit_dates(windows: &DateWindowMap) -> Vec<DatedWindows> {
    windows
        .iter()
        .map(|(date, w)| DatedWindows {
            date,
            windows: w.to_vec(),
        })
        .collect()
}

fn widen(days: &BTreeSet<u8>) -> Vec<i64> {
    days.iter().map(|d| i64::from(*d)).collect()
}

// ── deserialize ─────────────────────────────────────────────────────────────

/// Parse a payload string (e.g. a submitted hidden field). Never fails.
pub fn deserialize_str(raw: &str) -> Schedule {
    try_deserialize_str(raw).unwrap_or_default()
}

/// Like [`deserialize_str`], but `None` when there is nothing to load:
/// empty or `null` input, malformed JSON, or a payload that names no usable
/// rule. A well-formed payload with nothing selected is still `Some`.
pub fn try_deserialize_str(raw: &str) -> Option<Schedule> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return None;
    }
    match serde_json::from_str::<Payload>(raw) {
        Ok(payload) => try_deserialize(payload),
        Err(err) => {
            tracing::warn!(error = %err, "malformed schedule payload, starting empty");
            None
        }
    }
}

/// Parse an already-decoded JSON value. Never fails.
pub fn deserialize_value(value: serde_json::Value) -> Schedule {
    if value.is_null() {
        return Schedule::empty();
    }
    match serde_json::from_value::<Payload>(value) {
        Ok(payload) => deserialize(payload),
        Err(err) => {
            tracing::warn!(error = %err, "malformed schedule payload, starting empty");
            Schedule::empty()
        }
    }
}

/// Rebuild in-memory state from a typed payload.
pub fn deserialize(payload: Payload) -> Schedule {
    try_deserialize(payload).unwrap_or_default()
}

/// Rebuild in-memory state, or `None` for a one-off payload without a date.
pub fn try_deserialize(payload: Payload) -> Option<Schedule> {
    match payload {
        Payload::ExplicitDates(entries) => Some(from_explicit_dates(entries)),
        Payload::Rule(rule) => from_rule_payload(rule),
    }
}

fn from_explicit_dates(entries: Vec<DatedWindows>) -> Schedule {
    tracing::debug!(dates = entries.len(), "loading explicit-dates payload");
    let mut windows = DateWindowMap::new();
    let mut dates = BTreeSet::new();
    for entry in entries {
        let mut list = windows
            .get(entry.date)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        if !dates.insert(entry.date) {
            tracing::warn!(date = %entry.date, "date listed twice, merging its windows");
        }
        list.extend(entry.windows);
        windows.set_windows(entry.date, list);
    }
    Schedule {
        rule: RecurrenceRule::OneOffMulti { dates },
        fence: DateFence::unbounded(),
        windows,
        shared_windows: Vec::new(),
        info_fields: Vec::new(),
    }
}

fn from_rule_payload(payload: RulePayload) -> Option<Schedule> {
    tracing::debug!(frequency = %payload.frequency, "loading rule payload");
    let RulePayload {
        frequency,
        starts_on,
        ends_on,
        windows: shared_windows,
        weekly_days,
        monthly_days,
        info_fields,
    } = payload;

    let fence = DateFence::new(starts_on, ends_on);
    let rule = match frequency {
        Frequency::OneOffSingle => match starts_on.or(ends_on) {
            Some(date) => RecurrenceRule::single(date),
            None => {
                tracing::warn!("one-off payload without a date, starting empty");
                return None;
            }
        },
        Frequency::OneOffMulti => {
            tracing::warn!("ad-hoc rule payload carries no dates");
            RecurrenceRule::empty(Frequency::OneOffMulti)
        }
        Frequency::Weekly => RecurrenceRule::weekly(narrow(weekly_days)),
        Frequency::Monthly => RecurrenceRule::monthly(narrow(monthly_days)),
    };

    let mut windows = DateWindowMap::new();
    // A selected date always carries a window, so a one-off saved with none
    // was outside its session's fence and stays unselected.
    let unselected_one_off = frequency == Frequency::OneOffSingle && shared_windows.is_empty();
    if !unselected_one_off {
        match expand(&rule, &fence) {
            Ok(dates) => windows.sync_with_template(&dates, &shared_windows),
            Err(err) => tracing::warn!(error = %err, "persisted rule not expanded"),
        }
    }

    Some(Schedule {
        rule,
        fence,
        windows,
        shared_windows,
        info_fields,
    })
}

/// Serde adapter for day-selector lists that drops entries not fitting `u8`
/// instead of rejecting the whole document.
pub(crate) fn lenient_days<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let raw: Option<Vec<i64>> = Option::deserialize(d)?;
    Ok(narrow(raw).collect())
}

/// Day selectors as persisted; negative or oversized values are dropped by
/// the rule constructors (anything not fitting `u8` is dropped here).
fn narrow(days: Option<Vec<i64>>) -> impl Iterator<Item = u8> {
    days.unwrap_or_default().into_iter().filter_map(|d| {
        let narrowed = u8::try_from(d).ok();
        if narrowed.is_none() {
            tracing::warn!(value = d, "dropping out-of-range day selector");
        }
        narrowed
    })
}

fn lenient_date<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw
        .as_deref()
        .and_then(|s| parse_fence_date(s, DateOrder::default())))
}

// ── Tests ───────────────────────────────────────────────────────────────────
