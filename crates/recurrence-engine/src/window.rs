//! Time windows attached to selected dates.
//!
//! Every selected date owns an ordered, never-empty list of [`TimeWindow`]s.
//! A freshly selected date gets one unset placeholder window. Windows of the
//! same date may overlap or repeat; nothing here validates or merges them.
//!
//! A window whose end time precedes its start time is an overnight window
//! (the session runs past midnight). It is kept exactly as entered.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-local identity of a window. Not persisted; regenerated on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A start/end time-of-day pair. Either side may be unset (`None`).
/// Times are kept to whole minutes; seconds are dropped on the way in.
///
/// Persisted as `{"start_time": "HH:MM", "end_time": "HH:MM"}` with `""` for
/// unset times. Equality compares times only, never ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(skip)]
    pub id: WindowId,
    #[serde(with = "hhmm", default, alias = "startTime")]
    pub start_time: Option<NaiveTime>,
    #[serde(with = "hhmm", default, alias = "endTime")]
    pub end_time: Option<NaiveTime>,
}

impl PartialEq for TimeWindow {
    fn eq(&self, other: &Self) -> bool {
        self.start_time == other.start_time && self.end_time == other.end_time
    }
}

impl Eq for TimeWindow {}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::empty()
    }
}

impl TimeWindow {
    pub fn new(start_time: Option<NaiveTime>, end_time: Option<NaiveTime>) -> Self {
        Self {
            id: WindowId::new(),
            start_time: start_time.map(whole_minutes),
            end_time: end_time.map(whole_minutes),
        }
    }

    /// Placeholder window with both times unset.
    pub fn empty() -> Self {
        Self::new(None, None)
    }

    /// Build from `"HH:MM"` strings; unparseable or empty strings stay unset.
    pub fn parse(start: &str, end: &str) -> Self {
        Self::new(parse_time(start), parse_time(end))
    }

    /// Same times under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self::new(self.start_time, self.end_time)
    }

    pub fn is_complete(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }

    /// End strictly before start: the window crosses midnight.
    pub fn is_overnight(&self) -> bool {
        matches!((self.start_time, self.end_time), (Some(s), Some(e)) if e < s)
    }

    pub fn start_str(&self) -> String {
        format_time(self.start_time)
    }

    pub fn end_str(&self) -> String {
        format_time(self.end_time)
    }
}

/// Parse `"HH:MM"` (or `"HH:MM:SS"`). Empty input is unset; anything else
/// that does not parse is unset too, with a warning.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
        .map(whole_minutes);
    if parsed.is_none() {
        tracing::warn!(input = %s, "unparseable window time, leaving it unset");
    }
    parsed
}

/// Drop seconds and sub-seconds; the persisted form is `HH:MM`.
fn whole_minutes(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(time)
}

/// Fresh copies of `template`, or one placeholder when it is empty.
pub(crate) fn instantiate(template: &[TimeWindow]) -> Vec<TimeWindow> {
    if template.is_empty() {
        vec![TimeWindow::empty()]
    } else {
        template.iter().map(TimeWindow::duplicate).collect()
    }
}

fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// serde adapter: `Option<NaiveTime>` <-> `"HH:MM"` / `""`.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_time))
    }
}

// ── DateWindowMap ───────────────────────────────────────────────────────────

/// Selected dates and their windows, ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateWindowMap {
    entries: BTreeMap<NaiveDate, Vec<TimeWindow>>,
}

impl DateWindowMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_selected(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    /// Selected dates, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.entries.keys().copied()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&[TimeWindow]> {
        self.entries.get(&date).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[TimeWindow])> + '_ {
        self.entries.iter().map(|(d, w)| (*d, w.as_slice()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Select a date with one placeholder window. Returns `false` if it was
    /// already selected (its windows are left alone).
    pub fn select(&mut self, date: NaiveDate) -> bool {
        if self.entries.contains_key(&date) {
            return false;
        }
        self.entries.insert(date, vec![TimeWindow::empty()]);
        true
    }

    pub fn select_many(&mut self, dates: impl IntoIterator<Item = NaiveDate>) {
        for date in dates {
            self.select(date);
        }
    }

    /// Remove a date and all of its windows. Idempotent.
    pub fn deselect(&mut self, date: NaiveDate) -> bool {
        self.entries.remove(&date).is_some()
    }

    /// Make the selection exactly `dates`: windows of dates that stay are kept,
    /// new dates get a placeholder, dates not listed are dropped.
    pub fn sync(&mut self, dates: &[NaiveDate]) {
        self.sync_with_template(dates, &[]);
    }

    /// Like [`DateWindowMap::sync`], but newly added dates receive copies of
    /// `template` (fresh ids) instead of a single placeholder.
    pub fn sync_with_template(&mut self, dates: &[NaiveDate], template: &[TimeWindow]) {
        let wanted: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|date, _| wanted.contains(date));
        let kept = self.entries.len();
        for date in wanted {
            self.entries
                .entry(date)
                .or_insert_with(|| instantiate(template));
        }
        tracing::trace!(
            before,
            kept,
            after = self.entries.len(),
            "selection synchronised"
        );
    }

    /// Replace a date's windows, selecting it if needed. An empty list leaves
    /// one placeholder so a selected date never has zero windows.
    pub fn set_windows(&mut self, date: NaiveDate, windows: Vec<TimeWindow>) {
        let windows = if windows.is_empty() {
            instantiate(&[])
        } else {
            windows
        };
        self.entries.insert(date, windows);
    }

    /// Append a placeholder window. `None` if the date is not selected.
    pub fn add_window(&mut self, date: NaiveDate) -> Option<WindowId> {
        let windows = self.entries.get_mut(&date)?;
        let window = TimeWindow::empty();
        let id = window.id;
        windows.push(window);
        Some(id)
    }

    /// Remove the window at `index`. Removing the last window leaves a fresh
    /// placeholder. Returns `false` for an unknown date or index.
    pub fn remove_window(&mut self, date: NaiveDate, index: usize) -> bool {
        let Some(windows) = self.entries.get_mut(&date) else {
            return false;
        };
        if index >= windows.len() {
            return false;
        }
        windows.remove(index);
        if windows.is_empty() {
            windows.push(TimeWindow::empty());
        }
        true
    }

    /// Clone the window at `index` under a new id, right after the original.
    pub fn duplicate_window(&mut self, date: NaiveDate, index: usize) -> Option<WindowId> {
        let windows = self.entries.get_mut(&date)?;
        let copy = windows.get(index)?.duplicate();
        let id = copy.id;
        windows.insert(index + 1, copy);
        Some(id)
    }

    /// Overwrite the times of one window, truncated to whole minutes.
    pub fn update_window(
        &mut self,
        date: NaiveDate,
        index: usize,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
    ) -> bool {
        let Some(window) = self
            .entries
            .get_mut(&date)
            .and_then(|windows| windows.get_mut(index))
        else {
            return false;
        };
        window.start_time = start_time.map(whole_minutes);
        window.end_time = end_time.map(whole_minutes);
        true
    }

    /// Set the first window of every selected date to `start`..`end`.
    ///
    /// Later windows are untouched. Does nothing when either time is empty or
    /// unparseable. Returns the number of dates updated.
    pub fn apply_common_hours(&mut self, start: &str, end: &str) -> usize {
        let (Some(start_time), Some(end_time)) = (parse_time(start), parse_time(end)) else {
            tracing::debug!(start, end, "common hours incomplete, nothing applied");
            return 0;
        };
        let mut updated = 0;
        for windows in self.entries.values_mut() {
            if let Some(first) = windows.first_mut() {
                first.start_time = Some(start_time);
                first.end_time = Some(end_time);
                updated += 1;
            }
        }
        updated
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    // ── TimeWindow ──────────────────────────────────────────────────────

    #[test]
    fn test_overnight_window_is_kept_verbatim() {
        let w = TimeWindow::parse("22:00", "02:00");
        assert!(w.is_overnight());
        assert_eq!(w.start_str(), "22:00");
        assert_eq!(w.end_str(), "02:00");
        assert!(!TimeWindow::parse("09:00", "17:00").is_overnight());
        assert!(!TimeWindow::parse("09:00", "").is_overnight());
        assert!(w.is_complete());
        assert!(!TimeWindow::parse("", "17:00").is_complete());
    }

    #[test]
    fn test_parse_time_accepts_seconds_and_rejects_garbage() {
        assert_eq!(parse_time("09:30:00"), t(9, 30));
        assert_eq!(parse_time(" 07:05 "), t(7, 5));
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("9am"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_seconds_are_dropped_so_round_trip_holds() {
        let precise = NaiveTime::from_hms_milli_opt(9, 0, 30, 250);
        let window = TimeWindow::new(precise, NaiveTime::from_hms_opt(17, 45, 59));
        assert_eq!(window, TimeWindow::new(t(9, 0), t(17, 45)));

        let mut map = DateWindowMap::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        map.select(date);
        assert!(map.update_window(date, 0, precise, None));
        let stored = map.get(date).unwrap()[0].clone();
        assert_eq!(stored.start_time, t(9, 0));

        let json = serde_json::to_string(&stored).unwrap();
        let back: TimeWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
        assert_eq!(parse_time("09:00:30"), t(9, 0));
    }

    #[test]
    fn test_window_serde_shape() {
        let w = TimeWindow::parse("09:00", "");
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"start_time": "09:00", "end_time": ""})
        );
        let back: TimeWindow =
            serde_json::from_str(r#"{"startTime": "10:15:00", "end_time": null}"#).unwrap();
        assert_eq!(back, TimeWindow::new(t(10, 15), None));
    }

    #[test]
    fn test_window_equality_ignores_id() {
        let a = TimeWindow::parse("09:00", "10:00");
        let b = a.duplicate();
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    // ── selection ───────────────────────────────────────────────────────

    #[test]
    fn test_select_inserts_one_placeholder() {
        let mut map = DateWindowMap::new();
        assert!(map.select(d(2025, 3, 3)));
        assert!(!map.select(d(2025, 3, 3)));
        assert_eq!(map.get(d(2025, 3, 3)).unwrap(), &[TimeWindow::empty()]);
    }

    #[test]
    fn test_deselect_then_reselect_yields_fresh_window() {
        let mut map = DateWindowMap::new();
        let date = d(2025, 3, 3);
        map.select(date);
        map.update_window(date, 0, t(9, 0), t(12, 0));
        map.add_window(date);
        assert!(map.deselect(date));
        assert!(!map.deselect(date));
        assert!(map.get(date).is_none());

        map.select(date);
        assert_eq!(map.get(date).unwrap(), &[TimeWindow::empty()]);
    }

    #[test]
    fn test_sync_keeps_surviving_windows() {
        let mut map = DateWindowMap::new();
        map.select_many([d(2025, 3, 3), d(2025, 3, 5)]);
        map.update_window(d(2025, 3, 5), 0, t(8, 0), t(9, 0));

        let dates = [d(2025, 3, 5), d(2025, 3, 7)];
        map.sync(&dates);
        assert_eq!(map.dates().collect::<Vec<_>>(), dates.to_vec());
        assert_eq!(map.get(d(2025, 3, 5)).unwrap()[0], TimeWindow::new(t(8, 0), t(9, 0)));
        assert_eq!(map.get(d(2025, 3, 7)).unwrap(), &[TimeWindow::empty()]);

        let snapshot = map.clone();
        map.sync(&dates);
        assert_eq!(map, snapshot);
    }

    #[test]
    fn test_sync_with_template_copies_windows_for_new_dates() {
        let mut map = DateWindowMap::new();
        let template = vec![
            TimeWindow::new(t(9, 0), t(12, 0)),
            TimeWindow::new(t(22, 0), t(2, 0)),
        ];
        map.sync_with_template(&[d(2025, 3, 3), d(2025, 3, 10)], &template);
        for (_, windows) in map.iter() {
            assert_eq!(windows, template.as_slice());
            assert_ne!(windows[0].id, template[0].id);
        }
    }

    // ── per-date windows ────────────────────────────────────────────────

    #[test]
    fn test_remove_last_window_leaves_placeholder() {
        let mut map = DateWindowMap::new();
        let date = d(2025, 3, 3);
        map.select(date);
        map.update_window(date, 0, t(9, 0), t(10, 0));
        assert!(map.remove_window(date, 0));
        assert_eq!(map.get(date).unwrap(), &[TimeWindow::empty()]);
        assert!(!map.remove_window(date, 4));
        assert!(!map.remove_window(d(2025, 1, 1), 0));
    }

    #[test]
    fn test_duplicate_window_inserts_after_original() {
        let mut map = DateWindowMap::new();
        let date = d(2025, 3, 3);
        map.select(date);
        map.update_window(date, 0, t(9, 0), t(10, 0));
        map.add_window(date);
        map.update_window(date, 1, t(14, 0), t(15, 0));

        let new_id = map.duplicate_window(date, 0).unwrap();
        let windows = map.get(date).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].id, new_id);
        assert_ne!(windows[0].id, windows[1].id);
        assert_eq!(windows[1], TimeWindow::new(t(9, 0), t(10, 0)));
        assert_eq!(windows[2], TimeWindow::new(t(14, 0), t(15, 0)));
        assert!(map.duplicate_window(date, 9).is_none());
    }

    #[test]
    fn test_add_window_requires_selection() {
        let mut map = DateWindowMap::new();
        assert!(map.add_window(d(2025, 3, 3)).is_none());
    }

    #[test]
    fn test_overlapping_windows_are_permitted() {
        let mut map = DateWindowMap::new();
        let date = d(2025, 3, 3);
        map.select(date);
        map.update_window(date, 0, t(9, 0), t(12, 0));
        map.duplicate_window(date, 0);
        map.add_window(date);
        map.update_window(date, 2, t(10, 0), t(11, 0));
        assert_eq!(map.get(date).unwrap().len(), 3);
    }

    // ── common hours ────────────────────────────────────────────────────

    #[test]
    fn test_common_hours_touch_first_window_only() {
        let mut map = DateWindowMap::new();
        let dates = [d(2025, 3, 3), d(2025, 3, 4), d(2025, 3, 5)];
        map.select_many(dates);
        map.add_window(dates[1]);
        map.update_window(dates[1], 1, t(18, 0), t(20, 0));

        assert_eq!(map.apply_common_hours("09:00", "17:00"), 3);
        for date in dates {
            assert_eq!(map.get(date).unwrap()[0], TimeWindow::new(t(9, 0), t(17, 0)));
        }
        assert_eq!(
            map.get(dates[1]).unwrap()[1],
            TimeWindow::new(t(18, 0), t(20, 0))
        );
    }

    #[test]
    fn test_common_hours_noop_when_time_missing() {
        let mut map = DateWindowMap::new();
        map.select(d(2025, 3, 3));
        assert_eq!(map.apply_common_hours("09:00", ""), 0);
        assert_eq!(map.get(d(2025, 3, 3)).unwrap(), &[TimeWindow::empty()]);
    }
}
