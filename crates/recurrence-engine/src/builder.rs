//! The rule-builder session.
//!
//! A [`ScheduleBuilder`] owns everything one editing session needs: the
//! resolved fence, the active rule, the selected dates with their windows and
//! the info fields carried next to them. It is built from the input contract
//! ([`BuilderInput`]) and emits the persisted payload string on [`submit`].
//!
//! Every edit that can change the set of selected dates re-expands the rule
//! and synchronises the window map: dates that are still produced keep their
//! windows, new dates get copies of the shared windows, dropped dates lose
//! theirs.
//!
//! [`submit`]: ScheduleBuilder::submit

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expander::{
    expand_with_options, select_all, select_weekdays, select_weekends, ExpandOptions,
};
use crate::fence::{DateFence, DateOrder, FenceResolver};
use crate::payload::{explicit_dates, try_deserialize_str, InfoField, Payload, Schedule};
use crate::rule::{Frequency, RecurrenceRule};
use crate::window::{instantiate, parse_time, DateWindowMap, TimeWindow};

/// Which persisted shape a session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderVariant {
    /// Rule shape; ad-hoc date sets still fall back to explicit dates.
    #[default]
    Periods,
    /// Explicit-dates shape, always.
    Calendar,
}

/// Session configuration. Every field is optional in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    pub variant: BuilderVariant,
    pub date_order: DateOrder,
    /// Dates before this day are never selected.
    pub today: Option<NaiveDate>,
}

/// What a session is initialised from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuilderInput {
    pub fence_min_raw: Option<String>,
    pub fence_max_raw: Option<String>,
    /// A payload saved by an earlier session.
    pub previous_payload: Option<String>,
}

impl BuilderInput {
    pub fn new(fence_min_raw: Option<&str>, fence_max_raw: Option<&str>) -> Self {
        Self {
            fence_min_raw: fence_min_raw.map(str::to_owned),
            fence_max_raw: fence_max_raw.map(str::to_owned),
            previous_payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.previous_payload = Some(payload.into());
        self
    }
}

/// Bulk selections over the whole fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickSelect {
    All,
    Weekdays,
    Weekends,
}

#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    options: BuilderOptions,
    resolver: FenceResolver,
    rule: RecurrenceRule,
    windows: DateWindowMap,
    /// Windows given to dates that enter the selection.
    template: Vec<TimeWindow>,
    info_fields: Vec<InfoField>,
}

impl ScheduleBuilder {
    /// Start a session. Never fails: a malformed previous payload starts
    /// empty and an open fence defers expansion until [`set_fence`] closes it.
    ///
    /// [`set_fence`]: ScheduleBuilder::set_fence
    pub fn new(input: BuilderInput, options: BuilderOptions) -> Self {
        let mut resolver = FenceResolver::new(options.date_order);
        resolver.update(input.fence_min_raw.as_deref(), input.fence_max_raw.as_deref());

        let schedule = input
            .previous_payload
            .as_deref()
            .and_then(try_deserialize_str)
            .unwrap_or_else(|| Schedule {
                rule: default_rule(options.variant),
                ..Schedule::empty()
            });

        let mut builder = Self {
            options,
            resolver,
            rule: schedule.rule,
            windows: schedule.windows,
            template: schedule.shared_windows,
            info_fields: schedule.info_fields,
        };
        if let Err(err) = builder.rebuild() {
            tracing::debug!(error = %err, "expansion deferred until the fence is closed");
        }
        builder
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn fence(&self) -> DateFence {
        self.resolver.current()
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    pub fn windows(&self) -> &DateWindowMap {
        &self.windows
    }

    /// Direct access for per-date window edits.
    pub fn windows_mut(&mut self) -> &mut DateWindowMap {
        &mut self.windows
    }

    pub fn info_fields(&self) -> &[InfoField] {
        &self.info_fields
    }

    pub fn set_info_fields(&mut self, fields: Vec<InfoField>) {
        self.info_fields = fields;
    }

    /// Re-resolve the fence from raw bounds.
    ///
    /// Returns `Ok(false)` without touching the selection when the resolved
    /// fence is unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnboundedRange`](crate::EngineError::UnboundedRange)
    /// when the new fence is open and the rule recurs. The selection is
    /// cleared; the rule and shared windows are kept.
    pub fn set_fence(&mut self, raw_min: Option<&str>, raw_max: Option<&str>) -> Result<bool> {
        if self.resolver.update(raw_min, raw_max).is_none() {
            return Ok(false);
        }
        self.rebuild()?;
        Ok(true)
    }

    /// Replace the active rule and re-expand it.
    pub fn set_rule(&mut self, rule: RecurrenceRule) -> Result<()> {
        self.rule = rule;
        self.rebuild()
    }

    /// Replace the selection with a bulk choice over the fence, from `today`
    /// on. Returns the number of dates selected.
    pub fn quick_select(&mut self, kind: QuickSelect) -> Result<usize> {
        let fence = self.fence();
        let mut rule = match kind {
            QuickSelect::All => select_all(&fence),
            QuickSelect::Weekdays => select_weekdays(&fence),
            QuickSelect::Weekends => select_weekends(&fence),
        };
        if let (Some(today), RecurrenceRule::OneOffMulti { dates }) =
            (self.options.today, &mut rule)
        {
            dates.retain(|date| *date >= today);
        }
        self.set_rule(rule)?;
        Ok(self.windows.len())
    }

    /// Select or deselect one date by hand, turning the rule into an ad-hoc
    /// date set if it was not one already.
    ///
    /// Dates outside the fence or before `today` are ignored. Returns `true`
    /// when the selection changed.
    pub fn toggle_date(&mut self, date: NaiveDate) -> bool {
        if !self.fence().contains(date) || self.options.today.is_some_and(|today| date < today) {
            tracing::debug!(%date, "date not selectable, ignored");
            return false;
        }
        let mut dates = match std::mem::take(&mut self.rule) {
            RecurrenceRule::OneOffMulti { dates } => dates,
            _ => self.windows.dates().collect::<BTreeSet<_>>(),
        };
        if dates.remove(&date) {
            self.windows.deselect(date);
        } else {
            dates.insert(date);
            self.windows.select(date);
        }
        self.rule = RecurrenceRule::OneOffMulti { dates };
        true
    }

    /// Set the first window of every selected date, and of the shared
    /// windows, to `start`..`end`. Returns the number of dates updated.
    pub fn apply_common_hours(&mut self, start: &str, end: &str) -> usize {
        let updated = self.windows.apply_common_hours(start, end);
        if let (Some(start_time), Some(end_time)) = (parse_time(start), parse_time(end)) {
            match self.template.first_mut() {
                Some(first) => {
                    first.start_time = Some(start_time);
                    first.end_time = Some(end_time);
                }
                None => self
                    .template
                    .push(TimeWindow::new(Some(start_time), Some(end_time))),
            }
        }
        updated
    }

    /// Replace the shared windows and give every selected date fresh copies
    /// of them.
    pub fn set_common_windows(&mut self, windows: Vec<TimeWindow>) {
        let dates: Vec<NaiveDate> = self.windows.dates().collect();
        for date in dates {
            self.windows.set_windows(date, instantiate(&windows));
        }
        self.template = windows;
    }

    /// Snapshot the session as a [`Schedule`].
    pub fn to_schedule(&self) -> Schedule {
        Schedule {
            rule: self.rule.clone(),
            fence: self.fence(),
            windows: self.windows.clone(),
            shared_windows: self.template.clone(),
            info_fields: self.info_fields.clone(),
        }
    }

    /// Serialize the session into the payload string for its variant.
    pub fn submit(&self) -> Result<String> {
        let payload = match self.options.variant {
            BuilderVariant::Calendar => Payload::ExplicitDates(explicit_dates(&self.windows)),
            BuilderVariant::Periods => self.to_schedule().to_payload(),
        };
        payload.to_json()
    }

    /// The first selected date's windows become the shared windows.
    fn capture_template(&mut self) {
        if let Some((_, first)) = self.windows.iter().next() {
            self.template = first.to_vec();
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.capture_template();
        let fence = self.fence();
        let options = ExpandOptions {
            today: self.options.today,
        };
        match expand_with_options(&self.rule, &fence, &options) {
            Ok(dates) => {
                match self.rule {
                    RecurrenceRule::OneOffMulti { .. } => self.windows.sync(&dates),
                    _ => self.windows.sync_with_template(&dates, &self.template),
                }
                Ok(())
            }
            Err(err) => {
                self.windows.clear();
                Err(err)
            }
        }
    }
}

fn default_rule(variant: BuilderVariant) -> RecurrenceRule {
    match variant {
        BuilderVariant::Periods => RecurrenceRule::empty(Frequency::Weekly),
        BuilderVariant::Calendar => RecurrenceRule::empty(Frequency::OneOffMulti),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
