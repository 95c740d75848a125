//! Ticket availability descriptors.
//!
//! A ticket carries its own declarative frequency (`""`, `daily`, `weekly`,
//! `monthly` plus day selectors). It is persisted as-is and expanded later by
//! a downstream consumer, which here means rendering it as an RFC 5545 RRULE
//! and enumerating it with the `rrule` crate.

use chrono::NaiveDate;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::fence::DateFence;
use crate::payload::{lenient_days, InfoField};
use crate::rule::{RecurrenceRule, MAX_WEEKDAY};

/// Upper bound on instances enumerated for one ticket (about 179 years of
/// daily availability).
const MAX_TICKET_INSTANCES: u16 = u16::MAX;

/// RRULE weekday codes indexed Monday = 0.
const BYDAY_CODES: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketFrequency {
    /// No recurrence chosen yet.
    #[default]
    #[serde(rename = "")]
    Unset,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub frequency: TicketFrequency,
    #[serde(default, deserialize_with = "lenient_days")]
    pub weekly_days: Vec<u8>,
    #[serde(default, deserialize_with = "lenient_days")]
    pub monthly_days: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info_fields: Vec<InfoField>,
}

impl Ticket {
    /// The equivalent engine rule. `daily` is weekly on all seven days.
    pub fn as_rule(&self) -> Option<RecurrenceRule> {
        match self.frequency {
            TicketFrequency::Unset => None,
            TicketFrequency::Daily => Some(RecurrenceRule::weekly(0..=MAX_WEEKDAY)),
            TicketFrequency::Weekly => {
                Some(RecurrenceRule::weekly(self.weekly_days.iter().copied()))
            }
            TicketFrequency::Monthly => {
                Some(RecurrenceRule::monthly(self.monthly_days.iter().copied()))
            }
        }
    }

    /// Render the ticket as a `DTSTART`/`RRULE` pair bounded by the fence.
    ///
    /// Returns `None` for an unset frequency, an empty day selection or a
    /// fence with an open bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use recurrence_engine::{DateFence, Ticket, TicketFrequency};
    /// use chrono::NaiveDate;
    ///
    /// let ticket = Ticket {
    ///     frequency: TicketFrequency::Weekly,
    ///     weekly_days: vec![0, 4],
    ///     ..Default::default()
    /// };
    /// let fence = DateFence::bounded(
    ///     NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
    ///     NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
    /// );
    /// assert_eq!(
    ///     ticket.to_rrule(&fence).unwrap(),
    ///     "DTSTART:20250301T000000Z\nRRULE:FREQ=WEEKLY;BYDAY=MO,FR;UNTIL=20250331T235959Z"
    /// );
    /// ```
    pub fn to_rrule(&self, fence: &DateFence) -> Option<String> {
        let (min, max) = fence.bounds()?;
        let rule = self.as_rule()?;
        if rule.is_empty() {
            return None;
        }

        let recurrence = match (&self.frequency, &rule) {
            (TicketFrequency::Daily, _) => "FREQ=DAILY".to_string(),
            (_, RecurrenceRule::Weekly { days_of_week }) => {
                let codes: Vec<&str> = days_of_week
                    .iter()
                    .map(|d| BYDAY_CODES[usize::from(*d)])
                    .collect();
                format!("FREQ=WEEKLY;BYDAY={}", codes.join(","))
            }
            (_, RecurrenceRule::Monthly { days_of_month }) => {
                let days: Vec<String> = days_of_month.iter().map(u8::to_string).collect();
                format!("FREQ=MONTHLY;BYMONTHDAY={}", days.join(","))
            }
            (_, RecurrenceRule::OneOffSingle { .. } | RecurrenceRule::OneOffMulti { .. }) => {
                return None;
            }
        };

        Some(format!(
            "DTSTART:{}T000000Z\nRRULE:{};UNTIL={}T235959Z",
            min.format("%Y%m%d"),
            recurrence,
            max.format("%Y%m%d")
        ))
    }
}

/// Expand a ticket's declarative rule inside a fence, ascending.
///
/// # Errors
///
/// - [`EngineError::UnboundedRange`] if the ticket recurs and the fence is open
/// - [`EngineError::InvalidRule`] if the rendered RRULE is rejected
/// - [`EngineError::Expansion`] if the instance limit is hit
pub fn expand_ticket(ticket: &Ticket, fence: &DateFence) -> Result<Vec<NaiveDate>> {
    let Some(rule) = ticket.as_rule() else {
        return Ok(Vec::new());
    };
    let frequency = rule.frequency();
    if frequency.needs_bounded_fence() && !fence.is_bounded() {
        return Err(EngineError::UnboundedRange { frequency });
    }
    let Some(text) = ticket.to_rrule(fence) else {
        return Ok(Vec::new());
    };

    let set: RRuleSet = text
        .parse()
        .map_err(|e: rrule::RRuleError| EngineError::InvalidRule(format!("{text}: {e}")))?;
    let result = set.all(MAX_TICKET_INSTANCES);
    if result.limited {
        return Err(EngineError::Expansion(format!(
            "ticket '{}' produces more than {MAX_TICKET_INSTANCES} instances",
            ticket.name
        )));
    }

    let dates: Vec<NaiveDate> = result
        .dates
        .iter()
        .map(|dt| dt.date_naive())
        .filter(|d| fence.contains(*d) && rule.matches(*d))
        .collect();
    tracing::debug!(ticket = %ticket.name, count = dates.len(), "ticket expanded");
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::expand;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ticket(frequency: TicketFrequency, weekly: &[u8], monthly: &[u8]) -> Ticket {
        Ticket {
            name: "General admission".into(),
            frequency,
            weekly_days: weekly.to_vec(),
            monthly_days: monthly.to_vec(),
            info_fields: Vec::new(),
        }
    }

    #[test]
    fn test_unset_frequency_round_trips_as_empty_string() {
        let t: Ticket = serde_json::from_str(
            r#"{"name": "VIP", "frequency": "", "weekly_days": [], "monthly_days": []}"#,
        )
        .unwrap();
        assert_eq!(t.frequency, TicketFrequency::Unset);
        assert!(t.as_rule().is_none());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["frequency"], "");
    }

    #[test]
    fn test_ticket_info_fields_accept_legacy_keys() {
        let t: Ticket = serde_json::from_str(
            r#"{"frequency": "daily", "info_fields": [{"key": "Gate", "value": "B"}]}"#,
        )
        .unwrap();
        assert_eq!(t.info_fields[0].title, "Gate");
        assert_eq!(t.info_fields[0].description, "B");
    }

    #[test]
    fn test_out_of_range_days_are_dropped_not_fatal() {
        let t: Ticket = serde_json::from_str(
            r#"{"name": "Matinee", "frequency": "weekly", "weekly_days": [0, -1, 300, 9, 4],
                "monthly_days": null}"#,
        )
        .unwrap();
        assert_eq!(t.weekly_days, vec![0, 9, 4]);
        assert!(t.monthly_days.is_empty());
        assert_eq!(t.as_rule(), Some(RecurrenceRule::weekly([0, 4])));
    }

    #[test]
    fn test_rrule_rendering() {
        let fence = DateFence::bounded(d(2025, 3, 1), d(2025, 3, 31));
        assert_eq!(
            ticket(TicketFrequency::Monthly, &[], &[15, 1]).to_rrule(&fence).unwrap(),
            "DTSTART:20250301T000000Z\nRRULE:FREQ=MONTHLY;BYMONTHDAY=1,15;UNTIL=20250331T235959Z"
        );
        assert_eq!(
            ticket(TicketFrequency::Daily, &[], &[]).to_rrule(&fence).unwrap(),
            "DTSTART:20250301T000000Z\nRRULE:FREQ=DAILY;UNTIL=20250331T235959Z"
        );
        assert!(ticket(TicketFrequency::Weekly, &[], &[]).to_rrule(&fence).is_none());
        assert!(ticket(TicketFrequency::Unset, &[1], &[]).to_rrule(&fence).is_none());
        assert!(ticket(TicketFrequency::Daily, &[], &[])
            .to_rrule(&DateFence::new(Some(d(2025, 3, 1)), None))
            .is_none());
    }

    #[test]
    fn test_expand_weekly_ticket_matches_engine() {
        let fence = DateFence::bounded(d(2025, 3, 1), d(2025, 3, 31));
        let t = ticket(TicketFrequency::Weekly, &[0, 2, 4], &[]);
        let downstream = expand_ticket(&t, &fence).unwrap();
        let engine = expand(&t.as_rule().unwrap(), &fence).unwrap();
        assert_eq!(downstream, engine);
        assert_eq!(downstream.len(), 13);
    }

    #[test]
    fn test_expand_monthly_ticket_skips_short_months() {
        let fence = DateFence::bounded(d(2025, 1, 1), d(2025, 6, 30));
        let t = ticket(TicketFrequency::Monthly, &[], &[31]);
        assert_eq!(
            expand_ticket(&t, &fence).unwrap(),
            vec![d(2025, 1, 31), d(2025, 3, 31), d(2025, 5, 31)]
        );
    }

    #[test]
    fn test_expand_daily_ticket() {
        let fence = DateFence::bounded(d(2024, 2, 27), d(2024, 3, 2));
        let t = ticket(TicketFrequency::Daily, &[], &[]);
        assert_eq!(expand_ticket(&t, &fence).unwrap().len(), 5);
    }

    #[test]
    fn test_expand_ticket_open_fence_is_error() {
        let t = ticket(TicketFrequency::Daily, &[], &[]);
        assert!(matches!(
            expand_ticket(&t, &DateFence::unbounded()),
            Err(EngineError::UnboundedRange { .. })
        ));
        let unset = ticket(TicketFrequency::Unset, &[], &[]);
        assert!(expand_ticket(&unset, &DateFence::unbounded()).unwrap().is_empty());
    }
}
