//! Rule expansion: [`RecurrenceRule`] + [`DateFence`] → ordered concrete dates.
//!
//! Expansion is pure. The same rule and fence always produce the same
//! ascending, duplicate-free sequence, so callers may re-run it freely after
//! every edit. Nothing here reads the system clock; past-date exclusion takes
//! an explicit `today` through [`ExpandOptions`].

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, Result};
use crate::fence::DateFence;
use crate::rule::{is_weekend_index, weekday_index, RecurrenceRule};

/// Options for [`expand_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    /// When set, dates strictly before `today` are left out.
    pub today: Option<NaiveDate>,
}

/// Expand a rule against a fence.
///
/// # Errors
///
/// Returns [`EngineError::UnboundedRange`] when a weekly or monthly rule is
/// expanded against a fence with an open bound. One-off rules are already
/// finite and are filtered by whichever bounds are present.
///
/// # Examples
///
/// ```
/// use recurrence_engine::{expand, DateFence, RecurrenceRule};
/// use chrono::NaiveDate;
///
/// let fence = DateFence::bounded(
///     NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
/// );
/// let dates = expand(&RecurrenceRule::monthly([1, 15, 31]), &fence).unwrap();
/// assert_eq!(dates.len(), 2); // April has no 31st
/// ```
pub fn expand(rule: &RecurrenceRule, fence: &DateFence) -> Result<Vec<NaiveDate>> {
    expand_with_options(rule, fence, &ExpandOptions::default())
}

/// Expand a rule against a fence with options (past-date exclusion).
pub fn expand_with_options(
    rule: &RecurrenceRule,
    fence: &DateFence,
    options: &ExpandOptions,
) -> Result<Vec<NaiveDate>> {
    let dates: Vec<NaiveDate> = expand_iter(rule, fence)?
        .filter(|date| options.today.is_none_or(|today| *date >= today))
        .collect();

    tracing::debug!(
        frequency = %rule.frequency(),
        min = ?fence.min,
        max = ?fence.max,
        count = dates.len(),
        "rule expanded"
    );
    Ok(dates)
}

/// Lazily enumerate the dates selected by `rule` inside `fence`, ascending.
///
/// The returned iterator borrows the rule; calling this again restarts the
/// sequence from the beginning.
pub fn expand_iter<'a>(
    rule: &'a RecurrenceRule,
    fence: &DateFence,
) -> Result<Box<dyn Iterator<Item = NaiveDate> + 'a>> {
    let fence = *fence;
    match rule {
        RecurrenceRule::OneOffSingle { date } => {
            Ok(Box::new(Some(*date).into_iter().filter(move |d| fence.contains(*d))))
        }
        RecurrenceRule::OneOffMulti { dates } => {
            // BTreeSet iteration is already ascending.
            Ok(Box::new(dates.iter().copied().filter(move |d| fence.contains(*d))))
        }
        RecurrenceRule::Weekly { days_of_week } => {
            let days = fence.days().ok_or(EngineError::UnboundedRange {
                frequency: rule.frequency(),
            })?;
            Ok(Box::new(
                days.filter(move |d| days_of_week.contains(&weekday_index(*d))),
            ))
        }
        RecurrenceRule::Monthly { days_of_month } => {
            let (min, max) = fence.bounds().ok_or(EngineError::UnboundedRange {
                frequency: rule.frequency(),
            })?;
            Ok(Box::new(
                months_between(min, max)
                    .flat_map(move |(year, month)| {
                        // from_ymd_opt rejects day numbers past the month's length,
                        // which is exactly the skip-not-clamp rule.
                        days_of_month.iter().filter_map(move |day| {
                            NaiveDate::from_ymd_opt(year, month, u32::from(*day))
                        })
                    })
                    .filter(move |d| fence.contains(*d)),
            ))
        }
    }
}

/// Every (year, month) pair from `min`'s month through `max`'s month inclusive.
fn months_between(min: NaiveDate, max: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let last = (max.year(), max.month());
    std::iter::successors(Some((min.year(), min.month())), move |&(y, m)| {
        if (y, m) >= last {
            None
        } else if m == 12 {
            Some((y + 1, 1))
        } else {
            Some((y, m + 1))
        }
    })
}

// ── Quick select ────────────────────────────────────────────────────────────

/// Every day of the fence as an ad-hoc date set.
///
/// A fence with only `min` set selects just that day; a fence without `min`
/// selects nothing. Neither case is extended into an unbounded sequence.
pub fn select_all(fence: &DateFence) -> RecurrenceRule {
    RecurrenceRule::dates(quick_select_days(fence))
}

/// Monday through Friday of the fence as an ad-hoc date set.
pub fn select_weekdays(fence: &DateFence) -> RecurrenceRule {
    RecurrenceRule::dates(
        quick_select_days(fence)
            .into_iter()
            .filter(|d| !is_weekend_index(weekday_index(*d))),
    )
}

/// Saturdays and Sundays of the fence as an ad-hoc date set.
pub fn select_weekends(fence: &DateFence) -> RecurrenceRule {
    RecurrenceRule::dates(
        quick_select_days(fence)
            .into_iter()
            .filter(|d| is_weekend_index(weekday_index(*d))),
    )
}

fn quick_select_days(fence: &DateFence) -> Vec<NaiveDate> {
    match (fence.min, fence.max) {
        (Some(_), Some(_)) => fence.days().map(Iterator::collect).unwrap_or_default(),
        (Some(min), None) => vec![min],
        (None, _) => Vec::new(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Frequency;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn march_2025() -> DateFence {
        DateFence::bounded(d(2025, 3, 1), d(2025, 3, 31))
    }

    // ── one-off ─────────────────────────────────────────────────────────

    #[test]
    fn test_single_inside_fence() {
        let dates = expand(&RecurrenceRule::single(d(2025, 3, 10)), &march_2025()).unwrap();
        assert_eq!(dates, vec![d(2025, 3, 10)]);
    }

    #[test]
    fn test_single_outside_fence_is_empty() {
        let dates = expand(&RecurrenceRule::single(d(2025, 4, 10)), &march_2025()).unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn test_multi_filters_and_sorts() {
        let rule = RecurrenceRule::dates([d(2025, 3, 20), d(2025, 2, 1), d(2025, 3, 2)]);
        let dates = expand(&rule, &march_2025()).unwrap();
        assert_eq!(dates, vec![d(2025, 3, 2), d(2025, 3, 20)]);
    }

    #[test]
    fn test_multi_half_open_fence_uses_present_bound() {
        let rule = RecurrenceRule::dates([d(2024, 1, 1), d(2026, 1, 1)]);
        let fence = DateFence::new(Some(d(2025, 1, 1)), None);
        assert_eq!(expand(&rule, &fence).unwrap(), vec![d(2026, 1, 1)]);
    }

    // ── weekly ──────────────────────────────────────────────────────────

    #[test]
    fn test_weekly_mon_wed_fri_march_2025() {
        let dates = expand(&RecurrenceRule::weekly([0, 2, 4]), &march_2025()).unwrap();
        let days: Vec<u32> = dates.iter().map(|d| d.day()).collect();
        assert_eq!(days, vec![3, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28, 31]);
        assert_eq!(dates.len(), 13);
    }

    #[test]
    fn test_weekly_partial_week_at_end_of_range() {
        // Thu 2025-03-27 .. Mon 2025-03-31: only one Sunday fits.
        let fence = DateFence::bounded(d(2025, 3, 27), d(2025, 3, 31));
        let dates = expand(&RecurrenceRule::weekly([6]), &fence).unwrap();
        assert_eq!(dates, vec![d(2025, 3, 30)]);
    }

    #[test]
    fn test_weekly_open_fence_is_unbounded_error() {
        let fence = DateFence::new(Some(d(2025, 3, 1)), None);
        let err = expand(&RecurrenceRule::weekly([0]), &fence).unwrap_err();
        assert_eq!(
            err,
            EngineError::UnboundedRange {
                frequency: Frequency::Weekly
            }
        );
        assert!(err.to_string().contains("weekly"));
    }

    #[test]
    fn test_weekly_empty_set_expands_to_nothing() {
        let dates = expand(&RecurrenceRule::empty(Frequency::Weekly), &march_2025()).unwrap();
        assert!(dates.is_empty());
    }

    // ── monthly ─────────────────────────────────────────────────────────

    #[test]
    fn test_monthly_skips_31_in_april() {
        let fence = DateFence::bounded(d(2025, 4, 1), d(2025, 4, 30));
        let dates = expand(&RecurrenceRule::monthly([1, 15, 31]), &fence).unwrap();
        assert_eq!(dates, vec![d(2025, 4, 1), d(2025, 4, 15)]);
    }

    #[test]
    fn test_monthly_31_across_q1() {
        let fence = DateFence::bounded(d(2025, 1, 1), d(2025, 3, 31));
        let dates = expand(&RecurrenceRule::monthly([31]), &fence).unwrap();
        assert_eq!(dates, vec![d(2025, 1, 31), d(2025, 3, 31)]);
    }

    #[test]
    fn test_monthly_29_leap_and_non_leap() {
        let rule = RecurrenceRule::monthly([29]);
        let leap = DateFence::bounded(d(2024, 2, 1), d(2024, 2, 29));
        assert_eq!(expand(&rule, &leap).unwrap(), vec![d(2024, 2, 29)]);
        let plain = DateFence::bounded(d(2025, 2, 1), d(2025, 2, 28));
        assert!(expand(&rule, &plain).unwrap().is_empty());
    }

    #[test]
    fn test_monthly_fence_clips_partial_months() {
        let fence = DateFence::bounded(d(2025, 1, 20), d(2025, 3, 10));
        let dates = expand(&RecurrenceRule::monthly([5, 25]), &fence).unwrap();
        assert_eq!(
            dates,
            vec![d(2025, 1, 25), d(2025, 2, 5), d(2025, 2, 25), d(2025, 3, 5)]
        );
    }

    #[test]
    fn test_monthly_crosses_year_boundary() {
        let fence = DateFence::bounded(d(2025, 11, 1), d(2026, 2, 28));
        let dates = expand(&RecurrenceRule::monthly([30]), &fence).unwrap();
        assert_eq!(
            dates,
            vec![d(2025, 11, 30), d(2025, 12, 30), d(2026, 1, 30)]
        );
    }

    #[test]
    fn test_monthly_open_fence_is_unbounded_error() {
        let fence = DateFence::new(None, Some(d(2025, 3, 1)));
        assert!(matches!(
            expand(&RecurrenceRule::monthly([1]), &fence),
            Err(EngineError::UnboundedRange { .. })
        ));
    }

    // ── options ─────────────────────────────────────────────────────────

    #[test]
    fn test_today_excludes_past_dates() {
        let options = ExpandOptions {
            today: Some(d(2025, 3, 12)),
        };
        let dates =
            expand_with_options(&RecurrenceRule::weekly([0, 2, 4]), &march_2025(), &options)
                .unwrap();
        assert_eq!(dates.first(), Some(&d(2025, 3, 12)));
        assert_eq!(dates.len(), 9);
    }

    #[test]
    fn test_expand_iter_restarts() {
        let rule = RecurrenceRule::weekly([1]);
        let fence = march_2025();
        let first: Vec<_> = expand_iter(&rule, &fence).unwrap().take(2).collect();
        let again: Vec<_> = expand_iter(&rule, &fence).unwrap().take(2).collect();
        assert_eq!(first, again);
        assert_eq!(first, vec![d(2025, 3, 4), d(2025, 3, 11)]);
    }

    // ── quick select ────────────────────────────────────────────────────

    #[test]
    fn test_select_all_weekdays_weekends_partition() {
        let fence = march_2025();
        let count = |rule: RecurrenceRule| match rule {
            RecurrenceRule::OneOffMulti { dates } => dates.len(),
            other => panic!("unexpected rule {other:?}"),
        };
        assert_eq!(count(select_all(&fence)), 31);
        assert_eq!(count(select_weekdays(&fence)), 21);
        assert_eq!(count(select_weekends(&fence)), 10);
    }

    #[test]
    fn test_select_all_min_only_degenerates_to_single_day() {
        let fence = DateFence::new(Some(d(2025, 3, 1)), None);
        assert_eq!(select_all(&fence), RecurrenceRule::dates([d(2025, 3, 1)]));
        // 2025-03-01 is a Saturday
        assert_eq!(select_weekdays(&fence), RecurrenceRule::dates(Vec::new()));
    }

    #[test]
    fn test_select_all_without_min_is_empty() {
        let fence = DateFence::new(None, Some(d(2025, 3, 1)));
        assert!(select_all(&fence).is_empty());
    }

    proptest! {
        #[test]
        fn prop_weekly_hits_every_selected_weekday(
            start in 0i64..10_000,
            len in 6i64..120,
            days in proptest::collection::btree_set(0u8..7, 1..7),
        ) {
            let min = d(2000, 1, 1) + chrono::Duration::days(start);
            let fence = DateFence::bounded(min, min + chrono::Duration::days(len));
            let rule = RecurrenceRule::Weekly { days_of_week: days.clone() };
            let dates = expand(&rule, &fence).unwrap();
            for day in &days {
                prop_assert!(dates.iter().any(|d| weekday_index(*d) == *day));
            }
            prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(dates.iter().all(|d| fence.contains(*d)));
        }

        #[test]
        fn prop_monthly_never_rolls_over(
            start in 0i64..10_000,
            len in 0i64..800,
            days in proptest::collection::btree_set(1u8..=31, 1..5),
        ) {
            let min = d(2000, 1, 1) + chrono::Duration::days(start);
            let fence = DateFence::bounded(min, min + chrono::Duration::days(len));
            let rule = RecurrenceRule::Monthly { days_of_month: days.clone() };
            for date in expand(&rule, &fence).unwrap() {
                prop_assert!(days.contains(&(date.day() as u8)));
                prop_assert!(fence.contains(date));
            }
        }
    }
}
