//! Week-label interval resolution.
//!
//! Each week column carries a day range such as `DIA 01 - 07` in its label
//! row. The label names no month: the month comes from the run's reference
//! date. A range whose start day is greater than its end day began in the
//! previous month (`DIA 29 - 04` in March means 29 February to 4 March).

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::WeekInterval;

fn dia_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"DIA\s*").expect("static regex"))
}

fn dash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*-\s*").expect("static regex"))
}

/// Resolve a week label into its inclusive `(start, end)` dates.
///
/// Returns `None` when the label is empty, does not split into exactly two
/// integers, or names a day that does not exist in its month. Malformed
/// labels are a per-column condition and never abort a run.
pub fn resolve_interval(label: &str, year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let upper = label.to_uppercase();
    let cleaned = dia_token().replace_all(&upper, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let parts: Vec<&str> = dash().split(cleaned).collect();
    if parts.len() != 2 {
        return None;
    }

    let (Ok(start_day), Ok(end_day)) =
        (parts[0].trim().parse::<u32>(), parts[1].trim().parse::<u32>())
    else {
        warn!(label, "interval label is not a pair of day numbers");
        return None;
    };

    let resolved = if start_day > end_day {
        let (prev_year, prev_month) = previous_month(year, month);
        NaiveDate::from_ymd_opt(prev_year, prev_month, start_day)
            .zip(NaiveDate::from_ymd_opt(year, month, end_day))
    } else {
        NaiveDate::from_ymd_opt(year, month, start_day)
            .zip(NaiveDate::from_ymd_opt(year, month, end_day))
    };

    if resolved.is_none() {
        warn!(label, year, month, "interval label names a day outside its month");
    }
    resolved
}

/// The month before `(year, month)`, wrapping January into December.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Sorted distinct ISO week numbers touched by any day of the month.
///
/// January may include week 52/53 of the previous ISO year and December may
/// include week 1 of the next; both are reported as-is.
pub fn weeks_of_month(year: i32, month: u32) -> Vec<u32> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|d| d.iso_week().week())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Weeks of `today`'s month up to and including its ISO week.
pub fn weeks_in_scope(today: NaiveDate) -> Vec<u32> {
    let current = today.iso_week().week();
    weeks_of_month(today.year(), today.month())
        .into_iter()
        .filter(|w| *w <= current)
        .collect()
}

/// Monday and Sunday of ISO week `week` as it falls in `(year, month)`.
///
/// `None` when no day of the month belongs to that week.
pub fn week_span(year: i32, month: u32, week: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let day = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .find(|d| d.iso_week().week() == week)?;
    let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
    Some((monday, monday + Duration::days(6)))
}

/// Why a week column yields no interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WeekLabelError {
    #[error("interval label cannot be resolved")]
    Unreadable,
    #[error("interval label does not overlap its week")]
    OtherWeek,
}

/// Interval of week `week` read from its label, relative to `today`'s month.
///
/// The resolved range must overlap the ISO week it is filed under. A label
/// written for another month (a trailing `DIA 27 - 02` read in January
/// lands in December) is rejected instead of being matched against the
/// wrong days.
pub fn week_interval(
    label: &str,
    week: u32,
    today: NaiveDate,
) -> Result<WeekInterval, WeekLabelError> {
    let (start, end) =
        resolve_interval(label, today.year(), today.month()).ok_or(WeekLabelError::Unreadable)?;
    let interval = WeekInterval::new(week, start, end).ok_or(WeekLabelError::Unreadable)?;
    match week_span(today.year(), today.month(), week) {
        Some((monday, sunday)) if start <= sunday && monday <= end => Ok(interval),
        _ => Err(WeekLabelError::OtherWeek),
    }
}
