//! Cron expression evaluation.
//! Accepts Unix "MIN HOUR DOM MON DOW" (5-field) as well as the seconds-first
//! 6/7-field dialect of the `cron` crate.
//! Example: "0 8 * * *" = every day at 8:00 in the task's timezone.
//!
//! Unix day-of-week numbers (0 or 7 = Sunday) are rewritten to the crate's
//! 1 = Sunday numbering before parsing.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use newsbrief_core::error::{BriefError, Result};

/// Resolve an IANA timezone name. Blank means UTC.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(Tz::UTC);
    }
    Tz::from_str(name).map_err(|_| BriefError::Validation(format!("Unknown timezone '{name}'")))
}

/// Rewrite a 5-field expression into the 6-field form the `cron` crate expects.
pub fn normalize(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = normalize_day_of_week(expression, fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(BriefError::cron(
            expression,
            format!("need 5 fields (MIN HOUR DOM MON DOW), got {n}"),
        )),
    }
}

/// Expand a numeric Unix day-of-week field into an explicit list in 1..=7.
/// Named days and special characters pass through untouched.
fn normalize_day_of_week(expression: &str, field: &str) -> Result<String> {
    if field == "*"
        || field == "?"
        || field.chars().any(|c| c.is_ascii_alphabetic() || c == '#')
    {
        return Ok(field.to_string());
    }

    let bad = |what: &str| BriefError::cron(expression, format!("bad day-of-week '{what}'"));
    let parse_day = |s: &str| -> Result<u32> {
        s.parse::<u32>().ok().filter(|d| *d <= 7).ok_or_else(|| bad(s))
    };

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step.parse().map_err(|_| bad(item))?;
                (range, step)
            }
            None => (item, 1),
        };
        if step == 0 {
            return Err(bad(item));
        }

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_day(a)?, parse_day(b)?)
        } else {
            let day = parse_day(range)?;
            if step > 1 { (day, 7) } else { (day, day) }
        };
        if start > end {
            return Err(bad(item));
        }

        for day in (start..=end).step_by(step) {
            days.insert(day % 7 + 1);
        }
    }

    Ok(days
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(","))
}

/// Parse an expression in either dialect.
pub fn parse(expression: &str) -> Result<Schedule> {
    let normalized = normalize(expression)?;
    Schedule::from_str(&normalized).map_err(|e| BriefError::cron(expression, e))
}

/// Check both the expression and the timezone.
pub fn validate(expression: &str, timezone: &str) -> Result<()> {
    parse(expression)?;
    parse_timezone(timezone)?;
    Ok(())
}

/// Most recent occurrence at or before `now`.
pub fn prev_occurrence(
    expression: &str,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(expression)?;
    let tz = parse_timezone(timezone)?;
    // The iterator walks strictly before its anchor; anchor one second later
    // so an occurrence exactly at `now` counts.
    let anchor = now.with_nanosecond(0).unwrap_or(now) + Duration::seconds(1);
    Ok(schedule
        .after(&anchor.with_timezone(&tz))
        .next_back()
        .map(|t| t.with_timezone(&Utc)))
}

/// First occurrence strictly after `after`.
pub fn next_occurrence(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(expression)?;
    let tz = parse_timezone(timezone)?;
    Ok(schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc)))
}
