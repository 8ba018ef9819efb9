//! Due rules. Pure functions of the record and an explicit `now`.

use chrono::{DateTime, Duration, Utc};
use newsbrief_core::error::Result;

use crate::cron;
use crate::tasks::{Cadence, Subscription, Task};

/// A task is due when its latest cron occurrence has not been consumed yet.
/// Missed occurrences collapse into one catch-up run.
pub fn is_task_due(task: &Task, now: DateTime<Utc>) -> Result<bool> {
    if !task.enabled {
        return Ok(false);
    }
    let Some(prev) = cron::prev_occurrence(&task.cron, &task.timezone, now)? else {
        return Ok(false);
    };
    Ok(prev <= now && task.last_run.is_none_or(|last| last < prev))
}

/// Hourly: more than one hour since the last send.
/// Daily: a later UTC calendar date than the last send.
pub fn is_subscription_due(sub: &Subscription, now: DateTime<Utc>) -> bool {
    let Some(last) = sub.last_sent else {
        return true;
    };
    match sub.cadence {
        Cadence::Hourly => now - last > Duration::hours(1),
        Cadence::Daily => now.date_naive() > last.date_naive(),
    }
}
