//! Reminder policy and notification predicates.
//!
//! The predicates here are layered on top of engine output: they decide
//! whether a reminder may be sent right now, whether it should be
//! repeated, and where a snooze ends. None of them touch state.

use crate::localtime::local_minutes_of_day;
use crate::{ClockTime, MedicationState};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Grace period applied when none is configured
pub const DEFAULT_GRACE_MINUTES: u32 = 30;
/// Snooze length applied when none is configured
pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;

/// Reminder behavior for a medication
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderPolicy {
    /// Minutes after the scheduled instant during which the dose is still DUE
    pub grace_minutes: u32,
    /// Default snooze length in minutes
    pub snooze_minutes: u32,
    /// Whether an as-needed intake also advances the regular schedule
    pub prn_affects_schedule: bool,
    /// Re-notify every N minutes while the dose is due
    pub repeat_minutes: Option<u32>,
    /// Upper bound on repeated notifications for one occurrence
    pub max_retries: Option<u32>,
    pub quiet_hours_start: Option<ClockTime>,
    pub quiet_hours_end: Option<ClockTime>,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            grace_minutes: DEFAULT_GRACE_MINUTES,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            prn_affects_schedule: false,
            repeat_minutes: None,
            max_retries: None,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

impl ReminderPolicy {
    pub fn grace(&self) -> Duration {
        Duration::minutes(self.grace_minutes as i64)
    }
}

/// Rate limit: no second notification within `max(1, snooze/2)` minutes
pub fn should_send_notification(
    policy: &ReminderPolicy,
    state: &MedicationState,
    now: DateTime<Utc>,
) -> bool {
    if let Some(last) = state.last_notified_at {
        let min_gap = Duration::minutes((policy.snooze_minutes / 2).max(1) as i64);
        if now - last < min_gap {
            return false;
        }
    }
    true
}

/// Whether a still-due reminder should be sent again
///
/// `notification_count` is the number of notifications already sent for
/// the current occurrence.
pub fn should_repeat_notification(
    policy: &ReminderPolicy,
    state: &MedicationState,
    now: DateTime<Utc>,
    notification_count: u32,
) -> bool {
    let Some(repeat) = policy.repeat_minutes.filter(|m| *m > 0) else {
        return false;
    };

    if let Some(max) = policy.max_retries {
        if notification_count >= max {
            return false;
        }
    }

    match state.last_notified_at {
        None => true,
        Some(last) => now - last >= Duration::minutes(repeat as i64),
    }
}

/// End of a snooze starting at `now`; `minutes` overrides the policy default
pub fn compute_snooze_until(
    policy: &ReminderPolicy,
    now: DateTime<Utc>,
    minutes: Option<u32>,
) -> DateTime<Utc> {
    let minutes = minutes.unwrap_or(policy.snooze_minutes);
    now + Duration::minutes(minutes as i64)
}

pub fn is_within_grace_period(
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &ReminderPolicy,
) -> bool {
    now >= scheduled_for && now <= scheduled_for + policy.grace()
}

pub fn is_dose_missed(
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &ReminderPolicy,
) -> bool {
    now > scheduled_for + policy.grace()
}

/// Whether `now` falls inside the policy's local quiet hours.
///
/// Ranges with start after end wrap past midnight (22:00 → 07:00).
/// The end bound is exclusive.
pub fn is_in_quiet_hours(now: DateTime<Utc>, tz: &Tz, policy: &ReminderPolicy) -> bool {
    let (Some(start), Some(end)) = (policy.quiet_hours_start, policy.quiet_hours_end) else {
        return false;
    };

    let current = local_minutes_of_day(tz, now);
    let start = start.minutes_of_day();
    let end = end.minutes_of_day();

    if start <= end {
        start <= current && current < end
    } else {
        current >= start || current < end
    }
}
