//! Occurrence engine: the next due dose and the medication's status.
//!
//! [`compute_next_occurrence`] is a pure function of its arguments. It
//! keeps no state between calls, so every evaluation starts from scratch:
//!
//! 1. As-needed schedules never produce a clock occurrence (`Prn`).
//! 2. Outside the schedule's local date window there is nothing to do (`Ok`).
//! 3. An active snooze reports the base occurrence as `Snoozed`.
//! 4. Otherwise the base occurrence is classified against the grace period;
//!    a snooze that ended after the scheduled instant restarts grace.
//!
//! All calendar and weekday logic uses the patient's local date.

use crate::localtime::{local_date, local_midnight, resolve_local};
use crate::schedule::{daily_slot_key, weekly_slot_key};
use crate::{
    ClockTime, DayOfWeek, MedicationStatus, Occurrence, Recurrence, ReminderPolicy, ScheduleSpec,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Days scanned ahead for daily schedules
const DAILY_LOOKAHEAD_DAYS: i64 = 7;
/// Days scanned ahead for weekly schedules (two full weeks)
const WEEKLY_LOOKAHEAD_DAYS: i64 = 14;

/// A dose taken within this distance of a slot on the same local day satisfies it
const DEDUP_WINDOW_SECONDS: i64 = 3600;

/// Compute the next occurrence and current status of a medication.
///
/// # Arguments
/// * `tz` - The patient's timezone
/// * `schedule` - The medication's schedule
/// * `now` - Evaluation instant
/// * `last_taken` - When a dose was last taken (or a slot last skipped)
/// * `snooze_until` - End of the active snooze, if any
/// * `policy` - Grace period source
///
/// Callers holding an IANA name resolve it first with [`parse_timezone`](crate::parse_timezone).
pub fn compute_next_occurrence(
    tz: &Tz,
    schedule: &ScheduleSpec,
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
    snooze_until: Option<DateTime<Utc>>,
    policy: &ReminderPolicy,
) -> (Option<Occurrence>, MedicationStatus) {
    if matches!(schedule.recurrence, Recurrence::AsNeeded) {
        return (None, MedicationStatus::Prn);
    }

    let today = local_date(tz, now);
    if !schedule.is_active_on(today) {
        tracing::debug!("Schedule inactive on {}", today);
        return (None, MedicationStatus::Ok);
    }

    if let Some(until) = snooze_until.filter(|until| now < *until) {
        let occurrence = base_occurrence(tz, schedule, now, last_taken);
        tracing::debug!("Snoozed until {}", until);
        return (occurrence, MedicationStatus::Snoozed);
    }

    let Some(occurrence) = base_occurrence(tz, schedule, now, last_taken) else {
        return (None, MedicationStatus::Ok);
    };

    let status = classify(&occurrence, now, snooze_until, policy);
    tracing::debug!(
        "Next occurrence {} at {} is {}",
        occurrence.slot_key,
        occurrence.scheduled_for,
        status
    );
    (Some(occurrence), status)
}

/// Instant at which the medication next needs attention.
///
/// While snoozed this is the snooze end; otherwise the occurrence itself.
pub fn compute_effective_next_due(
    occurrence: Option<&Occurrence>,
    snooze_until: Option<DateTime<Utc>>,
    status: MedicationStatus,
) -> Option<DateTime<Utc>> {
    if status == MedicationStatus::Prn {
        return None;
    }
    let occurrence = occurrence?;
    match snooze_until {
        Some(until) if status == MedicationStatus::Snoozed => Some(until),
        _ => Some(occurrence.scheduled_for),
    }
}

fn classify(
    occurrence: &Occurrence,
    now: DateTime<Utc>,
    snooze_until: Option<DateTime<Utc>>,
    policy: &ReminderPolicy,
) -> MedicationStatus {
    if now < occurrence.scheduled_for {
        return MedicationStatus::Ok;
    }

    let grace_start = match snooze_until {
        Some(until) if until > occurrence.scheduled_for => until,
        _ => occurrence.scheduled_for,
    };

    if now > grace_start + policy.grace() {
        MedicationStatus::Missed
    } else {
        MedicationStatus::Due
    }
}

/// Next not-yet-taken slot, ignoring snooze and status
fn base_occurrence(
    tz: &Tz,
    schedule: &ScheduleSpec,
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
) -> Option<Occurrence> {
    match &schedule.recurrence {
        Recurrence::TimesPerDay { times, .. } => {
            times_per_day_occurrence(tz, schedule, times, now, last_taken)
        }
        Recurrence::Weekly {
            weekdays, times, ..
        } => weekly_occurrence(tz, schedule, weekdays, times, now, last_taken),
        Recurrence::Interval {
            interval_minutes,
            anchor,
        } => interval_occurrence(
            tz,
            schedule,
            interval_minutes.get(),
            *anchor,
            now,
            last_taken,
        ),
        Recurrence::AsNeeded => None,
    }
}

fn sorted_times(times: &[ClockTime]) -> Vec<ClockTime> {
    let mut sorted = times.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// A slot is satisfied if the last dose was within an hour of it on the same local day
fn is_slot_taken(tz: &Tz, last_taken: Option<DateTime<Utc>>, scheduled: DateTime<Utc>) -> bool {
    let Some(taken) = last_taken else {
        return false;
    };
    if local_date(tz, taken) != local_date(tz, scheduled) {
        return false;
    }
    (taken - scheduled).num_seconds().abs() < DEDUP_WINDOW_SECONDS
}

fn slot_occurrence(
    schedule: &ScheduleSpec,
    scheduled_for: DateTime<Utc>,
    slot_key: String,
) -> Option<Occurrence> {
    match schedule.dose_for_slot(&slot_key) {
        Some(dose) => Some(Occurrence {
            scheduled_for,
            dose: dose.clone(),
            slot_key,
        }),
        None => {
            tracing::debug!("Slot {} has no dose configured; skipping", slot_key);
            None
        }
    }
}

fn times_per_day_occurrence(
    tz: &Tz,
    schedule: &ScheduleSpec,
    times: &[ClockTime],
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
) -> Option<Occurrence> {
    let times = sorted_times(times);
    let today = local_date(tz, now);

    // Slots from earlier today that were never taken stay pending
    for &time in &times {
        let scheduled = resolve_local(tz, today, time);
        if scheduled > now || is_slot_taken(tz, last_taken, scheduled) {
            continue;
        }
        if let Some(occ) = slot_occurrence(schedule, scheduled, daily_slot_key(time)) {
            return Some(occ);
        }
    }

    scan_forward(tz, schedule, now, last_taken, DAILY_LOOKAHEAD_DAYS, |date| {
        times
            .iter()
            .map(|&time| (resolve_local(tz, date, time), daily_slot_key(time)))
            .collect()
    })
}

fn weekly_occurrence(
    tz: &Tz,
    schedule: &ScheduleSpec,
    weekdays: &[DayOfWeek],
    times: &[ClockTime],
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
) -> Option<Occurrence> {
    let times = sorted_times(times);

    scan_forward(tz, schedule, now, last_taken, WEEKLY_LOOKAHEAD_DAYS, |date| {
        let day = DayOfWeek::of(date);
        if !weekdays.contains(&day) {
            return Vec::new();
        }
        times
            .iter()
            .map(|&time| (resolve_local(tz, date, time), weekly_slot_key(day, time)))
            .collect()
    })
}

/// Walk forward day by day and return the first future, untaken, dosable slot.
///
/// `slots_on` yields the candidate `(instant, slot_key)` pairs of a date in
/// ascending order. Scanning stops at the end of the date window.
fn scan_forward<F>(
    tz: &Tz,
    schedule: &ScheduleSpec,
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
    lookahead_days: i64,
    slots_on: F,
) -> Option<Occurrence>
where
    F: Fn(NaiveDate) -> Vec<(DateTime<Utc>, String)>,
{
    let today = local_date(tz, now);
    for offset in 0..lookahead_days {
        let date = today + Duration::days(offset);
        if schedule.start_date.is_some_and(|start| date < start) {
            continue;
        }
        if schedule.end_date.is_some_and(|end| date > end) {
            return None;
        }

        for (scheduled, slot_key) in slots_on(date) {
            if scheduled <= now || is_slot_taken(tz, last_taken, scheduled) {
                continue;
            }
            if let Some(occ) = slot_occurrence(schedule, scheduled, slot_key) {
                return Some(occ);
            }
        }
    }
    None
}

/// Current pending dose of an interval schedule.
///
/// Counting from the anchor, the first dose is `anchor + interval`. Once
/// that has passed, the pending dose is the latest multiple of the interval
/// at or before `now`; a candidate exactly at `now` is the pending one.
fn interval_occurrence(
    tz: &Tz,
    schedule: &ScheduleSpec,
    interval_minutes: u32,
    configured_anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    last_taken: Option<DateTime<Utc>>,
) -> Option<Occurrence> {
    let interval = Duration::minutes(interval_minutes as i64);

    let mut anchor = last_taken
        .or(configured_anchor)
        .unwrap_or_else(|| local_midnight(tz, local_date(tz, now)));

    let mut next_due = latest_pending(anchor, interval, now);

    if let Some(start) = schedule.start_date {
        if local_date(tz, next_due) < start {
            anchor = local_midnight(tz, start);
            next_due = anchor + interval;
        }
    }

    if schedule
        .end_date
        .is_some_and(|end| local_date(tz, next_due) > end)
    {
        return None;
    }

    let dose = schedule.default_dose.clone()?;
    let slot_key = format!("interval_{}", (next_due - anchor).num_minutes());

    Some(Occurrence {
        scheduled_for: next_due,
        dose,
        slot_key,
    })
}

fn latest_pending(
    anchor: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let first = anchor + interval;
    if first > now {
        return first;
    }
    let steps = (now - anchor).num_seconds() / interval.num_seconds();
    anchor + Duration::seconds(steps * interval.num_seconds())
}
