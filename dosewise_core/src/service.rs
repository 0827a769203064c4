//! Medication service: commands that mutate a profile and re-run the engine.
//!
//! Each command takes `&mut Profile`, so one caller at a time owns the
//! aggregate. After every state change the engine is invoked again and its
//! result replaces the medication's mirrored `next_*`/`status` fields.

use crate::engine::compute_next_occurrence;
use crate::policy::compute_snooze_until;
use crate::{
    ClockTime, DayOfWeek, DosageForm, DoseQuantity, Error, LogAction, LogRecord, Medication,
    Profile, Recurrence, ReminderPolicy, Result, ScheduleKind, ScheduleSpec,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::num::NonZeroU32;

/// Source of the current instant
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Add a medication to a profile
///
/// Times and weekdays arrive unvalidated (as entered by a user) and are
/// checked by [`AddMedicationCommand::validate`].
#[derive(Clone, Debug)]
pub struct AddMedicationCommand {
    pub display_name: String,
    pub kind: ScheduleKind,
    pub times: Vec<String>,
    pub weekdays: Vec<u8>,
    pub interval_minutes: Option<u32>,
    pub anchor: Option<DateTime<Utc>>,
    pub slot_doses: BTreeMap<String, DoseQuantity>,
    pub default_dose: Option<DoseQuantity>,
    pub form: DosageForm,
    /// Falls back to the profile's default policy
    pub policy: Option<ReminderPolicy>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AddMedicationCommand {
    pub fn new(display_name: impl Into<String>, kind: ScheduleKind) -> Self {
        Self {
            display_name: display_name.into(),
            kind,
            times: Vec::new(),
            weekdays: Vec::new(),
            interval_minutes: None,
            anchor: None,
            slot_doses: BTreeMap::new(),
            default_dose: None,
            form: DosageForm::default(),
            policy: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.build_schedule().map(|_| ())
    }

    fn parse_times(&self) -> Result<Vec<ClockTime>> {
        self.times
            .iter()
            .map(|s| {
                s.parse::<ClockTime>()
                    .map_err(|_| Error::Validation(format!("Invalid time format: {}", s)))
            })
            .collect()
    }

    fn build_schedule(&self) -> Result<ScheduleSpec> {
        if self.display_name.trim().is_empty() {
            return Err(Error::Validation("Display name is required".into()));
        }

        let recurrence = match self.kind {
            ScheduleKind::TimesPerDay => {
                if self.times.is_empty() {
                    return Err(Error::Validation(
                        "Times are required for times_per_day schedule".into(),
                    ));
                }
                Recurrence::TimesPerDay {
                    times: self.parse_times()?,
                    slot_doses: self.slot_doses.clone(),
                }
            }
            ScheduleKind::Weekly => {
                if self.weekdays.is_empty() {
                    return Err(Error::Validation(
                        "Weekdays are required for weekly schedule".into(),
                    ));
                }
                if self.times.is_empty() {
                    return Err(Error::Validation(
                        "Times are required for weekly schedule".into(),
                    ));
                }
                let weekdays = self
                    .weekdays
                    .iter()
                    .map(|d| {
                        DayOfWeek::new(*d)
                            .map_err(|_| Error::Validation(format!("Invalid weekday: {}", d)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Recurrence::Weekly {
                    weekdays,
                    times: self.parse_times()?,
                    slot_doses: self.slot_doses.clone(),
                }
            }
            ScheduleKind::Interval => {
                let interval_minutes = self
                    .interval_minutes
                    .and_then(NonZeroU32::new)
                    .ok_or_else(|| {
                        Error::Validation(
                            "Positive interval_minutes is required for interval schedule".into(),
                        )
                    })?;
                Recurrence::Interval {
                    interval_minutes,
                    anchor: self.anchor,
                }
            }
            ScheduleKind::AsNeeded => Recurrence::AsNeeded,
        };

        ScheduleSpec::new(recurrence, self.default_dose.clone())
            .and_then(|spec| spec.with_window(self.start_date, self.end_date))
            .map_err(|e| Error::Validation(e.to_string()))
    }
}

/// Change a medication's name, schedule or policy
#[derive(Clone, Debug, Default)]
pub struct UpdateMedicationCommand {
    pub medication_id: String,
    pub display_name: Option<String>,
    pub schedule: Option<ScheduleSpec>,
    pub policy: Option<ReminderPolicy>,
}

/// Record a scheduled dose as taken
#[derive(Clone, Debug, Default)]
pub struct TakeCommand {
    pub medication_id: String,
    /// Defaults to now
    pub taken_at: Option<DateTime<Utc>>,
    pub dose_override: Option<DoseQuantity>,
}

/// Record an as-needed intake
#[derive(Clone, Debug)]
pub struct PrnTakeCommand {
    pub medication_id: String,
    pub dose: DoseQuantity,
    pub taken_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Defer the pending reminder
#[derive(Clone, Debug, Default)]
pub struct SnoozeCommand {
    pub medication_id: String,
    /// Overrides the policy's snooze length
    pub minutes: Option<u32>,
    /// Explicit end; wins over `minutes`
    pub until: Option<DateTime<Utc>>,
}

/// Skip the pending dose
#[derive(Clone, Debug, Default)]
pub struct SkipCommand {
    pub medication_id: String,
    pub reason: Option<String>,
}

// ============================================================================
// Service
// ============================================================================

/// Application service coordinating profile mutations and engine evaluation
#[derive(Clone, Debug, Default)]
pub struct MedicationService<C: Clock = SystemClock> {
    clock: C,
}

impl MedicationService<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> MedicationService<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn add_medication(
        &self,
        profile: &mut Profile,
        command: AddMedicationCommand,
    ) -> Result<Medication> {
        let schedule = command.build_schedule()?;
        let policy = command
            .policy
            .unwrap_or_else(|| profile.default_policy.clone());

        let mut medication = Medication::create(
            command.display_name.trim(),
            schedule,
            command.form,
            policy,
        );
        self.recompute(profile, &mut medication)?;

        tracing::info!(
            "Added medication {} ({}) with {} schedule",
            medication.display_name,
            medication.medication_id,
            medication.schedule.kind()
        );
        profile.add_medication(medication.clone());
        Ok(medication)
    }

    pub fn update_medication(
        &self,
        profile: &mut Profile,
        command: UpdateMedicationCommand,
    ) -> Result<Medication> {
        if let Some(schedule) = &command.schedule {
            schedule
                .validate()
                .map_err(|e| Error::Validation(e.to_string()))?;
        }

        let mut medication = take_medication(profile, &command.medication_id)?;

        if let Some(name) = command.display_name {
            let name = name.trim().to_string();
            medication.reference.display_name = name.clone();
            medication.display_name = name;
        }
        if let Some(schedule) = command.schedule {
            medication.schedule = schedule;
        }
        if let Some(policy) = command.policy {
            medication.policy = policy;
        }

        let result = self.recompute(profile, &mut medication);
        profile.add_medication(medication.clone());
        result?;

        tracing::info!("Updated medication {}", medication.medication_id);
        Ok(medication)
    }

    pub fn remove_medication(
        &self,
        profile: &mut Profile,
        medication_id: &str,
    ) -> Option<Medication> {
        let removed = profile.remove_medication(medication_id);
        if removed.is_some() {
            tracing::info!("Removed medication {}", medication_id);
        }
        removed
    }

    /// Mark the pending scheduled dose as taken
    pub fn take(&self, profile: &mut Profile, command: TakeCommand) -> Result<LogRecord> {
        let now = self.clock.now();
        let taken_at = command.taken_at.unwrap_or(now);

        self.mutate(profile, &command.medication_id, |medication| {
            let dose = command
                .dose_override
                .clone()
                .or_else(|| medication.state.next_dose.clone())
                .or_else(|| medication.schedule.default_dose.clone())
                .unwrap_or_else(|| DoseQuantity::whole(1, "dose"));

            let record = LogRecord {
                medication_id: medication.medication_id.clone(),
                action: LogAction::Taken,
                taken_at,
                scheduled_for: medication.state.next_due,
                dose: Some(dose),
                slot_key: medication.state.next_slot_key.clone(),
                meta: BTreeMap::new(),
            };

            medication.state.last_taken = Some(taken_at);
            medication.state.snooze_until = None;
            medication.state.last_notified_at = None;
            medication.state.notification_count = 0;
            Ok((record, true))
        })
    }

    /// Log an as-needed intake; it moves the schedule only if the policy says so
    pub fn prn_take(&self, profile: &mut Profile, command: PrnTakeCommand) -> Result<LogRecord> {
        let now = self.clock.now();
        let taken_at = command.taken_at.unwrap_or(now);

        self.mutate(profile, &command.medication_id, |medication| {
            let mut meta = BTreeMap::new();
            if let Some(note) = command.note.clone() {
                meta.insert("note".to_string(), note);
            }

            let record = LogRecord {
                medication_id: medication.medication_id.clone(),
                action: LogAction::PrnTaken,
                taken_at,
                scheduled_for: None,
                dose: Some(command.dose.clone()),
                slot_key: None,
                meta,
            };

            let affects_schedule = medication.policy.prn_affects_schedule;
            if affects_schedule {
                medication.state.last_taken = Some(taken_at);
            }
            Ok((record, affects_schedule))
        })
    }

    /// Snooze the pending reminder; returns the snooze end
    pub fn snooze(&self, profile: &mut Profile, command: SnoozeCommand) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        let mut snooze_until = now;

        self.mutate(profile, &command.medication_id, |medication| {
            if medication.schedule.kind() == ScheduleKind::AsNeeded {
                return Err(Error::Validation(
                    "Cannot snooze PRN-only medication".into(),
                ));
            }

            snooze_until = command.until.unwrap_or_else(|| {
                compute_snooze_until(&medication.policy, now, command.minutes)
            });

            let mut meta = BTreeMap::new();
            meta.insert("snooze_until".to_string(), snooze_until.to_rfc3339());

            let record = LogRecord {
                medication_id: medication.medication_id.clone(),
                action: LogAction::Snoozed,
                taken_at: now,
                scheduled_for: medication.state.next_due,
                dose: medication.state.next_dose.clone(),
                slot_key: medication.state.next_slot_key.clone(),
                meta,
            };

            medication.state.snooze_until = Some(snooze_until);
            Ok((record, true))
        })?;

        Ok(snooze_until)
    }

    /// Skip the pending dose and move on to the next slot
    pub fn skip(&self, profile: &mut Profile, command: SkipCommand) -> Result<LogRecord> {
        let now = self.clock.now();

        self.mutate(profile, &command.medication_id, |medication| {
            let mut meta = BTreeMap::new();
            if let Some(reason) = command.reason.clone() {
                meta.insert("reason".to_string(), reason);
            }

            let record = LogRecord {
                medication_id: medication.medication_id.clone(),
                action: LogAction::Skipped,
                taken_at: now,
                scheduled_for: medication.state.next_due,
                dose: medication.state.next_dose.clone(),
                slot_key: medication.state.next_slot_key.clone(),
                meta,
            };

            // The scheduled instant itself lands inside the slot's dedup window
            medication.state.last_taken = Some(medication.state.next_due.unwrap_or(now));
            medication.state.snooze_until = None;
            Ok((record, true))
        })
    }

    /// Stamp a sent notification for the medication's current occurrence
    pub fn record_notification(&self, profile: &mut Profile, medication_id: &str) -> Result<()> {
        let now = self.clock.now();
        let medication = profile
            .medication_mut(medication_id)
            .ok_or_else(|| Error::MedicationNotFound(medication_id.to_string()))?;
        medication.state.last_notified_at = Some(now);
        medication.state.notification_count += 1;
        Ok(())
    }

    /// Re-evaluate every medication (the periodic tick)
    pub fn recompute_all_states(&self, profile: &mut Profile) -> Result<()> {
        let ids: Vec<String> = profile.medications.keys().cloned().collect();
        for id in ids {
            let mut medication = take_medication(profile, &id)?;
            let result = self.recompute(profile, &mut medication);
            profile.add_medication(medication);
            result?;
        }
        Ok(())
    }

    /// Apply `change` to one medication, log its record and optionally re-evaluate
    ///
    /// The medication is evaluated at the current instant first, so the
    /// record captures the occurrence that is pending right now.
    fn mutate<F>(&self, profile: &mut Profile, medication_id: &str, change: F) -> Result<LogRecord>
    where
        F: FnOnce(&mut Medication) -> Result<(LogRecord, bool)>,
    {
        let mut medication = take_medication(profile, medication_id)?;
        let outcome = self.apply_change(profile, &mut medication, change);
        profile.add_medication(medication);

        let record = outcome?;
        tracing::info!(
            "{} recorded for medication {}",
            record.action,
            record.medication_id
        );
        profile.add_log(record.clone());
        Ok(record)
    }

    fn apply_change<F>(
        &self,
        profile: &Profile,
        medication: &mut Medication,
        change: F,
    ) -> Result<LogRecord>
    where
        F: FnOnce(&mut Medication) -> Result<(LogRecord, bool)>,
    {
        self.recompute(profile, medication)?;
        let (record, recompute) = change(&mut *medication)?;
        if recompute {
            self.recompute(profile, medication)?;
        }
        Ok(record)
    }

    fn recompute(&self, profile: &Profile, medication: &mut Medication) -> Result<()> {
        let tz = profile.tz()?;
        let now = self.clock.now();

        let (occurrence, status) = compute_next_occurrence(
            &tz,
            &medication.schedule,
            now,
            medication.state.last_taken,
            medication.state.snooze_until,
            &medication.policy,
        );

        let previous_slot = (
            medication.state.next_due,
            medication.state.next_slot_key.clone(),
        );
        medication.state.apply_evaluation(occurrence, status);
        if previous_slot != (medication.state.next_due, medication.state.next_slot_key.clone()) {
            medication.state.notification_count = 0;
        }

        tracing::debug!(
            "Medication {} is {} (next due {:?})",
            medication.medication_id,
            status,
            medication.state.next_due
        );
        Ok(())
    }
}

/// Remove a medication from the profile so it can be mutated alongside `&Profile`
fn take_medication(profile: &mut Profile, medication_id: &str) -> Result<Medication> {
    profile
        .remove_medication(medication_id)
        .ok_or_else(|| Error::MedicationNotFound(medication_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MedicationStatus;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, 0).unwrap()
    }

    fn service_at(h: u32, m: u32) -> MedicationService<FixedClock> {
        MedicationService::with_clock(FixedClock(at(h, m)))
    }

    fn profile() -> Profile {
        Profile::create("Test", "UTC", ReminderPolicy::default()).unwrap()
    }

    fn twice_daily() -> AddMedicationCommand {
        AddMedicationCommand {
            times: vec!["08:00".into(), "20:00".into()],
            default_dose: Some(DoseQuantity::whole(1, "tablet")),
            ..AddMedicationCommand::new("Aspirin", ScheduleKind::TimesPerDay)
        }
    }

    #[test]
    fn test_add_computes_initial_state() {
        let mut profile = profile();
        let med = service_at(7, 0)
            .add_medication(&mut profile, twice_daily())
            .unwrap();

        assert_eq!(med.state.next_due, Some(at(8, 0)));
        assert_eq!(med.state.next_slot_key.as_deref(), Some("08:00"));
        assert_eq!(med.state.status, MedicationStatus::Ok);
        assert!(profile.medication(&med.medication_id).is_some());
    }

    #[test]
    fn test_add_uses_profile_default_policy() {
        let mut profile = profile();
        profile.default_policy.grace_minutes = 90;
        let med = service_at(7, 0)
            .add_medication(&mut profile, twice_daily())
            .unwrap();
        assert_eq!(med.policy.grace_minutes, 90);
    }

    #[test]
    fn test_add_validation() {
        let service = service_at(7, 0);
        let mut profile = profile();

        let blank = AddMedicationCommand {
            display_name: "  ".into(),
            ..twice_daily()
        };
        assert!(matches!(
            service.add_medication(&mut profile, blank),
            Err(Error::Validation(_))
        ));

        let bad_time = AddMedicationCommand {
            times: vec!["8am".into()],
            ..twice_daily()
        };
        assert!(matches!(
            service.add_medication(&mut profile, bad_time),
            Err(Error::Validation(_))
        ));

        let no_times = AddMedicationCommand::new("X", ScheduleKind::TimesPerDay);
        assert!(no_times.validate().is_err());

        let bad_weekday = AddMedicationCommand {
            weekdays: vec![7],
            times: vec!["09:00".into()],
            ..AddMedicationCommand::new("X", ScheduleKind::Weekly)
        };
        assert!(bad_weekday.validate().is_err());

        let zero_interval = AddMedicationCommand {
            interval_minutes: Some(0),
            ..AddMedicationCommand::new("X", ScheduleKind::Interval)
        };
        assert!(zero_interval.validate().is_err());

        let inverted_window = AddMedicationCommand {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..twice_daily()
        };
        assert!(inverted_window.validate().is_err());

        assert!(profile.medications.is_empty());
    }

    #[test]
    fn test_take_advances_and_logs() {
        let mut profile = profile();
        let med = service_at(7, 0)
            .add_medication(&mut profile, twice_daily())
            .unwrap();

        let service = service_at(8, 5);
        service.recompute_all_states(&mut profile).unwrap();
        assert_eq!(
            profile.medication(&med.medication_id).unwrap().state.status,
            MedicationStatus::Due
        );

        let record = service
            .take(
                &mut profile,
                TakeCommand {
                    medication_id: med.medication_id.clone(),
                    ..TakeCommand::default()
                },
            )
            .unwrap();

        assert_eq!(record.action, LogAction::Taken);
        assert_eq!(record.scheduled_for, Some(at(8, 0)));
        assert_eq!(record.slot_key.as_deref(), Some("08:00"));
        assert_eq!(record.dose, Some(DoseQuantity::whole(1, "tablet")));

        let state = &profile.medication(&med.medication_id).unwrap().state;
        assert_eq!(state.last_taken, Some(at(8, 5)));
        assert_eq!(state.next_slot_key.as_deref(), Some("20:00"));
        assert_eq!(state.status, MedicationStatus::Ok);
        assert_eq!(profile.logs.len(), 1);
    }

    #[test]
    fn test_take_with_dose_override() {
        let mut profile = profile();
        let service = service_at(8, 0);
        let med = service.add_medication(&mut profile, twice_daily()).unwrap();
        let half = DoseQuantity::normalize(1, 2, "tablet").unwrap();

        let record = service
            .take(
                &mut profile,
                TakeCommand {
                    medication_id: med.medication_id,
                    dose_override: Some(half.clone()),
                    ..TakeCommand::default()
                },
            )
            .unwrap();
        assert_eq!(record.dose, Some(half));
    }

    #[test]
    fn test_unknown_medication() {
        let mut profile = profile();
        let err = service_at(8, 0)
            .take(
                &mut profile,
                TakeCommand {
                    medication_id: "nope".into(),
                    ..TakeCommand::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::MedicationNotFound(_)));
    }

    #[test]
    fn test_prn_take_leaves_schedule_by_default() {
        let mut profile = profile();
        let service = service_at(7, 50);
        let med = service.add_medication(&mut profile, twice_daily()).unwrap();

        let record = service
            .prn_take(
                &mut profile,
                PrnTakeCommand {
                    medication_id: med.medication_id.clone(),
                    dose: DoseQuantity::whole(1, "tablet"),
                    taken_at: None,
                    note: Some("headache".into()),
                },
            )
            .unwrap();

        assert_eq!(record.action, LogAction::PrnTaken);
        assert!(record.scheduled_for.is_none());
        assert_eq!(record.meta.get("note").map(String::as_str), Some("headache"));
        let state = &profile.medication(&med.medication_id).unwrap().state;
        assert!(state.last_taken.is_none());
        assert_eq!(state.next_slot_key.as_deref(), Some("08:00"));
    }

    #[test]
    fn test_prn_take_can_advance_schedule() {
        let mut profile = profile();
        let service = service_at(7, 50);
        let command = AddMedicationCommand {
            policy: Some(ReminderPolicy {
                prn_affects_schedule: true,
                ..ReminderPolicy::default()
            }),
            ..twice_daily()
        };
        let med = service.add_medication(&mut profile, command).unwrap();

        service
            .prn_take(
                &mut profile,
                PrnTakeCommand {
                    medication_id: med.medication_id.clone(),
                    dose: DoseQuantity::whole(1, "tablet"),
                    taken_at: None,
                    note: None,
                },
            )
            .unwrap();

        // 07:50 is within an hour of 08:00, so the morning slot is consumed
        let state = &profile.medication(&med.medication_id).unwrap().state;
        assert_eq!(state.last_taken, Some(at(7, 50)));
        assert_eq!(state.next_slot_key.as_deref(), Some("20:00"));
    }

    #[test]
    fn test_snooze_sets_status_and_logs() {
        let mut profile = profile();
        let med = service_at(7, 0)
            .add_medication(&mut profile, twice_daily())
            .unwrap();

        let service = service_at(8, 5);
        let until = service
            .snooze(
                &mut profile,
                SnoozeCommand {
                    medication_id: med.medication_id.clone(),
                    minutes: Some(25),
                    until: None,
                },
            )
            .unwrap();
        assert_eq!(until, at(8, 30));

        let state = &profile.medication(&med.medication_id).unwrap().state;
        assert_eq!(state.status, MedicationStatus::Snoozed);
        assert_eq!(state.snooze_until, Some(at(8, 30)));
        assert_eq!(state.next_slot_key.as_deref(), Some("08:00"));

        let log = profile.logs.last().unwrap();
        assert_eq!(log.action, LogAction::Snoozed);
        assert!(log.meta.contains_key("snooze_until"));

        // Grace restarts at the snooze end
        service_at(8, 40).recompute_all_states(&mut profile).unwrap();
        assert_eq!(
            profile.medication(&med.medication_id).unwrap().state.status,
            MedicationStatus::Due
        );
        service_at(9, 5).recompute_all_states(&mut profile).unwrap();
        assert_eq!(
            profile.medication(&med.medication_id).unwrap().state.status,
            MedicationStatus::Missed
        );
    }

    #[test]
    fn test_cannot_snooze_prn() {
        let mut profile = profile();
        let service = service_at(8, 0);
        let command = AddMedicationCommand {
            default_dose: Some(DoseQuantity::whole(2, "puff")),
            form: DosageForm::Inhaler,
            ..AddMedicationCommand::new("Ventolin", ScheduleKind::AsNeeded)
        };
        let med = service.add_medication(&mut profile, command).unwrap();
        assert_eq!(med.state.status, MedicationStatus::Prn);

        let err = service
            .snooze(
                &mut profile,
                SnoozeCommand {
                    medication_id: med.medication_id.clone(),
                    ..SnoozeCommand::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(profile.medication(&med.medication_id).is_some());
        assert!(profile.logs.is_empty());
    }

    #[test]
    fn test_skip_consumes_pending_slot() {
        let mut profile = profile();
        let med = service_at(7, 0)
            .add_medication(&mut profile, twice_daily())
            .unwrap();

        let service = service_at(9, 0);
        service.recompute_all_states(&mut profile).unwrap();
        assert_eq!(
            profile.medication(&med.medication_id).unwrap().state.status,
            MedicationStatus::Missed
        );

        let record = service
            .skip(
                &mut profile,
                SkipCommand {
                    medication_id: med.medication_id.clone(),
                    reason: Some("nausea".into()),
                },
            )
            .unwrap();
        assert_eq!(record.action, LogAction::Skipped);
        assert_eq!(record.slot_key.as_deref(), Some("08:00"));

        let state = &profile.medication(&med.medication_id).unwrap().state;
        assert_eq!(state.last_taken, Some(at(8, 0)));
        assert_eq!(state.next_slot_key.as_deref(), Some("20:00"));
        assert_eq!(state.status, MedicationStatus::Ok);
    }

    #[test]
    fn test_update_replaces_schedule() {
        let mut profile = profile();
        let service = service_at(9, 0);
        let med = service.add_medication(&mut profile, twice_daily()).unwrap();

        let schedule = ScheduleSpec::interval(240, Some(DoseQuantity::whole(1, "tablet")))
            .unwrap()
            .with_anchor(at(8, 0));
        let updated = service
            .update_medication(
                &mut profile,
                UpdateMedicationCommand {
                    medication_id: med.medication_id.clone(),
                    display_name: Some(" Aspirin 100 ".into()),
                    schedule: Some(schedule),
                    policy: None,
                },
            )
            .unwrap();

        assert_eq!(updated.display_name, "Aspirin 100");
        assert_eq!(updated.reference.display_name, "Aspirin 100");
        assert_eq!(updated.state.next_due, Some(at(12, 0)));
        assert_eq!(updated.state.next_slot_key.as_deref(), Some("interval_240"));
    }

    #[test]
    fn test_notification_counter_resets_on_new_occurrence() {
        let mut profile = profile();
        let service = service_at(8, 0);
        let med = service.add_medication(&mut profile, twice_daily()).unwrap();
        let id = med.medication_id.clone();

        service.record_notification(&mut profile, &id).unwrap();
        service.record_notification(&mut profile, &id).unwrap();
        assert_eq!(profile.medication(&id).unwrap().state.notification_count, 2);

        // Same occurrence: counter survives a re-evaluation
        service_at(8, 10).recompute_all_states(&mut profile).unwrap();
        assert_eq!(profile.medication(&id).unwrap().state.notification_count, 2);

        service_at(8, 15)
            .take(
                &mut profile,
                TakeCommand {
                    medication_id: id.clone(),
                    ..TakeCommand::default()
                },
            )
            .unwrap();
        assert_eq!(profile.medication(&id).unwrap().state.notification_count, 0);
    }

    #[test]
    fn test_remove_medication() {
        let mut profile = profile();
        let service = service_at(8, 0);
        let med = service.add_medication(&mut profile, twice_daily()).unwrap();
        assert!(service
            .remove_medication(&mut profile, &med.medication_id)
            .is_some());
        assert!(service.remove_medication(&mut profile, "missing").is_none());
    }
}
