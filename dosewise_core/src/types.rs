//! Core domain types for the Dosewise system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Engine output (occurrences and statuses)
//! - Per-medication mutable state mirrored from engine output
//! - Intake log records
//! - The medication and profile aggregates

use crate::localtime::parse_timezone;
use crate::{DosageForm, DoseQuantity, ReminderPolicy, Result, ScheduleSpec};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Engine Output
// ============================================================================

/// One concrete scheduled dose
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub scheduled_for: DateTime<Utc>,
    pub dose: DoseQuantity,
    /// Which recurring position this is, e.g. `"08:00"`, `"W2-08:00"`, `"interval_480"`
    pub slot_key: String,
}

/// Status of a medication at one evaluation instant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationStatus {
    /// Nothing due yet
    #[default]
    Ok,
    /// Occurrence reached, within grace
    Due,
    /// Occurrence reached but deferred by the user
    Snoozed,
    /// Past grace and not taken
    Missed,
    /// As-needed only, never due on a clock
    Prn,
}

impl fmt::Display for MedicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MedicationStatus::Ok => "ok",
            MedicationStatus::Due => "due",
            MedicationStatus::Snoozed => "snoozed",
            MedicationStatus::Missed => "missed",
            MedicationStatus::Prn => "prn",
        };
        f.pad(label)
    }
}

// ============================================================================
// Medication State and Logs
// ============================================================================

/// Mutable per-medication state owned by the caller.
///
/// `next_due`, `next_dose`, `next_slot_key` and `status` mirror the most
/// recent engine result and are replaced wholesale after each evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationState {
    pub next_due: Option<DateTime<Utc>>,
    pub next_dose: Option<DoseQuantity>,
    pub next_slot_key: Option<String>,
    pub snooze_until: Option<DateTime<Utc>>,
    pub last_taken: Option<DateTime<Utc>>,
    pub status: MedicationStatus,
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Notifications sent for the current occurrence
    pub notification_count: u32,
}

impl MedicationState {
    /// Replace the mirrored engine fields with a fresh evaluation
    pub fn apply_evaluation(&mut self, occurrence: Option<Occurrence>, status: MedicationStatus) {
        match occurrence {
            Some(occ) => {
                self.next_due = Some(occ.scheduled_for);
                self.next_dose = Some(occ.dose);
                self.next_slot_key = Some(occ.slot_key);
            }
            None => {
                self.next_due = None;
                self.next_dose = None;
                self.next_slot_key = None;
            }
        }
        self.status = status;
    }

    /// The mirrored occurrence, if the last evaluation produced one
    pub fn occurrence(&self) -> Option<Occurrence> {
        match (&self.next_due, &self.next_dose, &self.next_slot_key) {
            (Some(scheduled_for), Some(dose), Some(slot_key)) => Some(Occurrence {
                scheduled_for: *scheduled_for,
                dose: dose.clone(),
                slot_key: slot_key.clone(),
            }),
            _ => None,
        }
    }
}

/// Kind of logged action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Taken,
    PrnTaken,
    Snoozed,
    Skipped,
    Missed,
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogAction::Taken => "taken",
            LogAction::PrnTaken => "prn_taken",
            LogAction::Snoozed => "snoozed",
            LogAction::Skipped => "skipped",
            LogAction::Missed => "missed",
        };
        f.pad(label)
    }
}

/// One entry in a profile's intake log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub medication_id: String,
    pub action: LogAction,
    pub taken_at: DateTime<Utc>,
    /// `None` for as-needed intakes
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dose: Option<DoseQuantity>,
    #[serde(default)]
    pub slot_key: Option<String>,
    /// Free-form context such as a skip reason or snooze end
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

// ============================================================================
// Aggregates
// ============================================================================

/// Reference to a medication in an external catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationRef {
    /// e.g. "manual", "rxnorm", "openfda"
    pub provider: String,
    pub external_id: String,
    pub display_name: String,
}

/// A medication with its schedule, policy and current state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub medication_id: String,
    pub display_name: String,
    #[serde(rename = "ref")]
    pub reference: MedicationRef,
    #[serde(default)]
    pub form: DosageForm,
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub policy: ReminderPolicy,
    #[serde(default)]
    pub state: MedicationState,
}

impl Medication {
    /// New medication with a generated id and a manual catalog reference
    pub fn create(
        display_name: impl Into<String>,
        schedule: ScheduleSpec,
        form: DosageForm,
        policy: ReminderPolicy,
    ) -> Self {
        let medication_id = Uuid::new_v4().to_string();
        let display_name = display_name.into();
        Self {
            reference: MedicationRef {
                provider: "manual".into(),
                external_id: medication_id.clone(),
                display_name: display_name.clone(),
            },
            medication_id,
            display_name,
            form,
            schedule,
            policy,
            state: MedicationState::default(),
        }
    }
}

/// A medication profile (aggregate root): one patient, one timezone
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: String,
    pub name: String,
    /// IANA timezone name, e.g. "Europe/Berlin"
    pub timezone: String,
    #[serde(default)]
    pub medications: BTreeMap<String, Medication>,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
    #[serde(default)]
    pub default_policy: ReminderPolicy,
}

impl Profile {
    /// New empty profile; fails if the timezone is unknown
    pub fn create(
        name: impl Into<String>,
        timezone: impl Into<String>,
        default_policy: ReminderPolicy,
    ) -> Result<Self> {
        let timezone = timezone.into();
        parse_timezone(&timezone)?;
        Ok(Self {
            profile_id: Uuid::new_v4().to_string(),
            name: name.into(),
            timezone,
            medications: BTreeMap::new(),
            logs: Vec::new(),
            default_policy,
        })
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn add_medication(&mut self, medication: Medication) {
        self.medications
            .insert(medication.medication_id.clone(), medication);
    }

    pub fn remove_medication(&mut self, medication_id: &str) -> Option<Medication> {
        self.medications.remove(medication_id)
    }

    pub fn medication(&self, medication_id: &str) -> Option<&Medication> {
        self.medications.get(medication_id)
    }

    pub fn medication_mut(&mut self, medication_id: &str) -> Option<&mut Medication> {
        self.medications.get_mut(medication_id)
    }

    /// Find a medication by id, or by case-insensitive display name
    pub fn find_medication(&self, id_or_name: &str) -> Option<&Medication> {
        self.medications.get(id_or_name).or_else(|| {
            self.medications
                .values()
                .find(|m| m.display_name.eq_ignore_ascii_case(id_or_name))
        })
    }

    pub fn add_log(&mut self, record: LogRecord) {
        self.logs.push(record);
    }

    /// Log records for one medication, oldest first; `limit` keeps the most recent N
    pub fn logs_for_medication(&self, medication_id: &str, limit: Option<usize>) -> Vec<&LogRecord> {
        let matching: Vec<&LogRecord> = self
            .logs
            .iter()
            .filter(|r| r.medication_id == medication_id)
            .collect();
        match limit {
            Some(n) if matching.len() > n => matching[matching.len() - n..].to_vec(),
            _ => matching,
        }
    }
}
