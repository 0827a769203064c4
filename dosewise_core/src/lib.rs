#![forbid(unsafe_code)]

//! Core domain model and business logic for the Dosewise medication reminder.
//!
//! This crate provides:
//! - Dose quantities, clock times and schedule specifications
//! - The occurrence engine (next dose and status for a medication)
//! - Reminder policy predicates (grace, snooze, quiet hours, repeats)
//! - The medication service (take, skip, snooze, PRN)
//! - Persistence (profile store with schema migration)

pub mod types;
pub mod error;
pub mod dose;
pub mod localtime;
pub mod schedule;
pub mod policy;
pub mod forms;
pub mod config;
pub mod logging;
pub mod store;
pub mod service;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use dose::DoseQuantity;
pub use localtime::{parse_timezone, ClockTime};
pub use schedule::{DayOfWeek, Recurrence, ScheduleKind, ScheduleSpec};
pub use policy::{
    compute_snooze_until, is_dose_missed, is_in_quiet_hours, is_within_grace_period,
    should_repeat_notification, should_send_notification, ReminderPolicy,
};
pub use forms::{dosage_form_info, DosageForm, DosageFormInfo};
pub use config::Config;
pub use store::{ProfileStore, StoreDocument, SCHEMA_VERSION};
pub use service::{
    AddMedicationCommand, Clock, FixedClock, MedicationService, PrnTakeCommand, SkipCommand,
    SnoozeCommand, SystemClock, TakeCommand, UpdateMedicationCommand,
};
pub use engine::{compute_effective_next_due, compute_next_occurrence};
