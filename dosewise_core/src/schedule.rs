//! Schedule specifications.
//!
//! A schedule is one of four recurrence kinds. Each kind carries only the
//! fields that make sense for it; the optional date window and default
//! dose are shared. The record shape is flat and tagged by `kind`:
//!
//! ```json
//! {"kind": "weekly", "weekdays": [0, 2, 4], "times": ["09:00"],
//!  "start_date": "2025-01-01", "default_dose": {"numerator": 1, "denominator": 2, "unit": "tablet"}}
//! ```

use crate::{ClockTime, DoseQuantity, Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

/// Day of week, 0 = Monday .. 6 = Sunday
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub fn new(index: u8) -> Result<Self> {
        if index > 6 {
            return Err(Error::Schedule(format!("invalid weekday {}", index)));
        }
        Ok(Self(index))
    }

    pub fn of(date: NaiveDate) -> Self {
        Self(date.weekday().num_days_from_monday() as u8)
    }

    pub fn index(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DayOfWeek> for u8 {
    fn from(value: DayOfWeek) -> Self {
        value.0
    }
}

/// Recurrence pattern, tagged by `kind` in the record format
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Fixed clock times every day; slot key `"HH:MM"`
    TimesPerDay {
        times: Vec<ClockTime>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        slot_doses: BTreeMap<String, DoseQuantity>,
    },
    /// Fixed clock times on selected weekdays; slot key `"W{weekday}-HH:MM"`
    Weekly {
        weekdays: Vec<DayOfWeek>,
        times: Vec<ClockTime>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        slot_doses: BTreeMap<String, DoseQuantity>,
    },
    /// Every `interval_minutes`, counted from the last dose or the anchor
    Interval {
        interval_minutes: NonZeroU32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<DateTime<Utc>>,
    },
    /// No clock schedule
    AsNeeded,
}

/// Short label for each recurrence kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    TimesPerDay,
    Weekly,
    Interval,
    AsNeeded,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScheduleKind::TimesPerDay => "times_per_day",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::Interval => "interval",
            ScheduleKind::AsNeeded => "as_needed",
        };
        f.write_str(label)
    }
}

/// Complete schedule: recurrence plus optional date window and default dose
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRecord")]
pub struct ScheduleSpec {
    #[serde(flatten)]
    pub recurrence: Recurrence,

    /// First active local date (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    /// Last active local date (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dose: Option<DoseQuantity>,
}

/// Wire shape used when decoding; every decoded schedule passes through `validate`
#[derive(Deserialize)]
struct ScheduleRecord {
    #[serde(flatten)]
    recurrence: Recurrence,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    #[serde(default)]
    default_dose: Option<DoseQuantity>,
}

impl TryFrom<ScheduleRecord> for ScheduleSpec {
    type Error = Error;

    fn try_from(record: ScheduleRecord) -> Result<Self> {
        let spec = Self {
            recurrence: record.recurrence,
            start_date: record.start_date,
            end_date: record.end_date,
            default_dose: record.default_dose,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Slot key for a daily time
pub fn daily_slot_key(time: ClockTime) -> String {
    time.to_string()
}

/// Slot key for a weekly time
pub fn weekly_slot_key(day: DayOfWeek, time: ClockTime) -> String {
    format!("W{}-{}", day.index(), time)
}

impl ScheduleSpec {
    pub fn times_per_day(times: Vec<ClockTime>, default_dose: Option<DoseQuantity>) -> Result<Self> {
        Self::new(
            Recurrence::TimesPerDay {
                times,
                slot_doses: BTreeMap::new(),
            },
            default_dose,
        )
    }

    pub fn weekly(
        weekdays: Vec<DayOfWeek>,
        times: Vec<ClockTime>,
        default_dose: Option<DoseQuantity>,
    ) -> Result<Self> {
        Self::new(
            Recurrence::Weekly {
                weekdays,
                times,
                slot_doses: BTreeMap::new(),
            },
            default_dose,
        )
    }

    pub fn interval(interval_minutes: u32, default_dose: Option<DoseQuantity>) -> Result<Self> {
        let interval_minutes = NonZeroU32::new(interval_minutes).ok_or_else(|| {
            Error::Schedule("interval schedule requires a positive interval".into())
        })?;
        Self::new(
            Recurrence::Interval {
                interval_minutes,
                anchor: None,
            },
            default_dose,
        )
    }

    pub fn as_needed(default_dose: Option<DoseQuantity>) -> Self {
        Self {
            recurrence: Recurrence::AsNeeded,
            start_date: None,
            end_date: None,
            default_dose,
        }
    }

    /// Build and validate a schedule
    pub fn new(recurrence: Recurrence, default_dose: Option<DoseQuantity>) -> Result<Self> {
        let spec = Self {
            recurrence,
            start_date: None,
            end_date: None,
            default_dose,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Restrict the schedule to an inclusive local date window
    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        self.start_date = start;
        self.end_date = end;
        self.validate()?;
        Ok(self)
    }

    /// Set the anchor of an interval schedule; no effect on other kinds
    pub fn with_anchor(mut self, at: DateTime<Utc>) -> Self {
        if let Recurrence::Interval { anchor, .. } = &mut self.recurrence {
            *anchor = Some(at);
        }
        self
    }

    /// Override the dose for one slot of a daily or weekly schedule
    pub fn with_slot_dose(mut self, slot_key: impl Into<String>, dose: DoseQuantity) -> Result<Self> {
        let kind = self.kind();
        let slot_doses = match &mut self.recurrence {
            Recurrence::TimesPerDay { slot_doses, .. } | Recurrence::Weekly { slot_doses, .. } => {
                slot_doses
            }
            _ => {
                return Err(Error::Schedule(format!(
                    "{} schedules have no per-slot doses",
                    kind
                )))
            }
        };
        slot_doses.insert(slot_key.into(), dose);
        Ok(self)
    }

    pub fn kind(&self) -> ScheduleKind {
        match self.recurrence {
            Recurrence::TimesPerDay { .. } => ScheduleKind::TimesPerDay,
            Recurrence::Weekly { .. } => ScheduleKind::Weekly,
            Recurrence::Interval { .. } => ScheduleKind::Interval,
            Recurrence::AsNeeded => ScheduleKind::AsNeeded,
        }
    }

    /// Check the structural invariants of the schedule
    pub fn validate(&self) -> Result<()> {
        match &self.recurrence {
            Recurrence::TimesPerDay { times, .. } if times.is_empty() => {
                return Err(Error::Schedule(
                    "times_per_day schedule requires at least one time".into(),
                ));
            }
            Recurrence::Weekly { weekdays, times, .. } => {
                if weekdays.is_empty() {
                    return Err(Error::Schedule(
                        "weekly schedule requires at least one weekday".into(),
                    ));
                }
                if times.is_empty() {
                    return Err(Error::Schedule(
                        "weekly schedule requires at least one time".into(),
                    ));
                }
            }
            _ => {}
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(Error::Schedule(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Dose for a slot: the per-slot override if any, else the default dose.
    ///
    /// `None` means the slot cannot produce an occurrence.
    pub fn dose_for_slot(&self, slot_key: &str) -> Option<&DoseQuantity> {
        let overrides = match &self.recurrence {
            Recurrence::TimesPerDay { slot_doses, .. } | Recurrence::Weekly { slot_doses, .. } => {
                slot_doses.get(slot_key)
            }
            _ => None,
        };
        overrides.or(self.default_dose.as_ref())
    }

    /// Whether `date` falls inside the optional window
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    /// Human-readable one-line summary
    pub fn describe(&self) -> String {
        let join = |times: &[ClockTime]| {
            times
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.recurrence {
            Recurrence::TimesPerDay { times, .. } => format!("daily at {}", join(times)),
            Recurrence::Weekly { weekdays, times, .. } => {
                const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
                let days = weekdays
                    .iter()
                    .map(|d| NAMES[d.index() as usize])
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{} at {}", days, join(times))
            }
            Recurrence::Interval {
                interval_minutes, ..
            } => format!("every {} min", interval_minutes),
            Recurrence::AsNeeded => "as needed".into(),
        }
    }
}
