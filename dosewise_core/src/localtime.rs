//! Wall-clock times and DST-safe local → absolute conversion.
//!
//! All calendar arithmetic in the engine happens on the patient's local
//! date. Turning a local date plus an `"HH:MM"` into an instant follows
//! one fixed rule:
//! - ambiguous wall time (fall-back overlap) ⇒ the earlier instant
//! - nonexistent wall time (spring-forward gap) ⇒ shifted forward by the
//!   gap, i.e. read in the offset that was in force before the transition

use crate::{Error, Result};
use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A time of day with minute precision, written `"HH:MM"`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime { hour: 0, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidClockTime(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes since local midnight
    pub fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    pub fn to_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidClockTime(s.to_string());
        if s.len() != 5 {
            return Err(invalid());
        }
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.len() != 2 || m.len() != 2 || !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Look up an IANA timezone such as `"Europe/Berlin"`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::UnknownTimezone(name.to_string()))
}

/// Local calendar date of an instant
pub fn local_date(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Local time of day of an instant, in minutes since midnight
pub fn local_minutes_of_day(tz: &Tz, instant: DateTime<Utc>) -> u32 {
    let local = instant.with_timezone(tz);
    local.hour() * 60 + local.minute()
}

/// Combine a local date and wall-clock time into an absolute instant.
pub fn resolve_local(tz: &Tz, date: NaiveDate, time: ClockTime) -> DateTime<Utc> {
    let naive = date.and_time(time.to_naive());
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _later) => earlier.with_timezone(&Utc),
        LocalResult::None => resolve_in_gap(tz, naive),
    }
}

/// Midnight at the start of a local date
pub fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    resolve_local(tz, date, ClockTime::MIDNIGHT)
}

// Zones never transition twice within a day, so the offset a day earlier
// is the one in force just before the gap.
fn resolve_in_gap(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let before = tz
        .offset_from_utc_datetime(&(naive - Duration::days(1)))
        .fix();
    let utc = naive - Duration::seconds(before.local_minus_utc() as i64);
    tracing::debug!(
        "Local time {} does not exist in {}; resolved with pre-transition offset {}",
        naive,
        tz.name(),
        before
    );
    Utc.from_utc_datetime(&utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Berlin;

    #[test]
    fn test_parse_clock_time() {
        let t: ClockTime = "08:30".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (8, 30));
        assert_eq!(t.to_string(), "08:30");
        assert_eq!(t.minutes_of_day(), 510);
    }

    #[test]
    fn test_reject_malformed_clock_times() {
        for bad in ["8:30", "24:00", "12:60", "ab:cd", "12-30", "", "12:300", "+8:30"] {
            assert!(bad.parse::<ClockTime>().is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn test_clock_times_sort_chronologically() {
        let mut times: Vec<ClockTime> = ["20:00", "08:00", "12:30"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        times.sort();
        let rendered: Vec<String> = times.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, vec!["08:00", "12:30", "20:00"]);
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(Error::UnknownTimezone(_))
        ));
        assert_eq!(parse_timezone("Europe/Berlin").unwrap(), Berlin);
    }

    #[test]
    fn test_regular_local_time() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let instant = resolve_local(&Berlin, date, "08:00".parse().unwrap());
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 1, 15, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_spring_forward_gap_shifts_forward() {
        // 02:30 does not exist in Berlin on 2025-03-30 (02:00 CET -> 03:00 CEST)
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let instant = resolve_local(&Berlin, date, "02:30".parse().unwrap());
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 3, 30, 1, 30, 0).unwrap());
        let local = instant.with_timezone(&Berlin);
        assert_eq!((local.hour(), local.minute()), (3, 30));
    }

    #[test]
    fn test_fall_back_ambiguity_takes_earlier() {
        // 02:30 happens twice in Berlin on 2025-10-26; first at CEST (+02:00)
        let date = NaiveDate::from_ymd_opt(2025, 10, 26).unwrap();
        let instant = resolve_local(&Berlin, date, "02:30".parse().unwrap());
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap());
    }

    #[test]
    fn test_local_date_uses_zone_not_utc() {
        // 23:30 UTC on Jan 14 is already Jan 15 in Berlin
        let instant = Utc.with_ymd_and_hms(2025, 1, 14, 23, 30, 0).unwrap();
        assert_eq!(
            local_date(&Berlin, instant),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
        assert_eq!(local_minutes_of_day(&Berlin, instant), 30);
    }
}
