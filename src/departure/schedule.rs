//! Weekly class schedule supplied by the caller.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{OffsetDateTime, Time, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Monday => DayOfWeek::Monday,
            Weekday::Tuesday => DayOfWeek::Tuesday,
            Weekday::Wednesday => DayOfWeek::Wednesday,
            Weekday::Thursday => DayOfWeek::Thursday,
            Weekday::Friday => DayOfWeek::Friday,
            Weekday::Saturday => DayOfWeek::Saturday,
            Weekday::Sunday => DayOfWeek::Sunday,
        }
    }
}

/// Wall-clock time of day, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime { hour: 0, minute: 0 };

    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    pub fn of(at: OffsetDateTime) -> Self {
        Self {
            hour: at.hour(),
            minute: at.minute(),
        }
    }

    /// This time of day on the same date (and offset) as `day`.
    pub fn on(self, day: OffsetDateTime) -> OffsetDateTime {
        day.replace_time(Time::MIDNIGHT)
            + time::Duration::minutes(i64::from(self.minutes_since_midnight()))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (hour, minute) = value
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {value:?}"))?;
        let hour: u8 = hour
            .parse()
            .map_err(|_| format!("invalid hour in {value:?}"))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| format!("invalid minute in {value:?}"))?;
        ClockTime::new(hour, minute).ok_or_else(|| format!("time out of range: {value:?}"))
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub course: String,
    pub building: String,
    pub days: Vec<DayOfWeek>,
    pub start: ClockTime,
    #[serde(default)]
    pub end: Option<ClockTime>,
}

fn default_commute_minutes() -> f64 {
    15.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub classes: Vec<ClassSession>,
    #[serde(default = "default_commute_minutes")]
    pub commute_minutes: f64,
    #[serde(default)]
    pub preferred_lots: Vec<String>,
    /// Where the commute starts; used for the proximity score.
    #[serde(default)]
    pub origin: Option<GeoPoint>,
}

impl Schedule {
    /// Earliest class today that starts strictly after `now`.
    pub fn next_class(&self, now: OffsetDateTime) -> Option<(&ClassSession, OffsetDateTime)> {
        let today = DayOfWeek::from(now.weekday());
        self.classes
            .iter()
            .filter(|class| class.days.contains(&today))
            .map(|class| (class, class.start.on(now)))
            .filter(|(_, starts_at)| *starts_at > now)
            .min_by_key(|(_, starts_at)| *starts_at)
    }

    pub fn is_preferred(&self, lot_id: &str) -> bool {
        self.preferred_lots.iter().any(|id| id == lot_id)
    }
}
