use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Open,
    Busy,
    Filling,
    Full,
}

impl LotStatus {
    pub fn from_occupancy(occupancy: f64) -> Self {
        if occupancy >= 95.0 {
            LotStatus::Full
        } else if occupancy >= 80.0 {
            LotStatus::Filling
        } else if occupancy >= 60.0 {
            LotStatus::Busy
        } else {
            LotStatus::Open
        }
    }
}

/// Probability (percent) of finding a free spot at the given occupancy.
pub fn chance_of_spot(occupancy: f64) -> u8 {
    match occupancy {
        o if o >= 98.0 => 5,
        o if o >= 95.0 => 15,
        o if o >= 90.0 => 30,
        o if o >= 85.0 => 50,
        o if o >= 75.0 => 70,
        o if o >= 60.0 => 85,
        _ => 95,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    VeryStale,
}

impl Freshness {
    pub fn of_report(last_report_at: Option<OffsetDateTime>, now: OffsetDateTime) -> Self {
        let Some(at) = last_report_at else {
            return Freshness::VeryStale;
        };
        let minutes = (now - at).whole_minutes();
        if minutes < 15 {
            Freshness::Fresh
        } else if minutes < 60 {
            Freshness::Stale
        } else {
            Freshness::VeryStale
        }
    }
}
