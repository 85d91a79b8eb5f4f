//! Read interfaces onto the campus data store.
//!
//! The engine never writes to the store; lots, reports, events and weather are
//! owned by an external collaborator. [`memory::InMemoryStore`] is the bundled
//! implementation, loaded from a JSON snapshot.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

pub mod memory;

pub type LotId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotKind {
    Commuter,
    Resident,
    Faculty,
    Visitor,
    Garage,
    Satellite,
}

impl LotKind {
    /// Numeric code used in the feature vector.
    pub fn code(self) -> f64 {
        match self {
            LotKind::Commuter => 0.0,
            LotKind::Resident => 1.0,
            LotKind::Faculty => 2.0,
            LotKind::Visitor => 3.0,
            LotKind::Garage => 4.0,
            LotKind::Satellite => 5.0,
        }
    }
}

fn default_popularity() -> f64 {
    50.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub name: String,
    pub capacity: u32,
    pub location: GeoPoint,
    pub kind: LotKind,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub icing_zone: bool,
    /// Permit names accepted by the lot; `"any"` admits every permit.
    #[serde(default)]
    pub permits: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    /// Historical popularity, 0-100.
    #[serde(default = "default_popularity")]
    pub popularity: f64,
    /// Walking minutes from the lot to each building.
    #[serde(default)]
    pub walk_minutes: BTreeMap<String, f64>,
}

impl Lot {
    pub fn accepts_permit(&self, permit: &str) -> bool {
        self.permits
            .iter()
            .any(|p| p.eq_ignore_ascii_case(permit) || p.eq_ignore_ascii_case("any"))
    }

    pub fn walk_minutes_to(&self, building: &str) -> Option<f64> {
        self.walk_minutes.get(building).copied()
    }
}

fn default_accuracy() -> f64 {
    1.0
}

/// Crowdsourced occupancy report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub lot_id: LotId,
    pub occupancy_percent: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub reported_at: OffsetDateTime,
    /// Reporter accuracy score, 0-1.
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Football,
    Basketball,
    Concert,
    Graduation,
    Conference,
    Other,
}

impl EventKind {
    pub fn is_special(self) -> bool {
        matches!(
            self,
            EventKind::Football | EventKind::Basketball | EventKind::Concert | EventKind::Graduation
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampusEvent {
    pub id: String,
    pub name: String,
    pub kind: EventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    /// Empty means the event affects every lot.
    #[serde(default)]
    pub affected_lots: Vec<LotId>,
    /// Expected impact on occupancy, 0-100.
    pub impact: f64,
    #[serde(default)]
    pub attendance: Option<u32>,
}

impl CampusEvent {
    pub fn affects(&self, lot_id: &str) -> bool {
        self.affected_lots.is_empty() || self.affected_lots.iter().any(|id| id == lot_id)
    }

    pub fn is_active_at(&self, at: OffsetDateTime) -> bool {
        self.starts_at <= at && at < self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    pub temperature_f: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_probability: f64,
    pub wind_speed_mph: f64,
}

/// Read-only view of the campus data store.
pub trait DataStore: Send + Sync + std::fmt::Debug {
    fn lot(&self, lot_id: &str) -> Option<Lot>;

    fn lots(&self) -> Vec<Lot>;

    /// Reports for a lot with `from <= reported_at <= to`, oldest first.
    fn reports_between(&self, lot_id: &str, from: OffsetDateTime, to: OffsetDateTime)
    -> Vec<Report>;

    /// Most recent report at or before `at`.
    fn latest_report(&self, lot_id: &str, at: OffsetDateTime) -> Option<Report>;

    /// Events overlapping `[from, to)`.
    fn events_overlapping(&self, from: OffsetDateTime, to: OffsetDateTime) -> Vec<CampusEvent>;

    /// Weather sample closest to `at`, if one lies within `tolerance`.
    fn weather_near(&self, at: OffsetDateTime, tolerance: Duration) -> Option<WeatherSample>;
}
