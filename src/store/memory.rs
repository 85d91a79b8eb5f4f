use crate::store::{CampusEvent, DataStore, Lot, Report, WeatherSample};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// JSON layout of a store snapshot.
#[derive(Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub lots: Vec<Lot>,
    #[serde(default)]
    pub reports: Vec<Report>,
    #[serde(default)]
    pub events: Vec<CampusEvent>,
    #[serde(default)]
    pub weather: Vec<WeatherSample>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    lots: BTreeMap<String, Lot>,
    reports: HashMap<String, Vec<Report>>,
    events: Vec<CampusEvent>,
    weather: Vec<WeatherSample>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let mut store = Self::new();
        for lot in snapshot.lots {
            if store.lots.contains_key(&lot.id) {
                return Err(SnapshotError::Invalid(format!("duplicate lot id: {}", lot.id)));
            }
            store.insert_lot(lot);
        }
        for report in snapshot.reports {
            if !store.lots.contains_key(&report.lot_id) {
                return Err(SnapshotError::Invalid(format!(
                    "report references unknown lot: {}",
                    report.lot_id
                )));
            }
            store.add_report(report);
        }
        for event in snapshot.events {
            store.add_event(event);
        }
        for sample in snapshot.weather {
            store.add_weather(sample);
        }
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn insert_lot(&mut self, lot: Lot) {
        self.lots.insert(lot.id.clone(), lot);
    }

    pub fn add_report(&mut self, report: Report) {
        let reports = self.reports.entry(report.lot_id.clone()).or_default();
        let index = reports.partition_point(|r| r.reported_at <= report.reported_at);
        reports.insert(index, report);
    }

    pub fn add_event(&mut self, event: CampusEvent) {
        self.events.push(event);
    }

    pub fn add_weather(&mut self, sample: WeatherSample) {
        let index = self
            .weather
            .partition_point(|w| w.observed_at <= sample.observed_at);
        self.weather.insert(index, sample);
    }
}

impl DataStore for InMemoryStore {
    fn lot(&self, lot_id: &str) -> Option<Lot> {
        self.lots.get(lot_id).cloned()
    }

    fn lots(&self) -> Vec<Lot> {
        self.lots.values().cloned().collect()
    }

    fn reports_between(
        &self,
        lot_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Vec<Report> {
        self.reports
            .get(lot_id)
            .map(|reports| {
                reports
                    .iter()
                    .filter(|r| r.reported_at >= from && r.reported_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn latest_report(&self, lot_id: &str, at: OffsetDateTime) -> Option<Report> {
        self.reports
            .get(lot_id)?
            .iter()
            .rev()
            .find(|r| r.reported_at <= at)
            .cloned()
    }

    fn events_overlapping(&self, from: OffsetDateTime, to: OffsetDateTime) -> Vec<CampusEvent> {
        self.events
            .iter()
            .filter(|e| e.starts_at < to && e.ends_at > from)
            .cloned()
            .collect()
    }

    fn weather_near(&self, at: OffsetDateTime, tolerance: Duration) -> Option<WeatherSample> {
        self.weather
            .iter()
            .filter(|w| (w.observed_at - at).abs() <= tolerance)
            .min_by_key(|w| (w.observed_at - at).abs())
            .cloned()
    }
}
