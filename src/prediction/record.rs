use crate::estimation::model::Factor;
use crate::estimation::{ComponentPredictions, Trend};
use crate::prediction::labels::{Freshness, LotStatus, chance_of_spot};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Server,
    Local,
}

/// Immutable occupancy prediction for one lot at one target time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub lot_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub target_time: OffsetDateTime,
    pub predicted_occupancy: f64,
    pub confidence: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub components: ComponentPredictions,
    pub model_version: String,
    pub source: SourceKind,
    pub factors: Vec<Factor>,
    pub trend: Trend,
    pub status: LotStatus,
    pub chance_of_spot: u8,
    pub freshness: Freshness,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_report_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Raw numbers from either inference stage, before labels are derived.
#[derive(Debug, Clone)]
pub struct PredictionDraft {
    pub lot_id: String,
    pub target_time: OffsetDateTime,
    pub occupancy: f64,
    pub confidence: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub components: ComponentPredictions,
    pub model_version: String,
    pub source: SourceKind,
    pub factors: Vec<Factor>,
    pub trend: Trend,
    pub last_report_at: Option<OffsetDateTime>,
}

impl PredictionDraft {
    /// Clamps the numbers into range and derives status, chance and freshness.
    pub fn finish(self, now: OffsetDateTime) -> Prediction {
        let occupancy = self.occupancy.clamp(0.0, 100.0);
        let lower = self.lower_bound.clamp(0.0, 100.0).min(occupancy);
        let upper = self.upper_bound.clamp(0.0, 100.0).max(occupancy);

        Prediction {
            lot_id: self.lot_id,
            target_time: self.target_time,
            predicted_occupancy: occupancy,
            confidence: self.confidence.clamp(0.0, 1.0),
            lower_bound: lower,
            upper_bound: upper,
            components: self.components,
            model_version: self.model_version,
            source: self.source,
            factors: self.factors,
            trend: self.trend,
            status: LotStatus::from_occupancy(occupancy),
            chance_of_spot: chance_of_spot(occupancy),
            freshness: Freshness::of_report(self.last_report_at, now),
            last_report_at: self.last_report_at,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn finish_orders_bounds_and_derives_labels() {
        let now = datetime!(2025-09-15 09:00 UTC);
        let draft = PredictionDraft {
            lot_id: "lot-a".to_string(),
            target_time: now,
            occupancy: 104.0,
            confidence: 0.7,
            lower_bound: 101.0,
            upper_bound: 90.0,
            components: ComponentPredictions::default(),
            model_version: "srv-1".to_string(),
            source: SourceKind::Server,
            factors: Vec::new(),
            trend: Trend::Steady,
            last_report_at: None,
        };

        let prediction = draft.finish(now);

        assert_eq!(prediction.predicted_occupancy, 100.0);
        assert!(prediction.lower_bound <= prediction.predicted_occupancy);
        assert_eq!(prediction.upper_bound, 100.0);
        assert_eq!(prediction.status, LotStatus::Full);
        assert_eq!(prediction.chance_of_spot, 5);
        assert_eq!(prediction.freshness, Freshness::VeryStale);
    }
}
