//! Occupancy ensemble: rule-tree tabular estimator + seasonal temporal estimator.

use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::Duration;
use tracing::{info, warn};

pub mod calibration;
pub mod forest;
pub mod model;
pub mod realtime;
pub mod remote;
pub mod temporal;

use calibration::Calibration;
use forest::{ForestModel, load_forest_from_path};
use model::{Factor, ModelInput, OccupancyModel};
use temporal::TemporalModel;

pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.95;
const TREND_BAND: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentPredictions {
    pub tabular: f64,
    pub temporal: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Steady,
    Falling,
}

impl Trend {
    pub fn from_delta(delta: f64) -> Self {
        if delta > TREND_BAND {
            Trend::Rising
        } else if delta < -TREND_BAND {
            Trend::Falling
        } else {
            Trend::Steady
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleWeights {
    pub tabular: f64,
    pub temporal: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            tabular: 0.6,
            temporal: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleEstimate {
    pub occupancy: f64,
    pub confidence: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub components: ComponentPredictions,
    pub factors: Vec<Factor>,
    pub trend: Trend,
    pub model_version: String,
}

#[derive(Debug)]
pub struct EnsemblePredictor {
    tabular: Box<dyn OccupancyModel>,
    temporal: Box<dyn OccupancyModel>,
    weights: EnsembleWeights,
    calibration: Calibration,
    version: String,
}

impl EnsemblePredictor {
    pub fn new(
        tabular: Box<dyn OccupancyModel>,
        temporal: Box<dyn OccupancyModel>,
        weights: EnsembleWeights,
    ) -> Self {
        let version = format!("ensemble/{}+{}", tabular.name(), temporal.name());
        Self {
            tabular,
            temporal,
            weights,
            calibration: Calibration::Identity,
            version,
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Calibrated confidence, kept within `[0.3, 0.95]`.
    pub fn calibrate(&self, confidence: f64) -> f64 {
        self.calibration
            .apply(confidence)
            .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }

    pub fn model_version(&self) -> &str {
        &self.version
    }

    pub fn estimate(&self, input: &ModelInput<'_>) -> EnsembleEstimate {
        let tabular = self.tabular.predict(input).clamp(0.0, 100.0);
        let temporal = self.temporal.predict(input).clamp(0.0, 100.0);
        let occupancy =
            (self.weights.tabular * tabular + self.weights.temporal * temporal).clamp(0.0, 100.0);

        let next_hour = ModelInput {
            target: input.target.saturating_add(Duration::hours(1)),
            ..*input
        };
        let trend = Trend::from_delta(self.temporal.predict(&next_hour) - temporal);

        let confidence = confidence(input.features);
        let (lower_bound, upper_bound) =
            uncertainty_bounds(occupancy, confidence, input.features.historical.volatility);

        EnsembleEstimate {
            occupancy,
            confidence,
            lower_bound,
            upper_bound,
            components: ComponentPredictions { tabular, temporal },
            factors: self.tabular.factors(input),
            trend,
            model_version: self.version.clone(),
        }
    }
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new(
            Box::new(ForestModel::default_forest()),
            Box::new(TemporalModel::default()),
            EnsembleWeights::default(),
        )
    }
}

/// Confidence from data quality, in `[0.3, 0.95]`.
pub fn confidence(features: &FeatureVector) -> f64 {
    let mut confidence: f64 = 0.5;
    if features.realtime.report_confidence > 0.5 {
        confidence += 0.2;
    }
    if features.realtime.recent_report_count > 3 {
        confidence += 0.1;
    }
    if features.historical.volatility < 15.0 {
        confidence += 0.1;
    }
    if !features.historical.is_default {
        confidence += 0.1;
    }
    if features.events.has_special_event {
        confidence -= 0.1;
    }
    if features.calendar.is_first_week {
        confidence -= 0.1;
    }
    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

pub fn uncertainty_bounds(occupancy: f64, confidence: f64, volatility: f64) -> (f64, f64) {
    let width = (1.0 - confidence) * 30.0 + volatility.max(0.0) * 0.5;
    (
        (occupancy - width).clamp(0.0, 100.0),
        (occupancy + width).clamp(0.0, 100.0),
    )
}

/// Builds the local ensemble, falling back to the built-in forest when the
/// model file is missing or invalid.
pub fn create_predictor(
    forest_path: Option<&Path>,
    weights: EnsembleWeights,
    jitter_seed: Option<u64>,
) -> EnsemblePredictor {
    let forest = match forest_path {
        Some(path) => match load_forest_from_path(path) {
            Ok(forest) => {
                info!(path = %path.display(), version = forest.version(), "Loaded forest model");
                forest
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Falling back to default forest");
                ForestModel::default_forest()
            }
        },
        None => ForestModel::default_forest(),
    };

    let calibration = forest.calibration();
    EnsemblePredictor::new(
        Box::new(forest),
        Box::new(TemporalModel::new(jitter_seed)),
        weights,
    )
    .with_calibration(calibration)
}
