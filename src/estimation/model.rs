//! Component model trait for the occupancy ensemble.
//!
//! Each component turns the extracted features (and the lot's recent hourly
//! series) into an occupancy percentage. Components are selected by the
//! ensemble at startup; the tabular forest may come from a model file.

use crate::features::{FeatureVector, SeriesPoint};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Everything a component model may look at for one prediction.
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    pub features: &'a FeatureVector,
    /// Hourly occupancy, oldest first. May be empty.
    pub series: &'a [SeriesPoint],
    pub target: OffsetDateTime,
    pub now: OffsetDateTime,
}

/// Named, signed influence on a prediction, in occupancy points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub impact: f64,
}

impl Factor {
    pub fn new(name: impl Into<String>, impact: f64) -> Self {
        Self {
            name: name.into(),
            impact,
        }
    }
}

pub trait OccupancyModel: Send + Sync + std::fmt::Debug {
    /// Short identifier used in model versions and logs.
    fn name(&self) -> &str;

    /// Predicted occupancy in `[0, 100]`.
    fn predict(&self, input: &ModelInput<'_>) -> f64;

    /// Named contributions behind the last prediction for `input`.
    fn factors(&self, _input: &ModelInput<'_>) -> Vec<Factor> {
        Vec::new()
    }
}
