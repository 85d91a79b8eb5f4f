//! Rule-tree tabular estimator.
//!
//! Formula: `base + learning_rate * sum(tree outputs)`, clamped to `[0, 100]`.
//! Trees are plain data and can be replaced by a JSON model file:
//!
//! ```json
//! {
//!   "model_version": "forest-2025-09",
//!   "base": 50.0,
//!   "learning_rate": 0.1,
//!   "trees": [
//!     { "name": "weekend", "root": {
//!         "type": "split", "feature": "is_weekend", "threshold": 0.5,
//!         "left": { "type": "leaf", "value": 0.0 },
//!         "right": { "type": "leaf", "value": -60.0 } } }
//!   ],
//!   "calibration": { "method": "temperature", "temperature": 1.5 }
//! }
//! ```
//!
//! `calibration` is optional and defaults to identity.

use crate::estimation::calibration::Calibration;
use crate::estimation::model::{Factor, ModelInput, OccupancyModel};
use crate::features::{Feature, FeatureVector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_BASE: f64 = 50.0;
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_FOREST_VERSION: &str = "default-forest-1";

/// Tree node: `feature <= threshold` goes left, otherwise right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: Feature,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn evaluate(&self, features: &FeatureVector) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features.get(*feature) <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

fn leaf(value: f64) -> TreeNode {
    TreeNode::Leaf { value }
}

fn split(feature: Feature, threshold: f64, left: TreeNode, right: TreeNode) -> TreeNode {
    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub name: String,
    pub root: TreeNode,
}

fn default_base() -> f64 {
    DEFAULT_BASE
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestFile {
    pub model_version: String,
    #[serde(default = "default_base")]
    pub base: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub calibration: Calibration,
}

#[derive(Debug, Error)]
pub enum ModelFileError {
    #[error("failed to read model file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model file: {0}")]
    Invalid(String),
}

const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ForestModel {
    version: String,
    base: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
    calibration: Calibration,
}

impl ForestModel {
    pub fn from_file(file: ForestFile) -> Result<Self, ModelFileError> {
        if file.trees.is_empty() {
            return Err(ModelFileError::Invalid("forest has no trees".to_string()));
        }
        if !(0.0..=100.0).contains(&file.base) {
            return Err(ModelFileError::Invalid(format!(
                "base {} outside 0-100",
                file.base
            )));
        }
        if !file.learning_rate.is_finite() || file.learning_rate <= 0.0 {
            return Err(ModelFileError::Invalid(format!(
                "learning_rate must be positive, got {}",
                file.learning_rate
            )));
        }
        if let Some(tree) = file.trees.iter().find(|t| t.root.depth() > MAX_TREE_DEPTH) {
            return Err(ModelFileError::Invalid(format!(
                "tree {} deeper than {MAX_TREE_DEPTH}",
                tree.name
            )));
        }

        Ok(Self {
            version: file.model_version,
            base: file.base,
            learning_rate: file.learning_rate,
            trees: file.trees,
            calibration: file.calibration.validate()?,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Built-in forest used when no model file is configured or it fails to load.
    pub fn default_forest() -> Self {
        use Feature::*;

        let trees = vec![
            Tree {
                name: "historical_level".to_string(),
                root: split(
                    HistoricalAvgSameTime,
                    55.0,
                    split(
                        HistoricalAvgSameTime,
                        35.0,
                        split(HistoricalAvgSameTime, 15.0, leaf(-420.0), leaf(-250.0)),
                        leaf(-50.0),
                    ),
                    split(
                        HistoricalAvgSameTime,
                        75.0,
                        leaf(150.0),
                        split(HistoricalAvgSameTime, 90.0, leaf(320.0), leaf(450.0)),
                    ),
                ),
            },
            Tree {
                name: "peak_hour".to_string(),
                root: split(
                    IsPeakHour,
                    0.5,
                    leaf(0.0),
                    split(IsWeekend, 0.5, leaf(40.0), leaf(0.0)),
                ),
            },
            Tree {
                name: "weekend".to_string(),
                root: split(IsWeekend, 0.5, leaf(0.0), leaf(-60.0)),
            },
            Tree {
                name: "event".to_string(),
                root: split(
                    EventImpactScore,
                    20.0,
                    leaf(0.0),
                    split(EventImpactScore, 60.0, leaf(80.0), leaf(180.0)),
                ),
            },
            Tree {
                name: "weather".to_string(),
                root: split(
                    WeatherImpactScore,
                    30.0,
                    leaf(0.0),
                    split(WeatherImpactScore, 60.0, leaf(40.0), leaf(80.0)),
                ),
            },
            Tree {
                name: "finals_week".to_string(),
                root: split(IsFinalsWeek, 0.5, leaf(0.0), leaf(50.0)),
            },
            Tree {
                name: "first_week".to_string(),
                root: split(IsFirstWeek, 0.5, leaf(0.0), leaf(70.0)),
            },
            Tree {
                name: "live_reports".to_string(),
                root: split(
                    ReportConfidence,
                    0.3,
                    leaf(0.0),
                    split(
                        CurrentOccupancy,
                        60.0,
                        split(CurrentOccupancy, 30.0, leaf(-120.0), leaf(-40.0)),
                        split(CurrentOccupancy, 85.0, leaf(40.0), leaf(120.0)),
                    ),
                ),
            },
        ];

        Self {
            version: DEFAULT_FOREST_VERSION.to_string(),
            base: DEFAULT_BASE,
            learning_rate: DEFAULT_LEARNING_RATE,
            trees,
            calibration: Calibration::Identity,
        }
    }

    pub fn predict_features(&self, features: &FeatureVector) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.root.evaluate(features)).sum();
        (self.base + self.learning_rate * sum).clamp(0.0, 100.0)
    }
}

impl Default for ForestModel {
    fn default() -> Self {
        Self::default_forest()
    }
}

impl OccupancyModel for ForestModel {
    fn name(&self) -> &str {
        &self.version
    }

    fn predict(&self, input: &ModelInput<'_>) -> f64 {
        self.predict_features(input.features)
    }

    /// Per-tree contributions, skipping the level tree and zero outputs.
    fn factors(&self, input: &ModelInput<'_>) -> Vec<Factor> {
        self.trees
            .iter()
            .filter(|t| t.name != "historical_level")
            .map(|t| Factor::new(t.name.clone(), self.learning_rate * t.root.evaluate(input.features)))
            .filter(|f| f.impact != 0.0)
            .collect()
    }
}

pub fn load_forest_from_path(path: impl AsRef<Path>) -> Result<ForestModel, ModelFileError> {
    let contents = std::fs::read_to_string(path)?;
    let file: ForestFile = serde_json::from_str(&contents)?;
    ForestModel::from_file(file)
}
