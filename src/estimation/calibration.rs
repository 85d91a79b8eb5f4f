//! Confidence calibration shipped alongside a forest model file.
//!
//! ```json
//! { "calibration": { "method": "temperature", "temperature": 1.5 } }
//! ```

use crate::estimation::forest::ModelFileError;
use serde::{Deserialize, Serialize};

const LOGIT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibration {
    #[default]
    Identity,
    /// `sigmoid(logit(c) / temperature)`; above 1 pulls confidence toward 0.5.
    Temperature { temperature: f64 },
}

impl Calibration {
    pub fn validate(self) -> Result<Self, ModelFileError> {
        match self {
            Calibration::Temperature { temperature }
                if !temperature.is_finite() || temperature <= 0.0 =>
            {
                Err(ModelFileError::Invalid(format!(
                    "calibration temperature must be positive, got {temperature}"
                )))
            }
            _ => Ok(self),
        }
    }

    pub fn apply(self, confidence: f64) -> f64 {
        match self {
            Calibration::Identity => confidence,
            Calibration::Temperature { temperature } => {
                let c = confidence.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
                let logit = (c / (1.0 - c)).ln();
                1.0 / (1.0 + (-logit / temperature).exp())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_leaves_confidence_alone() {
        assert_eq!(Calibration::Identity.apply(0.73), 0.73);
    }

    #[test]
    fn temperature_softens_or_sharpens() {
        let soft = Calibration::Temperature { temperature: 2.0 };
        let sharp = Calibration::Temperature { temperature: 0.5 };

        assert!((soft.apply(0.5) - 0.5).abs() < 1e-9);
        assert!(soft.apply(0.9) < 0.9 && soft.apply(0.9) > 0.5);
        assert!(sharp.apply(0.9) > 0.9);
        assert!(soft.apply(0.2) > 0.2 && soft.apply(0.2) < 0.5);
        // logit(0.9) / 2 = ln(3)
        assert!((soft.apply(0.9) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn non_positive_temperature_is_invalid() {
        for temperature in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                Calibration::Temperature { temperature }.validate(),
                Err(ModelFileError::Invalid(_))
            ));
        }
        assert!(Calibration::Temperature { temperature: 1.5 }.validate().is_ok());
    }

    #[test]
    fn parses_tagged_json() -> Result<(), serde_json::Error> {
        let calibration: Calibration =
            serde_json::from_str(r#"{ "method": "temperature", "temperature": 1.5 }"#)?;

        assert_eq!(calibration, Calibration::Temperature { temperature: 1.5 });
        Ok(())
    }
}
