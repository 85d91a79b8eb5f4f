use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    /// Less than 10 minutes to spare.
    Critical,
    Moderate,
    /// 30 minutes or more.
    Relaxed,
}

impl UrgencyTier {
    pub fn from_minutes(urgency_minutes: f64) -> Self {
        if urgency_minutes < 10.0 {
            UrgencyTier::Critical
        } else if urgency_minutes < 30.0 {
            UrgencyTier::Moderate
        } else {
            UrgencyTier::Relaxed
        }
    }

    pub fn weights(self) -> ScoringWeights {
        match self {
            UrgencyTier::Critical => ScoringWeights {
                availability: 0.55,
                proximity: 0.25,
                walk_time: 0.10,
                convenience: 0.10,
            },
            UrgencyTier::Moderate => ScoringWeights {
                availability: 0.40,
                proximity: 0.25,
                walk_time: 0.20,
                convenience: 0.15,
            },
            UrgencyTier::Relaxed => ScoringWeights {
                availability: 0.25,
                proximity: 0.30,
                walk_time: 0.30,
                convenience: 0.15,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringWeights {
    pub availability: f64,
    pub proximity: f64,
    pub walk_time: f64,
    pub convenience: f64,
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.availability + self.proximity + self.walk_time + self.convenience
    }
}
