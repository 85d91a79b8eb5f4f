//! Multi-factor spot ranking.
//!
//! Each candidate gets four 0-100 component scores (availability, proximity,
//! walk time, convenience) that are blended with urgency-dependent weights.

use crate::geo::GeoPoint;
use crate::prediction::Prediction;
use crate::store::{Lot, LotKind};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub mod tiebreak;
pub mod weights;

use crate::estimation::Trend;
pub use weights::{ScoringWeights, UrgencyTier};

/// Proximity decay per metre; the score halves roughly every 866 m.
pub const PROXIMITY_DECAY_PER_M: f64 = 0.0008;
pub const DRIVE_METRES_PER_MINUTE: f64 = 400.0;
pub const PARKING_OVERHEAD_MINUTES: f64 = 1.0;
pub const MAX_WALK_MINUTES: f64 = 20.0;
pub const UNKNOWN_WALK_SCORE: f64 = 50.0;
pub const AT_LOT_METRES: f64 = 50.0;
pub const ICING_PENALTY: f64 = 20.0;
pub const TIME_LIMIT_PENALTY: f64 = 15.0;
pub const AT_LOT_PENALTY: f64 = 30.0;
pub const PERMIT_PENALTY: f64 = 50.0;
pub const FULL_THRESHOLD: f64 = 90.0;
const SHORT_WALK_MINUTES: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub lot: Lot,
    pub prediction: Arc<Prediction>,
}

#[derive(Debug, Clone, Copy)]
pub struct RankQuery<'a> {
    pub user_location: GeoPoint,
    /// Building the user is heading to; drives the walk score.
    pub destination: Option<&'a str>,
    pub urgency_minutes: f64,
    /// 0 keeps every candidate.
    pub max_results: usize,
    pub permit: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub availability: f64,
    pub proximity: f64,
    pub walk: f64,
    pub convenience: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankReason {
    BestAvailability,
    Closest,
    ShortWalk,
    BestOverall,
    Alternative,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub rank: usize,
    pub lot_id: String,
    pub lot_name: String,
    pub kind: LotKind,
    pub distance_m: f64,
    pub drive_minutes: f64,
    pub walk_minutes: Option<f64>,
    pub prediction: Arc<Prediction>,
    pub scores: ComponentScores,
    pub penalty_total: f64,
    pub final_score: f64,
    pub recommended: bool,
    pub reason: RankReason,
    pub has_amenity: bool,
    pub has_time_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    FallingLot,
    Satellite,
    Wait,
}

/// Guidance returned when every ranked lot is nearly full.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullLotAdvice {
    pub kind: AdviceKind,
    pub lot_id: Option<String>,
    pub message: String,
}

pub fn proximity_score(distance_m: f64) -> f64 {
    ((-PROXIMITY_DECAY_PER_M * distance_m.max(0.0)).exp() * 0.95 + 0.05) * 100.0
}

pub fn walk_score(walk_minutes: Option<f64>) -> f64 {
    match walk_minutes {
        Some(minutes) => 100.0 * (1.0 - minutes.max(0.0) / MAX_WALK_MINUTES).max(0.0),
        None => UNKNOWN_WALK_SCORE,
    }
}

pub fn drive_minutes(distance_m: f64) -> f64 {
    distance_m.max(0.0) / DRIVE_METRES_PER_MINUTE + PARKING_OVERHEAD_MINUTES
}

/// Returns (convenience score, total penalty).
pub fn convenience_score(lot: &Lot, distance_m: f64, permit: Option<&str>) -> (f64, f64) {
    let mut penalty = 0.0;
    if lot.icing_zone {
        penalty += ICING_PENALTY;
    }
    if lot.time_limit_minutes.is_some() {
        penalty += TIME_LIMIT_PENALTY;
    }
    if distance_m < AT_LOT_METRES {
        penalty += AT_LOT_PENALTY;
    }
    if permit.is_some_and(|p| !lot.accepts_permit(p)) {
        penalty += PERMIT_PENALTY;
    }
    ((100.0 - penalty).max(0.0), penalty)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RankingEngine;

impl RankingEngine {
    pub fn new() -> Self {
        Self
    }

    fn score(&self, candidate: Candidate, query: &RankQuery<'_>, weights: ScoringWeights) -> RankedResult {
        let Candidate { lot, prediction } = candidate;
        let distance_m = query.user_location.distance_m(&lot.location);
        let walk_minutes = query.destination.and_then(|b| lot.walk_minutes_to(b));
        let (convenience, penalty_total) = convenience_score(&lot, distance_m, query.permit);

        let scores = ComponentScores {
            availability: f64::from(prediction.chance_of_spot),
            proximity: proximity_score(distance_m),
            walk: walk_score(walk_minutes),
            convenience,
        };
        let final_score = (scores.availability * weights.availability
            + scores.proximity * weights.proximity
            + scores.walk * weights.walk_time
            + scores.convenience * weights.convenience)
            .round();

        RankedResult {
            rank: 0,
            lot_id: lot.id,
            lot_name: lot.name,
            kind: lot.kind,
            distance_m,
            drive_minutes: drive_minutes(distance_m),
            walk_minutes,
            prediction,
            scores,
            penalty_total,
            final_score,
            recommended: false,
            reason: RankReason::Alternative,
            has_amenity: !lot.amenities.is_empty(),
            has_time_limit: lot.time_limit_minutes.is_some(),
        }
    }

    pub fn rank(&self, candidates: Vec<Candidate>, query: &RankQuery<'_>) -> Vec<RankedResult> {
        let tier = UrgencyTier::from_minutes(query.urgency_minutes);
        let weights = tier.weights();

        let mut seen = HashSet::new();
        let scored: Vec<RankedResult> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.lot.id.clone()))
            .map(|c| self.score(c, query, weights))
            .collect();

        let mut ordered = tiebreak::order(scored);
        if query.max_results > 0 {
            ordered.truncate(query.max_results);
        }
        assign_ranks_and_reasons(&mut ordered);

        debug!(
            tier = ?tier,
            results = ordered.len(),
            top = ordered.first().map(|r| r.lot_id.as_str()).unwrap_or("-"),
            "Ranked candidates"
        );
        ordered
    }

    /// Advice when every ranked lot is at or above 90% predicted occupancy.
    /// `satellites` are fallback lots outside the ranked set.
    pub fn advise_when_full(&self, ranked: &[RankedResult], satellites: &[Lot]) -> Option<FullLotAdvice> {
        if ranked.is_empty()
            || ranked
                .iter()
                .any(|r| r.prediction.predicted_occupancy < FULL_THRESHOLD)
        {
            return None;
        }

        if let Some(falling) = ranked.iter().find(|r| r.prediction.trend == Trend::Falling) {
            return Some(FullLotAdvice {
                kind: AdviceKind::FallingLot,
                lot_id: Some(falling.lot_id.clone()),
                message: format!(
                    "All nearby lots are nearly full, but {} is starting to clear out.",
                    falling.lot_name
                ),
            });
        }

        let satellite = ranked
            .iter()
            .find(|r| r.kind == LotKind::Satellite)
            .map(|r| (r.lot_id.clone(), r.lot_name.clone()))
            .or_else(|| {
                satellites
                    .iter()
                    .filter(|lot| lot.kind == LotKind::Satellite)
                    .filter(|lot| !ranked.iter().any(|r| r.lot_id == lot.id))
                    .min_by(|a, b| a.id.cmp(&b.id))
                    .map(|lot| (lot.id.clone(), lot.name.clone()))
            });
        if let Some((lot_id, name)) = satellite {
            return Some(FullLotAdvice {
                kind: AdviceKind::Satellite,
                lot_id: Some(lot_id),
                message: format!("All nearby lots are nearly full. Try the satellite lot {name} and take the shuttle."),
            });
        }

        Some(FullLotAdvice {
            kind: AdviceKind::Wait,
            lot_id: None,
            message: "All lots are nearly full. Waiting 10-15 minutes may free up spots as classes change.".to_string(),
        })
    }
}

fn assign_ranks_and_reasons(results: &mut [RankedResult]) {
    let best_availability = results
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            a.scores
                .availability
                .total_cmp(&b.scores.availability)
                .then_with(|| ib.cmp(ia))
        })
        .map(|(i, _)| i);
    let closest = results
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| a.distance_m.total_cmp(&b.distance_m).then_with(|| ia.cmp(ib)))
        .map(|(i, _)| i);

    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
        result.recommended = i == 0;
        result.reason = if Some(i) == best_availability {
            RankReason::BestAvailability
        } else if Some(i) == closest {
            RankReason::Closest
        } else if result.walk_minutes.is_some_and(|w| w <= SHORT_WALK_MINUTES) {
            RankReason::ShortWalk
        } else if i == 0 {
            RankReason::BestOverall
        } else {
            RankReason::Alternative
        };
    }
}
