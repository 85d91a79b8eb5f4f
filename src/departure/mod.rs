//! Schedule-aware "leave by" recommendations.

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::prediction::PredictionService;
use crate::ranking::{Candidate, RankQuery, RankedResult, RankingEngine};
use crate::store::Lot;
use serde::Serialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub mod schedule;

use schedule::{ClockTime, Schedule};

pub const CROSS_LOT_FROM: ClockTime = match ClockTime::new(14, 30) {
    Some(time) => time,
    None => ClockTime::MIDNIGHT,
};
pub const FREE_PARKING_FROM: ClockTime = match ClockTime::new(17, 30) {
    Some(time) => time,
    None => ClockTime::MIDNIGHT,
};
pub const DEFAULT_WALK_MINUTES: f64 = 5.0;
pub const SAFETY_MARGIN_MINUTES: f64 = 5.0;
pub const BUSY_SEARCH_MINUTES: f64 = 12.0;
pub const CALM_SEARCH_MINUTES: f64 = 5.0;
pub const ALTERNATIVE_COUNT: usize = 3;
pub const MAX_COMMUTE_MINUTES: f64 = 1440.0;

const AVAILABILITY_WEIGHT: f64 = 0.60;
const WALK_WEIGHT: f64 = 0.25;
const BONUS_WEIGHT: f64 = 0.15;
const PREFERRED_BONUS: f64 = 60.0;
const NON_ICING_BONUS: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParkingWindow {
    PermitOnly,
    /// From 14:30 any permit may use any lot.
    CrossLot,
    FreeParking,
}

impl ParkingWindow {
    pub fn at(arrival: OffsetDateTime) -> Self {
        let time = ClockTime::of(arrival);
        if time >= FREE_PARKING_FROM {
            ParkingWindow::FreeParking
        } else if time >= CROSS_LOT_FROM {
            ParkingWindow::CrossLot
        } else {
            ParkingWindow::PermitOnly
        }
    }

    pub fn admits(self, lot: &Lot, permit: &str) -> bool {
        match self {
            ParkingWindow::PermitOnly => lot.accepts_permit(permit),
            ParkingWindow::CrossLot | ParkingWindow::FreeParking => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            ConfidenceLabel::High
        } else if confidence >= 0.65 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingBreakdown {
    pub commute_minutes: f64,
    pub search_buffer_minutes: f64,
    pub walk_minutes: f64,
    pub safety_margin_minutes: f64,
    pub total_minutes: f64,
}

impl TimingBreakdown {
    fn for_lot(commute_minutes: f64, result: &RankedResult) -> Self {
        let search_buffer_minutes = if result.prediction.predicted_occupancy > 75.0 {
            BUSY_SEARCH_MINUTES
        } else {
            CALM_SEARCH_MINUTES
        };
        let walk_minutes = result.walk_minutes.unwrap_or(DEFAULT_WALK_MINUTES);
        Self {
            commute_minutes,
            search_buffer_minutes,
            walk_minutes,
            safety_margin_minutes: SAFETY_MARGIN_MINUTES,
            total_minutes: commute_minutes
                + search_buffer_minutes
                + walk_minutes
                + SAFETY_MARGIN_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LotOption {
    pub lot_id: String,
    pub lot_name: String,
    pub predicted_occupancy: f64,
    pub chance_of_spot: u8,
    pub departure_score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub leave_by: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub arrival_time: OffsetDateTime,
    pub timing: TimingBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub course: String,
    pub building: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartureRecommendation {
    #[serde(with = "time::serde::rfc3339")]
    pub leave_by: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub arrival_time: OffsetDateTime,
    pub target_lot: LotOption,
    pub alternatives: Vec<LotOption>,
    pub timing: TimingBreakdown,
    pub confidence: f64,
    pub confidence_label: ConfidenceLabel,
    pub reason: String,
    pub class: ClassInfo,
    pub leave_now: bool,
    pub parking_window: ParkingWindow,
}

fn minutes(value: f64) -> Duration {
    Duration::seconds_f64(value.max(0.0) * 60.0)
}

fn departure_score(result: &RankedResult, schedule: &Schedule, lot: Option<&Lot>) -> f64 {
    let mut bonus = 0.0;
    if schedule.is_preferred(&result.lot_id) {
        bonus += PREFERRED_BONUS;
    }
    if lot.is_some_and(|lot| !lot.icing_zone) {
        bonus += NON_ICING_BONUS;
    }
    AVAILABILITY_WEIGHT * result.scores.availability
        + WALK_WEIGHT * result.scores.walk
        + BONUS_WEIGHT * bonus
}

/// Prediction confidence adjusted for crowding, lead time and odd hours.
pub fn adjust_confidence(
    prediction_confidence: f64,
    predicted_occupancy: f64,
    lead_minutes: f64,
    class_start: ClockTime,
) -> f64 {
    let mut confidence = prediction_confidence;
    if predicted_occupancy > 85.0 {
        confidence -= 0.10;
    } else if predicted_occupancy > 75.0 {
        confidence -= 0.05;
    }
    if lead_minutes < 20.0 {
        confidence -= 0.10;
    }
    if lead_minutes > 240.0 {
        confidence -= 0.10;
    }
    if class_start.hour() < 8 || class_start.hour() >= 18 {
        confidence -= 0.05;
    }
    confidence.clamp(0.1, 0.95)
}

fn centroid(lots: &[Lot]) -> Option<GeoPoint> {
    if lots.is_empty() {
        return None;
    }
    let n = lots.len() as f64;
    let (lat, lon) = lots
        .iter()
        .fold((0.0, 0.0), |(lat, lon), lot| (lat + lot.location.lat, lon + lot.location.lon));
    Some(GeoPoint::new(lat / n, lon / n))
}

#[derive(Debug, Clone)]
pub struct DepartureRecommender {
    service: Arc<PredictionService>,
    ranking: RankingEngine,
}

impl DepartureRecommender {
    pub fn new(service: Arc<PredictionService>, ranking: RankingEngine) -> Self {
        Self { service, ranking }
    }

    /// `Ok(None)` when no class remains today or no lot is valid for the permit.
    pub async fn recommend(
        &self,
        schedule: &Schedule,
        permit: &str,
        now: OffsetDateTime,
    ) -> Result<Option<DepartureRecommendation>, AppError> {
        let commute_minutes = schedule.commute_minutes;
        if !(0.0..=MAX_COMMUTE_MINUTES).contains(&commute_minutes) {
            return Err(AppError::InvalidArgument(format!(
                "commute_minutes must be between 0 and {MAX_COMMUTE_MINUTES}, got {commute_minutes}"
            )));
        }
        let now = self.service.campus_target(now, self.service.clock().now())?;

        let Some((class, class_start)) = schedule.next_class(now) else {
            info!("No remaining classes today");
            return Ok(None);
        };
        let lead_minutes = (class_start - now).as_seconds_f64() / 60.0;
        let expected_arrival = now.checked_add(minutes(commute_minutes)).ok_or_else(|| {
            AppError::InvalidArgument(format!("arrival after {now} is out of range"))
        })?;
        let window = ParkingWindow::at(expected_arrival);

        let lots: Vec<Lot> = self
            .service
            .store()
            .lots()
            .into_iter()
            .filter(|lot| window.admits(lot, permit))
            .collect();
        if lots.is_empty() {
            let err = AppError::NoValidLotsForPermit(permit.to_string());
            warn!(error = %err, window = ?window, "No departure recommendation");
            return Ok(None);
        }

        let lot_ids: Vec<String> = lots.iter().map(|lot| lot.id.clone()).collect();
        let predictions = self
            .service
            .get_predictions(&lot_ids, expected_arrival)
            .await?;
        let candidates: Vec<Candidate> = lots
            .iter()
            .cloned()
            .zip(predictions)
            .map(|(lot, prediction)| Candidate { lot, prediction })
            .collect();

        let origin = schedule
            .origin
            .or_else(|| centroid(&lots))
            .unwrap_or(GeoPoint::new(0.0, 0.0));
        let ranked = self.ranking.rank(
            candidates,
            &RankQuery {
                user_location: origin,
                destination: Some(&class.building),
                urgency_minutes: lead_minutes,
                max_results: 0,
                permit: match window {
                    ParkingWindow::PermitOnly => Some(permit),
                    _ => None,
                },
            },
        );

        let mut scored: Vec<(f64, &RankedResult)> = ranked
            .iter()
            .map(|result| {
                let lot = lots.iter().find(|lot| lot.id == result.lot_id);
                (departure_score(result, schedule, lot), result)
            })
            .collect();
        // Stable: equal scores keep ranking order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let option = |score: f64, result: &RankedResult| {
            let timing = TimingBreakdown::for_lot(commute_minutes, result);
            let leave_by =
                class_start.saturating_sub(Duration::minutes(timing.total_minutes.ceil() as i64));
            LotOption {
                lot_id: result.lot_id.clone(),
                lot_name: result.lot_name.clone(),
                predicted_occupancy: result.prediction.predicted_occupancy,
                chance_of_spot: result.prediction.chance_of_spot,
                departure_score: score,
                leave_by,
                arrival_time: leave_by.saturating_add(minutes(commute_minutes)),
                timing,
            }
        };

        let mut options = scored.iter().map(|(score, result)| option(*score, *result));
        let Some(target_lot) = options.next() else {
            return Ok(None);
        };
        let alternatives: Vec<LotOption> = options.take(ALTERNATIVE_COUNT).collect();

        let top = scored[0].1;
        let confidence = adjust_confidence(
            top.prediction.confidence,
            top.prediction.predicted_occupancy,
            lead_minutes,
            class.start,
        );
        let leave_now = target_lot.leave_by <= now;
        let reason = format!(
            "{} is expected to be {:.0}% full when you arrive for {} in {}; allow {:.0} minutes door to door.",
            target_lot.lot_name,
            target_lot.predicted_occupancy,
            class.course,
            class.building,
            target_lot.timing.total_minutes
        );

        info!(
            course = %class.course,
            lot_id = %target_lot.lot_id,
            leave_now,
            confidence,
            "Departure recommendation ready"
        );

        Ok(Some(DepartureRecommendation {
            leave_by: target_lot.leave_by,
            arrival_time: target_lot.arrival_time,
            timing: target_lot.timing,
            target_lot,
            alternatives,
            confidence,
            confidence_label: ConfidenceLabel::from_confidence(confidence),
            reason,
            class: ClassInfo {
                course: class.course.clone(),
                building: class.building.clone(),
                starts_at: class_start,
            },
            leave_now,
            parking_window: window,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u8, minute: u8) -> ClockTime {
        ClockTime::new(hour, minute).unwrap_or(ClockTime::MIDNIGHT)
    }

    #[test]
    fn confidence_adjustments_stack_and_clamp() {
        assert!((adjust_confidence(0.8, 50.0, 60.0, at(10, 0)) - 0.8).abs() < 1e-9);
        assert!((adjust_confidence(0.8, 80.0, 60.0, at(10, 0)) - 0.75).abs() < 1e-9);
        assert!((adjust_confidence(0.8, 90.0, 10.0, at(7, 30)) - 0.55).abs() < 1e-9);
        assert!((adjust_confidence(0.95, 50.0, 300.0, at(18, 0)) - 0.80).abs() < 1e-9);
        assert_eq!(adjust_confidence(0.2, 99.0, 5.0, at(19, 0)), 0.1);
        assert_eq!(adjust_confidence(1.0, 0.0, 60.0, at(10, 0)), 0.95);
    }

    #[test]
    fn confidence_labels() {
        assert_eq!(ConfidenceLabel::from_confidence(0.85), ConfidenceLabel::High);
        assert_eq!(ConfidenceLabel::from_confidence(0.84), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_confidence(0.65), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_confidence(0.64), ConfidenceLabel::Low);
    }

    #[test]
    fn parking_windows() {
        use time::macros::datetime;

        assert_eq!(ParkingWindow::at(datetime!(2025-09-15 14:29 UTC)), ParkingWindow::PermitOnly);
        assert_eq!(ParkingWindow::at(datetime!(2025-09-15 14:30 UTC)), ParkingWindow::CrossLot);
        assert_eq!(ParkingWindow::at(datetime!(2025-09-15 17:30 UTC)), ParkingWindow::FreeParking);
    }
}
