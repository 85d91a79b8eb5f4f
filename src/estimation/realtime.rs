//! Blends fresh crowdsourced reports into a model prediction.

use crate::store::Report;
use time::{Duration, OffsetDateTime};

pub const REPORT_WINDOW: Duration = Duration::minutes(60);

#[derive(Debug, Clone, Copy)]
pub struct RealtimeAdjuster {
    /// Exponential decay constant for report age, minutes.
    pub decay_minutes: f64,
    pub report_weight: f64,
    pub min_reports: usize,
    /// Total report weight below which reports are ignored.
    pub min_weight: f64,
    pub max_adjustment: f64,
    /// Fraction of the adjustment applied to the interval bounds.
    pub bound_shift: f64,
}

impl Default for RealtimeAdjuster {
    fn default() -> Self {
        Self {
            decay_minutes: 30.0,
            report_weight: 0.3,
            min_reports: 2,
            min_weight: 0.1,
            max_adjustment: 25.0,
            bound_shift: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjusted {
    pub occupancy: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Signed points added to the model output.
    pub adjustment: f64,
}

impl RealtimeAdjuster {
    /// Returns `None` when there are too few reports within the hour before
    /// `target`, or their combined weight is under `min_weight`.
    pub fn adjust(
        &self,
        occupancy: f64,
        confidence: f64,
        lower_bound: f64,
        upper_bound: f64,
        reports: &[Report],
        target: OffsetDateTime,
    ) -> Option<Adjusted> {
        let window: Vec<(f64, f64)> = reports
            .iter()
            .filter(|r| r.reported_at <= target && target - r.reported_at <= REPORT_WINDOW)
            .map(|r| {
                let age = (target - r.reported_at).as_seconds_f64() / 60.0;
                let weight = (-age / self.decay_minutes).exp() * r.accuracy.clamp(0.0, 1.0);
                (weight, r.occupancy_percent.clamp(0.0, 100.0))
            })
            .collect();

        if window.len() < self.min_reports {
            return None;
        }
        let total_weight: f64 = window.iter().map(|(w, _)| w).sum();
        if total_weight < self.min_weight || total_weight <= 0.0 {
            return None;
        }
        let reported = window.iter().map(|(w, v)| w * v).sum::<f64>() / total_weight;

        let adjustment = ((reported - occupancy)
            * self.report_weight
            * total_weight.min(1.0)
            * (0.5 + 0.5 * (1.0 - confidence.clamp(0.0, 1.0))))
        .clamp(-self.max_adjustment, self.max_adjustment);

        let occupancy = (occupancy + adjustment).clamp(0.0, 100.0);
        let shift = adjustment * self.bound_shift;
        let lower = (lower_bound + shift).clamp(0.0, 100.0);
        let upper = (upper_bound + shift).clamp(0.0, 100.0);

        Some(Adjusted {
            occupancy,
            lower_bound: lower.min(occupancy),
            upper_bound: upper.max(occupancy),
            adjustment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn report(occupancy: f64, at: OffsetDateTime) -> Report {
        Report {
            lot_id: "lot-a".to_string(),
            occupancy_percent: occupancy,
            reported_at: at,
            accuracy: 1.0,
        }
    }

    #[test]
    fn single_report_is_not_enough() {
        let target = datetime!(2025-09-15 09:00 UTC);
        let reports = vec![report(90.0, target - Duration::minutes(1))];

        let adjusted = RealtimeAdjuster::default().adjust(50.0, 0.5, 40.0, 60.0, &reports, target);

        assert!(adjusted.is_none());
    }

    #[test]
    fn fresh_reports_pull_prediction_up() {
        let target = datetime!(2025-09-15 09:00 UTC);
        let reports = vec![report(90.0, target), report(90.0, target)];

        let adjusted = RealtimeAdjuster::default()
            .adjust(50.0, 0.5, 40.0, 60.0, &reports, target)
            .expect("two fresh reports");

        // (90 - 50) * 0.3 * 1.0 * 0.75
        assert!((adjusted.adjustment - 9.0).abs() < 1e-9);
        assert!((adjusted.occupancy - 59.0).abs() < 1e-9);
        assert!((adjusted.lower_bound - 47.2).abs() < 1e-9);
        assert!((adjusted.upper_bound - 67.2).abs() < 1e-9);
    }

    #[test]
    fn adjustment_is_capped() {
        let target = datetime!(2025-09-15 09:00 UTC);
        let reports: Vec<Report> = (0..10).map(|_| report(100.0, target)).collect();
        let adjuster = RealtimeAdjuster {
            report_weight: 1.0,
            ..RealtimeAdjuster::default()
        };

        let adjusted = adjuster
            .adjust(0.0, 0.0, 0.0, 10.0, &reports, target)
            .expect("ten fresh reports");

        assert_eq!(adjusted.adjustment, 25.0);
        assert!(adjusted.lower_bound <= adjusted.occupancy);
        assert!(adjusted.occupancy <= adjusted.upper_bound);
    }

    #[test]
    fn reports_older_than_an_hour_are_ignored() {
        let target = datetime!(2025-09-15 09:00 UTC);
        let reports = vec![
            report(90.0, target - Duration::minutes(61)),
            report(90.0, target - Duration::minutes(90)),
        ];

        assert!(
            RealtimeAdjuster::default()
                .adjust(50.0, 0.5, 40.0, 60.0, &reports, target)
                .is_none()
        );
    }

    #[test]
    fn faint_reports_below_min_weight_are_ignored() {
        let target = datetime!(2025-09-15 09:00 UTC);
        let faint = |at| Report {
            accuracy: 0.2,
            ..report(90.0, at)
        };
        // 2 * exp(-50 / 30) * 0.2 ~ 0.076
        let reports = vec![
            faint(target - Duration::minutes(50)),
            faint(target - Duration::minutes(50)),
        ];

        let default = RealtimeAdjuster::default().adjust(50.0, 0.5, 40.0, 60.0, &reports, target);
        let unfloored = RealtimeAdjuster {
            min_weight: 0.0,
            ..RealtimeAdjuster::default()
        }
        .adjust(50.0, 0.5, 40.0, 60.0, &reports, target);

        assert!(default.is_none());
        assert!(unfloored.is_some_and(|a| a.adjustment > 0.0));
    }
}
