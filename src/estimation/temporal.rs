//! Seasonal decomposition estimator.
//!
//! The lot's hourly series is split into level, linear trend, hour-of-day and
//! day-of-week components. Lots with too little history use a synthetic week
//! built from the default occupancy curve.

use crate::estimation::model::{ModelInput, OccupancyModel};
use crate::features::SeriesPoint;
use crate::features::baseline::synthetic_week;
use time::OffsetDateTime;

/// Fewer hourly points than this and the synthetic week is used instead.
pub const MIN_SERIES_POINTS: usize = 24;
const TREND_DAMPING: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub level: f64,
    /// Least-squares slope per series step.
    pub trend: f64,
    pub hourly: [f64; 24],
    /// Indexed from Monday.
    pub daily: [f64; 7],
    pub last_at: Option<OffsetDateTime>,
}

fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 { 0.0 } else { num / den }
}

fn bucket_means<const N: usize>(values: impl Iterator<Item = (usize, f64)>) -> [f64; N] {
    let mut sums = [0.0; N];
    let mut counts = [0usize; N];
    for (bucket, value) in values {
        sums[bucket] += value;
        counts[bucket] += 1;
    }
    let mut means = [0.0; N];
    for i in 0..N {
        if counts[i] > 0 {
            means[i] = sums[i] / counts[i] as f64;
        }
    }
    means
}

pub fn decompose(series: &[SeriesPoint]) -> Decomposition {
    if series.is_empty() {
        return Decomposition {
            level: 0.0,
            trend: 0.0,
            hourly: [0.0; 24],
            daily: [0.0; 7],
            last_at: None,
        };
    }

    let values: Vec<f64> = series.iter().map(|p| p.occupancy).collect();
    let level = values.iter().sum::<f64>() / values.len() as f64;
    let trend = slope(&values);

    let hourly: [f64; 24] = bucket_means(
        series
            .iter()
            .map(|p| (usize::from(p.at.hour()), p.occupancy - level)),
    );
    let daily: [f64; 7] = bucket_means(series.iter().map(|p| {
        let residual = p.occupancy - level - hourly[usize::from(p.at.hour())];
        (usize::from(p.at.weekday().number_days_from_monday()), residual)
    }));

    Decomposition {
        level,
        trend,
        hourly,
        daily,
        last_at: series.last().map(|p| p.at),
    }
}

impl Decomposition {
    pub fn forecast(&self, target: OffsetDateTime) -> f64 {
        let (target, steps_ahead) = match self.last_at {
            Some(last) => {
                let local = target.to_offset(last.offset());
                (local, ((local - last).as_seconds_f64() / 3600.0).max(0.0))
            }
            None => (target, 0.0),
        };
        let hour = usize::from(target.hour());
        let day = usize::from(target.weekday().number_days_from_monday());

        (self.level + self.trend * steps_ahead * TREND_DAMPING + self.hourly[hour] + self.daily[day])
            .clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemporalModel {
    jitter_seed: Option<u64>,
}

impl TemporalModel {
    pub fn new(jitter_seed: Option<u64>) -> Self {
        Self { jitter_seed }
    }

    pub fn decomposition_for(&self, input: &ModelInput<'_>) -> Decomposition {
        if input.series.len() >= MIN_SERIES_POINTS {
            decompose(input.series)
        } else {
            decompose(&synthetic_week(input.now, self.jitter_seed))
        }
    }
}

impl OccupancyModel for TemporalModel {
    fn name(&self) -> &str {
        "seasonal-decomposition"
    }

    fn predict(&self, input: &ModelInput<'_>) -> f64 {
        self.decomposition_for(input).forecast(input.target)
    }
}
