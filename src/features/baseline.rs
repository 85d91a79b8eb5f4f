//! Canned occupancy curve used whenever a lot has no history.

use crate::features::SeriesPoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::{Duration, OffsetDateTime, Weekday};

/// Weekday occupancy by hour: overnight trough below 15, 85-100 between 10:00 and 14:00.
const WEEKDAY_CURVE: [f64; 24] = [
    6.0, 5.0, 5.0, 5.0, 6.0, 10.0, 20.0, 40.0, 62.0, 78.0, 88.0, 95.0, 100.0, 92.0, 85.0, 70.0,
    58.0, 46.0, 35.0, 25.0, 18.0, 14.0, 10.0, 8.0,
];
const WEEKEND_LEVEL: f64 = 20.0;
const JITTER_POINTS: f64 = 5.0;
pub const SYNTHETIC_HOURS: i64 = 7 * 24;

pub fn default_occupancy(weekday: Weekday, hour: u8) -> f64 {
    match weekday {
        Weekday::Saturday | Weekday::Sunday => WEEKEND_LEVEL,
        _ => WEEKDAY_CURVE[usize::from(hour % 24)],
    }
}

pub fn default_occupancy_at(at: OffsetDateTime) -> f64 {
    default_occupancy(at.weekday(), at.hour())
}

/// Seven days of hourly points from the default curve, ending at the hour
/// before `end`. Jitter of up to +/-5 points is applied only when a seed is given.
pub fn synthetic_week(end: OffsetDateTime, jitter_seed: Option<u64>) -> Vec<SeriesPoint> {
    let mut rng = jitter_seed.map(StdRng::seed_from_u64);
    let anchor = end
        .replace_minute(0)
        .and_then(|t| t.replace_second(0))
        .and_then(|t| t.replace_nanosecond(0))
        .unwrap_or(end);

    (0..SYNTHETIC_HOURS)
        .map(|i| {
            let at = anchor - Duration::hours(SYNTHETIC_HOURS - i);
            let jitter = rng
                .as_mut()
                .map(|rng| rng.random_range(-JITTER_POINTS..=JITTER_POINTS))
                .unwrap_or(0.0);
            SeriesPoint {
                at,
                occupancy: (default_occupancy_at(at) + jitter).clamp(0.0, 100.0),
            }
        })
        .collect()
}
