use crate::features::baseline::default_occupancy_at;
use crate::features::calendar::AcademicCalendar;
use crate::features::{
    CalendarFeatures, CrossLotFeatures, EventFeatures, HistoricalFeatures, LotFeatures,
    RealtimeFeatures, SeriesPoint, TimeFeatures, WeatherFeatures,
};
use crate::store::{DataStore, Lot, Report};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use time::{Duration, OffsetDateTime, UtcOffset, Weekday};

pub const DEFAULT_TEMPERATURE_F: f64 = 70.0;
pub const DEFAULT_WIND_MPH: f64 = 5.0;
pub const DEFAULT_VOLATILITY: f64 = 20.0;
pub const NO_REPORT_MINUTES: f64 = 1440.0;
pub const NO_EVENT_HOURS: f64 = 48.0;

const WEATHER_TOLERANCE_HOURS: i64 = 3;
const HISTORY_WINDOW_DAYS: i64 = 30;
const RECENT_WINDOW_MINUTES: i64 = 30;
const REPORT_DECAY_MINUTES: f64 = 120.0;
const EVENT_LEAD_HOURS: f64 = 6.0;
const TREND_BAND: f64 = 5.0;
const NEARBY_RADIUS_M: f64 = 800.0;

fn minutes_between(earlier: OffsetDateTime, later: OffsetDateTime) -> f64 {
    (later - earlier).as_seconds_f64() / 60.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Hour difference on a 24-hour circle.
fn circular_hour_distance(a: u8, b: u8) -> u8 {
    let diff = a.abs_diff(b);
    diff.min(24 - diff)
}

/// Accuracy-weighted mean occupancy of the given reports.
fn weighted_average(reports: &[Report]) -> Option<f64> {
    let total: f64 = reports.iter().map(|r| r.accuracy.max(0.05)).sum();
    if reports.is_empty() || total <= 0.0 {
        return None;
    }
    let sum: f64 = reports
        .iter()
        .map(|r| r.accuracy.max(0.05) * r.occupancy_percent.clamp(0.0, 100.0))
        .sum();
    Some(sum / total)
}

pub async fn time_features(target: OffsetDateTime) -> TimeFeatures {
    let hour = target.hour();
    let day_of_week = target.weekday().number_days_from_monday();
    let hour_rad = 2.0 * PI * f64::from(hour) / 24.0;
    let day_rad = 2.0 * PI * f64::from(day_of_week) / 7.0;
    let is_weekend = matches!(target.weekday(), Weekday::Saturday | Weekday::Sunday);

    TimeFeatures {
        hour,
        minute: target.minute(),
        day_of_week,
        is_weekend,
        hour_sin: hour_rad.sin(),
        hour_cos: hour_rad.cos(),
        day_sin: day_rad.sin(),
        day_cos: day_rad.cos(),
        is_peak_hour: (10..14).contains(&hour),
        is_morning_rush: !is_weekend && (7..10).contains(&hour),
    }
}

pub async fn calendar_features(
    calendar: &AcademicCalendar,
    target: OffsetDateTime,
) -> CalendarFeatures {
    let state = calendar.state_on(target.date());
    CalendarFeatures {
        is_class_day: state.is_class_day,
        is_finals_week: state.is_finals_week,
        is_first_week: state.is_first_week,
        is_dead_week: state.is_dead_week,
        days_into_term: state.days_into_term,
        semester_week: state.semester_week,
        is_in_term: state.in_term,
    }
}

pub async fn event_features(
    store: &dyn DataStore,
    lot_id: &str,
    target: OffsetDateTime,
) -> EventFeatures {
    let horizon = target.saturating_add(Duration::hours(NO_EVENT_HOURS as i64));
    let events = store.events_overlapping(target, horizon);

    let mut features = EventFeatures {
        hours_until_event: NO_EVENT_HOURS,
        ..EventFeatures::default()
    };

    for event in events.iter().filter(|e| e.affects(lot_id)) {
        let (hours_until, weight) = if event.is_active_at(target) {
            (0.0, 1.0)
        } else {
            let hours = (event.starts_at - target).as_seconds_f64() / 3600.0;
            let weight = if hours <= EVENT_LEAD_HOURS {
                1.0 - hours / EVENT_LEAD_HOURS
            } else {
                0.0
            };
            (hours, weight)
        };

        features.hours_until_event = features.hours_until_event.min(hours_until.max(0.0));
        if hours_until <= EVENT_LEAD_HOURS {
            features.has_event = true;
            features.has_special_event |= event.kind.is_special();
            features.impact_score = features
                .impact_score
                .max((event.impact.clamp(0.0, 100.0) * weight).clamp(0.0, 100.0));
            if let Some(attendance) = event.attendance {
                features.attendance_thousands =
                    features.attendance_thousands.max(f64::from(attendance) / 1000.0);
            }
        }
    }

    features
}

/// Derived 0-100 weather pressure on driving demand.
pub fn weather_impact(temperature_f: f64, precipitation_probability: f64, wind_mph: f64) -> f64 {
    let mut impact = precipitation_probability.clamp(0.0, 100.0) * 0.5;
    if temperature_f < 32.0 {
        impact += 25.0;
    } else if temperature_f < 45.0 {
        impact += 10.0;
    }
    if temperature_f > 90.0 {
        impact += 10.0;
    }
    if wind_mph > 20.0 {
        impact += 15.0;
    }
    impact.clamp(0.0, 100.0)
}

pub async fn weather_features(store: &dyn DataStore, target: OffsetDateTime) -> WeatherFeatures {
    let (temperature_f, precipitation_probability, wind_speed_mph, is_default) =
        match store.weather_near(target, Duration::hours(WEATHER_TOLERANCE_HOURS)) {
            Some(sample) => (
                sample.temperature_f,
                sample.precipitation_probability.clamp(0.0, 100.0),
                sample.wind_speed_mph.max(0.0),
                false,
            ),
            None => (DEFAULT_TEMPERATURE_F, 0.0, DEFAULT_WIND_MPH, true),
        };

    WeatherFeatures {
        temperature_f,
        precipitation_probability,
        wind_speed_mph,
        impact_score: weather_impact(temperature_f, precipitation_probability, wind_speed_mph),
        is_raining: precipitation_probability >= 50.0,
        is_cold: temperature_f < 40.0,
        is_default,
    }
}

pub async fn historical_features(
    store: &dyn DataStore,
    lot_id: &str,
    target: OffsetDateTime,
    now: OffsetDateTime,
) -> HistoricalFeatures {
    let offset = target.offset();
    let weekday = target.weekday();
    let hour = target.hour();

    let window: Vec<f64> = store
        .reports_between(lot_id, now - Duration::days(HISTORY_WINDOW_DAYS), now)
        .iter()
        .filter(|r| {
            let local = r.reported_at.to_offset(offset);
            local.weekday() == weekday && circular_hour_distance(local.hour(), hour) <= 1
        })
        .map(|r| r.occupancy_percent.clamp(0.0, 100.0))
        .collect();

    let Some(avg_same_time) = mean(&window) else {
        let default = default_occupancy_at(target);
        return HistoricalFeatures {
            avg_same_time: default,
            avg_last_week: default,
            trend: 0,
            volatility: DEFAULT_VOLATILITY,
            sample_count: 0,
            is_default: true,
        };
    };

    let last_week_at = target.saturating_sub(Duration::days(7));
    let last_week: Vec<f64> = store
        .reports_between(
            lot_id,
            last_week_at.saturating_sub(Duration::hours(1)),
            last_week_at.saturating_add(Duration::hours(1)).min(now),
        )
        .iter()
        .map(|r| r.occupancy_percent.clamp(0.0, 100.0))
        .collect();

    let (avg_last_week, trend) = match mean(&last_week) {
        Some(avg) if avg - avg_same_time > TREND_BAND => (avg, 1),
        Some(avg) if avg - avg_same_time < -TREND_BAND => (avg, -1),
        Some(avg) => (avg, 0),
        None => (avg_same_time, 0),
    };

    HistoricalFeatures {
        avg_same_time,
        avg_last_week,
        trend,
        volatility: population_std(&window, avg_same_time),
        sample_count: window.len(),
        is_default: false,
    }
}

pub async fn realtime_features(
    store: &dyn DataStore,
    lot_id: &str,
    now: OffsetDateTime,
) -> RealtimeFeatures {
    let recent = store.reports_between(lot_id, now - Duration::minutes(RECENT_WINDOW_MINUTES), now);

    if let Some(average) = weighted_average(&recent) {
        let newest = recent.iter().map(|r| r.reported_at).max();
        let confidence = recent
            .iter()
            .map(|r| {
                let age = minutes_between(r.reported_at, now);
                r.accuracy.clamp(0.0, 1.0) * (1.0 - age / REPORT_DECAY_MINUTES).max(0.0)
            })
            .sum::<f64>()
            / recent.len() as f64;

        return RealtimeFeatures {
            current_occupancy: average,
            recent_report_count: recent.len(),
            recent_report_avg: average,
            minutes_since_last_report: newest
                .map(|at| minutes_between(at, now).clamp(0.0, NO_REPORT_MINUTES))
                .unwrap_or(NO_REPORT_MINUTES),
            report_confidence: confidence.clamp(0.0, 1.0),
            last_report_at: newest,
        };
    }

    match store.latest_report(lot_id, now) {
        Some(report) => {
            let age = minutes_between(report.reported_at, now);
            let confidence =
                report.accuracy.clamp(0.0, 1.0) * (1.0 - age / REPORT_DECAY_MINUTES).max(0.0);
            let occupancy = report.occupancy_percent.clamp(0.0, 100.0);
            RealtimeFeatures {
                current_occupancy: if confidence > 0.0 {
                    occupancy
                } else {
                    default_occupancy_at(now)
                },
                recent_report_count: 0,
                recent_report_avg: occupancy,
                minutes_since_last_report: age.clamp(0.0, NO_REPORT_MINUTES),
                report_confidence: confidence,
                last_report_at: Some(report.reported_at),
            }
        }
        None => {
            let default = default_occupancy_at(now);
            RealtimeFeatures {
                current_occupancy: default,
                recent_report_count: 0,
                recent_report_avg: default,
                minutes_since_last_report: NO_REPORT_MINUTES,
                report_confidence: 0.0,
                last_report_at: None,
            }
        }
    }
}

pub async fn lot_features(lot: &Lot) -> LotFeatures {
    LotFeatures {
        capacity: f64::from(lot.capacity),
        popularity: lot.popularity.clamp(0.0, 100.0),
        kind_code: lot.kind.code(),
        time_limit_minutes: lot.time_limit_minutes.map(f64::from).unwrap_or(0.0),
        is_icing_zone: lot.icing_zone,
    }
}

/// Current occupancy estimate for a lot: recent reports, else the default curve.
pub fn current_estimate(store: &dyn DataStore, lot_id: &str, now: OffsetDateTime) -> f64 {
    let recent = store.reports_between(lot_id, now - Duration::minutes(RECENT_WINDOW_MINUTES), now);
    weighted_average(&recent).unwrap_or_else(|| default_occupancy_at(now))
}

pub async fn cross_lot_features(
    store: &dyn DataStore,
    lot: &Lot,
    now: OffsetDateTime,
) -> CrossLotFeatures {
    let mut campus = Vec::new();
    let mut nearby = Vec::new();

    for other in store.lots() {
        let estimate = current_estimate(store, &other.id, now);
        campus.push(estimate);
        if other.id != lot.id && other.location.distance_m(&lot.location) <= NEARBY_RADIUS_M {
            nearby.push(estimate);
        }
    }

    let campus_wide_avg = mean(&campus).unwrap_or_else(|| default_occupancy_at(now));
    CrossLotFeatures {
        nearby_lots_avg: mean(&nearby).unwrap_or(campus_wide_avg),
        campus_wide_avg,
    }
}

/// Buckets reports into hourly means, oldest first.
pub fn hourly_series(reports: &[Report], offset: UtcOffset) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<OffsetDateTime, (f64, usize)> = BTreeMap::new();
    for report in reports {
        let local = report.reported_at.to_offset(offset);
        let Ok(hour_start) = local
            .replace_minute(0)
            .and_then(|t| t.replace_second(0))
            .and_then(|t| t.replace_nanosecond(0))
        else {
            continue;
        };
        let entry = buckets.entry(hour_start).or_insert((0.0, 0));
        entry.0 += report.occupancy_percent.clamp(0.0, 100.0);
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(at, (sum, count))| SeriesPoint {
            at,
            occupancy: sum / count as f64,
        })
        .collect()
}
