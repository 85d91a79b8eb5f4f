//! Feature extraction: (lot, target time) -> [`FeatureVector`].
//!
//! Eight independent sub-extractions (time, calendar, events, weather,
//! historical, real-time, lot attributes, cross-lot context) are joined
//! concurrently and merged. Only an unknown lot id is an error; every other
//! gap falls back to a documented default.

use crate::clock::Clock;
use crate::error::AppError;
use crate::store::DataStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::debug;

pub mod baseline;
pub mod calendar;
mod extractors;

use calendar::AcademicCalendar;

pub const FEATURE_COUNT: usize = 46;

/// One hourly observation of a lot's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub at: OffsetDateTime,
    pub occupancy: f64,
}

/// Stable feature index referenced by decision-tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Hour,
    Minute,
    DayOfWeek,
    IsWeekend,
    HourSin,
    HourCos,
    DaySin,
    DayCos,
    IsPeakHour,
    IsClassDay,
    IsFinalsWeek,
    IsFirstWeek,
    IsDeadWeek,
    DaysIntoTerm,
    SemesterWeek,
    IsInTerm,
    HasEvent,
    HasSpecialEvent,
    EventImpactScore,
    HoursUntilEvent,
    EventAttendanceThousands,
    TemperatureF,
    PrecipitationProbability,
    WindSpeedMph,
    WeatherImpactScore,
    IsRaining,
    IsCold,
    HistoricalAvgSameTime,
    HistoricalAvgLastWeek,
    HistoricalTrend,
    HistoricalVolatility,
    HistoricalSampleCount,
    HistoricalIsDefault,
    CurrentOccupancy,
    RecentReportCount,
    RecentReportAvg,
    MinutesSinceLastReport,
    ReportConfidence,
    LotCapacity,
    LotPopularity,
    LotType,
    LotTimeLimitMinutes,
    LotIsIcingZone,
    NearbyLotsAvg,
    CampusWideAvg,
    IsMorningRush,
}

impl Feature {
    pub fn index(self) -> usize {
        self as usize
    }
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimeFeatures {
    pub hour: u8,
    pub minute: u8,
    /// 0 = Monday
    pub day_of_week: u8,
    pub is_weekend: bool,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub is_peak_hour: bool,
    pub is_morning_rush: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CalendarFeatures {
    pub is_class_day: bool,
    pub is_finals_week: bool,
    pub is_first_week: bool,
    pub is_dead_week: bool,
    pub days_into_term: i64,
    pub semester_week: i64,
    pub is_in_term: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EventFeatures {
    pub has_event: bool,
    pub has_special_event: bool,
    pub impact_score: f64,
    pub hours_until_event: f64,
    pub attendance_thousands: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WeatherFeatures {
    pub temperature_f: f64,
    pub precipitation_probability: f64,
    pub wind_speed_mph: f64,
    pub impact_score: f64,
    pub is_raining: bool,
    pub is_cold: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HistoricalFeatures {
    pub avg_same_time: f64,
    pub avg_last_week: f64,
    /// -1, 0 or 1
    pub trend: i8,
    pub volatility: f64,
    pub sample_count: usize,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RealtimeFeatures {
    pub current_occupancy: f64,
    pub recent_report_count: usize,
    pub recent_report_avg: f64,
    pub minutes_since_last_report: f64,
    pub report_confidence: f64,
    /// Not part of the numeric vector; carried for freshness and tie-breaks.
    #[serde(skip)]
    pub last_report_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LotFeatures {
    pub capacity: f64,
    pub popularity: f64,
    pub kind_code: f64,
    pub time_limit_minutes: f64,
    pub is_icing_zone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CrossLotFeatures {
    pub nearby_lots_avg: f64,
    pub campus_wide_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureVector {
    pub lot_id: String,
    pub time: TimeFeatures,
    pub calendar: CalendarFeatures,
    pub events: EventFeatures,
    pub weather: WeatherFeatures,
    pub historical: HistoricalFeatures,
    pub realtime: RealtimeFeatures,
    pub lot: LotFeatures,
    pub cross_lot: CrossLotFeatures,
}

impl FeatureVector {
    /// Sources that fell back to defaults, as a `DataUnavailable` error.
    pub fn unavailable_data(&self) -> Option<AppError> {
        let mut missing = Vec::new();
        if self.historical.is_default {
            missing.push("history");
        }
        if self.weather.is_default {
            missing.push("weather");
        }
        if self.realtime.last_report_at.is_none() {
            missing.push("reports");
        }
        if missing.is_empty() {
            None
        } else {
            Some(AppError::DataUnavailable(missing.join(", ")))
        }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Hour => f64::from(self.time.hour),
            Feature::Minute => f64::from(self.time.minute),
            Feature::DayOfWeek => f64::from(self.time.day_of_week),
            Feature::IsWeekend => flag(self.time.is_weekend),
            Feature::HourSin => self.time.hour_sin,
            Feature::HourCos => self.time.hour_cos,
            Feature::DaySin => self.time.day_sin,
            Feature::DayCos => self.time.day_cos,
            Feature::IsPeakHour => flag(self.time.is_peak_hour),
            Feature::IsMorningRush => flag(self.time.is_morning_rush),
            Feature::IsClassDay => flag(self.calendar.is_class_day),
            Feature::IsFinalsWeek => flag(self.calendar.is_finals_week),
            Feature::IsFirstWeek => flag(self.calendar.is_first_week),
            Feature::IsDeadWeek => flag(self.calendar.is_dead_week),
            Feature::DaysIntoTerm => self.calendar.days_into_term as f64,
            Feature::SemesterWeek => self.calendar.semester_week as f64,
            Feature::IsInTerm => flag(self.calendar.is_in_term),
            Feature::HasEvent => flag(self.events.has_event),
            Feature::HasSpecialEvent => flag(self.events.has_special_event),
            Feature::EventImpactScore => self.events.impact_score,
            Feature::HoursUntilEvent => self.events.hours_until_event,
            Feature::EventAttendanceThousands => self.events.attendance_thousands,
            Feature::TemperatureF => self.weather.temperature_f,
            Feature::PrecipitationProbability => self.weather.precipitation_probability,
            Feature::WindSpeedMph => self.weather.wind_speed_mph,
            Feature::WeatherImpactScore => self.weather.impact_score,
            Feature::IsRaining => flag(self.weather.is_raining),
            Feature::IsCold => flag(self.weather.is_cold),
            Feature::HistoricalAvgSameTime => self.historical.avg_same_time,
            Feature::HistoricalAvgLastWeek => self.historical.avg_last_week,
            Feature::HistoricalTrend => f64::from(self.historical.trend),
            Feature::HistoricalVolatility => self.historical.volatility,
            Feature::HistoricalSampleCount => self.historical.sample_count as f64,
            Feature::HistoricalIsDefault => flag(self.historical.is_default),
            Feature::CurrentOccupancy => self.realtime.current_occupancy,
            Feature::RecentReportCount => self.realtime.recent_report_count as f64,
            Feature::RecentReportAvg => self.realtime.recent_report_avg,
            Feature::MinutesSinceLastReport => self.realtime.minutes_since_last_report,
            Feature::ReportConfidence => self.realtime.report_confidence,
            Feature::LotCapacity => self.lot.capacity,
            Feature::LotPopularity => self.lot.popularity,
            Feature::LotType => self.lot.kind_code,
            Feature::LotTimeLimitMinutes => self.lot.time_limit_minutes,
            Feature::LotIsIcingZone => flag(self.lot.is_icing_zone),
            Feature::NearbyLotsAvg => self.cross_lot.nearby_lots_avg,
            Feature::CampusWideAvg => self.cross_lot.campus_wide_avg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    store: Arc<dyn DataStore>,
    calendar: AcademicCalendar,
    clock: Arc<dyn Clock>,
}

/// Days of reports considered for the temporal series.
pub const SERIES_WINDOW_DAYS: i64 = 14;

impl FeatureExtractor {
    pub fn new(store: Arc<dyn DataStore>, calendar: AcademicCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            calendar,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn extract_features(
        &self,
        lot_id: &str,
        target: OffsetDateTime,
    ) -> Result<FeatureVector, AppError> {
        let lot = self
            .store
            .lot(lot_id)
            .ok_or_else(|| AppError::UnknownLot(lot_id.to_string()))?;
        let now = self.clock.now();
        let target = target.checked_to_offset(now.offset()).ok_or_else(|| {
            AppError::InvalidArgument(format!("target time {target} is out of range"))
        })?;
        let store = self.store.as_ref();

        let (time, calendar, events, weather, historical, realtime, lot_features, cross_lot) = tokio::join!(
            extractors::time_features(target),
            extractors::calendar_features(&self.calendar, target),
            extractors::event_features(store, lot_id, target),
            extractors::weather_features(store, target),
            extractors::historical_features(store, lot_id, target, now),
            extractors::realtime_features(store, lot_id, now),
            extractors::lot_features(&lot),
            extractors::cross_lot_features(store, &lot, now),
        );

        debug!(
            lot_id,
            historical_default = historical.is_default,
            weather_default = weather.is_default,
            reports = realtime.recent_report_count,
            "Features extracted"
        );

        let features = FeatureVector {
            lot_id: lot.id,
            time,
            calendar,
            events,
            weather,
            historical,
            realtime,
            lot: lot_features,
            cross_lot,
        };
        if let Some(err) = features.unavailable_data() {
            debug!(lot_id, error = %err, "Using default features");
        }
        Ok(features)
    }

    /// Hourly mean occupancy over the last fourteen days, oldest first.
    /// Empty when the lot has no reports in the window.
    pub fn occupancy_series(&self, lot_id: &str, now: OffsetDateTime) -> Vec<SeriesPoint> {
        let from = now - Duration::days(SERIES_WINDOW_DAYS);
        let reports = self.store.reports_between(lot_id, from, now);
        extractors::hourly_series(&reports, now.offset())
    }
}
