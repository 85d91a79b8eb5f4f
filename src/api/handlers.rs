use crate::api::responses::{
    DepartureSuccessResponse, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
    PredictionSuccessResponse, RankSuccessResponse, TimelineSuccessResponse,
};
use crate::departure::schedule::Schedule;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::ranking::{Candidate, RankQuery};
use crate::state::AppState;
use crate::store::{Lot, LotKind};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const DEFAULT_URGENCY_MINUTES: f64 = 30.0;

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictionQuery {
    /// RFC 3339 target time; defaults to now.
    pub at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub hours: Option<String>,
    /// RFC 3339 start; defaults to now.
    pub start: Option<String>,
}

fn default_urgency_minutes() -> f64 {
    DEFAULT_URGENCY_MINUTES
}

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub user_location: GeoPoint,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default = "default_urgency_minutes")]
    pub urgency_minutes: f64,
    /// 0 or absent returns every lot.
    #[serde(default)]
    pub max_results: usize,
    #[serde(default)]
    pub permit: Option<String>,
    /// Lots to rank; absent ranks every lot in the store.
    #[serde(default)]
    pub lot_ids: Option<Vec<String>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub target_time: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct DepartureRequest {
    pub schedule: Schedule,
    pub permit: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub now: Option<OffsetDateTime>,
}

pub async fn get_prediction(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
    Query(query): Query<PredictionQuery>,
) -> impl IntoResponse {
    build_prediction_response(&state, &lot_id, query).await
}

pub async fn get_timeline(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> impl IntoResponse {
    build_timeline_response(&state, &lot_id, query).await
}

pub async fn post_rank(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RankRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(request)) => build_rank_response(&state, request).await,
        Err(rejection) => rejection_response(&state, &rejection),
    }
}

pub async fn post_departure(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DepartureRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(request)) => build_departure_response(&state, request).await,
        Err(rejection) => rejection_response(&state, &rejection),
    }
}

pub async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    build_health_response(&state)
}

fn parse_time(value: &str, field: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| AppError::InvalidArgument(format!("{field} must be RFC 3339: {err}")))
}

async fn build_prediction_response(
    state: &AppState,
    lot_id: &str,
    query: PredictionQuery,
) -> ApiResponse<PredictionSuccessResponse> {
    let service = state.service();
    let now = service.clock().now();
    let target = match query
        .at
        .as_deref()
        .map(|at| parse_time(at, "at").and_then(|t| service.campus_target(t, now)))
        .transpose()
    {
        Ok(target) => target.unwrap_or(now),
        Err(err) => return error_response(&err, now),
    };

    match service.get_prediction(lot_id, target).await {
        Ok(prediction) => with_timestamp(now, |timestamp| PredictionSuccessResponse {
            prediction,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

async fn build_timeline_response(
    state: &AppState,
    lot_id: &str,
    query: TimelineQuery,
) -> ApiResponse<TimelineSuccessResponse> {
    let service = state.service();
    let now = service.clock().now();
    let hours = match query.hours.as_deref() {
        None => service.horizon_hours(),
        Some(raw) => match raw.parse::<u32>() {
            Ok(hours) => hours,
            Err(_) => {
                let err = AppError::InvalidArgument(format!("hours must be a whole number, got {raw:?}"));
                return error_response(&err, now);
            }
        },
    };
    let start = match query
        .start
        .as_deref()
        .map(|s| parse_time(s, "start").and_then(|t| service.campus_target(t, now)))
        .transpose()
    {
        Ok(start) => start.unwrap_or(now),
        Err(err) => return error_response(&err, now),
    };

    match service.get_prediction_timeline(lot_id, start, hours).await {
        Ok(predictions) => with_timestamp(now, |timestamp| TimelineSuccessResponse {
            lot_id: lot_id.to_string(),
            hours,
            predictions,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

async fn build_rank_response(
    state: &AppState,
    request: RankRequest,
) -> ApiResponse<RankSuccessResponse> {
    let service = state.service();
    let store = service.store();
    let now = service.clock().now();

    if !request.urgency_minutes.is_finite() {
        let err = AppError::InvalidArgument("urgency_minutes must be finite".to_string());
        return error_response(&err, now);
    }

    let lots: Vec<Lot> = match &request.lot_ids {
        Some(ids) => {
            let mut lots = Vec::with_capacity(ids.len());
            for id in ids {
                match store.lot(id) {
                    Some(lot) => lots.push(lot),
                    None => return error_response(&AppError::UnknownLot(id.clone()), now),
                }
            }
            lots
        }
        None => store.lots(),
    };

    let target = match service.campus_target(request.target_time.unwrap_or(now), now) {
        Ok(target) => target,
        Err(err) => return error_response(&err, now),
    };
    let lot_ids: Vec<String> = lots.iter().map(|lot| lot.id.clone()).collect();
    let predictions = match service.get_predictions(&lot_ids, target).await {
        Ok(predictions) => predictions,
        Err(err) => return error_response(&err, now),
    };
    let candidates: Vec<Candidate> = lots
        .into_iter()
        .zip(predictions)
        .map(|(lot, prediction)| Candidate { lot, prediction })
        .collect();

    let query = RankQuery {
        user_location: request.user_location,
        destination: request.destination.as_deref(),
        urgency_minutes: request.urgency_minutes,
        max_results: request.max_results,
        permit: request.permit.as_deref(),
    };
    let results = state.ranking().rank(candidates, &query);

    let satellites: Vec<Lot> = store
        .lots()
        .into_iter()
        .filter(|lot| lot.kind == LotKind::Satellite)
        .collect();
    let advice = state.ranking().advise_when_full(&results, &satellites);
    if let Some(advice) = &advice {
        info!(kind = ?advice.kind, lot_id = ?advice.lot_id, "All ranked lots nearly full");
    }

    with_timestamp(now, |timestamp| RankSuccessResponse {
        results,
        advice,
        timestamp,
    })
}

async fn build_departure_response(
    state: &AppState,
    request: DepartureRequest,
) -> ApiResponse<DepartureSuccessResponse> {
    let clock_now = state.service().clock().now();
    let now = request.now.unwrap_or(clock_now);

    match state
        .departure()
        .recommend(&request.schedule, &request.permit, now)
        .await
    {
        Ok(recommendation) => {
            let message = recommendation.is_none().then(|| {
                "No remaining class today or no lot admits this permit".to_string()
            });
            with_timestamp(clock_now, |timestamp| DepartureSuccessResponse {
                recommendation,
                message,
                timestamp,
            })
        }
        Err(err) => error_response(&err, clock_now),
    }
}

fn build_health_response(state: &AppState) -> ApiResponse<HealthSuccessResponse> {
    let service = state.service();
    let now = service.clock().now();
    let lot_count = service.store().lots().len();
    let status = if lot_count == 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    with_timestamp(now, |timestamp| HealthSuccessResponse {
        status,
        lot_count,
        model_version: service.model_version().to_string(),
        remote_enabled: service.has_remote(),
        timestamp,
    })
}

fn with_timestamp<T>(now: OffsetDateTime, body: impl FnOnce(String) -> T) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(body(timestamp)),
        Err(_) => internal_error("timestamp formatting failure"),
    }
}

fn rejection_response<T>(state: &AppState, rejection: &JsonRejection) -> ApiResponse<T> {
    let err = AppError::InvalidArgument(rejection.body_text());
    error_response(&err, state.service().clock().now())
}

fn error_response<T>(err: &AppError, now: OffsetDateTime) -> ApiResponse<T> {
    let (status, error_code) = match err {
        AppError::UnknownLot(_) => (StatusCode::NOT_FOUND, ErrorCode::UnknownLot),
        AppError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidArgument),
        _ => {
            error!(error = %err, "Request failed");
            return internal_error("request failed");
        }
    };
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message: err.to_string(),
                timestamp,
            },
        },
        Err(_) => internal_error("timestamp formatting failure"),
    }
}

fn internal_error<T>(message: &str) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling API request");
    let formatted = format_timestamp(OffsetDateTime::now_utc()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, TimestampError> {
    timestamp.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::departure::schedule::{ClassSession, ClockTime, DayOfWeek};
    use crate::estimation::EnsemblePredictor;
    use crate::features::FeatureExtractor;
    use crate::features::calendar::AcademicCalendar;
    use crate::prediction::{PredictionService, ServiceSettings, SourceKind};
    use crate::store::memory::InMemoryStore;
    use std::collections::BTreeMap;
    use time::macros::datetime;

    fn lot(id: &str, kind: LotKind, lat: f64) -> Lot {
        Lot {
            id: id.to_string(),
            name: id.to_uppercase(),
            capacity: 300,
            location: GeoPoint::new(lat, -97.15),
            kind,
            time_limit_minutes: None,
            icing_zone: false,
            permits: vec!["commuter".to_string()],
            amenities: Vec::new(),
            popularity: 50.0,
            walk_minutes: BTreeMap::from([("SCI".to_string(), 6.0)]),
        }
    }

    fn state_with(lots: Vec<Lot>) -> AppState {
        let mut store = InMemoryStore::new();
        for lot in lots {
            store.insert_lot(lot);
        }
        let clock = Arc::new(FixedClock::new(datetime!(2025-09-15 09:00 UTC)));
        let extractor = FeatureExtractor::new(Arc::new(store), AcademicCalendar::default(), clock);
        let service = PredictionService::new(
            extractor,
            EnsemblePredictor::default(),
            None,
            ServiceSettings::default(),
        );
        AppState::new(Arc::new(service))
    }

    fn campus_state() -> AppState {
        state_with(vec![
            lot("lot-a", LotKind::Commuter, 33.210),
            lot("lot-b", LotKind::Commuter, 33.215),
            lot("sat-1", LotKind::Satellite, 33.250),
        ])
    }

    fn expect_error<T>(response: ApiResponse<T>) -> (StatusCode, ErrorResponse) {
        match response {
            ApiResponse::Error { status, body } => (status, body),
            ApiResponse::Success(_) => panic!("expected error response"),
        }
    }

    fn expect_success<T>(response: ApiResponse<T>) -> T {
        match response {
            ApiResponse::Success(body) => body,
            ApiResponse::Error { status, body } => {
                panic!("expected success, got {status}: {}", body.error_message)
            }
        }
    }

    #[tokio::test]
    async fn prediction_handler_returns_local_prediction() {
        let state = campus_state();

        let body = expect_success(
            build_prediction_response(
                &state,
                "lot-a",
                PredictionQuery {
                    at: Some("2025-09-15T10:00:00Z".to_string()),
                },
            )
            .await,
        );

        assert_eq!(body.prediction.lot_id, "lot-a");
        assert_eq!(body.prediction.source, SourceKind::Local);
        assert_eq!(body.timestamp, "2025-09-15T09:00:00Z");
    }

    #[tokio::test]
    async fn prediction_handler_maps_unknown_lot_to_not_found() {
        let state = campus_state();

        let (status, body) =
            expect_error(build_prediction_response(&state, "ghost", PredictionQuery::default()).await);

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error_code, ErrorCode::UnknownLot);
    }

    #[tokio::test]
    async fn prediction_handler_rejects_malformed_time() {
        let state = campus_state();

        let (status, body) = expect_error(
            build_prediction_response(
                &state,
                "lot-a",
                PredictionQuery {
                    at: Some("tomorrow".to_string()),
                },
            )
            .await,
        );

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_code, ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn far_future_targets_are_bad_requests() {
        let state = campus_state();

        let (status, body) = expect_error(
            build_prediction_response(
                &state,
                "lot-a",
                PredictionQuery {
                    at: Some("9999-12-31T23:00:00Z".to_string()),
                },
            )
            .await,
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_code, ErrorCode::InvalidArgument);

        let request = RankRequest {
            user_location: GeoPoint::new(33.210, -97.15),
            destination: None,
            urgency_minutes: 20.0,
            max_results: 0,
            permit: None,
            lot_ids: None,
            target_time: Some(datetime!(9999-12-31 23:00 UTC)),
        };
        let (status, body) = expect_error(build_rank_response(&state, request).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_code, ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn timeline_handler_validates_hours() {
        let state = campus_state();

        for hours in ["0", "25", "two"] {
            let (status, body) = expect_error(
                build_timeline_response(
                    &state,
                    "lot-a",
                    TimelineQuery {
                        hours: Some(hours.to_string()),
                        start: None,
                    },
                )
                .await,
            );
            assert_eq!(status, StatusCode::BAD_REQUEST, "hours={hours}");
            assert_eq!(body.error_code, ErrorCode::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn timeline_handler_returns_quarter_hour_steps() {
        let state = campus_state();

        let body = expect_success(
            build_timeline_response(
                &state,
                "lot-b",
                TimelineQuery {
                    hours: Some("3".to_string()),
                    start: None,
                },
            )
            .await,
        );

        assert_eq!(body.hours, 3);
        assert_eq!(body.predictions.len(), 12);
    }

    #[tokio::test]
    async fn rank_handler_ranks_every_lot_by_default() {
        let state = campus_state();
        let request = RankRequest {
            user_location: GeoPoint::new(33.210, -97.15),
            destination: Some("SCI".to_string()),
            urgency_minutes: 20.0,
            max_results: 0,
            permit: Some("commuter".to_string()),
            lot_ids: None,
            target_time: None,
        };

        let body = expect_success(build_rank_response(&state, request).await);

        assert_eq!(body.results.len(), 3);
        assert_eq!(body.results[0].rank, 1);
        assert!(body.results[0].recommended);
        assert!(body.results[1..].iter().all(|r| !r.recommended));
    }

    #[tokio::test]
    async fn rank_handler_rejects_unknown_lot_ids() {
        let state = campus_state();
        let request = RankRequest {
            user_location: GeoPoint::new(33.210, -97.15),
            destination: None,
            urgency_minutes: 20.0,
            max_results: 0,
            permit: None,
            lot_ids: Some(vec!["lot-a".to_string(), "ghost".to_string()]),
            target_time: None,
        };

        let (status, body) = expect_error(build_rank_response(&state, request).await);

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error_code, ErrorCode::UnknownLot);
    }

    #[test]
    fn rank_request_applies_defaults() -> Result<(), serde_json::Error> {
        let request: RankRequest =
            serde_json::from_str(r#"{ "user_location": { "lat": 33.21, "lon": -97.15 } }"#)?;

        assert_eq!(request.urgency_minutes, DEFAULT_URGENCY_MINUTES);
        assert_eq!(request.max_results, 0);
        assert!(request.lot_ids.is_none());
        assert!(request.target_time.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn departure_handler_returns_none_without_remaining_class() {
        let state = campus_state();
        let request = DepartureRequest {
            schedule: Schedule {
                classes: vec![ClassSession {
                    course: "CS 101".to_string(),
                    building: "SCI".to_string(),
                    days: vec![DayOfWeek::Monday],
                    start: ClockTime::MIDNIGHT,
                    end: None,
                }],
                commute_minutes: 15.0,
                preferred_lots: Vec::new(),
                origin: None,
            },
            permit: "commuter".to_string(),
            now: None,
        };

        let body = expect_success(build_departure_response(&state, request).await);

        assert!(body.recommendation.is_none());
        assert!(body.message.is_some());
    }

    #[tokio::test]
    async fn departure_handler_rejects_unbounded_commute() {
        let state = campus_state();
        let request = DepartureRequest {
            schedule: Schedule {
                classes: Vec::new(),
                commute_minutes: 1e10,
                preferred_lots: Vec::new(),
                origin: None,
            },
            permit: "commuter".to_string(),
            now: None,
        };

        let (status, body) = expect_error(build_departure_response(&state, request).await);

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn health_handler_reports_degraded_without_lots() {
        let empty = expect_success(build_health_response(&state_with(Vec::new())));
        let loaded = expect_success(build_health_response(&campus_state()));

        assert_eq!(empty.status, HealthStatus::Degraded);
        assert_eq!(loaded.status, HealthStatus::Ok);
        assert_eq!(loaded.lot_count, 3);
        assert!(!loaded.remote_enabled);
    }
}
