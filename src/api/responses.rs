use crate::departure::DepartureRecommendation;
use crate::prediction::Prediction;
use crate::ranking::{FullLotAdvice, RankedResult};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownLot,
    InvalidArgument,
    InternalError,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PredictionSuccessResponse {
    pub prediction: Arc<Prediction>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TimelineSuccessResponse {
    pub lot_id: String,
    pub hours: u32,
    pub predictions: Vec<Arc<Prediction>>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RankSuccessResponse {
    pub results: Vec<RankedResult>,
    /// Present only when every ranked lot is nearly full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<FullLotAdvice>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DepartureSuccessResponse {
    pub recommendation: Option<DepartureRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub lot_count: usize,
    pub model_version: String,
    pub remote_enabled: bool,
    pub timestamp: String,
}
