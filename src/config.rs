use crate::features::calendar::{AcademicCalendar, CalendarError, TermSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_TABULAR_WEIGHT: f64 = 0.6;
pub const DEFAULT_TEMPORAL_WEIGHT: f64 = 0.4;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_HORIZON_HOURS: u32 = 24;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub data: Option<DataSection>,
    #[serde(default)]
    pub model: Option<ModelSection>,
    #[serde(default)]
    pub prediction: Option<PredictionSection>,
    #[serde(default)]
    pub campus: Option<CampusSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSection {
    /// JSON snapshot of lots, reports, events and weather
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSection {
    /// JSON file holding the decision forest; empty means built-in forest
    pub path: Option<PathBuf>,
    pub tabular_weight: Option<f64>,
    pub temporal_weight: Option<f64>,
    /// Seed for jitter on the synthetic baseline pattern; absent disables jitter
    pub jitter_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionSection {
    /// Remote inference endpoint (http:// only); absent means local only
    pub remote_endpoint: Option<String>,
    pub remote_timeout_ms: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub horizon_hours: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CampusSection {
    /// Local offset used for hour-of-day logic (default: UTC)
    pub utc_offset_hours: Option<i8>,
    #[serde(default)]
    pub terms: Vec<TermSpec>,
    #[serde(default)]
    pub holidays: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid campus calendar: {0}")]
    Calendar(#[from] CalendarError),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    let path = path?;
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

impl Config {
    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        non_empty(self.data.as_ref()?.snapshot_path.as_deref())
    }

    pub fn model_path(&self) -> Option<&Path> {
        non_empty(self.model.as_ref()?.path.as_deref())
    }

    /// Returns (tabular, temporal) ensemble weights, normalised to sum to 1.
    pub fn ensemble_weights(&self) -> Result<(f64, f64), ConfigError> {
        let tabular = self
            .model
            .as_ref()
            .and_then(|m| m.tabular_weight)
            .unwrap_or(DEFAULT_TABULAR_WEIGHT);
        let temporal = self
            .model
            .as_ref()
            .and_then(|m| m.temporal_weight)
            .unwrap_or(DEFAULT_TEMPORAL_WEIGHT);
        if tabular < 0.0 || temporal < 0.0 || tabular + temporal <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ensemble weights must be non-negative with a positive sum (got {tabular}, {temporal})"
            )));
        }
        let total = tabular + temporal;
        Ok((tabular / total, temporal / total))
    }

    pub fn jitter_seed(&self) -> Option<u64> {
        self.model.as_ref().and_then(|m| m.jitter_seed)
    }

    pub fn remote_endpoint(&self) -> Option<&str> {
        self.prediction
            .as_ref()
            .and_then(|p| p.remote_endpoint.as_deref())
            .filter(|endpoint| !endpoint.trim().is_empty())
    }

    /// Returns the remote call timeout (default: 2 seconds)
    pub fn remote_timeout(&self) -> Duration {
        let millis = self
            .prediction
            .as_ref()
            .and_then(|p| p.remote_timeout_ms)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    /// Returns the prediction cache TTL (default: 5 minutes)
    pub fn cache_ttl(&self) -> Duration {
        let secs = self
            .prediction
            .as_ref()
            .and_then(|p| p.cache_ttl_secs)
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);
        Duration::from_secs(secs)
    }

    /// Returns the maximum timeline length in hours (default: 24)
    pub fn horizon_hours(&self) -> u32 {
        self.prediction
            .as_ref()
            .and_then(|p| p.horizon_hours)
            .unwrap_or(DEFAULT_HORIZON_HOURS)
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        let hours = self
            .campus
            .as_ref()
            .and_then(|c| c.utc_offset_hours)
            .unwrap_or(0);
        UtcOffset::from_hms(hours, 0, 0)
            .map_err(|err| ConfigError::Invalid(format!("utc_offset_hours: {err}")))
    }

    /// Builds the academic calendar; falls back to the default fall/spring terms
    /// when no terms are configured.
    pub fn academic_calendar(&self) -> Result<AcademicCalendar, ConfigError> {
        match &self.campus {
            Some(campus) if !campus.terms.is_empty() => Ok(AcademicCalendar::from_specs(
                &campus.terms,
                &campus.holidays,
            )?),
            Some(campus) => Ok(AcademicCalendar::default().with_holidays(&campus.holidays)?),
            None => Ok(AcademicCalendar::default()),
        }
    }
}
