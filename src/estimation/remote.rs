use crate::estimation::ComponentPredictions;
use crate::estimation::model::Factor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const API_VERSION: &str = "1.0";

/// Client for the server-side inference endpoint.
pub struct RemoteClient {
    endpoint: String,
    timeout: Duration,
}

impl RemoteClient {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Requests `hours_ahead * 4` quarter-hour steps per lot starting at `target`.
    /// `hours_ahead == 0` asks for the single step at `target`.
    pub async fn forecast(
        &self,
        lot_ids: &[String],
        target: OffsetDateTime,
        hours_ahead: u32,
    ) -> Result<ForecastResponse, RemoteError> {
        let request = ForecastRequest {
            api_version: API_VERSION,
            lot_ids,
            target_time: target.format(&Rfc3339).map_err(RemoteError::Timestamp)?,
            hours_ahead,
        };
        let payload = serde_json::to_string(&request).map_err(RemoteError::Json)?;

        let body = tokio::time::timeout(self.timeout, send_http_json(&self.endpoint, &payload))
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))??;

        let response: ForecastResponse = serde_json::from_str(&body).map_err(RemoteError::Json)?;
        if response.forecasts.iter().all(|f| f.steps.is_empty()) {
            return Err(RemoteError::Empty);
        }
        Ok(response)
    }
}

impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ForecastRequest<'a> {
    api_version: &'static str,
    lot_ids: &'a [String],
    target_time: String,
    hours_ahead: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub model_version: String,
    #[serde(default)]
    pub forecasts: Vec<LotForecast>,
}

impl ForecastResponse {
    pub fn steps_for(&self, lot_id: &str) -> &[ForecastStep] {
        self.forecasts
            .iter()
            .find(|f| f.lot_id == lot_id)
            .map(|f| f.steps.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LotForecast {
    pub lot_id: String,
    #[serde(default)]
    pub steps: Vec<ForecastStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastStep {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub occupancy: f64,
    pub confidence: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default)]
    pub components: Option<ComponentPredictions>,
    #[serde(default)]
    pub factors: Vec<Factor>,
}

#[derive(Debug)]
pub enum RemoteError {
    InvalidUrl(String),
    Dns(String),
    Connect(std::io::Error),
    Io(std::io::Error),
    Http(u16, String),
    Json(serde_json::Error),
    Timestamp(time::error::Format),
    Timeout(Duration),
    Empty,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::InvalidUrl(msg) => write!(f, "invalid url: {msg}"),
            RemoteError::Dns(msg) => write!(f, "dns error: {msg}"),
            RemoteError::Connect(err) => write!(f, "connect error: {err}"),
            RemoteError::Io(err) => write!(f, "io error: {err}"),
            RemoteError::Http(code, body) => {
                write!(f, "http status {code} ({})", body.trim())
            }
            RemoteError::Json(err) => write!(f, "json error: {err}"),
            RemoteError::Timestamp(err) => write!(f, "timestamp error: {err}"),
            RemoteError::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            RemoteError::Empty => write!(f, "empty forecast"),
        }
    }
}

impl std::error::Error for RemoteError {}

struct ParsedUrl {
    host: String,
    port: u16,
    path: String,
}

fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, RemoteError> {
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| RemoteError::InvalidUrl("only http:// supported".to_string()))?;

    let (host_port, path) = match trimmed.split_once('/') {
        Some((host_port, path)) if !path.is_empty() => (host_port, format!("/{path}")),
        Some((host_port, _)) => (host_port, "/".to_string()),
        None => (trimmed, "/".to_string()),
    };

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) if !port.is_empty() => (
            host,
            port.parse::<u16>()
                .map_err(|_| RemoteError::InvalidUrl("invalid port".to_string()))?,
        ),
        Some((host, _)) => (host, 80),
        None => (host_port, 80),
    };
    if host.is_empty() {
        return Err(RemoteError::InvalidUrl("missing host".to_string()));
    }

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

async fn send_http_json(endpoint: &str, body: &str) -> Result<String, RemoteError> {
    let parsed = parse_http_url(endpoint)?;
    let addr = tokio::net::lookup_host((parsed.host.as_str(), parsed.port))
        .await
        .map_err(|err| RemoteError::Dns(err.to_string()))?
        .next()
        .ok_or_else(|| RemoteError::Dns("no addresses resolved".to_string()))?;

    let mut stream = TcpStream::connect(addr).await.map_err(RemoteError::Connect)?;

    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        parsed.path,
        parsed.host,
        body.len(),
        body
    );

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(RemoteError::Io)?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.map_err(RemoteError::Io)?;
    let response = String::from_utf8_lossy(&raw);

    let (headers, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| RemoteError::Http(0, "invalid http response".to_string()))?;

    let status_code = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| RemoteError::Http(0, "missing status code".to_string()))?
        .parse::<u16>()
        .map_err(|_| RemoteError::Http(0, "invalid status code".to_string()))?;

    if status_code >= 400 {
        return Err(RemoteError::Http(status_code, body.to_string()));
    }

    Ok(body.to_string())
}
