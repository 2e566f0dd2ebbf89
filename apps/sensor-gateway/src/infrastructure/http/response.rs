//! HTTP response types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ports::ReadingError;
use crate::infrastructure::broadcast::BroadcastStats;

/// Error body returned by every Request API failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
}

/// Request API failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Obtaining a reading failed.
    Reading(ReadingError),
    /// `limit` was missing a value, malformed or out of range.
    InvalidLimit {
        /// Largest accepted limit.
        max: u32,
    },
}

impl ApiError {
    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Reading(ReadingError::NotFound) => StatusCode::NOT_FOUND,
            Self::Reading(ReadingError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Reading(ReadingError::StoreQuery(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidLimit { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Reading(ReadingError::NotFound) => "No data available".to_string(),
            Self::Reading(e) => e.to_string(),
            Self::InvalidLimit { max } => format!("limit must be an integer in 1..={max}"),
        }
    }
}

impl From<ReadingError> for ApiError {
    fn from(e: ReadingError) -> Self {
        Self::Reading(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Broadcast loop running.
    Healthy,
    /// Broadcast loop not running; the Request API still answers.
    Degraded,
}

/// `/health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Seconds since the API state was created.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Configured reading strategy.
    pub source: &'static str,
    /// Hub counters.
    pub broadcast: BroadcastStats,
}
