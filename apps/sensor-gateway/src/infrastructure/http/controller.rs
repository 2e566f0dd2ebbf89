//! HTTP Controller (Driver Adapter)
//!
//! Axum handlers for the Request API and the operational endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use super::response::{ApiError, HealthResponse, HealthStatus};
use crate::application::ports::{ReadingError, SharedReadingSource, SharedReadingStore};
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::config::{HistorySettings, SourceStrategy};
use crate::infrastructure::metrics::{self, get_metrics_handle};

const ROUTE_SENSOR_DATA: &str = "/api/sensor-data";
const ROUTE_HISTORY: &str = "/api/history";
const VIDEO_FEED_PLACEHOLDER: &str = "Video feed endpoint - camera streaming is not available";

/// State shared across handlers.
pub struct ApiState {
    source: SharedReadingSource,
    store: SharedReadingStore,
    hub: SharedBroadcastHub,
    strategy: SourceStrategy,
    history: HistorySettings,
    version: String,
    started_at: Instant,
}

impl ApiState {
    /// Create handler state.
    #[must_use]
    pub fn new(
        source: SharedReadingSource,
        store: SharedReadingStore,
        hub: SharedBroadcastHub,
        strategy: SourceStrategy,
        history: HistorySettings,
    ) -> Self {
        Self {
            source,
            store,
            hub,
            strategy,
            history,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(ROUTE_SENSOR_DATA, get(sensor_data))
        .route(ROUTE_HISTORY, get(history))
        .route("/video_feed", get(video_feed))
        .route("/health", get(health))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Request API
// =============================================================================

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

async fn sensor_data(State(state): State<Arc<ApiState>>) -> Response {
    let result = state.source.produce().await.map(Json).map_err(ApiError::from);
    respond(ROUTE_SENSOR_DATA, result)
}

async fn history(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let result = match resolve_limit(query, state.history) {
        Ok(limit) => state
            .store
            .recent(limit)
            .await
            .map(Json)
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };
    respond(ROUTE_HISTORY, result)
}

fn resolve_limit(
    query: Result<Query<HistoryQuery>, QueryRejection>,
    settings: HistorySettings,
) -> Result<u32, ApiError> {
    let invalid = ApiError::InvalidLimit {
        max: settings.max_limit,
    };
    match query {
        Ok(Query(HistoryQuery { limit: None })) => Ok(settings.default_limit),
        Ok(Query(HistoryQuery { limit: Some(n) })) if (1..=settings.max_limit).contains(&n) => {
            Ok(n)
        }
        Ok(_) | Err(_) => Err(invalid),
    }
}

async fn video_feed() -> impl IntoResponse {
    (StatusCode::OK, VIDEO_FEED_PLACEHOLDER)
}

fn respond<T: IntoResponse>(route: &'static str, result: Result<T, ApiError>) -> Response {
    let response = match result {
        Ok(body) => body.into_response(),
        Err(e) => {
            if let ApiError::Reading(reading) = &e {
                metrics::record_reading_error(route, reading);
            }
            match &e {
                ApiError::Reading(ReadingError::NotFound) | ApiError::InvalidLimit { .. } => {
                    tracing::debug!(route, error = ?e, "Request rejected");
                }
                ApiError::Reading(ReadingError::StoreUnavailable(msg)) => {
                    tracing::warn!(route, error = %msg, "Reading store unavailable");
                }
                ApiError::Reading(ReadingError::StoreQuery(msg)) => {
                    tracing::error!(route, error = %msg, "Reading store query failed");
                }
            }
            e.into_response()
        }
    };
    metrics::record_http_response(route, response.status().as_u16());
    response
}

// =============================================================================
// Operational Endpoints
// =============================================================================

async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let status = if state.hub.is_running() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        source: state.strategy.as_str(),
        broadcast: state.hub.stats(),
    })
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    if state.hub.is_running() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
