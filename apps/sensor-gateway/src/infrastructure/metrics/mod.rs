//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Broadcast ticks by outcome
//! - **Messages**: Messages delivered to stream subscribers
//! - **Subscribers**: Active count, closes by reason, failed handshakes
//! - **HTTP**: Request API responses by route and status
//! - **Store**: Query latency, reading errors by kind
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::ReadingError;
use crate::domain::subscriber::CloseReason;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "sensor_gateway_ticks_total",
        "Broadcast ticks by outcome"
    );
    describe_counter!(
        "sensor_gateway_messages_sent_total",
        "Readings delivered to stream subscribers"
    );
    describe_gauge!(
        "sensor_gateway_subscribers",
        "Number of active stream subscribers"
    );
    describe_counter!(
        "sensor_gateway_subscribers_closed_total",
        "Stream subscribers closed by reason"
    );
    describe_counter!(
        "sensor_gateway_handshake_failures_total",
        "WebSocket upgrades that failed or timed out"
    );
    describe_counter!(
        "sensor_gateway_http_responses_total",
        "Request API responses by route and status"
    );
    describe_histogram!(
        "sensor_gateway_store_query_seconds",
        "Reading store query latency including connect"
    );
    describe_counter!(
        "sensor_gateway_reading_errors_total",
        "Failed reading lookups by error kind and caller"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome of one broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A reading was produced and fanned out.
    Broadcast,
    /// The store was empty.
    NoData,
    /// Producing the reading failed.
    Failed,
}

impl TickOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::NoData => "no_data",
            Self::Failed => "failed",
        }
    }
}

/// Record a completed tick.
pub fn record_tick(outcome: TickOutcome) {
    counter!("sensor_gateway_ticks_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record readings delivered to subscribers.
pub fn record_messages_sent(count: u64) {
    counter!("sensor_gateway_messages_sent_total").increment(count);
}

/// Update the active subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("sensor_gateway_subscribers").set(count as f64);
}

/// Record a subscriber leaving the registry.
pub fn record_subscriber_closed(reason: CloseReason) {
    counter!(
        "sensor_gateway_subscribers_closed_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a failed WebSocket upgrade.
pub fn record_handshake_failure() {
    counter!("sensor_gateway_handshake_failures_total").increment(1);
}

/// Record a Request API response.
pub fn record_http_response(route: &'static str, status: u16) {
    counter!(
        "sensor_gateway_http_responses_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record store query duration.
pub fn record_store_query(op: &'static str, duration: Duration) {
    histogram!("sensor_gateway_store_query_seconds", "op" => op).record(duration.as_secs_f64());
}

/// Record a failed reading lookup. `caller` is the tick loop or an API route.
pub fn record_reading_error(caller: &'static str, error: &ReadingError) {
    counter!(
        "sensor_gateway_reading_errors_total",
        "kind" => error.kind(),
        "caller" => caller
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
