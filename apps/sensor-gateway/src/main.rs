//! Sensor Gateway Binary
//!
//! Starts the Request API, the live stream server and the broadcast loop.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sensor-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Store
//! - `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`
//! - `DB_TABLE`: Reading table (default: public.gas_log)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 5)
//!
//! ## Servers
//! - `HTTP_PORT`: Request API port (default: 5001)
//! - `STREAM_PORT`: WebSocket port (default: 7002)
//!
//! ## Broadcast
//! - `READING_SOURCE`: live | synthetic (default: live)
//! - `SENSOR_SCHEMA`: gas_log | robot (default: gas_log)
//! - `TICK_INTERVAL_MS` (default: 3000)
//! - `SEND_TIMEOUT_MS` (default: 2000)
//! - `HANDSHAKE_TIMEOUT_MS` (default: 5000)
//! - `SUBSCRIBER_QUEUE_CAPACITY` (default: 8)
//! - `HISTORY_DEFAULT_LIMIT` (default: 20), `HISTORY_MAX_LIMIT` (default: 100)
//!
//! ## Observability
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: sensor_gateway=info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sensor_gateway::application::ports::{ReadingError, SharedReadingStore};
use sensor_gateway::infrastructure::http::{ApiState, HttpServer, create_router};
use sensor_gateway::infrastructure::stream::{StreamConfig, StreamServer};
use sensor_gateway::infrastructure::supervisor::{Supervisor, shutdown_signal};
use sensor_gateway::infrastructure::telemetry;
use sensor_gateway::{
    BroadcastConfig, BroadcastHub, GatewayConfig, PostgresReadingStore, build_source, init_metrics,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting Sensor Gateway"
    );

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    // Reading store
    let schema = config.schema.schema();
    let postgres = Arc::new(PostgresReadingStore::new(&config.store, schema.clone()));
    match postgres.validate_schema().await {
        Ok(()) => tracing::info!(table = %config.store.table, "Reading table matches schema"),
        Err(ReadingError::StoreUnavailable(e)) => {
            tracing::warn!(error = %e, "Reading store unreachable, skipping schema validation");
        }
        Err(e) => return Err(e).context("reading table does not match the configured schema"),
    }
    let store: SharedReadingStore = postgres;

    let source = build_source(config.source, schema, Arc::clone(&store))
        .context("synthetic samplers do not fit the schema")?;

    let shutdown_token = CancellationToken::new();

    // Broadcast hub
    let hub = Arc::new(BroadcastHub::new(
        BroadcastConfig::from(config.broadcast.clone()),
        Arc::clone(&source),
    ));

    // Servers
    let api_state = Arc::new(ApiState::new(
        source,
        store,
        Arc::clone(&hub),
        config.source,
        config.history,
    ));
    let http_server = HttpServer::bind(
        SocketAddr::from(([0, 0, 0, 0], config.server.http_port)),
        create_router(api_state),
        shutdown_token.clone(),
    )
    .await?;
    let stream_server = StreamServer::bind(
        SocketAddr::from(([0, 0, 0, 0], config.server.stream_port)),
        Arc::clone(&hub),
        StreamConfig::from(&config.broadcast),
        shutdown_token.clone(),
    )
    .await?;

    let mut supervisor = Supervisor::new(shutdown_token.clone());
    supervisor.spawn("request-api", async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "Request API error");
        }
    });
    supervisor.spawn("stream-server", stream_server.run());
    supervisor.spawn("broadcast-loop", {
        let hub = Arc::clone(&hub);
        let cancel = shutdown_token.clone();
        async move { hub.run(cancel).await }
    });

    tracing::info!("Sensor gateway ready");

    let report = supervisor.run_until(shutdown_signal()).await;

    tracing::info!(
        completed = report.completed,
        aborted = report.aborted,
        panicked = report.panicked,
        "Sensor gateway stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        source = config.source.as_str(),
        schema = config.schema.as_str(),
        http_port = config.server.http_port,
        stream_port = config.server.stream_port,
        tick_interval_ms =
            u64::try_from(config.broadcast.tick_interval.as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );
    tracing::debug!(
        host = %config.store.host,
        port = config.store.port,
        database = %config.store.database,
        table = %config.store.table,
        credentials = ?config.store.credentials,
        "Reading store"
    );
}
