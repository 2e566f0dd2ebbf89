#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Sensor Gateway - Environmental Reading Broadcaster
//!
//! Serves gas/environment sensor readings two ways: a small REST API for
//! the latest reading and recent history, and a WebSocket stream that
//! pushes a fresh reading to every connected dashboard on a fixed cadence.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types
//!   - `reading`: Timestamped measurement maps
//!   - `schema`: Field presets and synthetic samplers
//!   - `danger`: Area danger classification
//!   - `subscriber`: Stream subscriber lifecycle
//!
//! - **Application**: Port definitions
//!   - `ports`: `ReadingStore` and `ReadingSource`
//!
//! - **Infrastructure**: Adapters and servers
//!   - `store`: PostgreSQL and in-memory reading stores
//!   - `source`: Live and synthetic reading sources
//!   - `broadcast`: Subscriber registry and tick loop
//!   - `stream`: WebSocket server
//!   - `http`: Request API and operational endpoints
//!   - `supervisor`: Task lifecycle and graceful shutdown
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────────┐ tick ┌──────────────┐     ┌──────────────┐──► Dashboard 1
//! PostgreSQL ───►│ ReadingSource│─────►│ BroadcastHub │────►│ StreamServer │──► Dashboard 2
//!      │         └──────────────┘      └──────────────┘     └──────────────┘──► Dashboard N
//!      │                │
//!      │                ▼
//!      └─────────► Request API ◄──── GET /api/sensor-data, /api/history
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Readings, schema and subscriber types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::danger::DangerLevel;
pub use domain::reading::{MeasurementValue, Reading, ReadingShapeError};
pub use domain::schema::{FieldKind, FieldSchema, FieldSpec, Sampler, SchemaPreset};
pub use domain::subscriber::{CloseReason, SubscriberId, SubscriberState};

// Ports
pub use application::ports::{
    ReadingError, ReadingSource, ReadingStore, SharedReadingSource, SharedReadingStore,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, Credentials, GatewayConfig, HistorySettings, ServerSettings,
    SourceStrategy, StoreSettings,
};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, FanOut, SharedBroadcastHub, Subscription,
};

// Servers
pub use infrastructure::http::{ApiState, HttpServer, HttpServerError, create_router};
pub use infrastructure::stream::{StreamConfig, StreamError, StreamServer, StreamServerError};
pub use infrastructure::supervisor::{SHUTDOWN_TIMEOUT, ShutdownReport, Supervisor};

// Adapters
pub use infrastructure::source::{LiveSource, SyntheticSource, build_source};
pub use infrastructure::store::{InMemoryReadingStore, PostgresReadingStore};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
