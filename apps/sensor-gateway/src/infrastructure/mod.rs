//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the servers and runtime plumbing around them.

/// Broadcast hub: subscriber registry and tick loop.
pub mod broadcast;

/// Configuration loaded from the environment.
pub mod config;

/// Request API HTTP adapter.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Reading source strategies (live, synthetic).
pub mod source;

/// Reading store adapters (PostgreSQL, in-memory).
pub mod store;

/// WebSocket stream server.
pub mod stream;

/// Task supervision and graceful shutdown.
pub mod supervisor;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
