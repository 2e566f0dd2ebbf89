//! Request API
//!
//! Stateless HTTP adapter serving readings on demand.
//!
//! # Endpoints
//!
//! - `GET /api/sensor-data` - Latest reading (404 when the store is empty)
//! - `GET /api/history` - Newest-first readings, optional `?limit=`
//! - `GET /video_feed` - Plain-text placeholder
//! - `GET /health` - JSON health status with hub counters
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (broadcast loop running)
//! - `GET /metrics` - Prometheus metrics in text format

mod controller;
mod response;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use controller::{ApiState, create_router};
pub use response::{ApiError, ErrorResponse, HealthResponse, HealthStatus};

/// Request API HTTP server.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`HttpServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        router: Router,
        cancel: CancellationToken,
    ) -> Result<Self, HttpServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(addr, e.to_string()))?;

        Ok(Self {
            listener,
            router,
            cancel,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until cancelled, draining in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`HttpServerError::ServerFailed`] if the server stops with an
    /// I/O error.
    pub async fn run(self) -> Result<(), HttpServerError> {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, "Request API listening");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Request API stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind the listener.
    #[error("failed to bind Request API to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
