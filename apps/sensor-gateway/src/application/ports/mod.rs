//! Port Interfaces
//!
//! Contracts between the broadcast hub / request API and the adapters that
//! produce readings.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`ReadingStore`]: point and range queries against the reading table
//! - [`ReadingSource`]: produces the next reading for a tick or request

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::reading::Reading;

// =============================================================================
// Errors
// =============================================================================

/// Failure to obtain a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadingError {
    /// The store holds no readings. Expected, not exceptional.
    #[error("no readings available")]
    NotFound,

    /// The store could not be reached.
    #[error("reading store unavailable: {0}")]
    StoreUnavailable(String),

    /// The query ran but returned an unexpected shape.
    #[error("reading store query error: {0}")]
    StoreQuery(String),
}

impl ReadingError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::StoreQuery(_) => "store_query",
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Persistence boundary for reading queries.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Most recent reading.
    ///
    /// # Errors
    ///
    /// [`ReadingError::NotFound`] when the store is empty,
    /// [`ReadingError::StoreUnavailable`] / [`ReadingError::StoreQuery`]
    /// on connection or shape failures.
    async fn latest(&self) -> Result<Reading, ReadingError>;

    /// Up to `limit` readings, newest first. An empty store yields an empty
    /// vector.
    ///
    /// # Errors
    ///
    /// [`ReadingError::StoreUnavailable`] / [`ReadingError::StoreQuery`].
    async fn recent(&self, limit: u32) -> Result<Vec<Reading>, ReadingError>;
}

/// Produces the next reading, independent of transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Produce a reading.
    ///
    /// # Errors
    ///
    /// Any [`ReadingError`]; synthetic sources never fail.
    async fn produce(&self) -> Result<Reading, ReadingError>;

    /// Strategy name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Shared store reference.
pub type SharedReadingStore = Arc<dyn ReadingStore>;

/// Shared source reference.
pub type SharedReadingSource = Arc<dyn ReadingSource>;

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(ReadingError::NotFound => "not_found")]
    #[test_case(ReadingError::StoreUnavailable("refused".into()) => "store_unavailable")]
    #[test_case(ReadingError::StoreQuery("bad cast".into()) => "store_query")]
    fn error_kind_labels(error: ReadingError) -> &'static str {
        error.kind()
    }
}
