//! Live Reading Source
//!
//! Produces the newest row from the reading store.

use async_trait::async_trait;

use crate::application::ports::{ReadingError, ReadingSource, SharedReadingStore};
use crate::domain::reading::Reading;

/// Reading source that delegates to [`ReadingStore::latest`](crate::application::ports::ReadingStore::latest).
///
/// Store errors are propagated unchanged.
pub struct LiveSource {
    store: SharedReadingStore,
}

impl LiveSource {
    /// Create a live source over `store`.
    #[must_use]
    pub fn new(store: SharedReadingStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReadingSource for LiveSource {
    async fn produce(&self) -> Result<Reading, ReadingError> {
        self.store.latest().await
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
