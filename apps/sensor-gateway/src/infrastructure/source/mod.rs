//! Reading Source Strategies
//!
//! - **Live**: newest row from the reading store
//! - **Synthetic**: randomly generated readings
//!
//! [`build_source`] is the only place that branches on the configured
//! strategy; everything else holds a [`SharedReadingSource`].

pub mod live;
pub mod synthetic;

use std::sync::Arc;

pub use live::LiveSource;
pub use synthetic::{SamplerMismatch, SyntheticSource};

use crate::application::ports::{SharedReadingSource, SharedReadingStore};
use crate::domain::schema::FieldSchema;
use crate::infrastructure::config::SourceStrategy;

/// Build the configured reading source.
///
/// # Errors
///
/// Returns [`SamplerMismatch`] if the synthetic strategy is selected with a
/// schema whose samplers do not fit their fields.
pub fn build_source(
    strategy: SourceStrategy,
    schema: FieldSchema,
    store: SharedReadingStore,
) -> Result<SharedReadingSource, SamplerMismatch> {
    Ok(match strategy {
        SourceStrategy::Live => Arc::new(LiveSource::new(store)),
        SourceStrategy::Synthetic => Arc::new(SyntheticSource::new(schema)?),
    })
}
