//! Reading Store Adapters
//!
//! Implementations of [`ReadingStore`](crate::application::ports::ReadingStore).

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryReadingStore;
pub use postgres::PostgresReadingStore;
