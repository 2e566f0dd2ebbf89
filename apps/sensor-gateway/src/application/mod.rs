//! Application Layer - Port definitions.
//!
//! Interfaces that let the broadcast hub and the request API stay unaware
//! of which store or reading strategy is wired in.

/// Port interfaces for reading stores and sources.
pub mod ports;
