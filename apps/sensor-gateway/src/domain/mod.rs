//! Domain Layer - Core reading and subscriber types.
//!
//! Pure types with no I/O: readings, the field schema that shapes them,
//! danger classification, and the stream subscriber lifecycle.

/// Immutable timestamped readings.
pub mod reading;

/// Declared measurement fields and presets.
pub mod schema;

/// Area danger classification from gas levels.
pub mod danger;

/// Stream subscriber identity and lifecycle.
pub mod subscriber;
