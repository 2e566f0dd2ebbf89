//! Sensor Reading Types
//!
//! A [`Reading`] is one timestamped snapshot of every field declared by a
//! [`FieldSchema`](crate::domain::schema::FieldSchema). Readings are
//! immutable once built: the store adapters and the synthetic generator
//! construct them, everything downstream only serializes them.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::schema::{FieldKind, FieldSchema};

// =============================================================================
// Measurement Values
// =============================================================================

/// A single measured value.
///
/// Serialized untagged, so integers and reals become JSON numbers and text
/// becomes a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Whole-number measurement (ppm counts, degrees).
    Integer(i64),
    /// Real-valued measurement.
    Real(f64),
    /// Categorical label (sector, danger level).
    Text(String),
}

impl MeasurementValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Integer(_) => FieldKind::Integer,
            Self::Real(_) => FieldKind::Real,
            Self::Text(_) => FieldKind::Text,
        }
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Text view of the value, if it is a label.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value can be stored in a field of `kind`.
    ///
    /// Integers are accepted for real fields; nothing else converts.
    #[must_use]
    pub const fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Integer(_), FieldKind::Integer | FieldKind::Real)
                | (Self::Real(_), FieldKind::Real)
                | (Self::Text(_), FieldKind::Text)
        )
    }
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Error building a [`Reading`] from raw values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadingShapeError {
    /// A declared field had no value.
    #[error("missing value for field `{0}`")]
    MissingField(String),

    /// A value does not match the declared kind.
    #[error("field `{field}` expected {expected}, got {actual}")]
    KindMismatch {
        /// Field name.
        field: String,
        /// Declared kind.
        expected: FieldKind,
        /// Kind of the supplied value.
        actual: FieldKind,
    },

    /// A value was supplied for a field the schema does not declare.
    #[error("unexpected field `{0}`")]
    UnexpectedField(String),
}

/// One timestamped snapshot of measurement fields.
///
/// Serializes as a flat JSON object: `timestamp` first, then every
/// measurement field in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    values: IndexMap<String, MeasurementValue>,
}

impl Reading {
    /// Build a reading, checking the values against `schema`.
    ///
    /// Values are reordered to schema order. Every declared field must be
    /// present with a compatible kind and no undeclared field may appear.
    ///
    /// # Errors
    ///
    /// Returns [`ReadingShapeError`] when the values do not match the schema.
    pub fn new(
        schema: &FieldSchema,
        timestamp: DateTime<Utc>,
        mut values: IndexMap<String, MeasurementValue>,
    ) -> Result<Self, ReadingShapeError> {
        let mut ordered = IndexMap::with_capacity(schema.len());

        for spec in schema.fields() {
            let value = values
                .shift_remove(spec.name())
                .ok_or_else(|| ReadingShapeError::MissingField(spec.name().to_string()))?;

            if !value.fits(spec.kind()) {
                return Err(ReadingShapeError::KindMismatch {
                    field: spec.name().to_string(),
                    expected: spec.kind(),
                    actual: value.kind(),
                });
            }

            ordered.insert(spec.name().to_string(), value);
        }

        if let Some((extra, _)) = values.into_iter().next() {
            return Err(ReadingShapeError::UnexpectedField(extra));
        }

        Ok(Self {
            timestamp,
            values: ordered,
        })
    }

    /// When the reading was taken.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Look up a measurement by field name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&MeasurementValue> {
        self.values.get(field)
    }

    /// Numeric measurement by field name.
    #[must_use]
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(MeasurementValue::as_f64)
    }

    /// Iterate over measurements in schema order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &MeasurementValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of measurement fields (excluding the timestamp).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the reading carries no measurement fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
