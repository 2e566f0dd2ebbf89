//! Field Schema
//!
//! Statically declared description of the measurement fields a deployment
//! carries. The same schema drives three things:
//!
//! - the column list the store adapter selects (and validates at startup)
//! - the shape check applied to every [`Reading`](crate::domain::reading::Reading)
//! - the distributions the synthetic source samples from
//!
//! Two presets cover the known deployments: [`FieldSchema::gas_log`] for the
//! stationary gas logger table and [`FieldSchema::robot`] for the mobile
//! unit that also reports heading, travelled distance and sector.

use std::fmt;

// =============================================================================
// Field Kind
// =============================================================================

/// Value kind of a measurement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Whole number.
    Integer,
    /// Real number.
    Real,
    /// Text label.
    Text,
}

impl FieldKind {
    /// Lowercase kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sampler
// =============================================================================

/// Distribution the synthetic source draws a field from.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampler {
    /// Uniform integer in `min..=max`.
    UniformInt {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Uniform real in `min..=max`, rounded to `decimals` places.
    UniformReal {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
        /// Decimal places kept after rounding.
        decimals: u32,
    },
    /// `"{prefix} {letter}-{n}"` with `letter` drawn from `letters` and `n`
    /// uniform in `1..=max_index`.
    Sector {
        /// Label prefix.
        prefix: &'static str,
        /// Candidate sector letters.
        letters: &'static [char],
        /// Highest sub-sector number.
        max_index: u32,
    },
    /// Not sampled: computed from the other sampled gas levels with
    /// [`DangerLevel::classify`](crate::domain::danger::DangerLevel::classify).
    DangerLevel,
}

// =============================================================================
// Field Spec
// =============================================================================

/// One declared measurement field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: &'static str,
    column: &'static str,
    kind: FieldKind,
    sampler: Sampler,
}

impl FieldSpec {
    /// Declare a field.
    #[must_use]
    pub const fn new(
        name: &'static str,
        column: &'static str,
        kind: FieldKind,
        sampler: Sampler,
    ) -> Self {
        Self {
            name,
            column,
            kind,
            sampler,
        }
    }

    /// JSON field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Store column the field is read from.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        self.column
    }

    /// Value kind.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Synthetic distribution.
    #[must_use]
    pub const fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

// =============================================================================
// Field Schema
// =============================================================================

/// Name of the timestamp column every schema implies.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Selectable schema presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaPreset {
    /// Stationary gas logger (`co2`, `co`, `lpg`, `h2s`, `status`).
    #[default]
    GasLog,
    /// Mobile unit: gas logger fields plus `direction`, `distance`, `gasLocation`.
    Robot,
}

impl SchemaPreset {
    /// Parse a preset name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gas_log" | "gaslog" | "gas-log" => Some(Self::GasLog),
            "robot" => Some(Self::Robot),
            _ => None,
        }
    }

    /// Preset name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GasLog => "gas_log",
            Self::Robot => "robot",
        }
    }

    /// Build the schema for this preset.
    #[must_use]
    pub fn schema(self) -> FieldSchema {
        match self {
            Self::GasLog => FieldSchema::gas_log(),
            Self::Robot => FieldSchema::robot(),
        }
    }
}

/// Ordered set of measurement fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// Build a schema from field specs.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if a field name or column repeats, or if a
    /// name or column collides with the implied `timestamp` field.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut names = std::collections::HashSet::new();
        let mut columns = std::collections::HashSet::new();

        for spec in &fields {
            if spec.name == TIMESTAMP_COLUMN || spec.column == TIMESTAMP_COLUMN {
                return Err(SchemaError::ReservedName(spec.name.to_string()));
            }
            if !names.insert(spec.name) {
                return Err(SchemaError::DuplicateField(spec.name.to_string()));
            }
            if !columns.insert(spec.column) {
                return Err(SchemaError::DuplicateColumn(spec.column.to_string()));
            }
        }

        Ok(Self { fields })
    }

    /// Stationary gas logger schema.
    #[must_use]
    pub fn gas_log() -> Self {
        Self {
            fields: gas_fields(),
        }
    }

    /// Mobile unit schema.
    #[must_use]
    pub fn robot() -> Self {
        let mut fields = gas_fields();
        fields.extend([
            FieldSpec::new(
                "direction",
                "direction",
                FieldKind::Integer,
                Sampler::UniformInt { min: 0, max: 360 },
            ),
            FieldSpec::new(
                "distance",
                "distance",
                FieldKind::Real,
                Sampler::UniformReal {
                    min: 5.0,
                    max: 20.0,
                    decimals: 1,
                },
            ),
            FieldSpec::new(
                "gasLocation",
                "gas_location",
                FieldKind::Text,
                Sampler::Sector {
                    prefix: "Sector",
                    letters: &['A', 'B', 'C'],
                    max_index: 5,
                },
            ),
        ]);
        Self { fields }
    }

    /// Declared fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by JSON name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Store columns the schema reads, including the timestamp column.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(TIMESTAMP_COLUMN).chain(self.fields.iter().map(|f| f.column))
    }

    /// Number of measurement fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no measurement fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Columns from this schema that are absent from `available`.
    #[must_use]
    pub fn missing_columns<'a, I>(&self, available: I) -> Vec<&'static str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: std::collections::HashSet<&str> = available.into_iter().collect();
        self.columns()
            .filter(|c| !available.contains(c))
            .collect()
    }
}

fn gas_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(
            "co2",
            "co2_ppm",
            FieldKind::Integer,
            Sampler::UniformInt { min: 300, max: 600 },
        ),
        FieldSpec::new(
            "co",
            "co_ppm",
            FieldKind::Real,
            Sampler::UniformReal {
                min: 1.0,
                max: 10.0,
                decimals: 1,
            },
        ),
        FieldSpec::new(
            "lpg",
            "lpg_ppm",
            FieldKind::Integer,
            Sampler::UniformInt {
                min: 100,
                max: 1000,
            },
        ),
        FieldSpec::new(
            "h2s",
            "h2s_ppm",
            FieldKind::Real,
            Sampler::UniformReal {
                min: 0.01,
                max: 1.5,
                decimals: 2,
            },
        ),
        FieldSpec::new("status", "area_pred", FieldKind::Text, Sampler::DangerLevel),
    ]
}

/// Schema construction error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two fields share a JSON name.
    #[error("duplicate field name `{0}`")]
    DuplicateField(String),
    /// Two fields read the same column.
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    /// A field uses the reserved timestamp name.
    #[error("field `{0}` collides with the timestamp column")]
    ReservedName(String),
}

// =============================================================================
// Tests
// =============================================================================
