//! Synthetic Reading Source
//!
//! Generates readings by sampling every schema field independently from its
//! declared [`Sampler`]. The `status` field is not sampled: it is derived
//! from the sampled gas levels so that generated readings stay internally
//! consistent.

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::application::ports::{ReadingError, ReadingSource};
use crate::domain::danger::DangerLevel;
use crate::domain::reading::{MeasurementValue, Reading};
use crate::domain::schema::{FieldKind, FieldSchema, Sampler};

/// A sampler that cannot produce values of its field's kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sampler for field `{field}` cannot produce {kind} values")]
pub struct SamplerMismatch {
    /// Field name.
    pub field: String,
    /// Declared kind.
    pub kind: FieldKind,
}

/// Reading source that synthesizes values.
pub struct SyntheticSource {
    schema: FieldSchema,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    /// Create a source seeded from the operating system.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerMismatch`] if a field's sampler does not produce
    /// values of the field's kind.
    pub fn new(schema: FieldSchema) -> Result<Self, SamplerMismatch> {
        Self::with_rng(schema, StdRng::from_os_rng())
    }

    /// Create a source with a fixed seed (reproducible output).
    ///
    /// # Errors
    ///
    /// See [`SyntheticSource::new`].
    pub fn seeded(schema: FieldSchema, seed: u64) -> Result<Self, SamplerMismatch> {
        Self::with_rng(schema, StdRng::seed_from_u64(seed))
    }

    fn with_rng(schema: FieldSchema, rng: StdRng) -> Result<Self, SamplerMismatch> {
        if let Some(spec) = schema
            .fields()
            .iter()
            .find(|f| !sampler_produces(f.sampler(), f.kind()))
        {
            return Err(SamplerMismatch {
                field: spec.name().to_string(),
                kind: spec.kind(),
            });
        }

        Ok(Self {
            schema,
            rng: Mutex::new(rng),
        })
    }

    /// Generate one reading stamped with the current time.
    #[must_use]
    pub fn sample(&self) -> Reading {
        let mut values = IndexMap::with_capacity(self.schema.len());
        {
            let mut rng = self.rng.lock();
            for spec in self.schema.fields() {
                if let Some(value) = sample_value(spec.sampler(), &mut *rng) {
                    values.insert(spec.name().to_string(), value);
                }
            }
        }

        let level = classify(&values);
        for spec in self.schema.fields() {
            if matches!(spec.sampler(), Sampler::DangerLevel) {
                values.insert(
                    spec.name().to_string(),
                    MeasurementValue::Text(level.as_str().to_string()),
                );
            }
        }

        // Every field is filled and kinds were checked in the constructor.
        match Reading::new(&self.schema, Utc::now(), values) {
            Ok(reading) => reading,
            Err(e) => unreachable!("synthetic reading does not match its schema: {e}"),
        }
    }
}

#[async_trait]
impl ReadingSource for SyntheticSource {
    async fn produce(&self) -> Result<Reading, ReadingError> {
        Ok(self.sample())
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

const fn sampler_produces(sampler: &Sampler, kind: FieldKind) -> bool {
    matches!(
        (sampler, kind),
        (Sampler::UniformInt { .. }, FieldKind::Integer | FieldKind::Real)
            | (Sampler::UniformReal { .. }, FieldKind::Real)
            | (Sampler::Sector { .. } | Sampler::DangerLevel, FieldKind::Text)
    )
}

fn sample_value<R: Rng + ?Sized>(sampler: &Sampler, rng: &mut R) -> Option<MeasurementValue> {
    match sampler {
        Sampler::UniformInt { min, max } => {
            Some(MeasurementValue::Integer(rng.random_range(*min..=*max)))
        }
        Sampler::UniformReal { min, max, decimals } => {
            let raw = rng.random_range(*min..=*max);
            Some(MeasurementValue::Real(round_to(raw, *decimals).clamp(*min, *max)))
        }
        Sampler::Sector {
            prefix,
            letters,
            max_index,
        } => {
            let letter = letters[rng.random_range(0..letters.len())];
            let index = rng.random_range(1..=*max_index);
            Some(MeasurementValue::Text(format!("{prefix} {letter}-{index}")))
        }
        Sampler::DangerLevel => None,
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

fn classify(values: &IndexMap<String, MeasurementValue>) -> DangerLevel {
    let gas = |name: &str| {
        values
            .get(name)
            .and_then(MeasurementValue::as_f64)
            .unwrap_or(0.0)
    };
    DangerLevel::classify(gas("lpg"), gas("co"), gas("h2s"))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::schema::FieldSpec;

    #[tokio::test]
    async fn produce_never_fails_and_fills_every_field() {
        let source = SyntheticSource::seeded(FieldSchema::robot(), 7).unwrap();
        let reading = source.produce().await.unwrap();
        assert_eq!(reading.len(), FieldSchema::robot().len());
        assert_eq!(source.name(), "synthetic");
    }

    #[test]
    fn status_is_derived_from_gas_levels() {
        let source = SyntheticSource::seeded(FieldSchema::gas_log(), 42).unwrap();
        for _ in 0..200 {
            let reading = source.sample();
            let expected = DangerLevel::classify(
                reading.number("lpg").unwrap(),
                reading.number("co").unwrap(),
                reading.number("h2s").unwrap(),
            );
            assert_eq!(
                reading.get("status").and_then(MeasurementValue::as_text),
                Some(expected.as_str())
            );
        }
    }

    #[test]
    fn sector_labels_follow_pattern() {
        let source = SyntheticSource::seeded(FieldSchema::robot(), 3).unwrap();
        for _ in 0..100 {
            let reading = source.sample();
            let label = reading
                .get("gasLocation")
                .and_then(MeasurementValue::as_text)
                .unwrap()
                .to_string();
            let rest = label.strip_prefix("Sector ").unwrap();
            let (letter, index) = rest.split_once('-').unwrap();
            assert!(["A", "B", "C"].contains(&letter));
            assert!((1..=5).contains(&index.parse::<u32>().unwrap()));
        }
    }

    #[test]
    fn same_seed_same_values() {
        let a = SyntheticSource::seeded(FieldSchema::gas_log(), 99).unwrap();
        let b = SyntheticSource::seeded(FieldSchema::gas_log(), 99).unwrap();
        let va: Vec<_> = a.sample().values().map(|(_, v)| v.clone()).collect();
        let vb: Vec<_> = b.sample().values().map(|(_, v)| v.clone()).collect();
        assert_eq!(va, vb);
    }

    #[test]
    fn mismatched_sampler_rejected() {
        let schema = FieldSchema::new(vec![FieldSpec::new(
            "co2",
            "co2_ppm",
            FieldKind::Integer,
            Sampler::DangerLevel,
        )])
        .unwrap();
        let err = SyntheticSource::new(schema).err().unwrap();
        assert_eq!(err.field, "co2");
    }

    #[test]
    fn rounding() {
        assert!((round_to(1.2345, 2) - 1.23).abs() < f64::EPSILON);
        assert!((round_to(9.96, 1) - 10.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn sampled_values_stay_in_declared_ranges(seed in any::<u64>()) {
            let schema = FieldSchema::robot();
            let source = SyntheticSource::seeded(schema.clone(), seed).unwrap();
            let reading = source.sample();

            for spec in schema.fields() {
                let value = reading.get(spec.name()).unwrap();
                match spec.sampler() {
                    Sampler::UniformInt { min, max } => {
                        let MeasurementValue::Integer(v) = value else {
                            return Err(TestCaseError::fail("expected integer"));
                        };
                        prop_assert!((*min..=*max).contains(v));
                    }
                    Sampler::UniformReal { min, max, .. } => {
                        let v = value.as_f64().unwrap();
                        prop_assert!(v >= *min && v <= *max);
                    }
                    Sampler::Sector { .. } | Sampler::DangerLevel => {
                        prop_assert!(value.as_text().is_some());
                    }
                }
            }
        }
    }
}
