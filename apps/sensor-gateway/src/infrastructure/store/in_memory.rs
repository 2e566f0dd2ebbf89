//! In-memory reading store for testing.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{ReadingError, ReadingStore};
use crate::domain::reading::Reading;

/// In-memory implementation of [`ReadingStore`].
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<Reading>>,
    failure: RwLock<Option<ReadingError>>,
}

impl InMemoryReadingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `readings`.
    #[must_use]
    pub fn with_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let store = Self::new();
        for reading in readings {
            store.insert(reading);
        }
        store
    }

    /// Add a reading (for test setup).
    pub fn insert(&self, reading: Reading) {
        self.readings.write().push(reading);
    }

    /// Make every query fail with `error` until cleared with `None`
    /// (simulates an outage).
    pub fn set_failure(&self, error: Option<ReadingError>) {
        *self.failure.write() = error;
    }

    fn check_failure(&self) -> Result<(), ReadingError> {
        self.failure.read().clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn latest(&self) -> Result<Reading, ReadingError> {
        self.check_failure()?;
        self.readings
            .read()
            .iter()
            .max_by_key(|r| r.timestamp())
            .cloned()
            .ok_or(ReadingError::NotFound)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Reading>, ReadingError> {
        self.check_failure()?;
        let mut readings = self.readings.read().clone();
        readings.sort_by_key(|r| std::cmp::Reverse(r.timestamp()));
        readings.truncate(limit as usize);
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use indexmap::IndexMap;
    use proptest::prelude::*;

    use super::*;
    use crate::domain::reading::MeasurementValue;
    use crate::domain::schema::FieldSchema;

    fn reading_at(ts: DateTime<Utc>, co2: i64) -> Reading {
        let values = IndexMap::from([
            ("co2".to_string(), MeasurementValue::Integer(co2)),
            ("co".to_string(), MeasurementValue::Real(2.5)),
            ("lpg".to_string(), MeasurementValue::Integer(400)),
            ("h2s".to_string(), MeasurementValue::Real(0.1)),
            ("status".to_string(), MeasurementValue::Text("Low".into())),
        ]);
        Reading::new(&FieldSchema::gas_log(), ts, values).unwrap()
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn empty_store_latest_is_not_found() {
        let store = InMemoryReadingStore::new();
        assert_eq!(store.latest().await, Err(ReadingError::NotFound));
    }

    #[tokio::test]
    async fn empty_store_recent_is_empty() {
        let store = InMemoryReadingStore::new();
        assert!(store.recent(20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_picks_max_timestamp_regardless_of_insert_order() {
        let store = InMemoryReadingStore::with_readings([
            reading_at(base() + Duration::seconds(5), 2),
            reading_at(base() + Duration::seconds(10), 3),
            reading_at(base(), 1),
        ]);
        assert_eq!(store.latest().await.unwrap().number("co2"), Some(3.0));
    }

    #[tokio::test]
    async fn failure_overrides_contents() {
        let store = InMemoryReadingStore::with_readings([reading_at(base(), 1)]);
        store.set_failure(Some(ReadingError::StoreUnavailable("down".into())));
        assert!(matches!(
            store.latest().await,
            Err(ReadingError::StoreUnavailable(_))
        ));
        store.set_failure(None);
        assert!(store.latest().await.is_ok());
    }

    proptest! {
        #[test]
        fn recent_is_bounded_and_strictly_descending(
            offsets in proptest::collection::hash_set(0i64..10_000, 0..40),
            limit in 1u32..50,
        ) {
            let store = InMemoryReadingStore::with_readings(
                offsets.iter().map(|s| reading_at(base() + Duration::seconds(*s), *s)),
            );
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let recent = rt.block_on(store.recent(limit)).unwrap();

            prop_assert_eq!(recent.len(), offsets.len().min(limit as usize));
            for pair in recent.windows(2) {
                prop_assert!(pair[0].timestamp() > pair[1].timestamp());
            }
            if let Some(max) = offsets.iter().max() {
                prop_assert_eq!(recent[0].number("co2"), Some(*max as f64));
            }
        }
    }
}
