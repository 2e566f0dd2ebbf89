//! PostgreSQL Reading Store Integration Tests
//!
//! Runs against a real database. Each test seeds its own schema and drops
//! it afterwards.
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://postgres@localhost/postgres \
//!     cargo test -p sensor-gateway --test postgres_store -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};

use sensor_gateway::{
    FieldSchema, MeasurementValue, PostgresReadingStore, ReadingError, ReadingStore,
};

/// Gas logger table with the timestamp type given.
const GAS_LOG_COLUMNS: &str = "co2_ppm BIGINT, co_ppm DOUBLE PRECISION, lpg_ppm BIGINT, \
                               h2s_ppm DOUBLE PRECISION, area_pred TEXT";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

/// Get test database URL from environment.
fn get_test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("TEST_DATABASE_URL required")
}

/// A throwaway schema holding one `gas_log` table.
struct Fixture {
    options: PgConnectOptions,
    conn: PgConnection,
    schema: String,
}

impl Fixture {
    async fn new(timestamp_type: &str, columns: &str) -> Self {
        let options = PgConnectOptions::from_str(&get_test_database_url()).unwrap();
        let mut conn = options.connect().await.unwrap();
        let schema = format!("sg_test_{}", uuid::Uuid::new_v4().simple());

        sqlx::raw_sql(&format!(
            "CREATE SCHEMA {schema}; \
             CREATE TABLE {schema}.gas_log (\"timestamp\" {timestamp_type} NOT NULL, {columns});"
        ))
        .execute(&mut conn)
        .await
        .unwrap();

        Self {
            options,
            conn,
            schema,
        }
    }

    async fn gas_log() -> Self {
        Self::new("TIMESTAMPTZ", GAS_LOG_COLUMNS).await
    }

    fn store(&self) -> PostgresReadingStore {
        PostgresReadingStore::with_options(
            self.options.clone(),
            &format!("{}.gas_log", self.schema),
            Duration::from_secs(5),
            FieldSchema::gas_log(),
        )
    }

    async fn insert(&mut self, ts: DateTime<Utc>, co2: i64, co: Option<f64>) {
        sqlx::query(&format!(
            "INSERT INTO {}.gas_log VALUES ($1, $2, $3, 320, 0.05, 'Low')",
            self.schema
        ))
        .bind(ts)
        .bind(co2)
        .bind(co)
        .execute(&mut self.conn)
        .await
        .unwrap();
    }

    async fn teardown(mut self) {
        sqlx::raw_sql(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&mut self.conn)
            .await
            .unwrap();
        self.conn.close().await.unwrap();
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn empty_table_has_no_latest_and_empty_history() {
    let fixture = Fixture::gas_log().await;
    let store = fixture.store();

    assert_eq!(store.latest().await, Err(ReadingError::NotFound));
    assert!(store.recent(20).await.unwrap().is_empty());
    store.validate_schema().await.unwrap();

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn single_row_maps_through_aliases() {
    let mut fixture = Fixture::gas_log().await;
    fixture.insert(t0(), 450, Some(2.5)).await;
    let store = fixture.store();

    let reading = store.latest().await.unwrap();
    assert_eq!(reading.timestamp(), t0());
    assert_eq!(reading.get("co2"), Some(&MeasurementValue::Integer(450)));
    assert_eq!(reading.get("co"), Some(&MeasurementValue::Real(2.5)));
    assert_eq!(reading.get("lpg"), Some(&MeasurementValue::Integer(320)));
    assert_eq!(reading.get("h2s"), Some(&MeasurementValue::Real(0.05)));
    assert_eq!(
        reading.get("status"),
        Some(&MeasurementValue::Text("Low".to_string()))
    );

    assert_eq!(store.recent(20).await.unwrap(), vec![reading]);

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn newest_rows_come_first() {
    let mut fixture = Fixture::gas_log().await;
    // Insert out of order so only ORDER BY can sort them.
    for i in 0..25_i64 {
        let minute = (i * 7) % 25;
        fixture
            .insert(t0() + chrono::Duration::minutes(minute), 400 + minute, Some(1.0))
            .await;
    }
    let store = fixture.store();

    let latest = store.latest().await.unwrap();
    assert_eq!(latest.timestamp(), t0() + chrono::Duration::minutes(24));
    assert_eq!(latest.get("co2"), Some(&MeasurementValue::Integer(424)));

    let recent = store.recent(20).await.unwrap();
    assert_eq!(recent.len(), 20);
    assert_eq!(recent[0], latest);
    assert!(
        recent
            .windows(2)
            .all(|pair| pair[0].timestamp() > pair[1].timestamp())
    );
    assert_eq!(
        recent[19].timestamp(),
        t0() + chrono::Duration::minutes(5)
    );

    assert_eq!(store.recent(100).await.unwrap().len(), 25);

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn null_measurement_is_a_query_error() {
    let mut fixture = Fixture::gas_log().await;
    fixture.insert(t0(), 450, None).await;
    let store = fixture.store();

    match store.latest().await {
        Err(ReadingError::StoreQuery(msg)) => assert!(msg.contains("co_ppm"), "{msg}"),
        other => panic!("expected StoreQuery, got {other:?}"),
    }

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn non_finite_measurement_is_a_query_error() {
    let mut fixture = Fixture::gas_log().await;
    fixture.insert(t0(), 450, Some(f64::NAN)).await;
    let store = fixture.store();

    assert!(matches!(
        store.latest().await,
        Err(ReadingError::StoreQuery(_))
    ));

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn zoneless_timestamp_is_read_as_utc() {
    let mut fixture = Fixture::new("TIMESTAMP", GAS_LOG_COLUMNS).await;
    sqlx::query(&format!(
        "INSERT INTO {}.gas_log VALUES ($1, 450, 2.5, 320, 0.05, 'Low')",
        fixture.schema
    ))
    .bind(t0().naive_utc())
    .execute(&mut fixture.conn)
    .await
    .unwrap();
    let store = fixture.store();

    assert_eq!(store.latest().await.unwrap().timestamp(), t0());

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn missing_column_fails_validation_and_queries() {
    let fixture = Fixture::new(
        "TIMESTAMPTZ",
        "co2_ppm BIGINT, co_ppm DOUBLE PRECISION, lpg_ppm BIGINT, h2s_ppm DOUBLE PRECISION",
    )
    .await;
    let store = fixture.store();

    match store.validate_schema().await {
        Err(ReadingError::StoreQuery(msg)) => assert!(msg.contains("area_pred"), "{msg}"),
        other => panic!("expected StoreQuery, got {other:?}"),
    }
    assert!(matches!(
        store.latest().await,
        Err(ReadingError::StoreQuery(_))
    ));

    fixture.teardown().await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL TEST_DATABASE_URL"]
async fn missing_table_fails_validation() {
    let fixture = Fixture::gas_log().await;
    let store = PostgresReadingStore::with_options(
        fixture.options.clone(),
        &format!("{}.no_such_table", fixture.schema),
        Duration::from_secs(5),
        FieldSchema::gas_log(),
    );

    match store.validate_schema().await {
        Err(ReadingError::StoreQuery(msg)) => assert!(msg.contains("not found"), "{msg}"),
        other => panic!("expected StoreQuery, got {other:?}"),
    }

    fixture.teardown().await;
}
