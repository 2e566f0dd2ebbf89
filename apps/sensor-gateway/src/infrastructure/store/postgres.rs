//! PostgreSQL Reading Store
//!
//! Reads the sensor log table. Every call opens its own connection and
//! closes it before returning; there is no pool.
//!
//! Column values are cast in SQL to the schema's kinds (`BIGINT`,
//! `DOUBLE PRECISION`, `TEXT`) so numeric, real and integer columns all
//! decode the same way.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{ConnectOptions, Connection, Row};

use crate::application::ports::{ReadingError, ReadingStore};
use crate::domain::reading::{MeasurementValue, Reading};
use crate::domain::schema::{FieldKind, FieldSchema, FieldSpec, TIMESTAMP_COLUMN};
use crate::infrastructure::config::StoreSettings;
use crate::infrastructure::metrics;

/// Reading store backed by a PostgreSQL table.
pub struct PostgresReadingStore {
    options: PgConnectOptions,
    connect_timeout: Duration,
    schema: FieldSchema,
    table_schema: String,
    table_name: String,
    recent_sql: String,
}

impl PostgresReadingStore {
    /// Create a store for `settings.table` shaped by `schema`.
    ///
    /// No connection is made until the first query.
    #[must_use]
    pub fn new(settings: &StoreSettings, schema: FieldSchema) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(settings.credentials.user())
            .password(settings.credentials.password())
            .application_name("sensor-gateway");

        Self::with_options(options, &settings.table, settings.connect_timeout, schema)
    }

    /// Create a store from prebuilt connection options, e.g. parsed from a
    /// `postgres://` URL.
    #[must_use]
    pub fn with_options(
        options: PgConnectOptions,
        table: &str,
        connect_timeout: Duration,
        schema: FieldSchema,
    ) -> Self {
        let (table_schema, table_name) = split_table(table);
        let recent_sql = build_recent_sql(&schema, &table_schema, &table_name);

        Self {
            options,
            connect_timeout,
            schema,
            table_schema,
            table_name,
            recent_sql,
        }
    }

    /// Check that the table has every column the schema reads.
    ///
    /// # Errors
    ///
    /// [`ReadingError::StoreQuery`] naming the missing columns (or the
    /// missing table), [`ReadingError::StoreUnavailable`] if the database
    /// cannot be reached.
    pub async fn validate_schema(&self) -> Result<(), ReadingError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&self.table_schema)
        .bind(&self.table_name)
        .fetch_all(&mut conn)
        .await;
        release(conn).await;

        let rows = result.map_err(classify_error)?;
        if rows.is_empty() {
            return Err(ReadingError::StoreQuery(format!(
                "table {}.{} not found",
                self.table_schema, self.table_name
            )));
        }

        let available = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify_error)?;

        let missing = self
            .schema
            .missing_columns(available.iter().map(String::as_str));
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReadingError::StoreQuery(format!(
                "table {}.{} is missing columns: {}",
                self.table_schema,
                self.table_name,
                missing.join(", ")
            )))
        }
    }

    async fn connect(&self) -> Result<PgConnection, ReadingError> {
        tokio::time::timeout(self.connect_timeout, self.options.connect())
            .await
            .map_err(|_| {
                ReadingError::StoreUnavailable(format!(
                    "connection timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| ReadingError::StoreUnavailable(e.to_string()))
    }

    async fn query(&self, limit: u32, op: &'static str) -> Result<Vec<PgRow>, ReadingError> {
        let started = Instant::now();
        let mut conn = self.connect().await?;
        let result = sqlx::query(&self.recent_sql)
            .bind(i64::from(limit))
            .fetch_all(&mut conn)
            .await;
        release(conn).await;
        metrics::record_store_query(op, started.elapsed());

        result.map_err(classify_error)
    }
}

#[async_trait]
impl ReadingStore for PostgresReadingStore {
    async fn latest(&self) -> Result<Reading, ReadingError> {
        let rows = self.query(1, "latest").await?;
        rows.first()
            .map(|row| row_to_reading(&self.schema, row))
            .unwrap_or(Err(ReadingError::NotFound))
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Reading>, ReadingError> {
        let rows = self.query(limit, "recent").await?;
        rows.iter()
            .map(|row| row_to_reading(&self.schema, row))
            .collect()
    }
}

/// Close the connection, logging rather than surfacing close failures.
async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Failed to close store connection cleanly");
    }
}

// =============================================================================
// SQL Construction
// =============================================================================

fn split_table(table: &str) -> (String, String) {
    match table.split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => ("public".to_string(), table.to_string()),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

const fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "BIGINT",
        FieldKind::Real => "DOUBLE PRECISION",
        FieldKind::Text => "TEXT",
    }
}

fn select_expr(spec: &FieldSpec) -> String {
    format!(
        "CAST({} AS {}) AS {}",
        quote_ident(spec.column()),
        sql_type(spec.kind()),
        quote_ident(spec.name())
    )
}

fn build_recent_sql(schema: &FieldSchema, table_schema: &str, table_name: &str) -> String {
    let ts = quote_ident(TIMESTAMP_COLUMN);
    let columns: Vec<String> = std::iter::once(ts.clone())
        .chain(schema.fields().iter().map(select_expr))
        .collect();

    format!(
        "SELECT {} FROM {}.{} ORDER BY {ts} DESC LIMIT $1",
        columns.join(", "),
        quote_ident(table_schema),
        quote_ident(table_name),
    )
}

// =============================================================================
// Row Mapping
// =============================================================================

fn row_to_reading(schema: &FieldSchema, row: &PgRow) -> Result<Reading, ReadingError> {
    let timestamp = decode_timestamp(row)?;

    let mut values = IndexMap::with_capacity(schema.len());
    for spec in schema.fields() {
        values.insert(spec.name().to_string(), decode_value(row, spec)?);
    }

    Reading::new(schema, timestamp, values).map_err(|e| ReadingError::StoreQuery(e.to_string()))
}

/// `timestamptz` decodes directly; a zoneless `timestamp` is taken as UTC.
fn decode_timestamp(row: &PgRow) -> Result<DateTime<Utc>, ReadingError> {
    row.try_get::<DateTime<Utc>, _>(TIMESTAMP_COLUMN)
        .or_else(|_| {
            row.try_get::<NaiveDateTime, _>(TIMESTAMP_COLUMN)
                .map(|naive| naive.and_utc())
        })
        .map_err(classify_error)
}

fn decode_value(row: &PgRow, spec: &FieldSpec) -> Result<MeasurementValue, ReadingError> {
    let name = spec.name();
    let value = match spec.kind() {
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map(MeasurementValue::Integer)),
        FieldKind::Real => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.map(MeasurementValue::Real)),
        FieldKind::Text => row
            .try_get::<Option<String>, _>(name)
            .map(|v| v.map(MeasurementValue::Text)),
    }
    .map_err(classify_error)?;

    let value = value.ok_or_else(|| {
        ReadingError::StoreQuery(format!("column `{}` is NULL", spec.column()))
    })?;
    check_finite(spec, value)
}

/// Non-finite reals have no JSON number form.
fn check_finite(
    spec: &FieldSpec,
    value: MeasurementValue,
) -> Result<MeasurementValue, ReadingError> {
    match value {
        MeasurementValue::Real(v) if !v.is_finite() => Err(ReadingError::StoreQuery(format!(
            "column `{}` holds non-finite value {v}",
            spec.column()
        ))),
        other => Ok(other),
    }
}

/// Map a driver error onto the reading error taxonomy.
///
/// Errors reported by the server (undefined table/column, bad cast) and
/// decode failures are shape problems, unless the SQLSTATE says the server
/// is going away. Everything else is treated as the store being
/// unreachable.
fn classify_error(err: sqlx::Error) -> ReadingError {
    match err {
        sqlx::Error::Database(ref db)
            if db.code().is_some_and(|c| is_unavailable_sqlstate(&c)) =>
        {
            ReadingError::StoreUnavailable(err.to_string())
        }
        sqlx::Error::Database(_)
        | sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => ReadingError::StoreQuery(err.to_string()),
        _ => ReadingError::StoreUnavailable(err.to_string()),
    }
}

/// SQLSTATE classes for a server that cannot take queries right now:
/// `08` connection exception, `53` resource limits, `57P` shutdown.
fn is_unavailable_sqlstate(code: &str) -> bool {
    ["08", "53", "57P"].iter().any(|class| code.starts_with(class))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::infrastructure::config::StoreSettings;

    #[test]
    fn recent_sql_selects_schema_columns_newest_first() {
        let sql = build_recent_sql(&FieldSchema::gas_log(), "public", "gas_log");
        assert_eq!(
            sql,
            "SELECT \"timestamp\", \
             CAST(\"co2_ppm\" AS BIGINT) AS \"co2\", \
             CAST(\"co_ppm\" AS DOUBLE PRECISION) AS \"co\", \
             CAST(\"lpg_ppm\" AS BIGINT) AS \"lpg\", \
             CAST(\"h2s_ppm\" AS DOUBLE PRECISION) AS \"h2s\", \
             CAST(\"area_pred\" AS TEXT) AS \"status\" \
             FROM \"public\".\"gas_log\" ORDER BY \"timestamp\" DESC LIMIT $1"
        );
    }

    #[test]
    fn robot_sql_aliases_camel_case_field() {
        let sql = build_recent_sql(&FieldSchema::robot(), "public", "robot_log");
        assert!(sql.contains("CAST(\"gas_location\" AS TEXT) AS \"gasLocation\""));
    }

    #[test]
    fn table_split_defaults_to_public() {
        assert_eq!(
            split_table("gas_log"),
            ("public".to_string(), "gas_log".to_string())
        );
        assert_eq!(
            split_table("sensors.gas_log"),
            ("sensors".to_string(), "gas_log".to_string())
        );
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("co2"), "\"co2\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn decode_errors_are_query_errors() {
        let err = classify_error(sqlx::Error::ColumnNotFound("co2".into()));
        assert!(matches!(err, ReadingError::StoreQuery(_)));
    }

    #[test]
    fn transport_errors_are_unavailable() {
        let err = classify_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ReadingError::StoreUnavailable(_)));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            classify_error(sqlx::Error::Io(io)),
            ReadingError::StoreUnavailable(_)
        ));
    }

    #[test_case("08006" => true; "connection failure")]
    #[test_case("57P01" => true; "admin shutdown")]
    #[test_case("53300" => true; "too many connections")]
    #[test_case("42P01" => false; "undefined table")]
    #[test_case("42703" => false; "undefined column")]
    #[test_case("22P02" => false; "invalid text representation")]
    fn sqlstate_classification(code: &str) -> bool {
        is_unavailable_sqlstate(code)
    }

    #[test]
    fn non_finite_reals_are_rejected() {
        let schema = FieldSchema::gas_log();
        let co = schema.field("co").unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = check_finite(co, MeasurementValue::Real(bad)).unwrap_err();
            assert!(matches!(err, ReadingError::StoreQuery(msg) if msg.contains("co_ppm")));
        }
        assert_eq!(
            check_finite(co, MeasurementValue::Real(3.5)).unwrap(),
            MeasurementValue::Real(3.5)
        );
        assert_eq!(
            check_finite(co, MeasurementValue::Integer(4)).unwrap(),
            MeasurementValue::Integer(4)
        );
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let settings = StoreSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(500),
            ..StoreSettings::default()
        };
        let store = PostgresReadingStore::new(&settings, FieldSchema::gas_log());

        assert!(matches!(
            store.latest().await,
            Err(ReadingError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.validate_schema().await,
            Err(ReadingError::StoreUnavailable(_))
        ));
    }
}
