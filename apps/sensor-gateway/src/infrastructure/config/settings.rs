//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::time::Duration;

use crate::domain::schema::SchemaPreset;

/// Which reading strategy feeds the hub and the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceStrategy {
    /// Latest row from the reading store.
    #[default]
    Live,
    /// Randomly generated readings.
    Synthetic,
}

impl SourceStrategy {
    /// Parse strategy from string. Unknown values yield `None`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "live" | "store" => Some(Self::Live),
            "synthetic" | "mock" => Some(Self::Synthetic),
            _ => None,
        }
    }

    /// Get the strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Database credentials.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(user: String, password: String) -> Self {
        Self { user, password }
    }

    /// Get the database user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the database password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Reading store connection settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login credentials.
    pub credentials: Credentials,
    /// Reading table, optionally schema-qualified.
    pub table: String,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "project_akhir".to_string(),
            credentials: Credentials::new("postgres".to_string(), String::new()),
            table: "public.gas_log".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Request API HTTP port.
    pub http_port: u16,
    /// WebSocket stream port.
    pub stream_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 5001,
            stream_port: 7002,
        }
    }
}

/// Broadcast hub and stream timing settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Upper bound for a single socket write.
    pub send_timeout: Duration,
    /// Upper bound for the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// Outbound messages buffered per subscriber.
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            send_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(5),
            subscriber_queue_capacity: 8,
        }
    }
}

/// History endpoint limits.
#[derive(Debug, Clone, Copy)]
pub struct HistorySettings {
    /// Rows returned when no limit is requested.
    pub default_limit: u32,
    /// Largest limit a caller may request.
    pub max_limit: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Reading strategy.
    pub source: SourceStrategy,
    /// Measurement field schema preset.
    pub schema: SchemaPreset,
    /// Store connection settings.
    pub store: StoreSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Broadcast settings.
    pub broadcast: BroadcastSettings,
    /// History limits.
    pub history: HistorySettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty, unrecognized or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = match std::env::var("READING_SOURCE") {
            Ok(v) => SourceStrategy::from_str_case_insensitive(&v)
                .ok_or_else(|| ConfigError::InvalidValue("READING_SOURCE".to_string(), v))?,
            Err(_) => SourceStrategy::default(),
        };

        let schema = match std::env::var("SENSOR_SCHEMA") {
            Ok(v) => SchemaPreset::parse(&v)
                .ok_or_else(|| ConfigError::InvalidValue("SENSOR_SCHEMA".to_string(), v))?,
            Err(_) => SchemaPreset::default(),
        };

        let store_defaults = StoreSettings::default();
        let store = StoreSettings {
            host: non_empty_env("DB_HOST", store_defaults.host)?,
            port: parse_env_u16("DB_PORT", store_defaults.port),
            database: non_empty_env("DB_NAME", store_defaults.database)?,
            credentials: Credentials::new(
                non_empty_env("DB_USER", store_defaults.credentials.user().to_string())?,
                std::env::var("DB_PASSWORD").unwrap_or_default(),
            ),
            table: non_empty_env("DB_TABLE", store_defaults.table)?,
            connect_timeout: parse_env_duration_secs(
                "DB_CONNECT_TIMEOUT_SECS",
                store_defaults.connect_timeout,
            ),
        };

        let server = ServerSettings {
            http_port: parse_env_u16("HTTP_PORT", ServerSettings::default().http_port),
            stream_port: parse_env_u16("STREAM_PORT", ServerSettings::default().stream_port),
        };

        let broadcast = BroadcastSettings {
            tick_interval: parse_env_duration_millis(
                "TICK_INTERVAL_MS",
                BroadcastSettings::default().tick_interval,
            ),
            send_timeout: parse_env_duration_millis(
                "SEND_TIMEOUT_MS",
                BroadcastSettings::default().send_timeout,
            ),
            handshake_timeout: parse_env_duration_millis(
                "HANDSHAKE_TIMEOUT_MS",
                BroadcastSettings::default().handshake_timeout,
            ),
            subscriber_queue_capacity: parse_env_usize(
                "SUBSCRIBER_QUEUE_CAPACITY",
                BroadcastSettings::default().subscriber_queue_capacity,
            ),
        };

        let history = HistorySettings {
            default_limit: parse_env_u32(
                "HISTORY_DEFAULT_LIMIT",
                HistorySettings::default().default_limit,
            ),
            max_limit: parse_env_u32("HISTORY_MAX_LIMIT", HistorySettings::default().max_limit),
        };

        let config = Self {
            source,
            schema,
            store,
            server,
            broadcast,
            history,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] or [`ConfigError::InvalidValue`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.tick_interval.is_zero() {
            return Err(ConfigError::OutOfRange(
                "TICK_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.broadcast.send_timeout.is_zero() || self.broadcast.handshake_timeout.is_zero() {
            return Err(ConfigError::OutOfRange(
                "stream timeouts must be greater than zero".to_string(),
            ));
        }
        if self.broadcast.subscriber_queue_capacity == 0 {
            return Err(ConfigError::OutOfRange(
                "SUBSCRIBER_QUEUE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        if self.history.default_limit == 0 || self.history.default_limit > self.history.max_limit
        {
            return Err(ConfigError::OutOfRange(format!(
                "HISTORY_DEFAULT_LIMIT must be in 1..={}",
                self.history.max_limit
            )));
        }
        if !is_valid_table_name(&self.store.table) {
            return Err(ConfigError::InvalidValue(
                "DB_TABLE".to_string(),
                self.store.table.clone(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unrecognized value.
    #[error("environment variable {0} has invalid value `{1}`")]
    InvalidValue(String, String),
    /// A setting is outside its allowed range.
    #[error("{0}")]
    OutOfRange(String),
}

/// `table` or `schema.table`, each part a plain SQL identifier.
fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn non_empty_env(key: &str, default: String) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(v) => Ok(v),
        Err(_) => Ok(default),
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("live" => Some(SourceStrategy::Live))]
    #[test_case("LIVE" => Some(SourceStrategy::Live))]
    #[test_case("synthetic" => Some(SourceStrategy::Synthetic))]
    #[test_case(" Mock " => Some(SourceStrategy::Synthetic))]
    #[test_case("replay" => None)]
    fn source_strategy_parsing(input: &str) -> Option<SourceStrategy> {
        SourceStrategy::from_str_case_insensitive(input)
    }

    #[test_case("gas_log" => true)]
    #[test_case("public.gas_log" => true)]
    #[test_case("_staging.log_2025" => true)]
    #[test_case("gas_log; DROP TABLE x" => false)]
    #[test_case("a.b.c" => false)]
    #[test_case("1table" => false)]
    #[test_case("" => false)]
    #[test_case("public." => false)]
    fn table_name_validation(name: &str) -> bool {
        is_valid_table_name(name)
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("postgres".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("postgres"));
    }

    #[test]
    fn broadcast_settings_defaults() {
        let settings = BroadcastSettings::default();
        assert_eq!(settings.tick_interval, Duration::from_secs(3));
        assert_eq!(settings.send_timeout, Duration::from_secs(2));
        assert_eq!(settings.handshake_timeout, Duration::from_secs(5));
        assert_eq!(settings.subscriber_queue_capacity, 8);
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.http_port, 5001);
        assert_eq!(settings.stream_port, 7002);
    }

    #[test]
    fn default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.default_limit, 20);
        assert_eq!(config.store.table, "public.gas_log");
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let mut config = GatewayConfig::default();
        config.broadcast.tick_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange(_))));
    }

    #[test]
    fn history_default_above_max_rejected() {
        let mut config = GatewayConfig::default();
        config.history.default_limit = 500;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange(_))));
    }

    #[test]
    fn bad_table_rejected() {
        let mut config = GatewayConfig::default();
        config.store.table = "gas_log--".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key, _)) if key == "DB_TABLE"
        ));
    }
}
