//! Configuration Module
//!
//! Configuration loading for the gateway.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, Credentials, GatewayConfig, HistorySettings, ServerSettings,
    SourceStrategy, StoreSettings,
};
