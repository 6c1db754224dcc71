//! Data models for the MySQL inventory.

pub mod settings;
pub mod source;

pub use settings::{
    ConnectionSettings, ENV_DB_HOST, ENV_DB_NAME, ENV_DB_PASSWORD, ENV_DB_PORT, ENV_DB_USER,
    ValueOrigin,
};
pub use source::{KeyedGroupConfig, PLUGIN_NAMES, PortValue, SourceConfig, SslMode};
