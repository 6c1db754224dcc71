//! Connection parameter resolution.
//!
//! Each parameter is taken from the inventory source when present, then from
//! its environment variable, then from the built-in default. Parameters
//! without a default fail naming both places they could have come from.

use crate::config::DEFAULT_DB_PORT;
use crate::error::{InventoryError, InventoryResult};
use crate::models::source::{PortValue, SourceConfig, SslMode};
use std::time::Duration;
use tracing::debug;

pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DB_NAME: &str = "DB_NAME";

/// Where a resolved value came from, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Source,
    Environment,
    Default,
}

impl std::fmt::Display for ValueOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Environment => write!(f, "environment"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Fully resolved connection settings.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Sensitive - never logged
    pub password: String,
    pub database: String,
    pub ssl_mode: SslMode,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub connect_retries: u32,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("connect_retries", &self.connect_retries)
            .finish()
    }
}

impl ConnectionSettings {
    /// Resolve against the process environment.
    pub fn from_env(source: &SourceConfig) -> InventoryResult<Self> {
        Self::resolve(source, |name| std::env::var(name).ok())
    }

    /// Resolve with an injectable environment lookup.
    pub fn resolve<F>(source: &SourceConfig, env: F) -> InventoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required_text("db_host", ENV_DB_HOST, source.db_host.as_deref(), &env)?;
        let user = required_text("db_user", ENV_DB_USER, source.db_user.as_deref(), &env)?;
        let database = required_text("db_name", ENV_DB_NAME, source.db_name.as_deref(), &env)?;
        let password = resolve_password(source.db_password.as_deref(), &env)?;
        let port = resolve_port(source.db_port.as_ref(), &env)?;

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            ssl_mode: source.db_ssl_mode,
            connect_timeout: Duration::from_secs(source.connect_timeout),
            query_timeout: Duration::from_secs(source.query_timeout),
            connect_retries: source.connect_retries,
        })
    }

    /// Connection URL with the password removed, safe for logs.
    pub fn redacted_url(&self) -> String {
        let base = format!("mysql://{}:{}/{}", self.host, self.port, self.database);
        match url::Url::parse(&base) {
            Ok(mut url) => {
                // Only fails for cannot-be-a-base URLs, which mysql:// is not.
                let _ = url.set_username(&self.user);
                url.to_string()
            }
            Err(_) => format!("mysql://{}@{}", self.user, base.trim_start_matches("mysql://")),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn required_text<F>(
    option: &str,
    env_var: &str,
    explicit: Option<&str>,
    env: &F,
) -> InventoryResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_blank(explicit) {
        debug!(option, origin = %ValueOrigin::Source, "Resolved connection option");
        return Ok(value.to_string());
    }
    if let Some(value) = env(env_var).filter(|v| !v.trim().is_empty()) {
        debug!(option, origin = %ValueOrigin::Environment, env_var, "Resolved connection option");
        return Ok(value);
    }
    Err(InventoryError::missing_option(option, env_var))
}

/// An explicit empty password is allowed (passwordless accounts).
fn resolve_password<F>(explicit: Option<&str>, env: &F) -> InventoryResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit {
        return Ok(value.to_string());
    }
    env(ENV_DB_PASSWORD).ok_or_else(|| InventoryError::missing_option("db_password", ENV_DB_PASSWORD))
}

fn resolve_port<F>(explicit: Option<&PortValue>, env: &F) -> InventoryResult<u16>
where
    F: Fn(&str) -> Option<String>,
{
    match explicit {
        Some(PortValue::Number(n)) => return port_from_i64(*n, ValueOrigin::Source),
        Some(PortValue::Text(s)) if !s.trim().is_empty() => {
            return parse_port(s, ValueOrigin::Source);
        }
        _ => {}
    }
    match env(ENV_DB_PORT).filter(|v| !v.trim().is_empty()) {
        Some(s) => parse_port(&s, ValueOrigin::Environment),
        None => {
            debug!(option = "db_port", origin = %ValueOrigin::Default, "Resolved connection option");
            Ok(DEFAULT_DB_PORT)
        }
    }
}

fn parse_port(value: &str, origin: ValueOrigin) -> InventoryResult<u16> {
    let n: i64 = value.trim().parse().map_err(|_| {
        InventoryError::invalid_option(
            "db_port",
            format!("'{}' from {} is not a number", value, origin),
        )
    })?;
    port_from_i64(n, origin)
}

fn port_from_i64(n: i64, origin: ValueOrigin) -> InventoryResult<u16> {
    match u16::try_from(n) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(InventoryError::invalid_option(
            "db_port",
            format!("{} from {} is outside 1-65535", n, origin),
        )),
    }
}
