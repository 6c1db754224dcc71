//! Command line configuration for the inventory executable.
//!
//! Ansible invokes inventory scripts with either `--list` or `--host <name>`.
//! Everything else is optional and can also be provided through environment
//! variables, which is the only channel Ansible offers for extra settings.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_SOURCE_PATH: &str = "mysql.yml";
pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_HOSTNAME_FIELD: &str = "hostname";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_RETRIES: u32 = 0;

// Cache defaults
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_CACHE_PREFIX: &str = "ansible_inventory_";
pub const DEFAULT_CACHE_DIR_NAME: &str = "mysql-inventory-cache";

/// Output layout of the JSON document written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputStyle {
    /// Single line, what Ansible expects
    #[default]
    Compact,
    /// Indented, for humans
    Pretty,
}

impl std::fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compact => write!(f, "compact"),
            Self::Pretty => write!(f, "pretty"),
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    List,
    Host(String),
}

/// Configuration for the inventory executable.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mysql-inventory",
    about = "Dynamic Ansible inventory built from a MySQL SELECT query",
    version,
    author
)]
pub struct Config {
    /// Print the whole inventory (default when --host is absent)
    #[arg(long, conflicts_with = "host")]
    pub list: bool,

    /// Print the variables of a single host
    #[arg(long, value_name = "HOSTNAME")]
    pub host: Option<String>,

    /// Inventory source file; its name must end with mysql.yml or mysql.yaml
    #[arg(
        short = 'i',
        long = "inventory",
        value_name = "PATH",
        default_value = DEFAULT_SOURCE_PATH,
        env = "MYSQL_INVENTORY_SOURCE"
    )]
    pub source: PathBuf,

    /// Ignore cached results and query the database (the cache is rewritten)
    #[arg(long, env = "MYSQL_INVENTORY_REFRESH_CACHE")]
    pub refresh_cache: bool,

    /// JSON output style
    #[arg(long, value_enum, default_value = "compact", env = "MYSQL_INVENTORY_OUTPUT")]
    pub output: OutputStyle,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "MYSQL_INVENTORY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MYSQL_INVENTORY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            list: false,
            host: None,
            source: PathBuf::from(DEFAULT_SOURCE_PATH),
            refresh_cache: false,
            output: OutputStyle::Compact,
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }

    /// `--host` wins; anything else is a listing.
    pub fn action(&self) -> Action {
        match &self.host {
            Some(host) => Action::Host(host.clone()),
            None => Action::List,
        }
    }

    /// Whether the cache may be read for this run.
    pub fn use_cache(&self) -> bool {
        !self.refresh_cache
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source, PathBuf::from("mysql.yml"));
        assert_eq!(config.output, OutputStyle::Compact);
        assert_eq!(config.action(), Action::List);
        assert!(config.use_cache());
    }

    #[test]
    fn test_parse_list() {
        let config = Config::try_parse_from(["mysql-inventory", "--list"]).unwrap();
        assert!(config.list);
        assert_eq!(config.action(), Action::List);
    }

    #[test]
    fn test_parse_host() {
        let config =
            Config::try_parse_from(["mysql-inventory", "--host", "web01", "-i", "prod.mysql.yml"])
                .unwrap();
        assert_eq!(config.action(), Action::Host("web01".to_string()));
        assert_eq!(config.source, PathBuf::from("prod.mysql.yml"));
    }

    #[test]
    fn test_list_conflicts_with_host() {
        let result = Config::try_parse_from(["mysql-inventory", "--list", "--host", "web01"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_refresh_cache_disables_cache_reads() {
        let config =
            Config::try_parse_from(["mysql-inventory", "--list", "--refresh-cache"]).unwrap();
        assert!(!config.use_cache());
    }

    #[test]
    fn test_pretty_output() {
        let config =
            Config::try_parse_from(["mysql-inventory", "--output", "pretty"]).unwrap();
        assert_eq!(config.output, OutputStyle::Pretty);
    }
}
