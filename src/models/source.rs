//! The inventory source file (`*.mysql.yml`).

use crate::config::{
    DEFAULT_CACHE_PREFIX, DEFAULT_CACHE_TIMEOUT_SECS, DEFAULT_CONNECT_RETRIES,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOSTNAME_FIELD, DEFAULT_QUERY_TIMEOUT_SECS,
};
use crate::error::{InventoryError, InventoryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Names accepted in the `plugin` key.
pub const PLUGIN_NAMES: &[&str] = &["inventory", "silexdata.mysql.inventory"];

/// Cache backends understood by this inventory.
const CACHE_PLUGINS: &[&str] = &["jsonfile", "ansible.builtin.jsonfile"];

/// TLS negotiation mode for the MySQL connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

/// Port as written in YAML: `3306` or `"3306"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

/// One `keyed_groups` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyedGroupConfig {
    /// Expression whose value names the group(s)
    pub key: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Template naming a parent for every generated group
    pub parent_group: Option<String>,
    /// Group name used when the key (or a mapping value) is an empty string
    pub default_value: Option<String>,
    /// Keep the separator when a mapping value is empty (default true)
    pub trailing_separator: Option<bool>,
}

/// Parsed inventory source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub plugin: String,

    pub db_host: Option<String>,
    pub db_port: Option<PortValue>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_ssl_mode: SslMode,

    pub db_query: Option<String>,

    /// Column mapped to inventory_hostname
    #[serde(default = "default_hostname_field")]
    pub hostname_field: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Turn constructed (compose/groups/keyed_groups) errors into failures
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub compose: serde_yaml::Mapping,
    #[serde(default)]
    pub groups: serde_yaml::Mapping,
    #[serde(default)]
    pub keyed_groups: Vec<KeyedGroupConfig>,
    #[serde(default = "default_true")]
    pub leading_separator: bool,
    /// Replace characters that are invalid in group names with `_`
    #[serde(default)]
    pub sanitize_group_names: bool,

    #[serde(default)]
    pub cache: bool,
    pub cache_plugin: Option<String>,
    /// Seconds; 0 keeps entries forever
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,
    pub cache_connection: Option<PathBuf>,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_hostname_field() -> String {
    DEFAULT_HOSTNAME_FIELD.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_connect_retries() -> u32 {
    DEFAULT_CONNECT_RETRIES
}

fn default_cache_timeout() -> u64 {
    DEFAULT_CACHE_TIMEOUT_SECS
}

fn default_cache_prefix() -> String {
    DEFAULT_CACHE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl SourceConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> InventoryResult<Self> {
        let config: SourceConfig = serde_yaml::from_str(content)
            .map_err(|e| InventoryError::config(format!("Invalid inventory source: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a source file.
    pub fn load(path: &Path) -> InventoryResult<Self> {
        debug!(path = %path.display(), "Reading inventory source");
        let content = std::fs::read_to_string(path).map_err(|e| {
            InventoryError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if !PLUGIN_NAMES.contains(&self.plugin.as_str()) {
            return Err(InventoryError::invalid_option(
                "plugin",
                format!(
                    "'{}' is not one of {}",
                    self.plugin,
                    PLUGIN_NAMES.join(", ")
                ),
            ));
        }
        if self.hostname_field.trim().is_empty() {
            return Err(InventoryError::invalid_option(
                "hostname_field",
                "must not be empty",
            ));
        }
        if self.connect_timeout == 0 {
            return Err(InventoryError::invalid_option(
                "connect_timeout",
                "must be greater than 0",
            ));
        }
        if self.query_timeout == 0 {
            return Err(InventoryError::invalid_option(
                "query_timeout",
                "must be greater than 0",
            ));
        }
        if let Some(plugin) = &self.cache_plugin {
            if !CACHE_PLUGINS.contains(&plugin.as_str()) {
                return Err(InventoryError::invalid_option(
                    "cache_plugin",
                    format!("'{}' is not supported, use jsonfile", plugin),
                ));
            }
        }
        for keyed in &self.keyed_groups {
            if keyed.default_value.is_some() && keyed.trailing_separator.is_some() {
                return Err(InventoryError::keyed_group(format!(
                    "parameters are mutually exclusive for keyed group '{}': default_value|trailing_separator",
                    keyed.key
                )));
            }
        }
        // Surfaces non-string keys early.
        self.compose_entries()?;
        self.group_entries()?;
        Ok(())
    }

    /// `compose` in document order as (variable, expression).
    pub fn compose_entries(&self) -> InventoryResult<Vec<(String, String)>> {
        mapping_entries("compose", &self.compose)
    }

    /// `groups` in document order as (group, condition).
    pub fn group_entries(&self) -> InventoryResult<Vec<(String, String)>> {
        mapping_entries("groups", &self.groups)
    }
}

/// Flatten a YAML mapping of scalars into ordered string pairs.
fn mapping_entries(
    option: &str,
    mapping: &serde_yaml::Mapping,
) -> InventoryResult<Vec<(String, String)>> {
    mapping
        .iter()
        .map(|(k, v)| {
            let key = yaml_scalar(k).ok_or_else(|| {
                InventoryError::invalid_option(option, format!("key {:?} is not a string", k))
            })?;
            let value = yaml_scalar(v).ok_or_else(|| {
                InventoryError::invalid_option(
                    option,
                    format!("value for '{}' must be an expression string", key),
                )
            })?;
            Ok((key, value))
        })
        .collect()
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
plugin: silexdata.mysql.inventory

strict: false

db_host: localhost
db_user: ansible
db_password: ansiblepass
db_name: master
db_query: |
    SELECT * FROM mydb;

hostname_field: hostname

keyed_groups:
  - key: application
    prefix: app_
    separator: ""

groups:
  sbox: "env == 'SAND'"
  dev: "env == 'DEV'"
  test: "env == 'TEST'"
  qa: "env == 'QA'"
  prod: "env == 'PROD'"
"#;

    #[test]
    fn test_parse_documented_example() {
        let config = SourceConfig::from_yaml(EXAMPLE).unwrap();
        assert_eq!(config.plugin, "silexdata.mysql.inventory");
        assert_eq!(config.db_host.as_deref(), Some("localhost"));
        assert!(config.db_port.is_none());
        assert_eq!(config.hostname_field, "hostname");
        assert_eq!(config.keyed_groups.len(), 1);
        assert_eq!(config.keyed_groups[0].prefix, "app_");
        assert_eq!(config.keyed_groups[0].separator, "");
        assert!(!config.cache);
    }

    #[test]
    fn test_group_entries_keep_document_order() {
        let config = SourceConfig::from_yaml(EXAMPLE).unwrap();
        let names: Vec<String> = config
            .group_entries()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["sbox", "dev", "test", "qa", "prod"]);
    }

    #[test]
    fn test_defaults() {
        let config = SourceConfig::from_yaml("plugin: inventory\n").unwrap();
        assert_eq!(config.hostname_field, DEFAULT_HOSTNAME_FIELD);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.cache_timeout, DEFAULT_CACHE_TIMEOUT_SECS);
        assert_eq!(config.cache_prefix, DEFAULT_CACHE_PREFIX);
        assert_eq!(config.db_ssl_mode, SslMode::Preferred);
        assert!(config.leading_separator);
        assert!(!config.strict);
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let err = SourceConfig::from_yaml("plugin: community.mysql.other\n").unwrap_err();
        assert!(matches!(err, InventoryError::InvalidOption { ref option, .. } if option == "plugin"));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = SourceConfig::from_yaml("plugin: inventory\nkeyed_group: []\n").unwrap_err();
        assert!(matches!(err, InventoryError::Config { .. }));
    }

    #[test]
    fn test_port_as_number_or_string() {
        let a = SourceConfig::from_yaml("plugin: inventory\ndb_port: 3307\n").unwrap();
        assert_eq!(a.db_port, Some(PortValue::Number(3307)));
        let b = SourceConfig::from_yaml("plugin: inventory\ndb_port: \"3308\"\n").unwrap();
        assert_eq!(b.db_port, Some(PortValue::Text("3308".to_string())));
    }

    #[test]
    fn test_ssl_mode_parsing() {
        let config =
            SourceConfig::from_yaml("plugin: inventory\ndb_ssl_mode: verify_identity\n").unwrap();
        assert_eq!(config.db_ssl_mode, SslMode::VerifyIdentity);
    }

    #[test]
    fn test_default_value_and_trailing_separator_exclusive() {
        let yaml = r#"
plugin: inventory
keyed_groups:
  - key: tags
    default_value: none
    trailing_separator: false
"#;
        let err = SourceConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, InventoryError::KeyedGroup { .. }));
    }

    #[test]
    fn test_unsupported_cache_plugin() {
        let err =
            SourceConfig::from_yaml("plugin: inventory\ncache_plugin: redis\n").unwrap_err();
        assert!(err.to_string().contains("cache_plugin"));
    }

    #[test]
    fn test_compose_scalars_become_expressions() {
        let yaml = "plugin: inventory\ncompose:\n  ansible_port: 2222\n  ansible_host: ip_address\n";
        let config = SourceConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.compose_entries().unwrap(),
            vec![
                ("ansible_port".to_string(), "2222".to_string()),
                ("ansible_host".to_string(), "ip_address".to_string()),
            ]
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(SourceConfig::from_yaml("plugin: inventory\nquery_timeout: 0\n").is_err());
    }
}
