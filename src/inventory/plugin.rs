//! The inventory plugin: source file in, populated inventory out.

use crate::db::{Record, RowSource};
use crate::error::{InventoryError, InventoryResult};
use crate::inventory::cache::{InventoryCache, cache_key};
use crate::inventory::constructed::Constructed;
use crate::inventory::model::Inventory;
use crate::inventory::sql_guard::{EMPTY_QUERY, validate_query};
use crate::models::SourceConfig;
use crate::template::is_truthy;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Name used for cache keys.
pub const PLUGIN_NAME: &str = "mysql";

/// File name suffixes this plugin accepts.
pub const SOURCE_SUFFIXES: &[&str] = &["mysql.yml", "mysql.yaml"];

/// Whether `path` is a source this plugin can read.
pub fn verify_file(path: &Path) -> bool {
    let valid = path.is_file()
        && path
            .file_name()
            .map(|name| name.to_string_lossy())
            .is_some_and(|name| SOURCE_SUFFIXES.iter().any(|s| name.ends_with(s)));
    debug!(path = %path.display(), valid, "Verifying inventory file");
    valid
}

#[derive(Debug, Clone)]
pub struct InventoryPlugin {
    path: PathBuf,
    source: SourceConfig,
    constructed: Constructed,
    cache: InventoryCache,
}

impl InventoryPlugin {
    /// Verify, read and compile an inventory source file.
    pub fn load(path: &Path) -> InventoryResult<Self> {
        if !path.exists() {
            return Err(InventoryError::unsupported_source(
                path.display().to_string(),
                "file does not exist",
            ));
        }
        if !verify_file(path) {
            return Err(InventoryError::unsupported_source(
                path.display().to_string(),
                format!("file name must end with {}", SOURCE_SUFFIXES.join(" or ")),
            ));
        }
        let source = SourceConfig::load(path)?;
        Self::from_source(path, source)
    }

    /// Build from an already parsed source.
    pub fn from_source(path: &Path, source: SourceConfig) -> InventoryResult<Self> {
        let constructed = Constructed::from_source(&source)?;
        let cache = InventoryCache::from_source(&source);
        Ok(Self {
            path: path.to_path_buf(),
            source,
            constructed,
            cache,
        })
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn cache(&self) -> &InventoryCache {
        &self.cache
    }

    pub fn cache_key(&self) -> String {
        cache_key(PLUGIN_NAME, &self.path)
    }

    /// Fetch (or reuse cached) records and build the inventory.
    ///
    /// `use_cache` is false when the caller asked for a refresh; the cache is
    /// then skipped for reading but still rewritten.
    pub async fn parse<R: RowSource>(&self, rows: &R, use_cache: bool) -> InventoryResult<Inventory> {
        debug!(path = %self.path.display(), "Parsing inventory file");
        let key = self.cache_key();
        let utilize_cache = self.source.cache && use_cache;
        debug!(utilize_cache, "Cache decision");

        let cached = if utilize_cache {
            self.cache.get(&key)
        } else {
            None
        };

        let records = match cached {
            Some(records) => records,
            None => {
                debug!("No cached data found, querying database");
                let records = self.fetch(rows).await?;
                if self.source.cache {
                    // A failed cache write must not fail the inventory.
                    if let Err(e) = self.cache.set(&key, &records) {
                        warn!(error = %e, "Could not write inventory cache");
                    }
                }
                records
            }
        };

        debug!(records = records.len(), "Populating inventory");
        self.populate(&records)
    }

    async fn fetch<R: RowSource>(&self, rows: &R) -> InventoryResult<Vec<Record>> {
        let query = self
            .source
            .db_query
            .as_deref()
            .ok_or_else(|| InventoryError::invalid_query(EMPTY_QUERY))?;
        let query = validate_query(query)?;
        trace!(query, "Executing query");
        let records = rows.fetch_rows(query).await?;
        info!(rows = records.len(), "Fetched rows from database");
        Ok(records)
    }

    /// Turn records into hosts, variables and groups.
    pub fn populate(&self, records: &[Record]) -> InventoryResult<Inventory> {
        let field = self.source.hostname_field.as_str();
        debug!(hostname_field = field, "Using hostname field");

        let mut inventory = Inventory::new();
        for record in records {
            let Some(host) = hostname_of(record, field)? else {
                let row = Value::Object(record.clone());
                warn!(
                    hostname_field = field,
                    row = %row,
                    "Skipping row with missing hostname field"
                );
                continue;
            };
            trace!(host = %host, "Processing host");
            self.add_host(&mut inventory, &host, record)?;
        }

        info!(
            hosts = inventory.host_count(),
            groups = inventory.group_names().count(),
            "Inventory populated"
        );
        Ok(inventory)
    }

    fn add_host(&self, inventory: &mut Inventory, host: &str, record: &Record) -> InventoryResult<()> {
        inventory.add_host(host);
        for (name, value) in record {
            inventory.set_variable(host, name, value.clone())?;
        }
        self.constructed.apply(inventory, host)
    }
}

/// Host name of a record: `None` to skip the row, an error for values
/// that are not strings.
fn hostname_of(record: &Record, field: &str) -> InventoryResult<Option<String>> {
    let Some(value) = record.get(field) else {
        return Ok(None);
    };
    if !is_truthy(value) {
        return Ok(None);
    }
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(InventoryError::record(format!(
            "Invalid host name supplied in '{}': {}",
            field, other
        ))),
    }
}
