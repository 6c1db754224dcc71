//! File cache for query results (`cache: true`).
//!
//! One JSON file per inventory source, holding the raw records and the UTC
//! time they were fetched. Expired, unreadable or corrupt entries count as
//! misses.

use crate::config::DEFAULT_CACHE_DIR_NAME;
use crate::db::Record;
use crate::error::{InventoryError, InventoryResult};
use crate::models::SourceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// On-disk layout of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub written_at: DateTime<Utc>,
    pub records: Vec<Record>,
}

fn short_digest(input: &str) -> String {
    let mut digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest.truncate(5);
    digest
}

/// Stable key for a plugin/source pair: `<plugin>_<h(plugin)>s_<h(path)>`.
pub fn cache_key(plugin_name: &str, source_path: &Path) -> String {
    format!(
        "{}_{}s_{}",
        plugin_name,
        short_digest(plugin_name),
        short_digest(&source_path.to_string_lossy())
    )
}

#[derive(Debug, Clone)]
pub struct InventoryCache {
    dir: PathBuf,
    prefix: String,
    /// Zero keeps entries forever
    timeout: Duration,
}

impl InventoryCache {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            timeout,
        }
    }

    /// Cache settings of an inventory source; the directory defaults to a
    /// folder under the system temp dir.
    pub fn from_source(source: &SourceConfig) -> Self {
        let dir = source
            .cache_connection
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME));
        Self::new(
            dir,
            source.cache_prefix.clone(),
            Duration::from_secs(source.cache_timeout),
        )
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, key))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}.tmp", self.prefix, key))
    }

    pub fn is_expired(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.timeout.is_zero() {
            return false;
        }
        match (now - written_at).to_std() {
            Ok(age) => age > self.timeout,
            // Written "in the future" (clock skew): treat as fresh
            Err(_) => false,
        }
    }

    /// Cached records for `key`, or `None` on any kind of miss.
    pub fn get(&self, key: &str) -> Option<Vec<Record>> {
        let path = self.entry_path(key);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(key, path = %path.display(), error = %e, "Cache miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                return None;
            }
        };

        if self.is_expired(entry.written_at, Utc::now()) {
            debug!(key, written_at = %entry.written_at, "Cache entry expired");
            return None;
        }

        debug!(key, records = entry.records.len(), "Cache hit");
        Some(entry.records)
    }

    /// Store `records` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, records: &[Record]) -> InventoryResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            InventoryError::cache(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let entry = CacheEntry {
            written_at: Utc::now(),
            records: records.to_vec(),
        };
        let content = serde_json::to_vec(&entry)
            .map_err(|e| InventoryError::cache(format!("cannot serialize records: {}", e)))?;

        // Write then rename so readers never see a partial file.
        let path = self.entry_path(key);
        let tmp = self.temp_path(key);
        std::fs::write(&tmp, content)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| InventoryError::cache(format!("cannot write {}: {}", path.display(), e)))?;

        debug!(key, records = records.len(), path = %path.display(), "Cached query results");
        Ok(())
    }
}
