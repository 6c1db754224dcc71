//! Query execution against MySQL.
//!
//! Rows are streamed and collected under the query timeout, then decoded
//! into records. The pool is closed on every path.

use crate::db::types::RowToRecord;
use crate::db::{Record, RowSource, pool};
use crate::error::{InventoryError, InventoryResult};
use crate::models::ConnectionSettings;
use futures_util::StreamExt;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Row source backed by a live MySQL server.
#[derive(Debug, Clone)]
pub struct MySqlRowSource {
    settings: ConnectionSettings,
}

impl MySqlRowSource {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

impl RowSource for MySqlRowSource {
    async fn fetch_rows(&self, query: &str) -> InventoryResult<Vec<Record>> {
        let start = Instant::now();
        let pool = pool::connect(&self.settings)
            .await
            .map_err(InventoryError::into_query_failure)?;

        let result = fetch_all(&pool, query, self.settings.query_timeout).await;
        pool.close().await;

        let rows = result.map_err(InventoryError::into_query_failure)?;
        debug!(
            rows = rows.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(rows.iter().map(RowToRecord::to_record).collect())
    }
}

/// Run a raw (non-prepared) query and collect every row.
pub async fn fetch_all(
    pool: &MySqlPool,
    sql: &str,
    query_timeout: Duration,
) -> InventoryResult<Vec<MySqlRow>> {
    use sqlx::Executor;

    debug!(timeout_secs = query_timeout.as_secs(), "Executing inventory query");
    let rows_future = pool.fetch(sql).collect::<Vec<_>>();

    match timeout(query_timeout, rows_future).await {
        Ok(results) => collect_rows(results),
        Err(_) => Err(timeout_error("query execution", query_timeout)),
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> InventoryResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(InventoryError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> InventoryError {
    InventoryError::timeout(operation, timeout.as_secs() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_rows_stops_at_first_error() {
        let results: Vec<Result<u32, sqlx::Error>> =
            vec![Ok(1), Err(sqlx::Error::RowNotFound), Ok(3)];
        assert!(collect_rows(results).is_err());
    }

    #[test]
    fn test_collect_rows_keeps_order() {
        let results: Vec<Result<u32, sqlx::Error>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(collect_rows(results).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_query_failure() {
        let source = crate::models::SourceConfig::from_yaml(
            "plugin: inventory\ndb_host: 127.0.0.1\ndb_port: 1\ndb_user: ansible\ndb_password: pw\ndb_name: cmdb\nconnect_timeout: 1\n",
        )
        .unwrap();
        let settings = ConnectionSettings::resolve(&source, |_| None).unwrap();
        let err = MySqlRowSource::new(settings)
            .fetch_rows("SELECT 1")
            .await
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Database query failed: Connection failed: "),
            "{}",
            err
        );
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_timeout_error_reports_seconds() {
        let err = timeout_error("query execution", Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout: query execution exceeded 30s");
    }
}
