//! Database access layer.
//!
//! - Connection setup with retries (`pool`)
//! - Query execution under a timeout (`executor`)
//! - Column decoding into JSON records (`types`)

pub mod executor;
pub mod pool;
pub mod types;

use crate::error::InventoryResult;
use std::future::Future;

pub use executor::MySqlRowSource;

/// One result row: column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Anything that can answer the inventory query with records.
pub trait RowSource {
    fn fetch_rows(&self, query: &str) -> impl Future<Output = InventoryResult<Vec<Record>>> + Send;
}
