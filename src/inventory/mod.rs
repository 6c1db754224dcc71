//! Inventory building.
//!
//! - `plugin`: the load / fetch / populate flow
//! - `sql_guard`: read-only check of `db_query`
//! - `cache`: file cache of query results
//! - `constructed`: compose, groups and keyed_groups
//! - `model`: hosts and groups, rendered as inventory-script JSON

pub mod cache;
pub mod constructed;
pub mod model;
pub mod plugin;
pub mod sql_guard;

pub use cache::{InventoryCache, cache_key};
pub use constructed::Constructed;
pub use model::{Group, Inventory};
pub use plugin::{InventoryPlugin, PLUGIN_NAME, verify_file};
pub use sql_guard::validate_query;
