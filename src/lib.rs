//! MySQL dynamic inventory for Ansible.
//!
//! Builds an Ansible inventory from the rows of a MySQL SELECT query, with
//! the constructed features (`compose`, `groups`, `keyed_groups`) and an
//! optional file cache. The `mysql-inventory` binary speaks Ansible's
//! inventory-script protocol (`--list` / `--host`).

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod models;
pub mod template;

pub use config::Config;
pub use error::{InventoryError, InventoryResult};
pub use inventory::{Inventory, InventoryPlugin};
