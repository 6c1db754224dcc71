//! Error types for the MySQL inventory.
//!
//! Every failure that can abort an inventory run is an [`InventoryError`].
//! Variants carry enough context for the message printed by the executable
//! to be actionable on its own, since Ansible only surfaces stderr.

use crate::template::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required option '{option}': set it in the inventory source or via ${env_var}")]
    MissingOption { option: String, env_var: String },

    #[error("Invalid value for '{option}': {message}")]
    InvalidOption { option: String, message: String },

    #[error("Unsupported inventory source: {path} ({reason})")]
    UnsupportedSource { path: String, reason: String },

    #[error("{message}")]
    InvalidQuery { message: String },

    #[error("Query rejected: {operation} - {reason}")]
    QueryRejected { operation: String, reason: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database query failed: {message}{}", sqlstate_suffix(.sql_state))]
    Database {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("{context} ('{expression}'): {source}")]
    Expression {
        /// What was being computed, e.g. "Could not set ansible_host for host web01"
        context: String,
        expression: String,
        #[source]
        source: TemplateError,
    },

    #[error("Invalid keyed group: {message}")]
    KeyedGroup { message: String },

    #[error("Failure parsing record: {message}")]
    Record { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },
}

impl InventoryError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing option error naming the environment fallback.
    pub fn missing_option(option: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::MissingOption {
            option: option.into(),
            env_var: env_var.into(),
        }
    }

    /// Create an invalid option error.
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_source(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a rejected query error for a non read-only statement.
    pub fn query_rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueryRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Wrap a template failure together with the offending expression.
    pub fn expression(
        context: impl Into<String>,
        expression: impl Into<String>,
        source: TemplateError,
    ) -> Self {
        Self::Expression {
            context: context.into(),
            expression: expression.into(),
            source,
        }
    }

    pub fn keyed_group(message: impl Into<String>) -> Self {
        Self::KeyedGroup {
            message: message.into(),
        }
    }

    pub fn record(message: impl Into<String>) -> Self {
        Self::Record {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::MissingOption { .. } => {
                Some("Every connection option can come from the source file or its environment variable")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing connect_timeout/query_timeout or optimizing the query")
            }
            _ => None,
        }
    }

    /// Report any failure of the fetch step as a database query failure,
    /// keeping its suggestion.
    pub fn into_query_failure(self) -> Self {
        match self {
            Self::Connection {
                message,
                suggestion,
            } => Self::database(format!("Connection failed: {}", message), None, suggestion),
            Self::Timeout {
                operation,
                elapsed_secs,
            } => Self::database(
                format!("{} exceeded {}s", operation, elapsed_secs),
                None,
                "Consider increasing connect_timeout/query_timeout or optimizing the query",
            ),
            other => other,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

fn sqlstate_suffix(sql_state: &Option<String>) -> String {
    sql_state
        .as_deref()
        .map(|state| format!(" (SQLSTATE {})", state))
        .unwrap_or_default()
}

/// Convert sqlx errors to InventoryError.
impl From<sqlx::Error> for InventoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => InventoryError::connection(
                msg.to_string(),
                "Check db_host, db_port, db_user, db_password and db_name",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                InventoryError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, referenced tables and the user's grants",
                )
            }
            sqlx::Error::PoolTimedOut => InventoryError::connection(
                "Timed out waiting for a database connection",
                "Check that the MySQL server is reachable or raise connect_timeout",
            ),
            sqlx::Error::PoolClosed => {
                InventoryError::connection("Connection pool is closed", "Re-run the inventory")
            }
            sqlx::Error::Io(io_err) => InventoryError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and MySQL server status",
            ),
            sqlx::Error::Tls(tls_err) => InventoryError::connection(
                format!("TLS error: {}", tls_err),
                "Verify db_ssl_mode and the server certificates",
            ),
            sqlx::Error::Protocol(msg) => InventoryError::connection(
                format!("Protocol error: {}", msg),
                "Check MySQL server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => InventoryError::database(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Cast the column to a simpler type in db_query",
            ),
            sqlx::Error::Decode(source) => InventoryError::database(
                format!("Decode error: {}", source),
                None,
                "Cast the column to a simpler type in db_query",
            ),
            sqlx::Error::WorkerCrashed => {
                InventoryError::connection("Database worker crashed", "Re-run the inventory")
            }
            _ => InventoryError::database(
                format!("Unknown database error: {}", err),
                None,
                "Check the MySQL server logs",
            ),
        }
    }
}

/// Result type alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;
