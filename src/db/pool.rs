//! MySQL connection setup.
//!
//! The inventory runs a single query per invocation, so the pool holds one
//! connection and exists only for the duration of the fetch.

use crate::error::{InventoryError, InventoryResult};
use crate::models::{ConnectionSettings, SslMode};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay unit between connection attempts; attempt `n` waits `n` units.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Map the source's TLS mode onto sqlx's.
pub fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disabled => MySqlSslMode::Disabled,
        SslMode::Preferred => MySqlSslMode::Preferred,
        SslMode::Required => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
    }
}

/// Build connect options from resolved settings.
pub fn connect_options(settings: &ConnectionSettings) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.database)
        .ssl_mode(ssl_mode(settings.ssl_mode))
        .charset("utf8mb4")
}

/// Linear backoff before retry number `attempt` (1-based).
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_BACKOFF * attempt
}

/// Open a single-connection pool, retrying retryable failures.
pub async fn connect(settings: &ConnectionSettings) -> InventoryResult<MySqlPool> {
    let url = settings.redacted_url();
    let pool = with_retries(settings.connect_retries, |attempt| {
        debug!(url = %url, attempt, "Connecting to MySQL");
        try_connect(settings)
    })
    .await?;
    info!(url = %url, "Connected to MySQL");
    Ok(pool)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or has
/// been retried `max_retries` times. `op` receives the 0-based attempt.
pub async fn with_retries<T, F, Fut>(max_retries: u32, mut op: F) -> InventoryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = InventoryResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = retry_delay(attempt);
                warn!(
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn try_connect(settings: &ConnectionSettings) -> InventoryResult<MySqlPool> {
    MySqlPoolOptions::new()
        .min_connections(0)
        .max_connections(1)
        .acquire_timeout(settings.connect_timeout)
        .connect_with(connect_options(settings))
        .await
        .map_err(|e| classify_connect_error(settings, e))
}

/// Connection-phase errors keep sqlx's classification but get a
/// suggestion tailored to what went wrong.
fn classify_connect_error(settings: &ConnectionSettings, error: sqlx::Error) -> InventoryError {
    let suggestion = connection_suggestion(settings, &error);
    match InventoryError::from(error) {
        InventoryError::Connection { message, .. } => {
            InventoryError::connection(message, suggestion)
        }
        InventoryError::Database {
            message, sql_state, ..
        } => InventoryError::database(message, sql_state, suggestion),
        other => other,
    }
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(settings: &ConnectionSettings, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the MySQL server is running and accessible at {}:{}",
            settings.host, settings.port
        );
    }

    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify db_user and db_password (or DB_USER/DB_PASSWORD)".to_string();
    }

    if error_str.contains("unknown database") {
        return format!("Check that the database '{}' exists", settings.database);
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check db_ssl_mode and the server's TLS configuration".to_string();
    }

    if matches!(error, sqlx::Error::PoolTimedOut) {
        return format!(
            "No connection within {}s; check the network path or raise connect_timeout",
            settings.connect_timeout.as_secs()
        );
    }

    "Verify db_host, db_port, db_user, db_password and db_name".to_string()
}
