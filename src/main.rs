//! mysql-inventory - Ansible inventory script backed by MySQL.

use mysql_inventory::cli;
use mysql_inventory::config::Config;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr; stdout carries the
/// inventory JSON.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse_args();
    init_tracing(&config);

    info!(
        source = %config.source.display(),
        action = ?config.action(),
        "Starting mysql-inventory v{}",
        env!("CARGO_PKG_VERSION")
    );

    match cli::run(&config).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Inventory failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}
