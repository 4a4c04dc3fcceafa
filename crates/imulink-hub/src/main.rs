//! Standalone relay hub binary.
//!
//! Runs a [`RelayHub`] on [`DEFAULT_PORT`] (overridable via the
//! `IMULINK_HUB_PORT` environment variable) until killed.  A bind failure
//! is the only fatal condition.

use imulink_hub::{DEFAULT_PORT, RelayHub};
use tracing::error;

#[tokio::main]
async fn main() {
    // Structured logging from RUST_LOG (defaults to "info").  Set
    // IMULINK_LOG_FORMAT=json for newline-delimited JSON output.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("IMULINK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    let port = std::env::var("IMULINK_HUB_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    if let Err(e) = RelayHub::new().with_port(port).run().await {
        error!(error = %e, "relay hub failed");
        std::process::exit(1);
    }
}
