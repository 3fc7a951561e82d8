//! Chat Relay - Entry Point
//!
//! Loads the config file, sets up logging, and runs the relay loop.

use std::env;
use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::{Config, ConfigWarning, RelayError, RelayServer};

/// Default config file path
const DEFAULT_CONFIG_PATH: &str = "config";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    // Get config path from command line or use default
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let (config, warnings) = Config::load(&path)?;
    init_logging(&config)?;

    for warning in &warnings {
        match warning {
            ConfigWarning::UnknownKey(_) => debug!("{}: {}", path, warning),
            _ => warn!("{}: {}", path, warning),
        }
    }

    let server = RelayServer::bind(&config).await?;
    info!("Chat relay listening on {}", server.local_addr()?);
    info!(
        "Limits: {} users, {} characters per message",
        config.max_users, config.max_message_length
    );

    server.run().await;
    Ok(())
}

/// Initialize logging with environment filter
///
/// RUST_LOG wins when set, e.g. RUST_LOG=chat_relay=trace; otherwise the
/// LOGGING_LEVEL from the config file applies.
fn init_logging(config: &Config) -> Result<(), RelayError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chat_relay={}", config.log_level.as_directive()))
    });

    match &config.log_file {
        Some(log_file) => {
            let file = OpenOptions::new().create(true).append(true).open(log_file)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}
