//! Logging setup with redaction of technician and site data
//!
//! Field records carry technician emails, customer phone numbers and plant
//! coordinates. Remote backends like to echo request payloads back in their
//! error messages, so anything from the network is passed through
//! [`redact`] before it reaches a log line.
//!
//! # Example
//!
//! ```no_run
//! use logger_redacted::{init_logging, redact, LoggerConfig};
//!
//! init_logging(&LoggerConfig::default()).ok();
//! tracing::warn!(error = %redact("tech@acme.com not authorised"), "Remote upsert failed");
//! ```

pub mod config;
pub mod redactor;

pub use config::LoggerConfig;
pub use redactor::{redact, PiiRedactor, RedactionConfig};

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter {0:?}: {1}")]
    InvalidFilter(String, String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init_logging(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| LoggerError::InvalidFilter(config.log_level.clone(), e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_ansi(false),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))
}
