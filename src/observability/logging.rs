//! # Structured Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` takes precedence over the
//! configured level when it is set.

use crate::core::config::LoggingConfig;
use crate::core::error::{GatewayError, GatewayResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    let level = level.to_lowercase();
    format!("yt_relay={level},tower_http={level}")
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|e| GatewayError::config(format!("Invalid log filter: {}", e)))?;

    let result = match config.format.to_lowercase().as_str() {
        "text" => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
        _ => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    };

    result.map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))
}
