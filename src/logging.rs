//! Logging and tracing initialization.
//!
//! Structured logging through the `tracing` ecosystem, either as pretty console output
//! or as JSON for machine parsing.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: Level::INFO,
        }
    }
}

impl LogConfig {
    /// Build a config from a verbosity name. `fatal` and `panic` are accepted as `error`.
    pub fn from_verbosity(verbosity: &str, json: bool) -> Result<Self> {
        let level = match verbosity.to_ascii_lowercase().as_str() {
            "fatal" | "panic" => Level::ERROR,
            other => other
                .parse::<Level>()
                .with_context(|| format!("invalid verbosity level {:?}", verbosity))?,
        };
        Ok(Self { json, level })
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This should be called early in main(), after config is loaded.
/// The log level can be overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "eth1_mock_rpc={}",
            config.level.as_str().to_lowercase()
        ))
    });

    if config.json {
        // JSON output for structured logging / log aggregation
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}
