//! Logging configuration and initialization.
//!
//! Provides flexible logging setup with support for:
//! - Environment variable (RUST_LOG) configuration
//! - the `[logging]` section of the configuration file
//! - Multiple output formats (pretty, compact, json)

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

/// Logging configuration (`[logging]` table).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl LogConfig {
    /// Creates a new LogConfig with default values.
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the logging system.
///
/// Priority:
/// 1. RUST_LOG environment variable (if set)
/// 2. config parameter (if provided)
/// 3. Default: info level, pretty format
///
/// Returns false if a global subscriber was already installed.
///
/// # Examples
///
/// ```ignore
/// let config = viface::config::load("viface.toml")?;
/// init_logging(config.logging.as_ref());
/// ```
pub fn init_logging(config: Option<&LogConfig>) -> bool {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(cfg) = config {
        let level = parse_level(&cfg.level);
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::new("info")
    };

    let format = config.map(|c| c.format.as_str()).unwrap_or("pretty");

    match format {
        "json" => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            );
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
        "compact" => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact());
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
        _ => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer());
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
    }
}

/// Parses a log level string into a Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
