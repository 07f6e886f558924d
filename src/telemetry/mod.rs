//! Telemetry: logging setup and interface statistics.

mod logging;
mod stats;

pub use logging::{LogConfig, init_logging};
pub use stats::{STAT_NAMES, StatsTable};
