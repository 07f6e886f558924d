//! Configuration management
//!
//! Interfaces can be described in a TOML file and applied with
//! [`VirtualInterface::configure`](crate::VirtualInterface::configure).

mod types;
mod validation;

pub use types::*;
pub use validation::*;

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}
