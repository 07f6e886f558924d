//! Configuration types

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::validation::DEFAULT_MTU;
use crate::link::LinkKind;
use crate::mac::MacAddr;
use crate::telemetry::LogConfig;

/// Configuration file (TOML)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: Option<LogConfig>,
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

/// One `[interfaces.<name>]` table. Values stay textual here; they are
/// validated by the interface setters when applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    #[serde(default)]
    pub kind: LinkKind,
    pub id: Option<u32>,
    pub mac: Option<String>,
    pub ipv4: Option<String>,
    pub netmask: Option<String>,
    pub broadcast: Option<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    pub mtu: Option<u32>,
}

/// Validated, typed settings of one interface, as buffered by the setters
/// and committed by `up`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub mac: Option<MacAddr>,
    pub ipv4: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
    pub mtu: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            mac: None,
            ipv4: None,
            netmask: None,
            broadcast: None,
            ipv6: Vec::new(),
            mtu: DEFAULT_MTU,
        }
    }
}
