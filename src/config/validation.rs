//! Configuration validation
//!
//! Field validators are pure: they never touch the OS. They run on every
//! setter call and again, over the whole pending configuration, when an
//! interface is brought up.

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{error, warn};

use super::{Config, LinkSettings};
use crate::mac::{MacAddr, ParseMacAddrError};

/// Kernel limit on interface names, including the terminating NUL.
pub const IFNAMSIZ: usize = 16;

/// RFC 791: every internet module must forward a 68-octet datagram.
pub const MIN_MTU: u32 = 68;

/// Largest MTU the kernel reports (loopback).
pub const MAX_MTU: u32 = 65536;

pub const DEFAULT_MTU: u32 = 1500;

/// The configuration field a value was destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Mac,
    Ipv4,
    Netmask,
    Broadcast,
    Ipv6,
    Mtu,
    Packet,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Name => "interface name",
            Field::Mac => "MAC address",
            Field::Ipv4 => "IPv4 address",
            Field::Netmask => "IPv4 netmask",
            Field::Broadcast => "IPv4 broadcast",
            Field::Ipv6 => "IPv6 address",
            Field::Mtu => "MTU",
            Field::Packet => "packet",
        };
        f.write_str(s)
    }
}

/// The syntax rule a value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    NameEmpty,
    NameTooLong,
    NameInvalidChar(char),
    NameReserved,
    MacGroupCount,
    MacGroupWidth,
    MacHexDigit,
    MacMulticast,
    MacZero,
    Ipv4Syntax,
    Ipv4OctetCount,
    Ipv4OctetRange,
    NetmaskNotContiguous,
    Ipv6Syntax,
    Ipv6Duplicate,
    MtuTooSmall,
    MtuTooLarge,
    RequiresIpv4,
    PacketTooSmall,
    PacketTooLarge,
    LengthPrefixMismatch,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::NameEmpty => write!(f, "name is empty"),
            Rule::NameTooLong => write!(f, "name must be shorter than {} bytes", IFNAMSIZ),
            Rule::NameInvalidChar(c) => write!(f, "name contains invalid character {:?}", c),
            Rule::NameReserved => write!(f, "name is reserved"),
            Rule::MacGroupCount => write!(f, "expected six hex groups"),
            Rule::MacGroupWidth => write!(f, "each hex group must be two digits"),
            Rule::MacHexDigit => write!(f, "invalid hex digit"),
            Rule::MacMulticast => write!(f, "multicast address cannot be assigned to a link"),
            Rule::MacZero => write!(f, "all-zero address cannot be assigned to a link"),
            Rule::Ipv4Syntax => write!(f, "not a dotted-decimal address"),
            Rule::Ipv4OctetCount => write!(f, "expected four octets"),
            Rule::Ipv4OctetRange => write!(f, "octet out of range 0-255"),
            Rule::NetmaskNotContiguous => write!(f, "netmask bits are not contiguous"),
            Rule::Ipv6Syntax => write!(f, "not a valid IPv6 address"),
            Rule::Ipv6Duplicate => write!(f, "address listed more than once"),
            Rule::MtuTooSmall => write!(f, "below minimum {}", MIN_MTU),
            Rule::MtuTooLarge => write!(f, "above maximum {}", MAX_MTU),
            Rule::RequiresIpv4 => write!(f, "requires an IPv4 address to be set"),
            Rule::PacketTooSmall => write!(f, "payload below {} bytes", MIN_MTU),
            Rule::PacketTooLarge => write!(f, "payload exceeds the limit"),
            Rule::LengthPrefixMismatch => write!(f, "length prefix does not match payload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} {value:?}: {rule}")]
pub struct ValidationError {
    pub field: Field,
    pub value: String,
    pub rule: Rule,
}

impl ValidationError {
    pub fn new(field: Field, value: impl Into<String>, rule: Rule) -> Self {
        Self {
            field,
            value: value.into(),
            rule,
        }
    }

    pub(crate) fn ipv6_syntax(field: Field, value: &str) -> Self {
        Self::new(field, value, Rule::Ipv6Syntax)
    }
}

type Checked<T> = std::result::Result<T, ValidationError>;

pub fn validate_name(name: &str) -> Checked<()> {
    if name.is_empty() {
        return Err(ValidationError::new(Field::Name, name, Rule::NameEmpty));
    }
    if name.len() >= IFNAMSIZ {
        return Err(ValidationError::new(Field::Name, name, Rule::NameTooLong));
    }
    if name == "." || name == ".." {
        return Err(ValidationError::new(Field::Name, name, Rule::NameReserved));
    }
    // '%' would let the kernel pick the final name
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | ':' | '%'))
    {
        return Err(ValidationError::new(
            Field::Name,
            name,
            Rule::NameInvalidChar(c),
        ));
    }
    Ok(())
}

pub fn validate_mac(mac: &str) -> Checked<MacAddr> {
    let parsed: MacAddr = mac.parse().map_err(|e| {
        let rule = match e {
            ParseMacAddrError::GroupCount => Rule::MacGroupCount,
            ParseMacAddrError::GroupWidth => Rule::MacGroupWidth,
            ParseMacAddrError::Hex => Rule::MacHexDigit,
        };
        ValidationError::new(Field::Mac, mac, rule)
    })?;
    check_mac(parsed)?;
    Ok(parsed)
}

fn check_mac(mac: MacAddr) -> Checked<()> {
    if mac.is_zero() {
        return Err(ValidationError::new(Field::Mac, mac.to_string(), Rule::MacZero));
    }
    if mac.is_multicast() {
        return Err(ValidationError::new(
            Field::Mac,
            mac.to_string(),
            Rule::MacMulticast,
        ));
    }
    Ok(())
}

/// Dotted-quad parser shared by address, netmask and broadcast fields.
fn parse_dotted_quad(field: Field, value: &str) -> Checked<Ipv4Addr> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() != 4 {
        return Err(ValidationError::new(field, value, Rule::Ipv4OctetCount));
    }

    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::new(field, value, Rule::Ipv4Syntax));
        }
        // Leading zeros read as octal by some tools
        if part.len() > 1 && part.starts_with('0') {
            return Err(ValidationError::new(field, value, Rule::Ipv4Syntax));
        }
        let n: u32 = if part.len() > 3 {
            u32::MAX
        } else {
            part.parse().unwrap_or(u32::MAX)
        };
        if n > 255 {
            return Err(ValidationError::new(field, value, Rule::Ipv4OctetRange));
        }
        octets[i] = n as u8;
    }

    Ok(Ipv4Addr::from(octets))
}

pub fn validate_ipv4(ipv4: &str) -> Checked<Ipv4Addr> {
    parse_dotted_quad(Field::Ipv4, ipv4)
}

pub fn validate_broadcast(broadcast: &str) -> Checked<Ipv4Addr> {
    parse_dotted_quad(Field::Broadcast, broadcast)
}

pub fn validate_netmask(netmask: &str) -> Checked<Ipv4Addr> {
    let mask = parse_dotted_quad(Field::Netmask, netmask)?;
    check_netmask(mask)?;
    Ok(mask)
}

fn check_netmask(mask: Ipv4Addr) -> Checked<()> {
    let bits = u32::from(mask);
    // Ones followed by zeros: inverting gives 0b0..01..1, so adding one
    // yields a power of two (or zero for 0.0.0.0).
    if (!bits).wrapping_add(1) & !bits != 0 {
        return Err(ValidationError::new(
            Field::Netmask,
            mask.to_string(),
            Rule::NetmaskNotContiguous,
        ));
    }
    Ok(())
}

pub fn validate_ipv6(ipv6: &str) -> Checked<Ipv6Addr> {
    ipv6.parse::<Ipv6Addr>()
        .map_err(|_| ValidationError::ipv6_syntax(Field::Ipv6, ipv6))
}

pub fn validate_ipv6_list<S: AsRef<str>>(list: &[S]) -> Checked<Vec<Ipv6Addr>> {
    let mut addrs = Vec::with_capacity(list.len());
    for s in list {
        let addr = validate_ipv6(s.as_ref())?;
        if addrs.contains(&addr) {
            return Err(ValidationError::new(
                Field::Ipv6,
                s.as_ref(),
                Rule::Ipv6Duplicate,
            ));
        }
        addrs.push(addr);
    }
    Ok(addrs)
}

pub fn validate_mtu(mtu: u32) -> Checked<u32> {
    if mtu < MIN_MTU {
        return Err(ValidationError::new(Field::Mtu, mtu.to_string(), Rule::MtuTooSmall));
    }
    if mtu > MAX_MTU {
        return Err(ValidationError::new(Field::Mtu, mtu.to_string(), Rule::MtuTooLarge));
    }
    Ok(mtu)
}

/// Re-checks every field of a pending configuration plus the rules that
/// span fields.
pub fn validate_settings(settings: &LinkSettings) -> Checked<()> {
    if let Some(mac) = settings.mac {
        check_mac(mac)?;
    }
    if let Some(mask) = settings.netmask {
        check_netmask(mask)?;
        if settings.ipv4.is_none() {
            return Err(ValidationError::new(
                Field::Netmask,
                mask.to_string(),
                Rule::RequiresIpv4,
            ));
        }
    }
    if let Some(broadcast) = settings.broadcast {
        if settings.ipv4.is_none() {
            return Err(ValidationError::new(
                Field::Broadcast,
                broadcast.to_string(),
                Rule::RequiresIpv4,
            ));
        }
    }
    for (i, addr) in settings.ipv6.iter().enumerate() {
        if settings.ipv6[..i].contains(addr) {
            return Err(ValidationError::new(
                Field::Ipv6,
                addr.to_string(),
                Rule::Ipv6Duplicate,
            ));
        }
    }
    validate_mtu(settings.mtu)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn log_diagnostics(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        for e in &self.errors {
            error!("{}", e);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a configuration file and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_interfaces(config, &mut result);
    validate_logging(config, &mut result);

    result
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    let mut ids: HashMap<u32, &str> = HashMap::new();

    for (name, iface) in &config.interfaces {
        if let Err(e) = validate_name(name) {
            result.error(format!("interfaces.{}: {}", name, e));
        }

        if let Some(id) = iface.id {
            if let Some(other) = ids.insert(id, name) {
                result.error(format!(
                    "interfaces.{}: id {} already used by interfaces.{}",
                    name, id, other
                ));
            }
        }

        if let Some(mac) = &iface.mac {
            if let Err(e) = validate_mac(mac) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
        if let Some(ipv4) = &iface.ipv4 {
            if let Err(e) = validate_ipv4(ipv4) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
        if let Some(netmask) = &iface.netmask {
            if let Err(e) = validate_netmask(netmask) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
        if let Some(broadcast) = &iface.broadcast {
            if let Err(e) = validate_broadcast(broadcast) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
        if let Err(e) = validate_ipv6_list(&iface.ipv6) {
            result.error(format!("interfaces.{}: {}", name, e));
        }

        match iface.mtu {
            Some(mtu) => {
                if let Err(e) = validate_mtu(mtu) {
                    result.error(format!("interfaces.{}: {}", name, e));
                }
            }
            None => result.warn(format!(
                "interfaces.{}: mtu not specified, using default {}",
                name, DEFAULT_MTU
            )),
        }

        if iface.ipv4.is_none() && (iface.netmask.is_some() || iface.broadcast.is_some()) {
            result.error(format!(
                "interfaces.{}: netmask/broadcast require an ipv4 address",
                name
            ));
        }
        if iface.ipv4.is_some() && iface.netmask.is_none() {
            result.warn(format!(
                "interfaces.{}: ipv4 without netmask, kernel will derive one",
                name
            ));
        }
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(log) = &config.logging else {
        return;
    };
    if !matches!(
        log.level.to_lowercase().as_str(),
        "error" | "warn" | "info" | "debug" | "trace"
    ) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            log.level
        ));
    }
    if !matches!(log.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            log.format
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;
    use crate::telemetry::LogConfig;
    use std::collections::BTreeMap;

    fn make_config() -> Config {
        Config {
            logging: None,
            interfaces: BTreeMap::new(),
        }
    }

    fn iface() -> InterfaceConfig {
        InterfaceConfig {
            mtu: Some(1500),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("viface0").is_ok());
        assert_eq!(validate_name("").unwrap_err().rule, Rule::NameEmpty);
        assert_eq!(
            validate_name("a-name-that-is-16").unwrap_err().rule,
            Rule::NameTooLong
        );
        assert!(validate_name("fifteen-chars-x").is_ok());
        assert_eq!(validate_name("..").unwrap_err().rule, Rule::NameReserved);
        assert_eq!(
            validate_name("tap%d").unwrap_err().rule,
            Rule::NameInvalidChar('%')
        );
        assert_eq!(
            validate_name("my tap").unwrap_err().rule,
            Rule::NameInvalidChar(' ')
        );
    }

    #[test]
    fn test_mac_rules() {
        assert_eq!(
            validate_mac("ec:f1:f8:d5:47:6b").unwrap(),
            MacAddr([0xec, 0xf1, 0xf8, 0xd5, 0x47, 0x6b])
        );
        assert_eq!(
            validate_mac("ec:f1:f8:d5:47").unwrap_err().rule,
            Rule::MacGroupCount
        );
        assert_eq!(
            validate_mac("ec:f1:f8:d5:47:6").unwrap_err().rule,
            Rule::MacGroupWidth
        );
        assert_eq!(
            validate_mac("ec:f1:f8:d5:47:6g").unwrap_err().rule,
            Rule::MacHexDigit
        );
        assert_eq!(
            validate_mac("01:00:5e:00:00:01").unwrap_err().rule,
            Rule::MacMulticast
        );
        assert_eq!(
            validate_mac("00:00:00:00:00:00").unwrap_err().rule,
            Rule::MacZero
        );
    }

    #[test]
    fn test_ipv4_rules() {
        assert_eq!(
            validate_ipv4("192.168.25.46").unwrap(),
            Ipv4Addr::new(192, 168, 25, 46)
        );
        assert_eq!(
            validate_ipv4("192.168.25").unwrap_err().rule,
            Rule::Ipv4OctetCount
        );
        assert_eq!(
            validate_ipv4("192.168.256.1").unwrap_err().rule,
            Rule::Ipv4OctetRange
        );
        assert_eq!(
            validate_ipv4("192.168.1000.1").unwrap_err().rule,
            Rule::Ipv4OctetRange
        );
        assert_eq!(
            validate_ipv4("192.168.x.1").unwrap_err().rule,
            Rule::Ipv4Syntax
        );
        assert_eq!(
            validate_ipv4("192.168.01.1").unwrap_err().rule,
            Rule::Ipv4Syntax
        );
        assert_eq!(
            validate_broadcast("300.0.0.1").unwrap_err().field,
            Field::Broadcast
        );
    }

    #[test]
    fn test_netmask_rules() {
        assert!(validate_netmask("255.255.255.0").is_ok());
        assert!(validate_netmask("255.255.255.255").is_ok());
        assert!(validate_netmask("0.0.0.0").is_ok());
        assert!(validate_netmask("255.255.128.0").is_ok());
        assert_eq!(
            validate_netmask("255.0.255.0").unwrap_err().rule,
            Rule::NetmaskNotContiguous
        );
        assert_eq!(
            validate_netmask("0.255.255.255").unwrap_err().rule,
            Rule::NetmaskNotContiguous
        );
    }

    #[test]
    fn test_ipv6_rules() {
        assert!(validate_ipv6("fe80::1").is_ok());
        assert_eq!(validate_ipv6("fe80:::1").unwrap_err().rule, Rule::Ipv6Syntax);
        let list = validate_ipv6_list(&["fe80::1", "2001:db8::1"]).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(
            validate_ipv6_list(&["fe80::1", "fe80:0::1"]).unwrap_err().rule,
            Rule::Ipv6Duplicate
        );
    }

    #[test]
    fn test_mtu_rules() {
        assert_eq!(validate_mtu(68).unwrap(), 68);
        assert_eq!(validate_mtu(65536).unwrap(), 65536);
        assert_eq!(validate_mtu(67).unwrap_err().rule, Rule::MtuTooSmall);
        assert_eq!(validate_mtu(65537).unwrap_err().rule, Rule::MtuTooLarge);
    }

    #[test]
    fn test_settings_cross_field() {
        let mut settings = LinkSettings {
            netmask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            ..Default::default()
        };
        let err = validate_settings(&settings).unwrap_err();
        assert_eq!(err.field, Field::Netmask);
        assert_eq!(err.rule, Rule::RequiresIpv4);

        settings.ipv4 = Some(Ipv4Addr::new(10, 0, 0, 1));
        assert!(validate_settings(&settings).is_ok());

        settings.mtu = 10;
        assert_eq!(
            validate_settings(&settings).unwrap_err().rule,
            Rule::MtuTooSmall
        );
    }

    #[test]
    fn test_settings_catches_corrupted_fields() {
        let settings = LinkSettings {
            mac: Some(MacAddr::BROADCAST),
            ..Default::default()
        };
        assert_eq!(
            validate_settings(&settings).unwrap_err().rule,
            Rule::MacMulticast
        );

        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        let settings = LinkSettings {
            ipv6: vec![addr, addr],
            ..Default::default()
        };
        assert_eq!(
            validate_settings(&settings).unwrap_err().rule,
            Rule::Ipv6Duplicate
        );
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = make_config();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_ids() {
        let mut config = make_config();
        config.interfaces.insert(
            "viface0".to_string(),
            InterfaceConfig {
                id: Some(1),
                ..iface()
            },
        );
        config.interfaces.insert(
            "viface1".to_string(),
            InterfaceConfig {
                id: Some(1),
                ..iface()
            },
        );
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("already used")));
    }

    #[test]
    fn test_bad_fields_reported() {
        let mut config = make_config();
        config.interfaces.insert(
            "viface0".to_string(),
            InterfaceConfig {
                mac: Some("ec:f1:f8".to_string()),
                ipv4: Some("10.0.0.300".to_string()),
                ipv6: vec!["nope".to_string()],
                ..iface()
            },
        );
        let result = validate(&config);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_netmask_requires_ipv4() {
        let mut config = make_config();
        config.interfaces.insert(
            "viface0".to_string(),
            InterfaceConfig {
                netmask: Some("255.255.255.0".to_string()),
                ..iface()
            },
        );
        let result = validate(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("require an ipv4 address")));
    }

    #[test]
    fn test_mtu_default_warning() {
        let mut config = make_config();
        config.interfaces.insert(
            "viface0".to_string(),
            InterfaceConfig {
                mtu: None,
                ..iface()
            },
        );
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("mtu not specified")));
    }

    #[test]
    fn test_logging_warnings() {
        let mut config = make_config();
        config.logging = Some(LogConfig {
            level: "loud".to_string(),
            format: "xml".to_string(),
        });
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 2);
    }
}
