//! Virtual network interfaces
//!
//! A [`VirtualInterface`] buffers its configuration while down. Setters
//! validate syntax immediately; nothing reaches the OS until [`up`], which
//! commits everything or nothing.
//!
//! [`up`]: VirtualInterface::up

mod lifecycle;
mod packet;

pub use lifecycle::IPV6_PREFIX_LEN;
pub use packet::{MAX_PAYLOAD, PacketBuffer};

use crate::arena::{InterfacePool, RootPool};
use crate::codec::CountedList;
use crate::config::{
    InterfaceConfig, LinkSettings, validate_broadcast, validate_ipv4, validate_ipv6,
    validate_ipv6_list, validate_mac, validate_mtu, validate_name, validate_netmask,
};
use crate::error::{LinkState, Rejected};
use crate::link::{KernelBackend, LinkBackend, LinkKind};
use crate::mac::MacAddr;
use crate::telemetry::{STAT_NAMES, StatsTable};
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsFd, BorrowedFd};
use tracing::{debug, info, warn};

/// A TAP or TUN link managed by this process.
pub struct VirtualInterface<B: LinkBackend = KernelBackend> {
    name: String,
    id: u32,
    kind: LinkKind,
    settings: LinkSettings,
    /// MTU came from a setter rather than the default.
    mtu_explicit: bool,
    restore: Option<lifecycle::Restore>,
    up: bool,
    stats: StatsTable,
    pool: InterfacePool,
    backend: B,
}

impl VirtualInterface<KernelBackend> {
    /// Create an interface driven by the running kernel.
    pub fn create(root: &RootPool, name: &str, kind: LinkKind, id: Option<u32>) -> Result<Self> {
        let backend = KernelBackend::new()?;
        Self::create_with_backend(root, name, kind, id, backend)
    }

    pub fn from_config(root: &RootPool, name: &str, config: &InterfaceConfig) -> Result<Self> {
        let backend = KernelBackend::new()?;
        Self::from_config_with_backend(root, name, config, backend)
    }
}

impl<B: LinkBackend> VirtualInterface<B> {
    pub fn create_with_backend(
        root: &RootPool,
        name: &str,
        kind: LinkKind,
        id: Option<u32>,
        backend: B,
    ) -> Result<Self> {
        validate_name(name)?;
        let id = root.next_id(id);
        let pool = root.create_interface_pool();

        info!("Created {} interface {} (id {})", kind, name, id);
        Ok(Self {
            name: name.to_string(),
            id,
            kind,
            settings: LinkSettings::default(),
            mtu_explicit: false,
            restore: None,
            up: false,
            stats: StatsTable::new(),
            pool,
            backend,
        })
    }

    /// Create an interface and apply a config-file entry to it.
    pub fn from_config_with_backend(
        root: &RootPool,
        name: &str,
        config: &InterfaceConfig,
        backend: B,
    ) -> Result<Self> {
        let mut iface = Self::create_with_backend(root, name, config.kind, config.id, backend)?;
        iface.configure(config)?;
        Ok(iface)
    }

    /// Applies every field present in `config` through the setters.
    pub fn configure(&mut self, config: &InterfaceConfig) -> Result<()> {
        self.require_down("configure")?;
        if config.kind != self.kind {
            warn!(
                "Interface {} is {}, ignoring configured kind {}",
                self.name, self.kind, config.kind
            );
        }

        if let Some(mac) = &config.mac {
            self.set_mac(mac)?;
        }
        if let Some(ipv4) = &config.ipv4 {
            self.set_ipv4(ipv4)?;
        }
        if let Some(netmask) = &config.netmask {
            self.set_netmask(netmask)?;
        }
        if let Some(broadcast) = &config.broadcast {
            self.set_broadcast(broadcast)?;
        }
        self.set_ipv6(&config.ipv6)?;
        if let Some(mtu) = config.mtu {
            self.set_mtu(mtu)?;
        }
        Ok(())
    }

    /// Destroy the interface and release its pool. Refused while up.
    pub fn destroy(mut self) -> std::result::Result<(), Rejected<Self>> {
        if self.up {
            let err = self.state_error("destroy");
            return Err(Rejected::new(self, err));
        }
        if let Err(e) = self.pool.release() {
            warn!("Releasing pool of {} failed: {}", self.name, e);
        }
        info!("Destroyed interface {}", self.name);
        Ok(())
    }

    fn state(&self) -> LinkState {
        if self.up { LinkState::Up } else { LinkState::Down }
    }

    fn state_error(&self, op: &'static str) -> Error {
        Error::State {
            op,
            name: self.name.clone(),
            state: self.state(),
        }
    }

    fn require_down(&self, op: &'static str) -> Result<()> {
        if self.up {
            return Err(self.state_error(op));
        }
        Ok(())
    }

    // Setters: validate, then buffer until the next `up`.

    pub fn set_mac(&mut self, mac: &str) -> Result<()> {
        self.require_down("set MAC address")?;
        let mac = validate_mac(mac)?;
        self.settings.mac = Some(mac);
        debug!("{}: pending MAC {}", self.name, mac);
        Ok(())
    }

    pub fn set_ipv4(&mut self, ipv4: &str) -> Result<()> {
        self.require_down("set IPv4 address")?;
        self.settings.ipv4 = Some(validate_ipv4(ipv4)?);
        debug!("{}: pending IPv4 {}", self.name, ipv4);
        Ok(())
    }

    pub fn set_netmask(&mut self, netmask: &str) -> Result<()> {
        self.require_down("set netmask")?;
        self.settings.netmask = Some(validate_netmask(netmask)?);
        debug!("{}: pending netmask {}", self.name, netmask);
        Ok(())
    }

    pub fn set_broadcast(&mut self, broadcast: &str) -> Result<()> {
        self.require_down("set broadcast address")?;
        self.settings.broadcast = Some(validate_broadcast(broadcast)?);
        debug!("{}: pending broadcast {}", self.name, broadcast);
        Ok(())
    }

    /// Replaces the IPv6 address list.
    pub fn set_ipv6<S: AsRef<str>>(&mut self, addrs: &[S]) -> Result<()> {
        self.require_down("set IPv6 addresses")?;
        self.settings.ipv6 = validate_ipv6_list(addrs)?;
        debug!(
            "{}: pending {} IPv6 address(es)",
            self.name,
            self.settings.ipv6.len()
        );
        Ok(())
    }

    pub fn add_ipv6(&mut self, addr: &str) -> Result<()> {
        self.require_down("add IPv6 address")?;
        let addr = validate_ipv6(addr)?;
        let mut list = self.settings.ipv6.clone();
        list.push(addr);
        let text: Vec<String> = list.iter().map(|a| a.to_string()).collect();
        validate_ipv6_list(&text)?;
        self.settings.ipv6 = list;
        Ok(())
    }

    pub fn set_mtu(&mut self, mtu: u32) -> Result<()> {
        self.require_down("set MTU")?;
        self.settings.mtu = validate_mtu(mtu)?;
        self.mtu_explicit = true;
        debug!("{}: pending MTU {}", self.name, mtu);
        Ok(())
    }

    // Getters: last-set values while down, committed values while up.

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// `None` until set or assigned by the first `up`. TUN links carry the
    /// address for identification only.
    pub fn mac(&self) -> Option<MacAddr> {
        self.settings.mac
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.settings.ipv4
    }

    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.settings.netmask
    }

    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        self.settings.broadcast
    }

    pub fn ipv6(&self) -> &[Ipv6Addr] {
        &self.settings.ipv6
    }

    /// An interface attached to an existing link reports that link's MTU
    /// once up, unless one was set.
    pub fn mtu(&self) -> u32 {
        self.settings.mtu
    }

    pub fn rx_fd(&self) -> Option<BorrowedFd<'_>> {
        self.pool.queues().map(|q| q.rx.as_fd())
    }

    pub fn tx_fd(&self) -> Option<BorrowedFd<'_>> {
        self.pool.queues().map(|q| q.tx.as_fd())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // Statistics

    pub fn list_stats(&self) -> &'static [&'static str] {
        StatsTable::names()
    }

    /// Statistic names in count-prefixed wire form.
    pub fn stat_names(&self) -> Vec<String> {
        CountedList::new(STAT_NAMES).encode()
    }

    pub fn read_stat(&mut self, stat: &str) -> Result<u64> {
        let idx = StatsTable::index_of(stat)?;
        self.observe(idx)?;
        Ok(self.stats.value(idx))
    }

    /// Zeroes a counter as seen through this interface. The kernel's
    /// counter keeps running.
    pub fn clear_stat(&mut self, stat: &str) -> Result<()> {
        let idx = StatsTable::index_of(stat)?;
        self.observe(idx)?;
        self.stats.clear(idx);
        debug!("{}: cleared {}", self.name, stat);
        Ok(())
    }

    /// All counters, in listing order.
    pub fn stats_snapshot(&mut self) -> Result<Vec<(String, u64)>> {
        self.refresh_stats()?;
        Ok(self.stats.export())
    }

    fn observe(&mut self, idx: usize) -> Result<()> {
        if self.up {
            let value = self.backend.read_stat(&self.name, STAT_NAMES[idx])?;
            self.stats.observe(idx, value);
        }
        Ok(())
    }

    fn refresh_stats(&mut self) -> Result<()> {
        for idx in 0..STAT_NAMES.len() {
            self.observe(idx)?;
        }
        Ok(())
    }
}

impl<B: LinkBackend> Drop for VirtualInterface<B> {
    fn drop(&mut self) {
        if self.up {
            if let Err(e) = self.down() {
                warn!("Failed to bring down {} on drop: {}", self.name, e);
            }
        }
    }
}

impl<B: LinkBackend> std::fmt::Debug for VirtualInterface<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualInterface")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::config::{Field, Rule, ValidationError};
    use crate::link::MemoryBackend;

    fn memory_iface(root: &RootPool, name: &str) -> VirtualInterface<MemoryBackend> {
        VirtualInterface::create_with_backend(root, name, LinkKind::Tap, None, MemoryBackend::new())
            .unwrap()
    }

    #[test]
    fn test_create_defaults() {
        let root = RootPool::create().unwrap();
        let iface = memory_iface(&root, "mem0");
        assert_eq!(iface.name(), "mem0");
        assert_eq!(iface.id(), 0);
        assert_eq!(iface.kind(), LinkKind::Tap);
        assert!(!iface.is_up());
        assert_eq!(iface.mtu(), 1500);
        assert!(iface.mac().is_none());
        assert!(iface.ipv4().is_none());
        assert!(iface.ipv6().is_empty());
        assert!(iface.rx_fd().is_none());
        assert!(iface.tx_fd().is_none());
        assert_eq!(root.live_pools(), 1);
        iface.destroy().unwrap();
        assert_eq!(root.live_pools(), 0);
    }

    #[test]
    fn test_create_rejects_bad_name_without_consuming_id() {
        let root = RootPool::create().unwrap();
        let err = VirtualInterface::create_with_backend(
            &root,
            "bad/name",
            LinkKind::Tap,
            None,
            MemoryBackend::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(root.live_pools(), 0);

        let iface = memory_iface(&root, "mem0");
        assert_eq!(iface.id(), 0);
    }

    #[test]
    fn test_setters_validate() {
        let root = RootPool::create().unwrap();
        let mut iface = memory_iface(&root, "mem0");

        let err = iface.set_mtu(67).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError {
                field: Field::Mtu,
                rule: Rule::MtuTooSmall,
                ..
            })
        ));
        assert_eq!(iface.mtu(), 1500);

        assert!(iface.set_mac("01:00:5e:00:00:01").is_err());
        assert!(iface.set_netmask("255.0.255.0").is_err());
        assert!(iface.set_ipv4("256.1.1.1").is_err());
        assert!(iface.mac().is_none());
        assert!(iface.ipv4().is_none());
    }

    #[test]
    fn test_add_ipv6_rejects_duplicate() {
        let root = RootPool::create().unwrap();
        let mut iface = memory_iface(&root, "mem0");
        iface.add_ipv6("fe80::1").unwrap();
        let err = iface.add_ipv6("fe80::0:1").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError {
                rule: Rule::Ipv6Duplicate,
                ..
            })
        ));
        assert_eq!(iface.ipv6().len(), 1);
    }

    #[test]
    fn test_stat_names_wire_form() {
        let root = RootPool::create().unwrap();
        let iface = memory_iface(&root, "mem0");
        let wire = iface.stat_names();
        assert_eq!(wire[0], "23");
        assert_eq!(wire.len(), 24);
        assert_eq!(&wire[1..], iface.list_stats());
    }

    #[test]
    fn test_unknown_stat() {
        let root = RootPool::create().unwrap();
        let mut iface = memory_iface(&root, "mem0");
        let err = iface.read_stat("rx_bogus").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(iface.clear_stat("rx_bogus").is_err());
        assert_eq!(iface.read_stat("rx_packets").unwrap(), 0);
    }

    #[test]
    fn test_configure_from_entry() {
        let root = RootPool::create().unwrap();
        let config = InterfaceConfig {
            id: Some(7),
            mac: Some("ec:f1:f8:d5:47:6b".into()),
            ipv4: Some("10.0.0.1".into()),
            netmask: Some("255.255.255.0".into()),
            ipv6: vec!["fe80::1".into()],
            mtu: Some(1400),
            ..Default::default()
        };
        let iface = VirtualInterface::from_config_with_backend(
            &root,
            "mem0",
            &config,
            MemoryBackend::new(),
        )
        .unwrap();
        assert_eq!(iface.id(), 7);
        assert_eq!(iface.mac().unwrap().to_string(), "ec:f1:f8:d5:47:6b");
        assert_eq!(iface.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(iface.ipv6().len(), 1);
        assert_eq!(iface.mtu(), 1400);
    }
}
