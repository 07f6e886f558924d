//! Up/down transitions
//!
//! `up` records every OS step it applies in a journal; if a later step
//! fails the journal is unwound in reverse so the link is left exactly as
//! it was found. A link that existed before `up` gets its MAC and MTU back
//! on `down`.

use super::VirtualInterface;
use crate::Result;
use crate::config::validate_settings;
use crate::link::{LinkBackend, LinkOrigin};
use crate::mac::MacAddr;
use std::net::Ipv6Addr;
use tracing::{debug, info, warn};

/// Prefix length given to every IPv6 address.
pub const IPV6_PREFIX_LEN: u8 = 64;

/// Ethernet header plus one VLAN tag.
const FRAME_OVERHEAD: usize = 18;

/// Settings an attached link had before `up`, put back by `down`.
#[derive(Debug, Clone, Copy)]
pub(super) struct Restore {
    mac: Option<MacAddr>,
    mtu: u32,
}

struct Committed {
    mtu: u32,
    restore: Option<Restore>,
}

/// An OS step that `up` has applied and may have to undo.
#[derive(Debug)]
enum Applied {
    Opened,
    Mac(MacAddr),
    Mtu(u32),
    Ipv4,
    Ipv6(Ipv6Addr),
    AdminUp,
}

impl<B: LinkBackend> VirtualInterface<B> {
    /// Commit the buffered configuration and bring the link up.
    pub fn up(&mut self) -> Result<()> {
        if self.up {
            return Err(self.state_error("up"));
        }
        validate_settings(&self.settings)?;

        let mac = self
            .settings
            .mac
            .unwrap_or_else(|| MacAddr::generate(self.id, &self.name));

        info!("Bringing up {} interface {}...", self.kind, self.name);
        let mut journal = Vec::new();
        let committed = match self.apply(mac, &mut journal) {
            Ok(committed) => committed,
            Err(e) => {
                warn!("Failed to bring up {}: {}", self.name, e);
                self.rollback(journal);
                return Err(e);
            }
        };

        self.settings.mac = Some(mac);
        self.settings.mtu = committed.mtu;
        self.restore = committed.restore;
        self.up = true;
        info!("Interface {} is up", self.name);
        Ok(())
    }

    fn apply(&mut self, mac: MacAddr, journal: &mut Vec<Applied>) -> Result<Committed> {
        let name = self.name.as_str();
        let backend = &mut self.backend;

        let queues = backend.open(name, self.kind)?;
        let origin = queues.origin;
        debug!("Opened {:?} queues for {}", origin, name);
        self.pool.attach_queues(queues);
        journal.push(Applied::Opened);

        // An existing link keeps its MTU unless one was asked for.
        let previous_mtu = backend.mtu(name)?;
        let mtu = if origin == LinkOrigin::Attached && !self.mtu_explicit {
            debug!("Adopting MTU {} of {}", previous_mtu, name);
            previous_mtu
        } else {
            self.settings.mtu
        };
        self.pool.reserve(mtu as usize + FRAME_OVERHEAD)?;

        let mut previous_mac = None;
        if self.kind.is_tap() {
            let previous = backend.mac(name)?;
            backend.set_mac(name, mac)?;
            journal.push(Applied::Mac(previous));
            previous_mac = Some(previous);
            debug!("Set MAC of {} to {}", name, mac);
        }

        backend.set_mtu(name, mtu)?;
        journal.push(Applied::Mtu(previous_mtu));
        debug!("Set MTU of {} to {}", name, mtu);

        if let Some(ipv4) = self.settings.ipv4 {
            backend.set_ipv4(name, ipv4)?;
            journal.push(Applied::Ipv4);
            if let Some(netmask) = self.settings.netmask {
                backend.set_netmask(name, netmask)?;
            }
            if let Some(broadcast) = self.settings.broadcast {
                backend.set_broadcast(name, broadcast)?;
            }
            debug!("Set IPv4 address of {} to {}", name, ipv4);
        }

        for addr in &self.settings.ipv6 {
            backend.add_ipv6(name, *addr, IPV6_PREFIX_LEN)?;
            journal.push(Applied::Ipv6(*addr));
            debug!("Added {}/{} to {}", addr, IPV6_PREFIX_LEN, name);
        }

        backend.set_admin_up(name, true)?;
        journal.push(Applied::AdminUp);

        let restore = (origin == LinkOrigin::Attached).then_some(Restore {
            mac: previous_mac,
            mtu: previous_mtu,
        });
        Ok(Committed { mtu, restore })
    }

    fn rollback(&mut self, journal: Vec<Applied>) {
        let name = self.name.as_str();
        let backend = &mut self.backend;

        for step in journal.into_iter().rev() {
            let result = match &step {
                Applied::AdminUp => backend.set_admin_up(name, false),
                Applied::Ipv6(addr) => backend.del_ipv6(name, *addr, IPV6_PREFIX_LEN),
                Applied::Ipv4 => backend.clear_ipv4(name),
                Applied::Mtu(previous) => backend.set_mtu(name, *previous),
                Applied::Mac(previous) => backend.set_mac(name, *previous),
                Applied::Opened => match self.pool.detach_queues() {
                    Some(queues) => backend.release(name, queues),
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                warn!("Rollback of {:?} on {} failed: {}", step, name, e);
            }
        }
        debug!("Rolled back {}", name);
    }

    /// Retract the committed configuration and close the link.
    ///
    /// Every step is attempted; the interface ends down and the first
    /// failure is returned.
    pub fn down(&mut self) -> Result<()> {
        if !self.up {
            return Err(self.state_error("down"));
        }
        info!("Bringing down interface {}...", self.name);

        // Last look at the counters before the link can disappear.
        if let Err(e) = self.refresh_stats() {
            debug!("Could not snapshot statistics of {}: {}", self.name, e);
        }

        let name = self.name.as_str();
        let backend = &mut self.backend;
        let mut first_error = None;
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                warn!("Teardown step on {} failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        };

        record(backend.set_admin_up(name, false));
        for addr in self.settings.ipv6.iter().rev() {
            record(backend.del_ipv6(name, *addr, IPV6_PREFIX_LEN));
        }
        if self.settings.ipv4.is_some() {
            record(backend.clear_ipv4(name));
        }
        if let Some(restore) = self.restore.take() {
            record(backend.set_mtu(name, restore.mtu));
            if let Some(mac) = restore.mac {
                record(backend.set_mac(name, mac));
            }
            debug!("Restored MTU {} of {}", restore.mtu, name);
        }
        let mut origin = LinkOrigin::Created;
        if let Some(queues) = self.pool.detach_queues() {
            origin = queues.origin;
            record(backend.release(name, queues));
        }

        self.stats.retire_link(origin);
        self.up = false;
        info!("Interface {} is down", self.name);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
