//! In-process link backend
//!
//! Models a kernel link with a datagram socketpair: the interface owns one
//! end, a [`MemoryPeer`] plays the kernel side. Counters follow the kernel's
//! point of view, so a frame written by the interface is received by the
//! peer and counted as `rx`.

use super::{LinkBackend, LinkKind, LinkOrigin, LinkQueues};
use crate::mac::MacAddr;
use crate::telemetry::STAT_NAMES;
use crate::{Error, Result};
use std::cell::RefCell;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixDatagram;
use std::rc::Rc;
use tracing::debug;

/// Address a freshly opened link starts with.
pub const INITIAL_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

const INITIAL_MTU: u32 = 1500;

/// Backend operations, for failure injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Open,
    Release,
    SetMac,
    SetMtu,
    SetIpv4,
    SetNetmask,
    SetBroadcast,
    ClearIpv4,
    AddIpv6,
    DelIpv6,
    SetAdminUp,
    SetAdminDown,
    ReadStat,
}

/// Observable state of the simulated link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLinkState {
    pub exists: bool,
    pub kind: Option<LinkKind>,
    pub admin_up: bool,
    pub mac: MacAddr,
    pub mtu: u32,
    pub ipv4: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub ipv6: Vec<(Ipv6Addr, u8)>,
    /// Number of times the link has been opened.
    pub opens: usize,
    /// Every mutating call that succeeded, in order.
    pub log: Vec<Op>,
}

impl Default for MemoryLinkState {
    fn default() -> Self {
        Self {
            exists: false,
            kind: None,
            admin_up: false,
            mac: INITIAL_MAC,
            mtu: INITIAL_MTU,
            ipv4: None,
            netmask: None,
            broadcast: None,
            ipv6: Vec::new(),
            opens: 0,
            log: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    link: MemoryLinkState,
    counters: [u64; STAT_NAMES.len()],
    fail_on: Option<Op>,
    peer: Option<UnixDatagram>,
    /// The link outlives the queues: opening attaches to it.
    attached: bool,
}

impl Shared {
    fn inject(&mut self, op: Op, name: &str) -> Result<()> {
        if self.fail_on == Some(op) {
            self.fail_on = None;
            return Err(Error::os(
                "complete injected operation",
                name,
                io::Error::other(format!("{:?} failed", op)),
            ));
        }
        Ok(())
    }

    fn check(&mut self, op: Op, name: &str) -> Result<()> {
        self.inject(op, name)?;
        if op != Op::Open {
            self.require_link(name)?;
        }
        Ok(())
    }

    fn require_link(&self, name: &str) -> Result<()> {
        if !self.link.exists {
            return Err(Error::os(
                "reach link",
                name,
                io::Error::from_raw_os_error(libc::ENODEV),
            ));
        }
        Ok(())
    }

    fn bump(&mut self, stat: &str, by: u64) {
        if let Some(idx) = STAT_NAMES.iter().position(|n| *n == stat) {
            self.counters[idx] = self.counters[idx].saturating_add(by);
        }
    }
}

/// Link backend that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that already exists with the given MTU and MAC. Opening it
    /// attaches; its settings and counters persist across open and release.
    pub fn existing(mtu: u32, mac: MacAddr) -> Self {
        let shared = Shared {
            link: MemoryLinkState {
                exists: true,
                mtu,
                mac,
                ..MemoryLinkState::default()
            },
            attached: true,
            ..Shared::default()
        };
        Self {
            shared: Rc::new(RefCell::new(shared)),
        }
    }

    /// Handle to the kernel side of the link.
    pub fn peer(&self) -> MemoryPeer {
        MemoryPeer {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Makes the next call of `op` fail with an OS error.
    pub fn fail_on(&self, op: Op) {
        self.shared.borrow_mut().fail_on = Some(op);
    }

    pub fn state(&self) -> MemoryLinkState {
        self.shared.borrow().link.clone()
    }

    fn apply(&mut self, op: Op, name: &str, f: impl FnOnce(&mut MemoryLinkState)) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        shared.check(op, name)?;
        f(&mut shared.link);
        shared.link.log.push(op);
        Ok(())
    }
}

impl LinkBackend for MemoryBackend {
    fn open(&mut self, name: &str, kind: LinkKind) -> Result<LinkQueues> {
        let mut shared = self.shared.borrow_mut();
        shared.check(Op::Open, name)?;

        let (local, remote) = UnixDatagram::pair().map_err(|e| Error::os("create link", name, e))?;
        local
            .set_nonblocking(true)
            .and_then(|_| remote.set_nonblocking(true))
            .map_err(|e| Error::os("create link", name, e))?;
        let tx = local
            .try_clone()
            .map_err(|e| Error::os("create link", name, e))?;

        let origin = if shared.attached {
            shared.link.kind = Some(kind);
            shared.link.opens += 1;
            LinkOrigin::Attached
        } else {
            let opens = shared.link.opens + 1;
            let log = std::mem::take(&mut shared.link.log);
            shared.link = MemoryLinkState {
                exists: true,
                kind: Some(kind),
                opens,
                log,
                ..MemoryLinkState::default()
            };
            shared.counters = [0; STAT_NAMES.len()];
            LinkOrigin::Created
        };
        shared.link.log.push(Op::Open);
        shared.peer = Some(remote);
        debug!("Opened in-memory {} link {} ({:?})", kind, name, origin);

        Ok(LinkQueues {
            rx: OwnedFd::from(local),
            tx: OwnedFd::from(tx),
            origin,
        })
    }

    fn release(&mut self, name: &str, queues: LinkQueues) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        let injected = shared.inject(Op::Release, name);

        // The queues close either way.
        shared.peer = None;
        if !shared.attached {
            shared.link.exists = false;
            shared.link.admin_up = false;
        }
        let closed = queues
            .close()
            .map_err(|e| Error::os("close link queues", name, e));
        if injected.is_ok() && closed.is_ok() {
            shared.link.log.push(Op::Release);
        }
        injected.and(closed)
    }

    fn mac(&mut self, name: &str) -> Result<MacAddr> {
        let shared = self.shared.borrow();
        shared.require_link(name)?;
        Ok(shared.link.mac)
    }

    fn set_mac(&mut self, name: &str, mac: MacAddr) -> Result<()> {
        self.apply(Op::SetMac, name, |link| link.mac = mac)
    }

    fn mtu(&mut self, name: &str) -> Result<u32> {
        let shared = self.shared.borrow();
        shared.require_link(name)?;
        Ok(shared.link.mtu)
    }

    fn set_mtu(&mut self, name: &str, mtu: u32) -> Result<()> {
        self.apply(Op::SetMtu, name, |link| link.mtu = mtu)
    }

    fn set_ipv4(&mut self, name: &str, addr: Ipv4Addr) -> Result<()> {
        self.apply(Op::SetIpv4, name, |link| link.ipv4 = Some(addr))
    }

    fn set_netmask(&mut self, name: &str, mask: Ipv4Addr) -> Result<()> {
        self.apply(Op::SetNetmask, name, |link| link.netmask = Some(mask))
    }

    fn set_broadcast(&mut self, name: &str, addr: Ipv4Addr) -> Result<()> {
        self.apply(Op::SetBroadcast, name, |link| link.broadcast = Some(addr))
    }

    fn clear_ipv4(&mut self, name: &str) -> Result<()> {
        self.apply(Op::ClearIpv4, name, |link| {
            link.ipv4 = None;
            link.netmask = None;
            link.broadcast = None;
        })
    }

    fn add_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.apply(Op::AddIpv6, name, |link| link.ipv6.push((addr, prefix_len)))
    }

    fn del_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.apply(Op::DelIpv6, name, |link| {
            link.ipv6.retain(|entry| *entry != (addr, prefix_len))
        })
    }

    fn set_admin_up(&mut self, name: &str, up: bool) -> Result<()> {
        let op = if up { Op::SetAdminUp } else { Op::SetAdminDown };
        self.apply(op, name, |link| link.admin_up = up)
    }

    fn read_stat(&mut self, name: &str, stat: &str) -> Result<u64> {
        let mut shared = self.shared.borrow_mut();
        shared.check(Op::ReadStat, name)?;
        STAT_NAMES
            .iter()
            .position(|n| *n == stat)
            .map(|idx| shared.counters[idx])
            .ok_or_else(|| Error::UnknownStat {
                name: stat.to_string(),
            })
    }
}

/// Kernel side of a [`MemoryBackend`] link.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryPeer {
    /// Delivers a frame to the interface, counted as transmitted by the link.
    pub fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut shared = self.shared.borrow_mut();
        let socket = shared
            .peer
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        socket.send(frame)?;
        shared.bump("tx_packets", 1);
        shared.bump("tx_bytes", frame.len() as u64);
        Ok(())
    }

    /// Takes the next frame the interface wrote, if any.
    pub fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut shared = self.shared.borrow_mut();
        let socket = shared
            .peer
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let mut buf = vec![0u8; 65536];
        match socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                shared.bump("rx_packets", 1);
                shared.bump("rx_bytes", n as u64);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Overrides a kernel counter of the current link.
    pub fn set_stat(&self, stat: &str, value: u64) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        let idx = STAT_NAMES
            .iter()
            .position(|n| *n == stat)
            .ok_or_else(|| Error::UnknownStat {
                name: stat.to_string(),
            })?;
        shared.counters[idx] = value;
        Ok(())
    }

    pub fn state(&self) -> MemoryLinkState {
        self.shared.borrow().link.clone()
    }
}
