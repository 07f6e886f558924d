//! Link backends
//!
//! The OS-facing primitives an interface needs: create or attach a link,
//! assign addressing and MTU, toggle administrative state and read the
//! kernel's counters. Two implementations:
//! - [`KernelBackend`]: ioctl on Linux, `/dev/net/tun` or `AF_PACKET`
//! - [`MemoryBackend`]: socketpair-backed, needs no privileges

mod af_packet;
mod kernel;
mod memory;

pub use af_packet::AfPacketSocket;
pub use kernel::KernelBackend;
pub use memory::{INITIAL_MAC, MemoryBackend, MemoryLinkState, MemoryPeer, Op};

use crate::Result;
use crate::mac::MacAddr;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::{IntoRawFd, OwnedFd};

/// Link flavour: layer 2 (ethernet frames) or layer 3 (IP packets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    #[default]
    Tap,
    Tun,
}

impl LinkKind {
    pub fn is_tap(&self) -> bool {
        *self == LinkKind::Tap
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Tap => write!(f, "tap"),
            LinkKind::Tun => write!(f, "tun"),
        }
    }
}

/// How the data path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrigin {
    /// A new link created for this interface; it disappears when the
    /// queues are closed.
    Created,
    /// An interface that already existed, reached through packet sockets.
    Attached,
}

/// The receive and transmit descriptors of an open link.
#[derive(Debug)]
pub struct LinkQueues {
    pub rx: OwnedFd,
    pub tx: OwnedFd,
    pub origin: LinkOrigin,
}

impl LinkQueues {
    /// Closes both descriptors, reporting the first failure.
    pub fn close(self) -> io::Result<()> {
        let rx = close_fd(self.rx);
        let tx = close_fd(self.tx);
        rx.and(tx)
    }
}

fn close_fd(fd: OwnedFd) -> io::Result<()> {
    let raw = fd.into_raw_fd();
    // SAFETY: `raw` was just released from an OwnedFd and is closed once.
    let ret = unsafe { libc::close(raw) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// OS primitives used by the interface state machine.
///
/// Every method takes the kernel-visible interface name. Implementations
/// do not validate values; callers pass already-validated settings.
pub trait LinkBackend {
    /// Creates (or attaches to) the link and opens its data-path queues.
    fn open(&mut self, name: &str, kind: LinkKind) -> Result<LinkQueues>;

    /// Closes the queues obtained from [`open`](LinkBackend::open).
    fn release(&mut self, name: &str, queues: LinkQueues) -> Result<()>;

    fn mac(&mut self, name: &str) -> Result<MacAddr>;
    fn set_mac(&mut self, name: &str, mac: MacAddr) -> Result<()>;

    fn mtu(&mut self, name: &str) -> Result<u32>;
    fn set_mtu(&mut self, name: &str, mtu: u32) -> Result<()>;

    fn set_ipv4(&mut self, name: &str, addr: Ipv4Addr) -> Result<()>;
    fn set_netmask(&mut self, name: &str, mask: Ipv4Addr) -> Result<()>;
    fn set_broadcast(&mut self, name: &str, addr: Ipv4Addr) -> Result<()>;
    /// Removes the IPv4 address together with its netmask and broadcast.
    fn clear_ipv4(&mut self, name: &str) -> Result<()>;

    fn add_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()>;
    fn del_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()>;

    fn set_admin_up(&mut self, name: &str, up: bool) -> Result<()>;

    /// Current kernel value of one of [`STAT_NAMES`](crate::telemetry::STAT_NAMES).
    fn read_stat(&mut self, name: &str, stat: &str) -> Result<u64>;
}
