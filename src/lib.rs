//! viface - virtual network interfaces
//!
//! Create TAP/TUN links, buffer and validate their configuration, commit it
//! to the kernel atomically on `up`, exchange length-prefixed packets and
//! read per-interface counters.
//!
//! Every interface draws its resources from a pool parented by a single
//! [`RootPool`]; the root outlives all interfaces.

pub mod arena;
pub mod codec;
pub mod config;
pub mod error;
pub mod iface;
pub mod link;
pub mod mac;
pub mod telemetry;

pub use arena::{InterfacePool, PoolLimits, RootPool};
pub use error::{Error, ErrorKind, LinkState, Rejected, Result};
pub use iface::{PacketBuffer, VirtualInterface};
pub use link::{LinkBackend, LinkKind};
pub use mac::MacAddr;
