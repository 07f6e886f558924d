//! Resource pools
//!
//! A [`RootPool`] parents one [`InterfacePool`] per interface. An interface
//! pool owns the interface's packet scratch memory and its open link
//! queues; destroying it releases both at once. The root refuses to go
//! away while any child pool is alive.
//!
//! Only one root pool may be live per thread. Pools are not `Send`.

use crate::error::Rejected;
use crate::link::LinkQueues;
use crate::{Error, Result};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};

thread_local! {
    static ROOT_LIVE: Cell<bool> = const { Cell::new(false) };
}

/// Sizing applied to every interface pool created from a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum bytes an interface pool hands out.
    pub interface_capacity: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            interface_capacity: 1 << 20,
        }
    }
}

#[derive(Debug)]
struct RootShared {
    live: Cell<usize>,
    next_id: Cell<u32>,
    limits: PoolLimits,
}

/// Process-wide parent of all interface pools.
#[derive(Debug)]
pub struct RootPool {
    shared: Rc<RootShared>,
}

impl RootPool {
    /// Create the root pool with default limits.
    pub fn create() -> Result<Self> {
        Self::with_limits(PoolLimits::default())
    }

    pub fn with_limits(limits: PoolLimits) -> Result<Self> {
        if ROOT_LIVE.get() {
            return Err(Error::RootPoolLive);
        }
        ROOT_LIVE.set(true);
        info!(
            "Root pool created (interface capacity {} bytes)",
            limits.interface_capacity
        );

        Ok(Self {
            shared: Rc::new(RootShared {
                live: Cell::new(0),
                next_id: Cell::new(0),
                limits,
            }),
        })
    }

    /// Destroy the root pool. Refused while interface pools are alive.
    pub fn destroy(self) -> std::result::Result<(), Rejected<RootPool>> {
        let live = self.live_pools();
        if live > 0 {
            return Err(Rejected::new(self, Error::PoolBusy { live }));
        }
        drop(self);
        info!("Root pool destroyed");
        Ok(())
    }

    pub fn create_interface_pool(&self) -> InterfacePool {
        self.shared.live.set(self.shared.live.get() + 1);
        InterfacePool {
            root: Rc::clone(&self.shared),
            capacity: self.shared.limits.interface_capacity,
            scratch: Vec::new(),
            queues: None,
        }
    }

    /// Number of interface pools not yet destroyed.
    pub fn live_pools(&self) -> usize {
        self.shared.live.get()
    }

    pub fn limits(&self) -> PoolLimits {
        self.shared.limits
    }

    /// Draws from the creation sequence. The sequence advances on every
    /// call; an explicit id is returned as-is.
    pub(crate) fn next_id(&self, explicit: Option<u32>) -> u32 {
        let seq = self.shared.next_id.get();
        self.shared.next_id.set(seq.wrapping_add(1));
        explicit.unwrap_or(seq)
    }
}

impl Drop for RootPool {
    fn drop(&mut self) {
        ROOT_LIVE.set(false);
        let live = self.live_pools();
        if live > 0 {
            warn!("Root pool dropped with {} live interface pool(s)", live);
        }
    }
}

/// Resources of a single interface.
#[derive(Debug)]
pub struct InterfacePool {
    root: Rc<RootShared>,
    capacity: usize,
    scratch: Vec<u8>,
    queues: Option<LinkQueues>,
}

impl InterfacePool {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> usize {
        self.scratch.len()
    }

    /// Sizes the scratch buffer to exactly `len` zeroed bytes.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > self.capacity {
            return Err(Error::PoolExhausted {
                requested: len,
                capacity: self.capacity,
            });
        }
        self.scratch.clear();
        self.scratch.resize(len, 0);
        Ok(&mut self.scratch)
    }

    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    pub(crate) fn attach_queues(&mut self, queues: LinkQueues) {
        self.queues = Some(queues);
    }

    pub(crate) fn detach_queues(&mut self) -> Option<LinkQueues> {
        self.queues.take()
    }

    pub fn queues(&self) -> Option<&LinkQueues> {
        self.queues.as_ref()
    }

    /// Frees scratch memory and closes any queues still held.
    pub(crate) fn release(&mut self) -> Result<()> {
        self.scratch = Vec::new();
        match self.queues.take() {
            Some(queues) => queues.close().map_err(Error::Io),
            None => Ok(()),
        }
    }

    /// Destroy the pool, closing every descriptor it owns. The pool is gone
    /// even when closing reports an error.
    pub fn destroy(mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for InterfacePool {
    fn drop(&mut self) {
        self.root.live.set(self.root.live.get().saturating_sub(1));
        debug!(
            "Interface pool released ({} still live)",
            self.root.live.get()
        );
    }
}
