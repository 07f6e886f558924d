//! Per-interface statistics.
//!
//! Values come from the link backend (the kernel's counters for a real
//! link). Clearing a counter moves a baseline kept here; the kernel value
//! is never written, so tools such as `ip -s link` keep reporting it.

use crate::link::LinkOrigin;
use crate::{Error, Result};

/// Known counters, in listing order.
pub const STAT_NAMES: [&str; 23] = [
    "collisions",
    "multicast",
    "rx_bytes",
    "rx_compressed",
    "rx_crc_errors",
    "rx_dropped",
    "rx_errors",
    "rx_fifo_errors",
    "rx_frame_errors",
    "rx_length_errors",
    "rx_missed_errors",
    "rx_over_errors",
    "rx_packets",
    "tx_aborted_errors",
    "tx_bytes",
    "tx_carrier_errors",
    "tx_compressed",
    "tx_dropped",
    "tx_errors",
    "tx_fifo_errors",
    "tx_heartbeat_errors",
    "tx_packets",
    "tx_window_errors",
];

const N: usize = STAT_NAMES.len();

/// Counter overlay for one interface.
///
/// A link can be torn down and recreated several times during the life of
/// an interface object; each incarnation starts its kernel counters at
/// zero. `carried` accumulates earlier incarnations so values only grow.
#[derive(Debug, Clone)]
pub struct StatsTable {
    carried: [u64; N],
    current: [u64; N],
    baseline: [u64; N],
}

impl StatsTable {
    pub fn new() -> Self {
        Self {
            carried: [0; N],
            current: [0; N],
            baseline: [0; N],
        }
    }

    pub fn names() -> &'static [&'static str] {
        &STAT_NAMES
    }

    /// Position of `name` in [`STAT_NAMES`].
    pub fn index_of(name: &str) -> Result<usize> {
        STAT_NAMES
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| Error::UnknownStat {
                name: name.to_string(),
            })
    }

    /// Records a fresh kernel reading.
    pub fn observe(&mut self, idx: usize, kernel: u64) {
        if kernel < self.current[idx] {
            // counter restarted underneath us
            self.carried[idx] = self.carried[idx].saturating_add(self.current[idx]);
        }
        self.current[idx] = kernel;
    }

    fn total(&self, idx: usize) -> u64 {
        self.carried[idx].saturating_add(self.current[idx])
    }

    /// Counter value as seen by the caller.
    pub fn value(&self, idx: usize) -> u64 {
        self.total(idx).saturating_sub(self.baseline[idx])
    }

    pub fn clear(&mut self, idx: usize) {
        self.baseline[idx] = self.total(idx);
    }

    /// The link's queues are closing; keep what it counted.
    ///
    /// A created link disappears with its queues and a recreated one starts
    /// from zero. An attached link keeps counting, so its last reading stays
    /// current and the next observation continues from it.
    pub fn retire_link(&mut self, origin: LinkOrigin) {
        if origin == LinkOrigin::Attached {
            return;
        }
        for idx in 0..N {
            self.carried[idx] = self.total(idx);
            self.current[idx] = 0;
        }
    }

    /// Exports all counters as name/value pairs, in listing order.
    pub fn export(&self) -> Vec<(String, u64)> {
        STAT_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), self.value(idx)))
            .collect()
    }
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_sorted() {
        let mut sorted = STAT_NAMES.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, STAT_NAMES.to_vec());
        assert_eq!(STAT_NAMES.len(), 23);
    }

    #[test]
    fn test_unknown_stat() {
        assert!(matches!(
            StatsTable::index_of("rx_bogus"),
            Err(Error::UnknownStat { .. })
        ));
        assert_eq!(StatsTable::index_of("collisions").unwrap(), 0);
    }

    #[test]
    fn test_clear_moves_baseline() {
        let mut stats = StatsTable::new();
        let idx = StatsTable::index_of("tx_packets").unwrap();

        stats.observe(idx, 100);
        assert_eq!(stats.value(idx), 100);

        stats.clear(idx);
        assert_eq!(stats.value(idx), 0);

        stats.observe(idx, 130);
        assert_eq!(stats.value(idx), 30);
    }

    #[test]
    fn test_retire_link_accumulates() {
        let mut stats = StatsTable::new();
        let idx = StatsTable::index_of("rx_bytes").unwrap();

        stats.observe(idx, 500);
        stats.retire_link(LinkOrigin::Created);
        assert_eq!(stats.value(idx), 500);

        // new link starts from zero
        stats.observe(idx, 20);
        assert_eq!(stats.value(idx), 520);
    }

    #[test]
    fn test_retire_attached_link_keeps_reading() {
        let mut stats = StatsTable::new();
        let idx = StatsTable::index_of("rx_packets").unwrap();

        stats.observe(idx, 1000);
        stats.observe(idx, 1010);
        stats.retire_link(LinkOrigin::Attached);
        assert_eq!(stats.value(idx), 1010);

        // the kernel counter kept running while we were detached
        stats.observe(idx, 1020);
        assert_eq!(stats.value(idx), 1020);
    }

    #[test]
    fn test_kernel_counter_restart() {
        let mut stats = StatsTable::new();
        stats.observe(0, 7);
        stats.observe(0, 2);
        assert_eq!(stats.value(0), 9);
    }

    #[test]
    fn test_export_order() {
        let mut stats = StatsTable::new();
        stats.observe(StatsTable::index_of("multicast").unwrap(), 3);
        let exported = stats.export();
        assert_eq!(exported.len(), 23);
        assert_eq!(exported[0], ("collisions".to_string(), 0));
        assert_eq!(exported[1], ("multicast".to_string(), 3));
    }
}
