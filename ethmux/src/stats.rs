//! Counters and the buffer ownership census.

use arrayvec::ArrayVec;

use crate::config::{MAX_TENANTS, TenantId};
use crate::error::DropReason;

/// Inbound frames (or fan-out copies) dropped, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounters {
    pub pool_exhausted: u64,
    pub queue_full: u64,
    pub no_match: u64,
    pub runt: u64,
    pub malformed: u64,
}

impl DropCounters {
    pub(crate) fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::PoolExhausted => self.pool_exhausted += 1,
            DropReason::QueueFull => self.queue_full += 1,
            DropReason::NoMatchingTenant => self.no_match += 1,
            DropReason::Runt => self.runt += 1,
            DropReason::MalformedInput => self.malformed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pool_exhausted + self.queue_full + self.no_match + self.runt + self.malformed
    }
}

/// Per-tenant traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantStats {
    pub id: TenantId,
    /// Frames placed in the inbound queue.
    pub rx_queued: u64,
    /// Frames handed to the tenant by `rx`.
    pub rx_received: u64,
    /// Frames dropped because the queue was full.
    pub rx_dropped: u64,
    /// Frames submitted to the device.
    pub tx_submitted: u64,
    /// `tx` calls that did not reach the device.
    pub tx_failed: u64,
    /// Wakeups emitted.
    pub notifications: u64,
}

/// Driver-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Inbound buffers handed to the device.
    pub rx_granted: u64,
    /// Inbound buffer requests refused (pool empty or frame too large).
    pub rx_refused: u64,
    /// Completed inbound frames seen.
    pub rx_completed: u64,
    /// Broadcast frames fanned out.
    pub rx_broadcast: u64,
    /// Extra buffers filled by broadcast fan-out.
    pub rx_copies: u64,
    /// Outbound completions returned to tenants.
    pub tx_completed: u64,
    pub drops: DropCounters,
    pub tenants: ArrayVec<TenantStats, MAX_TENANTS>,
}

impl Stats {
    pub(crate) fn new(ids: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: ids
                .into_iter()
                .map(|id| TenantStats {
                    id,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Counters of the tenant with `id`.
    pub fn tenant(&self, id: TenantId) -> Option<&TenantStats> {
        self.tenants.iter().find(|t| t.id == id)
    }
}

/// Ownership of one tenant's buffers at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantCensus {
    pub id: TenantId,
    /// Inbound frames queued.
    pub queued: usize,
    /// Inbound ring `(head, tail)`.
    pub rx_indices: (usize, usize),
    pub should_notify: bool,
    pub tx_free: usize,
    pub tx_in_flight: usize,
    pub tx_total: usize,
}

/// Where every buffer is, taken under the driver lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Census {
    /// Inbound pool size.
    pub total: usize,
    /// Free buffers in the pool.
    pub pool_free: usize,
    /// Inbound buffers owned by the device.
    pub hw_owned: usize,
    pub tenants: ArrayVec<TenantCensus, MAX_TENANTS>,
}

impl Census {
    /// Frames queued across all tenants.
    pub fn queued(&self) -> usize {
        self.tenants.iter().map(|t| t.queued).sum()
    }

    /// Pool + device + queues account for every inbound buffer, and every
    /// tenant still owns all of its outbound buffers.
    pub fn is_conserved(&self) -> bool {
        self.pool_free + self.hw_owned + self.queued() == self.total
            && self
                .tenants
                .iter()
                .all(|t| t.tx_free + t.tx_in_flight == t.tx_total)
    }

    pub fn tenant(&self, id: TenantId) -> Option<&TenantCensus> {
        self.tenants.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_counters() {
        let mut drops = DropCounters::default();
        drops.record(DropReason::QueueFull);
        drops.record(DropReason::QueueFull);
        drops.record(DropReason::Runt);
        assert_eq!(drops.queue_full, 2);
        assert_eq!(drops.total(), 3);
    }

    #[test]
    fn test_census_conservation() {
        let mut census = Census {
            total: 8,
            pool_free: 5,
            hw_owned: 1,
            tenants: ArrayVec::new(),
        };
        census.tenants.push(TenantCensus {
            id: 0,
            queued: 2,
            rx_indices: (2, 0),
            should_notify: false,
            tx_free: 3,
            tx_in_flight: 1,
            tx_total: 4,
        });
        assert!(census.is_conserved());

        census.pool_free -= 1;
        assert!(!census.is_conserved());
    }
}
