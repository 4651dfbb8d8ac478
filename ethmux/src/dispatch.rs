//! Routing of completed inbound frames to tenant queues.
//!
//! 1. Frames shorter than a hardware address go back to the pool.
//! 2. A destination equal to a tenant's address delivers the buffer to that
//!    tenant only.
//! 3. A broadcast destination is copied into a fresh pool buffer for every
//!    tenant except the primary, then the original buffer goes to the
//!    primary. A tenant whose queue is full, or for whom no buffer can be
//!    allocated, is skipped; the rest still receive the frame.
//! 4. Anything else goes back to the pool untouched.
//!
//! A full queue at delivery time drops the frame. Order within one tenant's
//! queue follows arrival order.

use smoltcp::wire::EthernetAddress;

use crate::config::{MAC_ADDRESS_LEN, TenantId};
use crate::dma::DmaBuf;
use crate::engine::Engine;
use crate::error::DropReason;
use crate::tenant::RxDesc;

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for exactly one tenant.
    Delivered(TenantId),
    /// Fanned out to every tenant.
    Broadcast {
        /// Copies queued for non-primary tenants.
        copies: usize,
        /// Non-primary tenants that missed the frame.
        skipped: usize,
        /// Whether the primary tenant got the original buffer.
        primary: bool,
    },
    /// Returned to the pool.
    Dropped(DropReason),
}

impl Engine {
    /// Route a completed inbound frame of `len` bytes.
    pub(crate) fn dispatch(&mut self, buf: DmaBuf, len: usize) -> Delivery {
        if len < MAC_ADDRESS_LEN {
            return self.drop_frame(buf, DropReason::Runt);
        }
        let dst = EthernetAddress::from_bytes(&buf.as_slice()[..MAC_ADDRESS_LEN]);

        if let Some(index) = self.tenants.index_of_mac(&dst) {
            return match self.deliver(index, buf, len) {
                Ok(()) => Delivery::Delivered(self.tenants[index].id()),
                Err(reason) => Delivery::Dropped(reason),
            };
        }

        if !dst.is_broadcast() {
            tracing::trace!(%dst, len, "No tenant for destination");
            return self.drop_frame(buf, DropReason::NoMatchingTenant);
        }

        self.stats.rx_broadcast += 1;
        let primary = self.tenants.primary();
        let mut copies = 0;
        let mut skipped = 0;
        for index in 0..self.tenants.len() {
            if index == primary {
                continue;
            }
            match self.copy_to(index, &buf, len) {
                Ok(()) => copies += 1,
                Err(reason) => {
                    tracing::trace!(
                        tenant = self.tenants[index].id(),
                        ?reason,
                        "Broadcast copy skipped"
                    );
                    skipped += 1;
                }
            }
        }

        let primary = self.deliver(primary, buf, len).is_ok();
        Delivery::Broadcast {
            copies,
            skipped,
            primary,
        }
    }

    /// Queue a private copy of `src` for tenant `index`.
    fn copy_to(&mut self, index: usize, src: &DmaBuf, len: usize) -> Result<(), DropReason> {
        // Check first so no buffer is spent on a tenant that cannot take it
        if self.tenants[index].rx_full() {
            self.stats.drops.record(DropReason::QueueFull);
            self.stats.tenants[index].rx_dropped += 1;
            return Err(DropReason::QueueFull);
        }
        let Some(mut copy) = self.pool.allocate() else {
            self.stats.drops.record(DropReason::PoolExhausted);
            return Err(DropReason::PoolExhausted);
        };
        self.sync.acquire(&copy, len);
        copy.copy_from(&src.as_slice()[..len]);
        self.stats.rx_copies += 1;
        self.deliver(index, copy, len)
    }

    /// Queue `buf` for tenant `index`, signalling it if armed.
    fn deliver(&mut self, index: usize, buf: DmaBuf, len: usize) -> Result<(), DropReason> {
        let tenant = &mut self.tenants[index];
        match tenant.enqueue(RxDesc { buf, len }) {
            Ok(signal) => {
                let stats = &mut self.stats.tenants[index];
                stats.rx_queued += 1;
                if signal {
                    stats.notifications += 1;
                    self.notify.emit(tenant.id());
                }
                Ok(())
            }
            Err(desc) => {
                tracing::debug!(tenant = tenant.id(), len, "Tenant queue full, dropping frame");
                self.stats.tenants[index].rx_dropped += 1;
                self.drop_frame(desc.buf, DropReason::QueueFull);
                Err(DropReason::QueueFull)
            }
        }
    }

    fn drop_frame(&mut self, buf: DmaBuf, reason: DropReason) -> Delivery {
        self.stats.drops.record(reason);
        self.pool.release(buf);
        Delivery::Dropped(reason)
    }
}
