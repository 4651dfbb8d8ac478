//! Shared state guarded by the driver lock.
//!
//! [`Engine`] owns the inbound pool, the inbound buffers lent to the device,
//! and the tenant table. The dispatch path lives in `dispatch.rs`, the
//! hardware callbacks in `hw/bridge.rs`; this file holds construction and
//! the tenant-side operations.

use std::sync::Arc;

use crate::config::{DriverConfig, MAC_ADDRESS_LEN, MIN_TX_LEN, TenantId};
use crate::dma::{BufferPool, DmaBuf, DmaRegion, DmaSync, DmaWindow};
use crate::driver::RxStatus;
use crate::error::Result;
use crate::hw::{TxCookie, TxSegment};
use crate::notify::Notify;
use crate::stats::{Census, Stats, TenantCensus};
use crate::tenant::{RxDesc, Tenant, TenantTable};

/// Alignment of each region's device address.
const REGION_ALIGN: u64 = 4096;

fn align_up(v: u64, align: u64) -> u64 {
    v.div_ceil(align) * align
}

pub struct Engine {
    pub(crate) pool: BufferPool,
    /// Inbound buffers owned by the device, indexed by buffer index.
    pub(crate) rx_in_flight: Box<[Option<DmaBuf>]>,
    pub(crate) tenants: TenantTable,
    pub(crate) buf_size: usize,
    pub(crate) sync: Box<dyn DmaSync>,
    pub(crate) notify: Box<dyn Notify>,
    pub(crate) stats: Stats,
    // Dropped last: every DmaBuf above points into these.
    regions: Vec<Arc<DmaRegion>>,
}

impl Engine {
    /// Map DMA memory and build the pool and tenant table.
    pub(crate) fn new(
        config: &DriverConfig,
        sync: Box<dyn DmaSync>,
        notify: Box<dyn Notify>,
    ) -> Result<Self> {
        config.validate()?;

        let mut iova = config.iova_base;
        let mut map = |len: usize| -> Result<Arc<DmaRegion>> {
            let region = DmaRegion::map(len, iova)?;
            iova = align_up(iova + len as u64, REGION_ALIGN);
            Ok(Arc::new(region))
        };

        let rx_region = map(config.rx_bufs * config.buf_size)?;
        let rx_bufs = rx_region.carve(config.buf_size, config.rx_bufs, 0);
        for buf in &rx_bufs {
            sync.scrub(buf, buf.capacity());
        }
        let mut regions = vec![rx_region];

        let mut tenants = Vec::with_capacity(config.tenants.len());
        for t in &config.tenants {
            let region = map(config.client_tx_bufs * config.buf_size)?;
            let tx_bufs = region.carve(config.buf_size, config.client_tx_bufs, 0);
            for buf in &tx_bufs {
                sync.scrub(buf, buf.capacity());
            }
            tenants.push(Tenant::new(t.id, t.mac, config.client_rx_bufs, tx_bufs));
            regions.push(region);
        }

        tracing::info!(
            rx_bufs = config.rx_bufs,
            tenants = config.tenants.len(),
            client_rx_bufs = config.client_rx_bufs,
            client_tx_bufs = config.client_tx_bufs,
            buf_size = config.buf_size,
            "Allocated DMA buffers"
        );

        Ok(Self {
            pool: BufferPool::new(rx_bufs),
            rx_in_flight: (0..config.rx_bufs).map(|_| None).collect(),
            tenants: TenantTable::new(tenants, config.primary_index()),
            buf_size: config.buf_size,
            sync,
            notify,
            stats: Stats::new(config.tenants.iter().map(|t| t.id)),
            regions,
        })
    }

    /// The device's view of all DMA memory.
    pub(crate) fn window(&self) -> DmaWindow {
        DmaWindow::new(self.regions.clone())
    }

    /// Receive one frame into `dataport`.
    ///
    /// A frame longer than `dataport` is truncated; the returned length is
    /// the number of bytes copied.
    pub(crate) fn rx(&mut self, index: usize, dataport: &mut [u8]) -> RxStatus {
        let tenant = &mut self.tenants[index];
        let Some(RxDesc { mut buf, len }) = tenant.dequeue() else {
            return RxStatus::Failure;
        };
        let drained = tenant.rx_pending() == 0;

        let n = len.min(dataport.len());
        dataport[..n].copy_from_slice(&buf.as_slice()[..n]);
        self.stats.tenants[index].rx_received += 1;

        buf.clear();
        self.sync.scrub(&buf, buf.capacity());
        self.pool.release(buf);

        if drained {
            RxStatus::Complete { len: n }
        } else {
            RxStatus::Incomplete { len: n }
        }
    }

    /// Fill an outbound buffer of tenant `index` with `frame`.
    ///
    /// The source address field is overwritten with the tenant's own address
    /// and the buffer is published to the device. Returns `None` if the
    /// tenant has no free outbound buffer.
    pub(crate) fn prepare_tx(&mut self, index: usize, frame: &[u8]) -> Option<TxSegment> {
        debug_assert!(frame.len() >= MIN_TX_LEN);
        let tenant = &mut self.tenants[index];
        let Some(mut buf) = tenant.take() else {
            self.stats.tenants[index].tx_failed += 1;
            return None;
        };

        let len = buf.copy_from(frame);
        buf.as_mut_slice()[MAC_ADDRESS_LEN..MIN_TX_LEN].copy_from_slice(tenant.mac().as_bytes());
        self.sync.publish(&buf, len);

        let iova = buf.iova();
        let slot = tenant.park_in_flight(buf);
        Some(TxSegment {
            iova,
            len,
            cookie: TxCookie {
                tenant: index as u8,
                slot,
            },
        })
    }

    /// Undo `prepare_tx` for a segment the device refused.
    pub(crate) fn cancel_tx(&mut self, segment: TxSegment) {
        let index = segment.cookie.tenant as usize;
        let returned = self.tenants[index].give_back(segment.cookie.slot);
        debug_assert!(returned, "cancelled segment was not in flight");
        self.stats.tenants[index].tx_failed += 1;
    }

    pub(crate) fn tenant_index(&self, id: TenantId) -> Option<usize> {
        self.tenants.index_of(id)
    }

    pub(crate) fn census(&self) -> Census {
        Census {
            total: self.pool.total(),
            pool_free: self.pool.avail_count(),
            hw_owned: self.rx_in_flight.iter().filter(|b| b.is_some()).count(),
            tenants: self
                .tenants
                .iter()
                .map(|t| TenantCensus {
                    id: t.id(),
                    queued: t.rx_pending(),
                    rx_indices: t.rx_indices(),
                    should_notify: t.should_notify(),
                    tx_free: t.tx_available(),
                    tx_in_flight: t.tx_in_flight(),
                    tx_total: t.tx_total(),
                })
                .collect(),
        }
    }
}
