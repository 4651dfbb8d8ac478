// Software NIC
// Frames injected by a test or simulator are delivered on the next
// interrupt; transmitted frames are captured (and optionally reflected back
// onto the inbound side).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::PlatConfig;
use crate::dma::DmaWindow;
use crate::error::BoxError;
use crate::hw::{RawCallbacks, RawDevice, TxSegment};

/// Default number of outbound frames the device queues before refusing.
const TX_RING: usize = 256;

#[derive(Default)]
struct Wire {
    plat: Option<PlatConfig>,
    window: DmaWindow,
    inbound: VecDeque<Vec<u8>>,
    tx_ring: VecDeque<TxSegment>,
    tx_capacity: usize,
    transmitted: Vec<Vec<u8>>,
    hold_completions: bool,
    reflect: bool,
    rx_missed: u64,
}

/// A NIC made of memory.
///
/// Clones share the same device, so a test can keep one handle while the
/// driver owns another.
#[derive(Clone)]
pub struct LoopbackDevice {
    wire: Arc<Mutex<Wire>>,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self {
            wire: Arc::new(Mutex::new(Wire {
                tx_capacity: TX_RING,
                ..Default::default()
            })),
        }
    }

    fn wire(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame to arrive on the next interrupt.
    pub fn inject(&self, frame: &[u8]) {
        self.wire().inbound.push_back(frame.to_vec());
    }

    /// Frames waiting for the next interrupt.
    pub fn inbound_pending(&self) -> usize {
        self.wire().inbound.len()
    }

    /// Frames the driver transmitted since the last call.
    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.wire().transmitted)
    }

    /// Outbound frames submitted but not yet completed.
    pub fn tx_pending(&self) -> usize {
        self.wire().tx_ring.len()
    }

    /// Limit the outbound ring; `raw_tx` refuses once it holds `n` frames.
    pub fn set_tx_capacity(&self, n: usize) {
        self.wire().tx_capacity = n;
    }

    /// While set, interrupts do not complete outbound frames.
    pub fn hold_completions(&self, hold: bool) {
        self.wire().hold_completions = hold;
    }

    /// While set, every transmitted frame is also queued as inbound.
    pub fn set_reflect(&self, reflect: bool) {
        self.wire().reflect = reflect;
    }

    /// Inbound frames lost because the driver had no buffer for them.
    pub fn rx_missed(&self) -> u64 {
        self.wire().rx_missed
    }

    /// Settings applied by the driver, once started.
    pub fn plat_config(&self) -> Option<PlatConfig> {
        self.wire().plat
    }
}

impl RawDevice for LoopbackDevice {
    fn configure(&mut self, config: &PlatConfig, window: DmaWindow) -> Result<(), BoxError> {
        let mut wire = self.wire();
        if wire.plat.is_some() {
            return Err("loopback device configured twice".into());
        }
        tracing::debug!(mac = %config.mac, promiscuous = config.promiscuous, "Loopback up");
        wire.plat = Some(*config);
        wire.window = window;
        Ok(())
    }

    fn raw_tx(&mut self, segment: TxSegment) -> Option<TxSegment> {
        let mut wire = self.wire();
        if wire.plat.is_none() || wire.tx_ring.len() >= wire.tx_capacity {
            return Some(segment);
        }
        // Safety: the segment is owned by the device until tx_complete
        let Some(frame) = (unsafe { wire.window.read(segment.iova, segment.len) }) else {
            tracing::warn!(iova = segment.iova, len = segment.len, "Segment outside DMA window");
            return Some(segment);
        };
        if wire.reflect {
            wire.inbound.push_back(frame.clone());
        }
        wire.transmitted.push(frame);
        wire.tx_ring.push_back(segment);
        None
    }

    fn handle_irq(&mut self, callbacks: &mut dyn RawCallbacks) {
        let (window, inbound, completed) = {
            let mut wire = self.wire();
            let completed = if wire.hold_completions {
                Vec::new()
            } else {
                wire.tx_ring.drain(..).collect()
            };
            (
                wire.window.clone(),
                std::mem::take(&mut wire.inbound),
                completed,
            )
        };

        let mut missed = 0;
        for frame in inbound {
            let Some(grant) = callbacks.allocate_rx_buf(frame.len()) else {
                missed += 1;
                continue;
            };
            // Safety: the granted buffer is owned by the device until rx_complete
            if unsafe { window.write(grant.iova, &frame) } {
                callbacks.rx_complete(grant.cookie, frame.len());
            } else {
                callbacks.rx_complete(grant.cookie, 0);
            }
        }
        for segment in completed {
            callbacks.tx_complete(segment.cookie);
        }

        if missed > 0 {
            tracing::debug!(missed, "Inbound frames missed");
            self.wire().rx_missed += missed;
        }
    }
}
