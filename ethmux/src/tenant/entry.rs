use smoltcp::wire::EthernetAddress;

use super::ring::BoundedRing;
use crate::config::TenantId;
use crate::dma::DmaBuf;

/// A received frame waiting in a tenant's inbound queue.
#[derive(Debug)]
pub struct RxDesc {
    pub buf: DmaBuf,
    pub len: usize,
}

/// Per-tenant state.
pub struct Tenant {
    id: TenantId,
    mac: EthernetAddress,
    /// Emit on the next delivery. Armed only once the tenant has seen its
    /// queue empty, so a tenant that is still draining is not woken again.
    should_notify: bool,
    rx: BoundedRing<RxDesc>,
    /// Outbound buffers ready for use (LIFO).
    tx_free: Vec<DmaBuf>,
    /// Outbound buffers submitted to hardware, indexed by buffer index.
    tx_in_flight: Box<[Option<DmaBuf>]>,
}

impl Tenant {
    pub(crate) fn new(
        id: TenantId,
        mac: EthernetAddress,
        rx_capacity: usize,
        tx_bufs: Vec<DmaBuf>,
    ) -> Self {
        debug_assert!(
            tx_bufs.iter().enumerate().all(|(i, b)| b.index() as usize == i),
            "tenant outbound buffers must be indexed from zero"
        );
        Self {
            id,
            mac,
            should_notify: true,
            rx: BoundedRing::new(rx_capacity),
            tx_in_flight: (0..tx_bufs.len()).map(|_| None).collect(),
            tx_free: tx_bufs,
        }
    }

    #[inline]
    pub fn id(&self) -> TenantId {
        self.id
    }

    #[inline]
    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    #[inline]
    pub fn should_notify(&self) -> bool {
        self.should_notify
    }

    /// Queue a received frame.
    ///
    /// On success returns whether the tenant must be signalled; the flag is
    /// cleared in that case. A full queue hands the descriptor back.
    pub fn enqueue(&mut self, desc: RxDesc) -> Result<bool, RxDesc> {
        self.rx.push(desc)?;
        Ok(std::mem::replace(&mut self.should_notify, false))
    }

    /// Pop the oldest queued frame.
    ///
    /// Arms the notification whenever the tenant observes its queue empty,
    /// either because it was already empty or because this pop drained it.
    pub fn dequeue(&mut self) -> Option<RxDesc> {
        let desc = self.rx.pop();
        if self.rx.is_empty() {
            self.should_notify = true;
        }
        desc
    }

    #[inline]
    pub fn rx_full(&self) -> bool {
        self.rx.is_full()
    }

    #[inline]
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn rx_indices(&self) -> (usize, usize) {
        self.rx.indices()
    }

    /// Take a free outbound buffer.
    #[inline]
    pub fn take(&mut self) -> Option<DmaBuf> {
        self.tx_free.pop()
    }

    /// Park an outbound buffer while the hardware owns it.
    ///
    /// Returns the slot used as completion cookie.
    pub(crate) fn park_in_flight(&mut self, buf: DmaBuf) -> u16 {
        let slot = buf.index();
        debug_assert!(
            self.tx_in_flight[slot as usize].is_none(),
            "outbound slot {slot} submitted twice"
        );
        self.tx_in_flight[slot as usize] = Some(buf);
        slot
    }

    /// Return a completed outbound buffer to this tenant's free-list.
    ///
    /// Returns `false` if `slot` does not name an in-flight buffer.
    pub fn give_back(&mut self, slot: u16) -> bool {
        match self.tx_in_flight.get_mut(slot as usize).and_then(Option::take) {
            Some(buf) => {
                self.tx_free.push(buf);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn tx_available(&self) -> usize {
        self.tx_free.len()
    }

    pub fn tx_in_flight(&self) -> usize {
        self.tx_in_flight.iter().filter(|b| b.is_some()).count()
    }

    /// Total outbound buffers owned by this tenant.
    #[inline]
    pub fn tx_total(&self) -> usize {
        self.tx_in_flight.len()
    }
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("mac", &self.mac)
            .field("should_notify", &self.should_notify)
            .field("rx_pending", &self.rx_pending())
            .field("tx_available", &self.tx_available())
            .finish()
    }
}
