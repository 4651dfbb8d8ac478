use super::{RawCallbacks, RxCookie, RxGrant, TxCookie};
use crate::engine::Engine;
use crate::error::DropReason;

impl RawCallbacks for Engine {
    fn allocate_rx_buf(&mut self, size: usize) -> Option<RxGrant> {
        if size > self.buf_size {
            tracing::warn!(size, buf_size = self.buf_size, "Inbound request too large");
            self.stats.rx_refused += 1;
            return None;
        }
        let Some(buf) = self.pool.allocate() else {
            tracing::trace!("Inbound pool empty");
            self.stats.rx_refused += 1;
            return None;
        };

        self.sync.acquire(&buf, buf.capacity());
        let grant = RxGrant {
            iova: buf.iova(),
            cookie: RxCookie(buf.index()),
        };
        let slot = buf.index() as usize;
        self.rx_in_flight[slot] = Some(buf);
        self.stats.rx_granted += 1;
        Some(grant)
    }

    fn rx_complete(&mut self, cookie: RxCookie, len: usize) {
        let Some(buf) = self
            .rx_in_flight
            .get_mut(cookie.0 as usize)
            .and_then(Option::take)
        else {
            tracing::warn!(?cookie, len, "Inbound completion for unknown buffer");
            self.stats.drops.record(DropReason::MalformedInput);
            return;
        };
        self.stats.rx_completed += 1;

        if len == 0 {
            tracing::warn!(?cookie, "Zero-length inbound completion");
            self.stats.drops.record(DropReason::MalformedInput);
            self.pool.release(buf);
            return;
        }
        let len = len.min(buf.capacity());
        self.sync.acquire(&buf, len);
        let delivery = self.dispatch(buf, len);
        tracing::trace!(?delivery, len, "Inbound frame");
    }

    fn tx_complete(&mut self, cookie: TxCookie) {
        let index = cookie.tenant as usize;
        let returned = self
            .tenants
            .get_mut(index)
            .is_some_and(|t| t.give_back(cookie.slot));
        if !returned {
            tracing::warn!(?cookie, "Outbound completion for unknown buffer");
            return;
        }
        self.stats.tx_completed += 1;
    }
}
