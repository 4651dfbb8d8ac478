use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use super::buf::DmaBuf;

/// Cache maintenance around buffer handoff between CPU and device.
///
/// These are protocol steps, not optimizations:
/// - [`publish`](Self::publish) after software wrote a buffer and before the
///   device address is handed out (clean).
/// - [`acquire`](Self::acquire) before a buffer is given to the device for
///   inbound data, so stale lines are discarded (invalidate).
/// - [`scrub`](Self::scrub) when a consumed buffer is recycled
///   (clean and invalidate).
///
/// Platforms with coherent DMA may implement them as fences, but every
/// handoff still goes through them.
pub trait DmaSync: Send + Sync {
    fn publish(&self, buf: &DmaBuf, len: usize);
    fn acquire(&self, buf: &DmaBuf, len: usize);
    fn scrub(&self, buf: &DmaBuf, len: usize);
}

/// Cache-coherent host memory: only ordering has to be enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostCoherent;

impl DmaSync for HostCoherent {
    #[inline]
    fn publish(&self, _buf: &DmaBuf, _len: usize) {
        fence(Ordering::Release);
    }

    #[inline]
    fn acquire(&self, _buf: &DmaBuf, _len: usize) {
        fence(Ordering::Acquire);
    }

    #[inline]
    fn scrub(&self, _buf: &DmaBuf, _len: usize) {
        fence(Ordering::SeqCst);
    }
}

impl<T: DmaSync + ?Sized> DmaSync for Arc<T> {
    fn publish(&self, buf: &DmaBuf, len: usize) {
        (**self).publish(buf, len)
    }

    fn acquire(&self, buf: &DmaBuf, len: usize) {
        (**self).acquire(buf, len)
    }

    fn scrub(&self, buf: &DmaBuf, len: usize) {
        (**self).scrub(buf, len)
    }
}
