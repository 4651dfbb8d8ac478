//! Boundary between the dispatch engine and the hardware driver.
//!
//! The hardware backend implements [`RawDevice`]; the engine implements
//! [`RawCallbacks`], which the backend invokes from its interrupt handler.
//! Every callback runs with the driver lock held.
//!
//! # Ownership
//!
//! ```text
//! inbound:   Pool ──allocate_rx_buf──> Hardware ──rx_complete──> Tenant queue ──rx()──> Pool
//! outbound:  Tenant free ──tx()──> Hardware ──tx_complete──> Tenant free
//! ```
//!
//! The hardware never holds a buffer, only its device address and an opaque
//! cookie. The buffer itself stays parked in the engine until the cookie
//! comes back.

mod bridge;

use crate::config::PlatConfig;
use crate::dma::DmaWindow;
use crate::error::BoxError;

/// Identifies an inbound buffer handed to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RxCookie(pub(crate) u16);

/// Identifies an outbound buffer submitted to the hardware, including the
/// tenant it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxCookie {
    pub(crate) tenant: u8,
    pub(crate) slot: u16,
}

/// A fresh inbound buffer for the hardware to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxGrant {
    /// Device address to DMA into.
    pub iova: u64,
    /// Returned with `rx_complete`.
    pub cookie: RxCookie,
}

/// One outbound frame ready for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSegment {
    /// Device address of the frame.
    pub iova: u64,
    /// Frame length in bytes.
    pub len: usize,
    /// Returned with `tx_complete`.
    pub cookie: TxCookie,
}

/// Completion entry points the hardware driver calls into.
pub trait RawCallbacks {
    /// Hand out a buffer of at least `size` bytes for an incoming frame.
    ///
    /// Returns `None` if no buffer is available or `size` is too large; the
    /// hardware drops the frame.
    fn allocate_rx_buf(&mut self, size: usize) -> Option<RxGrant>;

    /// The buffer behind `cookie` now holds a frame of `len` bytes.
    fn rx_complete(&mut self, cookie: RxCookie, len: usize);

    /// The frame behind `cookie` has left the device.
    fn tx_complete(&mut self, cookie: TxCookie);
}

/// A network interface driven by the engine.
pub trait RawDevice: Send {
    /// Bring the device up. Called once from [`EthDriver::start`](crate::EthDriver::start).
    ///
    /// `window` is the device's view of DMA memory.
    fn configure(&mut self, config: &PlatConfig, window: DmaWindow) -> Result<(), BoxError>;

    /// Queue one frame for transmission.
    ///
    /// Returns the segment back if the device cannot take it now.
    fn raw_tx(&mut self, segment: TxSegment) -> Option<TxSegment>;

    /// Service pending device events, reporting them through `callbacks`.
    fn handle_irq(&mut self, callbacks: &mut dyn RawCallbacks);
}

impl<D: RawDevice + ?Sized> RawDevice for Box<D> {
    fn configure(&mut self, config: &PlatConfig, window: DmaWindow) -> Result<(), BoxError> {
        (**self).configure(config, window)
    }

    fn raw_tx(&mut self, segment: TxSegment) -> Option<TxSegment> {
        (**self).raw_tx(segment)
    }

    fn handle_irq(&mut self, callbacks: &mut dyn RawCallbacks) {
        (**self).handle_irq(callbacks)
    }
}
