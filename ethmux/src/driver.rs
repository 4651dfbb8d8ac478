//! The public driver object and per-tenant handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smoltcp::wire::EthernetAddress;

use crate::config::{DriverConfig, MIN_TX_LEN, PlatConfig, TenantId};
use crate::dma::DmaSync;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::hw::{RawCallbacks, RawDevice, RxCookie, RxGrant, TxCookie};
use crate::notify::Notify;
use crate::stats::{Census, Stats};

/// Outcome of a receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStatus {
    /// Nothing was queued, the tenant is unknown, or the driver is not started.
    Failure,
    /// One frame of `len` bytes was copied and the queue is now empty.
    Complete { len: usize },
    /// One frame of `len` bytes was copied and more are waiting.
    Incomplete { len: usize },
}

impl RxStatus {
    pub const RAW_FAILURE: i32 = -1;
    pub const RAW_COMPLETE: i32 = 0;
    pub const RAW_INCOMPLETE: i32 = 1;

    /// Status code as returned across the component boundary.
    pub fn as_raw(&self) -> i32 {
        match self {
            RxStatus::Failure => Self::RAW_FAILURE,
            RxStatus::Complete { .. } => Self::RAW_COMPLETE,
            RxStatus::Incomplete { .. } => Self::RAW_INCOMPLETE,
        }
    }

    /// Bytes copied, if a frame was received.
    pub fn len(&self) -> Option<usize> {
        match *self {
            RxStatus::Failure => None,
            RxStatus::Complete { len } | RxStatus::Incomplete { len } => Some(len),
        }
    }

    /// Whether the tenant should call `rx` again.
    pub fn has_more(&self) -> bool {
        matches!(self, RxStatus::Incomplete { .. })
    }
}

/// Outcome of a transmit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The frame was handed to the device.
    Complete,
    /// Nothing was sent.
    Failed,
}

impl TxStatus {
    pub fn as_raw(&self) -> i32 {
        match self {
            TxStatus::Complete => 0,
            TxStatus::Failed => -1,
        }
    }
}

struct Inner<D> {
    engine: Engine,
    device: D,
}

/// Multiplexes one network device between several tenants.
///
/// Tenant calls (`rx`, `tx`, `mac`) and hardware completions (`irq_handle`
/// and the callback entry points) may come from any thread; all of them
/// serialize on one lock.
pub struct EthDriver<D> {
    inner: Mutex<Inner<D>>,
    plat: PlatConfig,
    buf_size: usize,
    started: AtomicBool,
}

impl<D: RawDevice> EthDriver<D> {
    /// Allocate DMA memory and tenant state.
    ///
    /// The device is not touched until [`start`](Self::start).
    pub fn new(
        config: DriverConfig,
        device: D,
        sync: impl DmaSync + 'static,
        notify: impl Notify + 'static,
    ) -> Result<Self> {
        let engine = Engine::new(&config, Box::new(sync), Box::new(notify))?;
        Ok(Self {
            inner: Mutex::new(Inner { engine, device }),
            plat: config.plat_config(),
            buf_size: config.buf_size,
            started: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<D>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure the device and open the driver to tenants.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(Error::AlreadyStarted);
        }
        let window = inner.engine.window();
        inner
            .device
            .configure(&self.plat, window)
            .map_err(Error::Device)?;
        self.started.store(true, Ordering::Release);
        tracing::info!(
            mac = %self.plat.mac,
            promiscuous = self.plat.promiscuous,
            tenants = inner.engine.tenants.len(),
            "Driver started"
        );
        Ok(())
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Device settings applied by `start`.
    pub fn plat_config(&self) -> PlatConfig {
        self.plat
    }

    /// Size of every DMA buffer, and of each tenant's dataport.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Receive the oldest queued frame of `tenant` into `dataport`.
    pub fn rx(&self, tenant: TenantId, dataport: &mut [u8]) -> RxStatus {
        if !self.is_started() {
            return RxStatus::Failure;
        }
        let mut inner = self.lock();
        let Some(index) = inner.engine.tenant_index(tenant) else {
            tracing::debug!(tenant, "rx from unknown tenant");
            return RxStatus::Failure;
        };
        inner.engine.rx(index, dataport)
    }

    /// Transmit `frame` on behalf of `tenant`.
    ///
    /// Frames shorter than two hardware addresses are refused; longer than
    /// a buffer are truncated. The source address is always rewritten to the
    /// tenant's own.
    pub fn tx(&self, tenant: TenantId, frame: &[u8]) -> TxStatus {
        if !self.is_started() {
            return TxStatus::Failed;
        }
        if frame.len() < MIN_TX_LEN {
            tracing::debug!(tenant, len = frame.len(), "Frame too short to transmit");
            return TxStatus::Failed;
        }
        let frame = &frame[..frame.len().min(self.buf_size)];

        let mut inner = self.lock();
        let Inner { engine, device } = &mut *inner;
        let Some(index) = engine.tenant_index(tenant) else {
            tracing::debug!(tenant, "tx from unknown tenant");
            return TxStatus::Failed;
        };
        let Some(segment) = engine.prepare_tx(index, frame) else {
            tracing::trace!(tenant, "No free outbound buffer");
            return TxStatus::Failed;
        };
        if let Some(refused) = device.raw_tx(segment) {
            tracing::debug!(tenant, len = refused.len, "Device refused frame");
            engine.cancel_tx(refused);
            return TxStatus::Failed;
        }
        engine.stats.tenants[index].tx_submitted += 1;
        TxStatus::Complete
    }

    /// Hardware address of `tenant`.
    pub fn mac(&self, tenant: TenantId) -> Option<EthernetAddress> {
        if !self.is_started() {
            return None;
        }
        let inner = self.lock();
        let index = inner.engine.tenant_index(tenant)?;
        Some(inner.engine.tenants[index].mac())
    }

    /// Hand a fresh inbound buffer to the hardware.
    pub fn request_inbound_buffer(&self, size: usize) -> Option<RxGrant> {
        self.lock().engine.allocate_rx_buf(size)
    }

    /// The hardware finished filling the buffer behind `cookie`.
    pub fn inbound_complete(&self, cookie: RxCookie, len: usize) {
        self.lock().engine.rx_complete(cookie, len)
    }

    /// The hardware finished sending the frame behind `cookie`.
    pub fn outbound_complete(&self, cookie: TxCookie) {
        self.lock().engine.tx_complete(cookie)
    }

    /// Service the device's pending events.
    pub fn irq_handle(&self) {
        let mut inner = self.lock();
        let Inner { engine, device } = &mut *inner;
        device.handle_irq(engine);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> Stats {
        self.lock().engine.stats.clone()
    }

    /// Where every buffer is right now.
    pub fn census(&self) -> Census {
        self.lock().engine.census()
    }

    /// Run `f` with exclusive access to the device backend.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.lock().device)
    }

    /// A handle bound to `tenant`, with its own dataport.
    pub fn port(self: &Arc<Self>, tenant: TenantId) -> Option<TenantPort<D>> {
        self.lock().engine.tenant_index(tenant)?;
        Some(TenantPort {
            driver: self.clone(),
            tenant,
            dataport: vec![0; self.buf_size].into_boxed_slice(),
        })
    }
}

impl<D> std::fmt::Debug for EthDriver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthDriver")
            .field("plat", &self.plat)
            .field("buf_size", &self.buf_size)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

/// One tenant's view of the driver.
///
/// The identity is fixed when the port is created, so a tenant can only
/// receive its own frames and only send from its own buffers. Frames move
/// through the dataport: `rx` fills it, `tx` sends from it.
pub struct TenantPort<D> {
    driver: Arc<EthDriver<D>>,
    tenant: TenantId,
    dataport: Box<[u8]>,
}

impl<D: RawDevice> TenantPort<D> {
    #[inline]
    pub fn id(&self) -> TenantId {
        self.tenant
    }

    pub fn mac(&self) -> Option<EthernetAddress> {
        self.driver.mac(self.tenant)
    }

    /// Receive one frame into the dataport.
    pub fn rx(&mut self) -> RxStatus {
        self.driver.rx(self.tenant, &mut self.dataport)
    }

    /// Send the first `len` bytes of the dataport.
    pub fn tx(&self, len: usize) -> TxStatus {
        let len = len.min(self.dataport.len());
        self.driver.tx(self.tenant, &self.dataport[..len])
    }

    #[inline]
    pub fn dataport(&self) -> &[u8] {
        &self.dataport
    }

    #[inline]
    pub fn dataport_mut(&mut self) -> &mut [u8] {
        &mut self.dataport
    }

    pub fn driver(&self) -> &Arc<EthDriver<D>> {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LoopbackDevice;
    use crate::dma::HostCoherent;

    const MAC_A: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0xa]);
    const MAC_B: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0xb]);

    fn driver() -> (EthDriver<LoopbackDevice>, LoopbackDevice) {
        let dev = LoopbackDevice::new();
        let config = DriverConfig::new()
            .rx_bufs(16)
            .client_rx_bufs(4)
            .client_tx_bufs(2)
            .buf_size(256)
            .tenant(1, MAC_A)
            .tenant(2, MAC_B);
        let driver = EthDriver::new(config, dev.clone(), HostCoherent, |_: TenantId| {}).unwrap();
        (driver, dev)
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(RxStatus::Failure.as_raw(), -1);
        assert_eq!(RxStatus::Complete { len: 3 }.as_raw(), 0);
        assert_eq!(RxStatus::Incomplete { len: 3 }.as_raw(), 1);
        assert_eq!(TxStatus::Complete.as_raw(), 0);
        assert_eq!(TxStatus::Failed.as_raw(), -1);
        assert_eq!(RxStatus::Incomplete { len: 3 }.len(), Some(3));
        assert!(!RxStatus::Complete { len: 3 }.has_more());
    }

    #[test]
    fn test_not_started() {
        let (driver, dev) = driver();
        let mut buf = [0u8; 256];
        assert_eq!(driver.rx(1, &mut buf), RxStatus::Failure);
        assert_eq!(driver.tx(1, &[0u8; 60]), TxStatus::Failed);
        assert_eq!(driver.mac(1), None);
        assert!(dev.plat_config().is_none());

        driver.start().unwrap();
        assert!(matches!(driver.start(), Err(Error::AlreadyStarted)));
        assert_eq!(driver.mac(1), Some(MAC_A));
        assert_eq!(driver.mac(3), None);
        assert!(dev.plat_config().unwrap().promiscuous);
    }

    #[test]
    fn test_tx_rewrites_source() {
        let (driver, dev) = driver();
        driver.start().unwrap();

        let mut frame = [0xeeu8; 60];
        frame[..6].copy_from_slice(MAC_B.as_bytes());
        assert_eq!(driver.tx(1, &frame[..11]), TxStatus::Failed);
        assert_eq!(driver.tx(1, &frame), TxStatus::Complete);

        let sent = dev.take_transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][..6], MAC_B.as_bytes());
        assert_eq!(&sent[0][6..12], MAC_A.as_bytes());
        assert_eq!(&sent[0][12..], &frame[12..]);
    }

    #[test]
    fn test_tx_exhaustion_and_completion() {
        let (driver, dev) = driver();
        driver.start().unwrap();
        let frame = [0u8; 64];

        assert_eq!(driver.tx(2, &frame), TxStatus::Complete);
        assert_eq!(driver.tx(2, &frame), TxStatus::Complete);
        assert_eq!(driver.tx(2, &frame), TxStatus::Failed);
        assert_eq!(dev.tx_pending(), 2);

        driver.irq_handle();
        assert_eq!(dev.tx_pending(), 0);
        assert_eq!(driver.tx(2, &frame), TxStatus::Complete);

        let stats = driver.stats();
        let t = stats.tenant(2).unwrap();
        assert_eq!(t.tx_submitted, 3);
        assert_eq!(t.tx_failed, 1);
        assert_eq!(stats.tx_completed, 2);
    }

    #[test]
    fn test_device_refusal_returns_buffer() {
        let (driver, dev) = driver();
        driver.start().unwrap();
        dev.set_tx_capacity(0);

        assert_eq!(driver.tx(1, &[0u8; 64]), TxStatus::Failed);
        let census = driver.census();
        assert_eq!(census.tenant(1).unwrap().tx_free, 2);
        assert!(census.is_conserved());
    }

    #[test]
    fn test_port() {
        let (driver, dev) = driver();
        let driver = Arc::new(driver);
        driver.start().unwrap();
        assert!(driver.port(9).is_none());

        let mut port = driver.port(2).unwrap();
        assert_eq!(port.dataport().len(), 256);
        let mut frame = vec![0x11u8; 80];
        frame[..6].copy_from_slice(MAC_B.as_bytes());
        dev.inject(&frame);
        driver.irq_handle();

        assert_eq!(port.rx(), RxStatus::Complete { len: 80 });
        assert_eq!(&port.dataport()[..80], &frame[..]);
        assert_eq!(port.rx(), RxStatus::Failure);

        port.dataport_mut()[..6].copy_from_slice(MAC_A.as_bytes());
        assert_eq!(port.tx(80), TxStatus::Complete);
        let sent = dev.take_transmitted();
        assert_eq!(&sent[0][6..12], MAC_B.as_bytes());
    }
}
