//! Share one network interface between several isolated tenants.
//!
//! The driver owns a fixed pool of DMA buffers for inbound traffic and a
//! fixed set of outbound buffers per tenant. Inbound frames are routed by
//! destination address into per-tenant queues (broadcast frames are copied
//! to every tenant); outbound frames are sent from the tenant's own buffers
//! with the source address forced to the tenant's.
//!
//! ```no_run
//! use ethmux::{DriverConfig, EthDriver, HostCoherent, LoopbackDevice};
//! use smoltcp::wire::EthernetAddress;
//!
//! let config = DriverConfig::new()
//!     .tenant(1, EthernetAddress([0x02, 0, 0, 0, 0, 1]))
//!     .tenant(2, EthernetAddress([0x02, 0, 0, 0, 0, 2]));
//! let driver = EthDriver::new(config, LoopbackDevice::new(), HostCoherent, |id: u32| {
//!     println!("tenant {id} has data");
//! })?;
//! driver.start()?;
//!
//! let mut dataport = vec![0u8; driver.buf_size()];
//! loop {
//!     let status = driver.rx(1, &mut dataport);
//!     if let Some(len) = status.len() {
//!         println!("{len} bytes");
//!     }
//!     if !status.has_more() {
//!         break;
//!     }
//! }
//! # Ok::<(), ethmux::Error>(())
//! ```

pub mod config;
pub mod device;
mod dispatch;
pub mod dma;
mod driver;
mod engine;
pub mod error;
pub mod hw;
mod notify;
pub mod stats;
pub mod tenant;

pub use config::{DriverConfig, PlatConfig, TenantConfig, TenantId};
pub use device::LoopbackDevice;
pub use dispatch::Delivery;
pub use dma::{DmaSync, HostCoherent};
pub use driver::{EthDriver, RxStatus, TenantPort, TxStatus};
pub use error::{BoxError, DropReason, Error, Result};
pub use notify::{Doorbell, Notify};
pub use stats::{Census, Stats};
