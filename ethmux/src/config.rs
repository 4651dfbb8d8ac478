//! Driver sizing and tenant configuration.
//!
//! All sizes are fixed when the driver is created. The defaults mirror a
//! typical single-port deployment: 256 shared receive buffers, 128 queued
//! frames and 128 transmit buffers per tenant, 2 KiB per buffer.

use smoltcp::wire::EthernetAddress;

use crate::error::{Error, Result};

/// Default number of buffers in the shared inbound pool.
pub const RX_BUFS: usize = 256;

/// Default inbound ring capacity per tenant (one slot stays empty).
pub const CLIENT_RX_BUFS: usize = 128;

/// Default outbound buffers per tenant.
pub const CLIENT_TX_BUFS: usize = 128;

/// Default size of every DMA buffer.
pub const BUF_SIZE: usize = 2048;

/// Largest accepted buffer size.
pub const MAX_BUF_SIZE: usize = 64 * 1024;

/// Compile-time bound on the number of tenants.
pub const MAX_TENANTS: usize = 8;

/// Length of a hardware address.
pub const MAC_ADDRESS_LEN: usize = 6;

/// Smallest frame a tenant may transmit: destination plus source address.
pub const MIN_TX_LEN: usize = 2 * MAC_ADDRESS_LEN;

/// Identity of a tenant, as assigned by the component runtime.
pub type TenantId = u32;

/// Static description of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantConfig {
    pub id: TenantId,
    pub mac: EthernetAddress,
}

impl TenantConfig {
    pub fn new(id: TenantId, mac: EthernetAddress) -> Self {
        Self { id, mac }
    }
}

/// Configuration for creating an [`EthDriver`](crate::EthDriver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Number of buffers in the shared inbound pool
    pub rx_bufs: usize,
    /// Inbound ring capacity per tenant (usable depth is one less)
    pub client_rx_bufs: usize,
    /// Outbound buffers per tenant
    pub client_tx_bufs: usize,
    /// Size of every DMA buffer in bytes
    pub buf_size: usize,
    /// Device address of the first byte of DMA memory
    pub iova_base: u64,
    /// Tenant receiving the original buffer on broadcast (default: first tenant)
    pub primary: Option<TenantId>,
    /// Tenants, in configuration order
    pub tenants: Vec<TenantConfig>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            rx_bufs: RX_BUFS,
            client_rx_bufs: CLIENT_RX_BUFS,
            client_tx_bufs: CLIENT_TX_BUFS,
            buf_size: BUF_SIZE,
            iova_base: 0x4000_0000,
            primary: None,
            tenants: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Create a new DriverConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shared inbound buffers.
    pub fn rx_bufs(mut self, n: usize) -> Self {
        self.rx_bufs = n;
        self
    }

    /// Set the inbound ring capacity of every tenant.
    ///
    /// One slot is reserved to tell a full ring from an empty one, so a ring
    /// of capacity `n` queues at most `n - 1` frames.
    pub fn client_rx_bufs(mut self, n: usize) -> Self {
        self.client_rx_bufs = n;
        self
    }

    /// Set the number of outbound buffers owned by every tenant.
    pub fn client_tx_bufs(mut self, n: usize) -> Self {
        self.client_tx_bufs = n;
        self
    }

    /// Set the size of each DMA buffer.
    pub fn buf_size(mut self, size: usize) -> Self {
        self.buf_size = size;
        self
    }

    /// Set the device address at which DMA memory starts.
    pub fn iova_base(mut self, base: u64) -> Self {
        self.iova_base = base;
        self
    }

    /// Choose the tenant that keeps the original buffer on broadcast.
    pub fn primary(mut self, id: TenantId) -> Self {
        self.primary = Some(id);
        self
    }

    /// Add a tenant.
    pub fn tenant(mut self, id: TenantId, mac: EthernetAddress) -> Self {
        self.tenants.push(TenantConfig::new(id, mac));
        self
    }

    /// Check sizes and tenant list.
    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(Error::InvalidConfig("at least one tenant is required"));
        }
        if self.tenants.len() > MAX_TENANTS {
            return Err(Error::TooManyTenants(self.tenants.len()));
        }
        if self.buf_size < MIN_TX_LEN {
            return Err(Error::InvalidConfig("buf_size smaller than a frame header"));
        }
        if self.buf_size > MAX_BUF_SIZE {
            return Err(Error::InvalidConfig("buf_size larger than 64 KiB"));
        }
        if self.rx_bufs == 0 || self.rx_bufs > u16::MAX as usize {
            return Err(Error::InvalidConfig("rx_bufs must be in 1..=65535"));
        }
        if self.client_rx_bufs < 2 {
            return Err(Error::InvalidConfig("client_rx_bufs must be at least 2"));
        }
        if self.client_tx_bufs == 0 || self.client_tx_bufs > u16::MAX as usize {
            return Err(Error::InvalidConfig("client_tx_bufs must be in 1..=65535"));
        }
        if self.rx_bufs.checked_mul(self.buf_size).is_none()
            || self.client_tx_bufs.checked_mul(self.buf_size).is_none()
        {
            return Err(Error::InvalidConfig("DMA region size overflows"));
        }
        for (i, t) in self.tenants.iter().enumerate() {
            if self.tenants[..i].iter().any(|o| o.id == t.id) {
                return Err(Error::DuplicateTenant(t.id));
            }
            if t.mac.is_broadcast() {
                return Err(Error::InvalidConfig("tenant address is the broadcast address"));
            }
            if self.tenants[..i].iter().any(|o| o.mac == t.mac) {
                return Err(Error::InvalidConfig("two tenants share an address"));
            }
        }
        if let Some(primary) = self.primary
            && !self.tenants.iter().any(|t| t.id == primary)
        {
            return Err(Error::InvalidConfig("primary tenant is not configured"));
        }
        Ok(())
    }

    /// Index (in configuration order) of the broadcast primary.
    pub(crate) fn primary_index(&self) -> usize {
        self.primary
            .and_then(|id| self.tenants.iter().position(|t| t.id == id))
            .unwrap_or(0)
    }

    /// Device settings derived from the tenant list.
    ///
    /// With several tenants the NIC must accept every destination, so it is
    /// put in promiscuous mode; a single tenant's address is programmed
    /// directly.
    pub fn plat_config(&self) -> PlatConfig {
        let mac = self
            .tenants
            .first()
            .map(|t| t.mac)
            .unwrap_or(EthernetAddress([0; MAC_ADDRESS_LEN]));
        PlatConfig {
            mac,
            promiscuous: self.tenants.len() > 1,
        }
    }
}

/// Settings handed to the device backend at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatConfig {
    pub mac: EthernetAddress,
    pub promiscuous: bool,
}
