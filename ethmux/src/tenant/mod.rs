//! Tenant registry: per-tenant inbound queues and outbound free-lists.

mod entry;
mod ring;

use arrayvec::ArrayVec;
use smoltcp::wire::EthernetAddress;

pub use entry::{RxDesc, Tenant};
pub use ring::BoundedRing;

use crate::config::{MAX_TENANTS, TenantId};

/// Fixed table of tenants, created once at startup.
///
/// Tenants are addressed by their position (`usize` index) internally and
/// by [`TenantId`] at the API boundary.
pub struct TenantTable {
    tenants: ArrayVec<Tenant, MAX_TENANTS>,
    primary: usize,
}

impl TenantTable {
    /// # Panics
    /// Panics if more than `MAX_TENANTS` tenants are given or `primary` is
    /// out of range; the driver validates its config first.
    pub(crate) fn new(tenants: impl IntoIterator<Item = Tenant>, primary: usize) -> Self {
        let tenants: ArrayVec<Tenant, MAX_TENANTS> = tenants.into_iter().collect();
        assert!(primary < tenants.len(), "primary tenant out of range");
        Self { tenants, primary }
    }

    /// Position of the tenant with `id`.
    #[inline]
    pub fn index_of(&self, id: TenantId) -> Option<usize> {
        self.tenants.iter().position(|t| t.id() == id)
    }

    /// Position of the tenant whose address is exactly `mac`.
    #[inline]
    pub fn index_of_mac(&self, mac: &EthernetAddress) -> Option<usize> {
        self.tenants.iter().position(|t| t.mac() == *mac)
    }

    /// Position of the tenant that keeps the original buffer on broadcast.
    #[inline]
    pub fn primary(&self) -> usize {
        self.primary
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Tenant> {
        self.tenants.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tenant> {
        self.tenants.get_mut(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tenant> {
        self.tenants.iter()
    }

    /// Total frames queued across all tenants.
    pub fn rx_pending(&self) -> usize {
        self.tenants.iter().map(Tenant::rx_pending).sum()
    }
}

impl std::ops::Index<usize> for TenantTable {
    type Output = Tenant;

    fn index(&self, index: usize) -> &Tenant {
        &self.tenants[index]
    }
}

impl std::ops::IndexMut<usize> for TenantTable {
    fn index_mut(&mut self, index: usize) -> &mut Tenant {
        &mut self.tenants[index]
    }
}
