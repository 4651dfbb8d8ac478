//! Per-tenant "data available" signalling.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::config::{MAX_TENANTS, TenantId};

/// Wakes a tenant when a frame lands in its (previously drained) queue.
///
/// Called with the driver lock held, so implementations must not block or
/// call back into the driver.
pub trait Notify: Send + Sync {
    fn emit(&self, tenant: TenantId);
}

impl<F> Notify for F
where
    F: Fn(TenantId) + Send + Sync,
{
    fn emit(&self, tenant: TenantId) {
        self(tenant)
    }
}

/// A notification object per tenant that a tenant thread can wait on.
///
/// Signals are latched: an `emit` with nobody waiting is consumed by the
/// next `wait`.
pub struct Doorbell {
    ids: Vec<TenantId>,
    pending: Mutex<[bool; MAX_TENANTS]>,
    cond: Condvar,
}

impl Doorbell {
    pub fn new(ids: impl IntoIterator<Item = TenantId>) -> Self {
        let ids: Vec<_> = ids.into_iter().take(MAX_TENANTS).collect();
        Self {
            ids,
            pending: Mutex::new([false; MAX_TENANTS]),
            cond: Condvar::new(),
        }
    }

    fn slot(&self, tenant: TenantId) -> Option<usize> {
        self.ids.iter().position(|&id| id == tenant)
    }

    /// Block until `tenant` is signalled or `timeout` elapses.
    ///
    /// Returns `true` if a signal was consumed.
    pub fn wait(&self, tenant: TenantId, timeout: Duration) -> bool {
        let Some(slot) = self.slot(tenant) else {
            return false;
        };
        let guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let (mut guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |pending| !pending[slot])
            .unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut guard[slot], false)
    }
}

impl Notify for Doorbell {
    fn emit(&self, tenant: TenantId) {
        let Some(slot) = self.slot(tenant) else {
            tracing::warn!(tenant, "Notification for unknown tenant");
            return;
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending[slot] = true;
        self.cond.notify_all();
    }
}
