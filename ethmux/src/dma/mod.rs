//! DMA memory, buffers and the shared inbound buffer pool.
//!
//! Every buffer has a stable CPU address and a stable device (bus) address.
//! Ownership moves with the [`DmaBuf`] value: whoever holds it owns it, and
//! the type is neither `Clone` nor `Copy`, so a buffer can never be held by
//! two parties at once.

mod buf;
mod pool;
mod region;
mod sync;

pub use buf::DmaBuf;
pub use pool::BufferPool;
pub use region::{DmaRegion, DmaWindow};
pub use sync::{DmaSync, HostCoherent};
