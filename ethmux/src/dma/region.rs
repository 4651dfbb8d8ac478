// DMA memory regions
// Host build: anonymous private mappings stand in for pinned device memory.

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, munmap};

use super::buf::DmaBuf;
use crate::error::Errno;

/// A contiguous, page-aligned block of DMA-capable memory.
///
/// The region is unmapped when dropped. Buffers carved from it hold raw
/// pointers into the mapping, so the region must outlive them; the driver
/// keeps every region alive for its whole lifetime.
pub struct DmaRegion {
    base: NonNull<u8>,
    len: usize,
    iova: u64,
}

// The mapping itself is plain memory; access is arbitrated by buffer ownership.
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl DmaRegion {
    /// Map `len` bytes of zeroed memory that the device sees at `iova`.
    pub fn map(len: usize, iova: u64) -> Result<Self, Errno> {
        let size = NonZeroUsize::new(len).ok_or(Errno::EINVAL)?;
        let ptr = unsafe {
            mmap_anonymous(
                None,
                size,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )?
        };
        tracing::debug!(len, iova = format_args!("{iova:#x}"), "Mapped DMA region");
        Ok(Self {
            base: ptr.cast(),
            len,
            iova,
        })
    }

    /// Length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device address of the first byte.
    #[inline]
    pub fn iova(&self) -> u64 {
        self.iova
    }

    /// Whether `[iova, iova + len)` lies inside this region.
    #[inline]
    pub fn contains(&self, iova: u64, len: usize) -> bool {
        iova >= self.iova && iova + len as u64 <= self.iova + self.len as u64
    }

    /// Split the region into `count` buffers of `buf_size` bytes.
    ///
    /// Buffer indices start at `first_index`.
    ///
    /// # Panics
    /// Panics if `count * buf_size` exceeds the region or overflows.
    pub(crate) fn carve(&self, buf_size: usize, count: usize, first_index: u16) -> Vec<DmaBuf> {
        assert!(
            buf_size.checked_mul(count).is_some_and(|n| n <= self.len),
            "{count} buffers of {buf_size} bytes exceed region of {} bytes",
            self.len
        );
        (0..count)
            .map(|i| {
                let offset = i * buf_size;
                // Safety: offset + buf_size is within the mapping (checked above)
                let vaddr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };
                unsafe {
                    DmaBuf::new(
                        vaddr,
                        self.iova + offset as u64,
                        buf_size,
                        first_index + i as u16,
                    )
                }
            })
            .collect()
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.base.cast(), self.len) } {
            tracing::warn!(error = ?e, "Failed to unmap DMA region");
        }
    }
}

impl std::fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaRegion")
            .field("len", &self.len)
            .field("iova", &format_args!("{:#x}", self.iova))
            .finish()
    }
}

/// The device's view of DMA memory: access by bus address.
///
/// Real hardware reaches buffers through the bus; a software device (see
/// [`LoopbackDevice`](crate::device::LoopbackDevice)) goes through this
/// window instead. It is only sound to touch a buffer through the window
/// while the device owns it.
#[derive(Clone, Default)]
pub struct DmaWindow {
    regions: Vec<Arc<DmaRegion>>,
}

impl DmaWindow {
    pub(crate) fn new(regions: Vec<Arc<DmaRegion>>) -> Self {
        Self { regions }
    }

    fn locate(&self, iova: u64, len: usize) -> Option<*mut u8> {
        self.regions
            .iter()
            .find(|r| r.contains(iova, len))
            .map(|r| unsafe { r.base.as_ptr().add((iova - r.iova) as usize) })
    }

    /// Copy `data` into device memory at `iova`.
    ///
    /// Returns `false` if the range is not mapped.
    ///
    /// # Safety
    /// The caller must own the buffer at `iova` on behalf of the device.
    pub unsafe fn write(&self, iova: u64, data: &[u8]) -> bool {
        match self.locate(iova, data.len()) {
            Some(ptr) => {
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
                true
            }
            None => false,
        }
    }

    /// Copy `len` bytes of device memory at `iova` into a new vector.
    ///
    /// # Safety
    /// The caller must own the buffer at `iova` on behalf of the device.
    pub unsafe fn read(&self, iova: u64, len: usize) -> Option<Vec<u8>> {
        let ptr = self.locate(iova, len)?;
        Some(unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec())
    }
}
