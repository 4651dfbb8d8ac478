use std::ptr::NonNull;
use std::slice;

/// A fixed-size DMA transfer buffer.
///
/// Holding a `DmaBuf` by value is ownership of the buffer: the pool, the
/// hardware in-flight tables and the tenant queues all store them by value,
/// and moving one between them is the ownership transfer.
pub struct DmaBuf {
    vaddr: NonNull<u8>,
    iova: u64,
    capacity: usize,
    index: u16,
}

// A buffer is only ever reachable through its single owner.
unsafe impl Send for DmaBuf {}

impl DmaBuf {
    /// # Safety
    /// `vaddr` must point to `capacity` bytes of mapped memory that the
    /// device reaches at `iova`, and no other `DmaBuf` may cover that memory.
    pub(crate) unsafe fn new(vaddr: NonNull<u8>, iova: u64, capacity: usize, index: u16) -> Self {
        Self {
            vaddr,
            iova,
            capacity,
            index,
        }
    }

    /// Device-visible address.
    #[inline]
    pub fn iova(&self) -> u64 {
        self.iova
    }

    /// CPU address.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.vaddr.as_ptr()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position of this buffer within its pool or tenant free-list.
    #[inline]
    pub fn index(&self) -> u16 {
        self.index
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.vaddr.as_ptr(), self.capacity) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.vaddr.as_ptr(), self.capacity) }
    }

    /// Copy `data` to the start of the buffer, truncating to capacity.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_from(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.capacity);
        self.as_mut_slice()[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Zero the whole buffer.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

impl std::fmt::Debug for DmaBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuf")
            .field("index", &self.index)
            .field("iova", &format_args!("{:#x}", self.iova))
            .field("capacity", &self.capacity)
            .finish()
    }
}
