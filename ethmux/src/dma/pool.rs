use super::buf::DmaBuf;

/// Fixed-size free-list of inbound transfer buffers.
///
/// Allocation and release are O(1) stack operations. The pool never grows:
/// its capacity is the number of buffers it was built with, and an empty
/// pool simply fails allocation.
pub struct BufferPool {
    free: Vec<DmaBuf>,
    total: usize,
    buf_size: usize,
}

impl BufferPool {
    /// Build a pool that initially owns all of `bufs`.
    pub fn new(bufs: Vec<DmaBuf>) -> Self {
        let buf_size = bufs.first().map(DmaBuf::capacity).unwrap_or(0);
        debug_assert!(bufs.iter().all(|b| b.capacity() == buf_size));
        Self {
            total: bufs.len(),
            free: bufs,
            buf_size,
        }
    }

    /// Take a buffer from the pool.
    ///
    /// Returns `None` if the pool is exhausted.
    #[inline]
    pub fn allocate(&mut self) -> Option<DmaBuf> {
        self.free.pop()
    }

    /// Return a buffer to the pool.
    #[inline]
    pub fn release(&mut self, buf: DmaBuf) {
        debug_assert!(
            self.free.len() < self.total,
            "pool overflow: released {buf:?} into a full pool"
        );
        debug_assert!(
            !self.free.iter().any(|b| b.index() == buf.index()),
            "buffer {} released twice",
            buf.index()
        );
        self.free.push(buf);
    }

    /// Number of free buffers.
    #[inline]
    pub fn avail_count(&self) -> usize {
        self.free.len()
    }

    /// Number of buffers the pool was created with.
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of buffers currently owned by someone else.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.total - self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Size of each buffer.
    #[inline]
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("avail", &self.avail_count())
            .field("total", &self.total)
            .field("buf_size", &self.buf_size)
            .finish()
    }
}
