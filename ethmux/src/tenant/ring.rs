/// Bounded circular queue with one slot reserved.
///
/// A ring of capacity `C` holds at most `C - 1` items: `head == tail` means
/// empty and `(head + 1) % C == tail` means full. Items are stored by value;
/// push on a full ring hands the item back untouched.
pub struct BoundedRing<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
}

impl<T> BoundedRing<T> {
    /// # Panics
    /// Panics if `capacity < 2`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring capacity must be at least 2");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
        }
    }

    /// Append at the head.
    ///
    /// Returns the item back if the ring is full; indices are unchanged.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.slots.len();
        Ok(())
    }

    /// Remove from the tail (oldest first).
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.tail].take();
        debug_assert!(item.is_some(), "occupied slot {} was empty", self.tail);
        self.tail = (self.tail + 1) % self.slots.len();
        item
    }

    /// Number of queued items.
    #[inline]
    pub fn len(&self) -> usize {
        (self.head + self.slots.len() - self.tail) % self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        (self.head + 1) % self.slots.len() == self.tail
    }

    /// Number of slots, including the reserved one.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Current `(head, tail)` indices.
    #[inline]
    pub fn indices(&self) -> (usize, usize) {
        (self.head, self.tail)
    }
}
