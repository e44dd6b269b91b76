/// Capacity of each transport buffer: 64 KiB.
pub const BUFFER_CAPACITY: usize = 64 * 1024;

/// Fixed-capacity staging buffer with read/write cursors.
///
/// Invariant: `position <= available <= capacity`. Bytes in
/// `data[position..available]` are pending (unread input or unsent output).
pub(crate) struct Buffer {
    data: Box<[u8]>,
    position: usize,
    available: usize,
}

impl Buffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            available: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of pending bytes.
    pub(crate) fn pending(&self) -> usize {
        self.available - self.position
    }

    /// Free space after `available`.
    pub(crate) fn spare(&self) -> usize {
        self.capacity() - self.available
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.position == self.available
    }

    pub(crate) fn reset(&mut self) {
        self.position = 0;
        self.available = 0;
    }

    /// Copy pending bytes into `dst`, advancing `position`. Returns the count copied.
    pub(crate) fn take_into(&mut self, dst: &mut [u8]) -> usize {
        let n = self.pending().min(dst.len());
        dst[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        if self.is_drained() {
            self.reset();
        }
        n
    }

    /// Append as much of `src` as fits, advancing `available`. Returns the count staged.
    pub(crate) fn stage(&mut self, src: &[u8]) -> usize {
        let n = self.spare().min(src.len());
        self.data[self.available..self.available + n].copy_from_slice(&src[..n]);
        self.available += n;
        n
    }

    /// The pending region.
    pub(crate) fn pending_slice(&self) -> &[u8] {
        &self.data[self.position..self.available]
    }

    /// Mark `n` pending bytes as consumed.
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.pending());
        self.position += n;
    }

    /// The whole backing array, for refilling after a reset.
    pub(crate) fn fill_slice(&mut self) -> &mut [u8] {
        debug_assert!(self.position == 0 && self.available == 0);
        &mut self.data[..]
    }

    /// Record that `n` bytes were written by [`Buffer::fill_slice`].
    pub(crate) fn filled(&mut self, n: usize) {
        debug_assert!(n <= self.capacity());
        self.position = 0;
        self.available = n;
    }
}
