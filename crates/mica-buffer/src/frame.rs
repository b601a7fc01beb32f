//! Buffer frame management.

use mica_common::page::{Page, PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Index of a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A page cached in memory.
///
/// A buffer holds one page worth of data plus the bookkeeping the pool
/// manager needs: which page it holds, whether it must be written back, how
/// many callers are currently using it, and whether it has ever been
/// populated (`is_valid` distinguishes an initialized buffer from a frame
/// that has not been used yet).
pub struct Buffer {
    /// The page currently held (raw `u64`; the sentinel means none yet).
    page_id: AtomicU64,
    /// Page data.
    data: RwLock<Box<Page>>,
    /// Whether the page has been modified since it was loaded.
    is_dirty: AtomicBool,
    /// Number of outstanding pins. A pinned buffer must not be evicted.
    ref_count: AtomicU32,
    /// Whether this buffer holds a real page.
    is_valid: AtomicBool,
}

impl Buffer {
    /// Creates an empty, invalid buffer.
    pub fn new() -> Self {
        Self {
            page_id: AtomicU64::new(PageId::INVALID.0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            is_dirty: AtomicBool::new(false),
            ref_count: AtomicU32::new(0),
            is_valid: AtomicBool::new(false),
        }
    }

    /// Returns the page id held by this buffer.
    ///
    /// Only meaningful while `is_valid` is true.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    /// Sets the page id held by this buffer.
    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    /// Returns true if this buffer must be written back before reuse.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Marks or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Returns true if this buffer holds a real page.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::Acquire)
    }

    /// Marks this buffer as holding (or no longer holding) a real page.
    #[inline]
    pub fn set_valid(&self, valid: bool) {
        self.is_valid.store(valid, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Returns true if any caller holds a pin on this buffer.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.ref_count() > 0
    }

    /// Takes a pin on this buffer.
    #[inline]
    pub fn pin(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases a pin on this buffer.
    ///
    /// Saturates at zero rather than underflowing.
    #[inline]
    pub fn unpin(&self) {
        let _ = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1));
    }

    /// Locks the page data for reading.
    #[inline]
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<Page>> {
        self.data.read()
    }

    /// Locks the page data for writing.
    #[inline]
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<Page>> {
        self.data.write()
    }

    /// Resets the buffer to its empty state, zeroing the page data.
    pub fn reset(&self) {
        self.page_id.store(PageId::INVALID.0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.is_valid.store(false, Ordering::Release);
        self.ref_count.store(0, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("page_id", &self.page_id())
            .field("is_dirty", &self.is_dirty())
            .field("is_valid", &self.is_valid())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// A slot in the buffer pool: one buffer plus its clock-sweep usage count.
pub struct Frame {
    /// Usage count driving clock-sweep victim selection.
    usage_count: AtomicU64,
    /// The cached page.
    buffer: Buffer,
}

impl Frame {
    /// Creates a fresh frame with an empty buffer.
    pub fn new() -> Self {
        Self {
            usage_count: AtomicU64::new(0),
            buffer: Buffer::new(),
        }
    }

    /// Returns the buffer held by this frame.
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Returns the current usage count.
    #[inline]
    pub fn usage_count(&self) -> u64 {
        self.usage_count.load(Ordering::Acquire)
    }

    /// Overwrites the usage count.
    #[inline]
    pub fn set_usage_count(&self, count: u64) {
        self.usage_count.store(count, Ordering::Release);
    }

    /// Increments the usage count (a cache hit).
    #[inline]
    pub fn bump_usage(&self) {
        self.usage_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the usage count, saturating at zero (clock decay).
    #[inline]
    pub fn decay_usage(&self) {
        let _ = self
            .usage_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1));
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("usage_count", &self.usage_count())
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId(42).to_string(), "frame:42");
    }

    #[test]
    fn test_buffer_new() {
        let buffer = Buffer::new();

        assert!(!buffer.is_valid());
        assert!(!buffer.is_dirty());
        assert!(!buffer.is_pinned());
        assert_eq!(buffer.ref_count(), 0);
    }

    #[test]
    fn test_buffer_pin_unpin() {
        let buffer = Buffer::new();

        buffer.pin();
        assert!(buffer.is_pinned());
        assert_eq!(buffer.ref_count(), 1);

        buffer.pin();
        assert_eq!(buffer.ref_count(), 2);

        buffer.unpin();
        assert_eq!(buffer.ref_count(), 1);

        buffer.unpin();
        assert_eq!(buffer.ref_count(), 0);
        assert!(!buffer.is_pinned());
    }

    #[test]
    fn test_buffer_unpin_underflow() {
        let buffer = Buffer::new();

        buffer.unpin();
        assert_eq!(buffer.ref_count(), 0);
    }

    #[test]
    fn test_buffer_dirty_flag() {
        let buffer = Buffer::new();

        buffer.set_dirty(true);
        assert!(buffer.is_dirty());

        buffer.set_dirty(false);
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn test_buffer_page_id() {
        let buffer = Buffer::new();

        buffer.set_page_id(PageId(99));
        assert_eq!(buffer.page_id(), PageId(99));
    }

    #[test]
    fn test_buffer_data_access() {
        let buffer = Buffer::new();

        {
            let mut data = buffer.data_mut();
            data[0] = 0xAB;
            data[PAGE_SIZE - 1] = 0xCD;
        }

        let data = buffer.data();
        assert_eq!(data[0], 0xAB);
        assert_eq!(data[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_buffer_reset() {
        let buffer = Buffer::new();

        buffer.set_page_id(PageId(1));
        buffer.set_valid(true);
        buffer.set_dirty(true);
        buffer.pin();
        buffer.data_mut()[0] = 0xFF;

        buffer.reset();

        assert!(!buffer.is_valid());
        assert!(!buffer.is_dirty());
        assert_eq!(buffer.ref_count(), 0);
        assert_eq!(buffer.data()[0], 0);
    }

    #[test]
    fn test_frame_usage_count() {
        let frame = Frame::new();
        assert_eq!(frame.usage_count(), 0);

        frame.bump_usage();
        frame.bump_usage();
        assert_eq!(frame.usage_count(), 2);

        frame.decay_usage();
        assert_eq!(frame.usage_count(), 1);

        frame.set_usage_count(10);
        assert_eq!(frame.usage_count(), 10);
    }

    #[test]
    fn test_frame_decay_saturates() {
        let frame = Frame::new();

        frame.decay_usage();
        assert_eq!(frame.usage_count(), 0);
    }

    #[test]
    fn test_frame_debug() {
        let frame = Frame::new();
        frame.bump_usage();

        let debug_str = format!("{:?}", frame);
        assert!(debug_str.contains("Frame"));
        assert!(debug_str.contains("usage_count"));
    }
}
