//! Buffer pool manager pairing the frame pool with the disk manager.
//!
//! All page access is routed through here: pages are fetched into frames,
//! mutated in memory through pinned guards, marked dirty, and written back
//! lazily on eviction or explicitly on `flush`.

use crate::disk::{DiskManager, DiskManagerConfig};
use mica_buffer::{BufferPool, BufferPoolConfig, Frame, PageTable};
use mica_common::config::StorageConfig;
use mica_common::page::{Page, PageId};
use mica_common::Result;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

/// Owns the disk manager, the buffer pool, and the page table, and serves
/// page fetches and creations against them.
///
/// `fetch_page` and `create_page` return a [`PageGuard`] holding a pin on
/// the underlying buffer; eviction can only reclaim a frame once every
/// guard on it has been dropped.
pub struct BufferPoolManager {
    disk: DiskManager,
    pool: BufferPool,
    page_table: PageTable,
}

impl BufferPoolManager {
    /// Creates a manager over an already opened disk manager and pool.
    pub fn new(disk: DiskManager, pool: BufferPool) -> Self {
        Self {
            disk,
            pool,
            page_table: PageTable::new(),
        }
    }

    /// Opens the heap file and sizes the pool according to `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let disk = DiskManager::new(DiskManagerConfig {
            path: config.path.clone(),
            fsync_enabled: config.fsync_enabled,
        })?;
        let pool = BufferPool::new(BufferPoolConfig {
            num_frames: config.pool_frames,
        });
        Ok(Self::new(disk, pool))
    }

    /// Returns the underlying disk manager.
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Returns true if the given page is currently cached.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Fetches a page, reading it from disk on a cache miss.
    ///
    /// A hit bumps the frame's usage count and takes another pin. A miss
    /// evicts a victim frame (writing it back first if dirty), reads the
    /// requested page into it, and starts it at usage count 1.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = self.pool.frame(frame_id);
            frame.bump_usage();
            frame.buffer().pin();
            return Ok(PageGuard { frame, page_id });
        }

        let frame_id = self.pool.evict()?;
        let frame = self.pool.frame(frame_id);
        self.recycle(frame)?;

        let buffer = frame.buffer();
        buffer.set_page_id(page_id);
        self.disk.read_page(page_id, &mut buffer.data_mut())?;
        buffer.set_valid(true);
        buffer.pin();
        frame.set_usage_count(1);
        self.page_table.insert(page_id, frame_id);

        Ok(PageGuard { frame, page_id })
    }

    /// Allocates a fresh page and returns it zero-filled and dirty.
    ///
    /// No disk read happens; the page reaches the file when its buffer is
    /// flushed or evicted.
    pub fn create_page(&self) -> Result<PageGuard<'_>> {
        let frame_id = self.pool.evict()?;
        let frame = self.pool.frame(frame_id);
        self.recycle(frame)?;

        let page_id = self.disk.allocate_page();
        let buffer = frame.buffer();
        buffer.set_page_id(page_id);
        buffer.set_dirty(true);
        buffer.set_valid(true);
        buffer.pin();
        frame.set_usage_count(1);
        self.page_table.insert(page_id, frame_id);

        Ok(PageGuard { frame, page_id })
    }

    /// Writes every cached page back to disk, clears dirty flags, and
    /// syncs the heap file.
    pub fn flush(&self) -> Result<()> {
        let mut entries = Vec::with_capacity(self.page_table.len());
        self.page_table
            .for_each(|page_id, frame_id| entries.push((page_id, frame_id)));

        for (page_id, frame_id) in entries {
            let buffer = self.pool.frame(frame_id).buffer();
            self.disk.write_page(page_id, &buffer.data())?;
            buffer.set_dirty(false);
        }
        self.disk.sync()
    }

    /// Prepares a victim frame for reuse: writes its page back if dirty,
    /// drops its page-table entry, and resets the buffer.
    fn recycle(&self, frame: &Frame) -> Result<()> {
        let buffer = frame.buffer();
        if buffer.is_valid() {
            let old_page_id = buffer.page_id();
            if buffer.is_dirty() {
                self.disk.write_page(old_page_id, &buffer.data())?;
            }
            self.page_table.remove(old_page_id);
        }
        buffer.reset();
        Ok(())
    }
}

/// Pinned access to one cached page.
///
/// Dropping the guard releases the pin; the dirty flag and usage count are
/// left untouched so the clock sweep sees the access history.
pub struct PageGuard<'a> {
    frame: &'a Frame,
    page_id: PageId,
}

impl PageGuard<'_> {
    /// Returns the id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Locks the page bytes for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<Page>> {
        self.frame.buffer().data()
    }

    /// Locks the page bytes for writing. Call [`mark_dirty`] after
    /// mutating, or the change may be lost on eviction.
    ///
    /// [`mark_dirty`]: PageGuard::mark_dirty
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<Page>> {
        self.frame.buffer().data_mut()
    }

    /// Flags the page for write-back.
    pub fn mark_dirty(&self) {
        self.frame.buffer().set_dirty(true);
    }

    /// Returns true if the page is flagged for write-back.
    pub fn is_dirty(&self) -> bool {
        self.frame.buffer().is_dirty()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.frame.buffer().unpin();
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
