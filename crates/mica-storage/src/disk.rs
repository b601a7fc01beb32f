//! Disk manager for page-level heap file I/O.

use mica_common::page::{Page, PageId, PAGE_SIZE};
use mica_common::{MicaError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path of the heap file.
    pub path: PathBuf,
    /// Enable fsync on `sync()`.
    pub fsync_enabled: bool,
}

impl DiskManagerConfig {
    /// Creates a configuration for the given path with fsync enabled.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync_enabled: true,
        }
    }
}

/// Manages page-granular reads and writes against a single heap file.
///
/// The file is a flat sequence of 4 KB pages; a page's byte offset is
/// `page_id * PAGE_SIZE`. Page ids are handed out by a monotonic counter
/// seeded from the file length at open, so allocation itself performs no
/// I/O — a freshly allocated page only reaches disk once a buffer holding
/// it is written back.
///
/// There is no caching at this layer; callers batch through the buffer
/// pool manager.
pub struct DiskManager {
    /// The heap file.
    file: Mutex<File>,
    /// Next page id to hand out.
    next_page_id: AtomicU64,
    /// Whether `sync()` performs an fsync.
    fsync_enabled: bool,
}

impl DiskManager {
    /// Opens the heap file at `path` with default configuration,
    /// creating it if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(DiskManagerConfig::new(path))
    }

    /// Opens the heap file described by `config`, creating it if missing.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&config.path)?;

        let file_len = file.metadata()?.len();
        let next_page_id = file_len / PAGE_SIZE as u64;

        Ok(Self {
            file: Mutex::new(file),
            next_page_id: AtomicU64::new(next_page_id),
            fsync_enabled: config.fsync_enabled,
        })
    }

    /// Returns the number of pages allocated so far.
    pub fn num_pages(&self) -> u64 {
        self.next_page_id.load(Ordering::Acquire)
    }

    /// Allocates a new page id. No I/O is performed; the page
    /// materializes in the file when it is first written.
    pub fn allocate_page(&self) -> PageId {
        PageId(self.next_page_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Reads one page into `buf`.
    ///
    /// Fails with `ShortRead` if the file ends before a full page.
    pub fn read_page(&self, page_id: PageId, buf: &mut Page) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                MicaError::ShortRead { page_id }
            } else {
                MicaError::Io(e)
            }
        })
    }

    /// Writes one page, extending the file if the offset is past its end.
    pub fn write_page(&self, page_id: PageId, data: &Page) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Flushes the heap file to stable storage.
    pub fn sync(&self) -> Result<()> {
        if self.fsync_enabled {
            self.file.lock().sync_all()?;
        }
        Ok(())
    }
}
