//! Configuration structures for MicaDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the engine.
///
/// Collects everything needed to assemble a disk manager and buffer pool
/// in one place; `BufferPoolManager::open` in the storage crate consumes
/// this directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the heap file.
    pub path: PathBuf,
    /// Buffer pool size in number of frames.
    pub pool_frames: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mica.db"),
            pool_frames: 1024, // 4 MB with 4 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration for the given heap file path with default
    /// pool sizing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Returns the total buffer pool size in bytes.
    pub fn pool_size_bytes(&self) -> usize {
        self.pool_frames * PAGE_SIZE
    }
}
