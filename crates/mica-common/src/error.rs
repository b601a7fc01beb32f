//! Error types for MicaDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using MicaError.
pub type Result<T> = std::result::Result<T, MicaError>;

/// Errors that can occur in MicaDB operations.
#[derive(Debug, Error)]
pub enum MicaError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: {page_id} extends past end of heap file")]
    ShortRead { page_id: PageId },

    // Buffer pool errors
    #[error("no free buffer available in pool")]
    NoFreeBuffer,

    // B+ tree errors
    #[error("duplicate key")]
    DuplicateKey,

    #[error("invalid node type tag: {tag}")]
    InvalidNodeType { tag: u8 },

    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("pair too large: {size} bytes (max {max})")]
    PairTooLarge { size: usize, max: usize },
}
