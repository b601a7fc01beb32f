//! Page identifiers and the fixed page geometry for MicaDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB). Every disk I/O and every buffer frame
/// operates on exactly one page.
pub const PAGE_SIZE: usize = 4096;

/// A single page worth of bytes.
pub type Page = [u8; PAGE_SIZE];

/// Unique identifier for a page within the heap file.
///
/// Page ids are allocated monotonically; the byte offset of a page in the
/// heap file is `page_id * PAGE_SIZE`. The all-ones value is reserved as an
/// on-disk sentinel for "no page" (for example in leaf sibling pointers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    /// Sentinel value meaning "no page".
    pub const INVALID: PageId = PageId(u64::MAX);

    /// Returns true if this is not the sentinel value.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns the byte offset of this page within the heap file.
    pub fn byte_offset(&self) -> u64 {
        self.0 * PAGE_SIZE as u64
    }

    /// Converts to `None` if this is the sentinel value.
    pub fn to_option(self) -> Option<PageId> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }

    /// Converts an optional page id to its on-disk representation,
    /// mapping `None` to the sentinel.
    pub fn from_option(id: Option<PageId>) -> PageId {
        id.unwrap_or(Self::INVALID)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            write!(f, "page:invalid")
        }
    }
}
