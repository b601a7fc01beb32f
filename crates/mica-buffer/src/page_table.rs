//! Page table mapping cached page ids to their frames.

use crate::frame::FrameId;
use mica_common::page::PageId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Mapping from `PageId` to the frame currently holding that page.
///
/// Only valid buffers appear here; the pool manager removes an entry when
/// its page is evicted.
pub struct PageTable {
    inner: Mutex<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates an empty page table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up the frame holding the given page.
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.inner.lock().get(&page_id).copied()
    }

    /// Returns true if the page is cached.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().contains_key(&page_id)
    }

    /// Records that `page_id` now lives in `frame_id`.
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.inner.lock().insert(page_id, frame_id);
    }

    /// Removes the entry for `page_id`, returning the frame it was in.
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.inner.lock().remove(&page_id)
    }

    /// Returns the number of cached pages.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if no pages are cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Calls `f` for every cached (page, frame) entry.
    pub fn for_each(&self, mut f: impl FnMut(PageId, FrameId)) {
        for (&page_id, &frame_id) in self.inner.lock().iter() {
            f(page_id, frame_id);
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_table_empty() {
        let table = PageTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.get(PageId(0)), None);
        assert!(!table.contains(PageId(0)));
    }

    #[test]
    fn test_page_table_insert_get() {
        let table = PageTable::new();

        table.insert(PageId(1), FrameId(3));
        table.insert(PageId(2), FrameId(7));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(PageId(1)), Some(FrameId(3)));
        assert_eq!(table.get(PageId(2)), Some(FrameId(7)));
        assert!(table.contains(PageId(1)));
    }

    #[test]
    fn test_page_table_overwrite() {
        let table = PageTable::new();

        table.insert(PageId(1), FrameId(3));
        table.insert(PageId(1), FrameId(5));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(PageId(1)), Some(FrameId(5)));
    }

    #[test]
    fn test_page_table_remove() {
        let table = PageTable::new();

        table.insert(PageId(1), FrameId(3));

        assert_eq!(table.remove(PageId(1)), Some(FrameId(3)));
        assert_eq!(table.remove(PageId(1)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_page_table_for_each() {
        let table = PageTable::new();

        for i in 0..5 {
            table.insert(PageId(i), FrameId(i as u32));
        }

        let mut seen = Vec::new();
        table.for_each(|page_id, frame_id| seen.push((page_id, frame_id)));
        seen.sort();

        assert_eq!(seen.len(), 5);
        for (i, (page_id, frame_id)) in seen.into_iter().enumerate() {
            assert_eq!(page_id, PageId(i as u64));
            assert_eq!(frame_id, FrameId(i as u32));
        }
    }
}
