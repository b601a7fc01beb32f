//! The tree's meta page.

use mica_common::page::PageId;

/// Meta page contents: the durable handle to a tree.
///
/// Only the first eight bytes of the page are used; they hold the current
/// root page id (little-endian). The root pointer moves here whenever an
/// overflowing root is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub root_page_id: PageId,
}

impl Meta {
    /// Size of the serialized meta header in bytes.
    pub const SIZE: usize = 8;

    /// Reads the meta header from a meta page.
    pub fn read_from(page: &[u8]) -> Self {
        let root = u64::from_le_bytes([
            page[0], page[1], page[2], page[3], page[4], page[5], page[6], page[7],
        ]);
        Self {
            root_page_id: PageId(root),
        }
    }

    /// Writes the meta header to a meta page.
    pub fn write_to(&self, page: &mut [u8]) {
        page[..Self::SIZE].copy_from_slice(&self.root_page_id.0.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_common::page::PAGE_SIZE;

    #[test]
    fn test_meta_roundtrip() {
        let mut page = [0u8; PAGE_SIZE];

        let meta = Meta {
            root_page_id: PageId(42),
        };
        meta.write_to(&mut page);

        assert_eq!(Meta::read_from(&page), meta);
    }

    #[test]
    fn test_meta_little_endian_layout() {
        let mut page = [0u8; PAGE_SIZE];
        Meta {
            root_page_id: PageId(0x0102_0304),
        }
        .write_to(&mut page);

        assert_eq!(&page[..8], &[0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_meta_overwrite() {
        let mut page = [0u8; PAGE_SIZE];

        Meta {
            root_page_id: PageId(1),
        }
        .write_to(&mut page);
        Meta {
            root_page_id: PageId(9),
        }
        .write_to(&mut page);

        assert_eq!(Meta::read_from(&page).root_page_id, PageId(9));
    }
}
