//! Simple tables over the B+ tree.
//!
//! A [`Tuple`] is an ordered list of byte-string elements — one row. A
//! [`SimpleTable`] stores tuples in a B+ tree by splitting each one at
//! `num_key_elems`: the leading elements become the tree key, the rest the
//! value, both encoded as length-prefixed element lists. Scans decode each
//! pair and merge the halves back into the original tuple.
//!
//! ```text
//! num_key_elems = 1        tuple: [id, name, age]
//!                                  └┬┘ └────┬───┘
//!                                  key    value
//! ```
//!
//! Rows persist like everything else: through `BufferPoolManager::flush`.

use crate::btree::{BTree, Iter, SearchMode};
use crate::manager::BufferPoolManager;
use bytes::{BufMut, Bytes, BytesMut};
use mica_common::page::PageId;
use mica_common::Result;

/// One row: an ordered list of byte-string elements.
pub type Tuple = Vec<Bytes>;

/// Encodes a tuple as `[num_elems: u16] ([elem_len: u16][elem_bytes])...`,
/// little-endian.
pub fn encode_tuple(tuple: &[Bytes]) -> Bytes {
    let size = 2 + tuple.iter().map(|elem| 2 + elem.len()).sum::<usize>();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u16_le(tuple.len() as u16);
    for elem in tuple {
        buf.put_u16_le(elem.len() as u16);
        buf.put_slice(elem);
    }
    buf.freeze()
}

/// Decodes a tuple encoded by [`encode_tuple`].
pub fn decode_tuple(data: &[u8]) -> Tuple {
    let num_elems = u16::from_le_bytes([data[0], data[1]]) as usize;
    let mut offset = 2;

    let mut tuple = Vec::with_capacity(num_elems);
    for _ in 0..num_elems {
        let elem_len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        tuple.push(Bytes::copy_from_slice(&data[offset..offset + elem_len]));
        offset += elem_len;
    }
    tuple
}

/// Splits a tuple into its key and value halves. When `num_key_elems`
/// exceeds the tuple length, the whole tuple is the key and the value is
/// empty.
pub fn split_tuple(tuple: &[Bytes], num_key_elems: usize) -> (&[Bytes], &[Bytes]) {
    let split_at = num_key_elems.min(tuple.len());
    tuple.split_at(split_at)
}

/// Reassembles a tuple from its key and value halves.
pub fn merge_tuple(key: &[Bytes], value: &[Bytes]) -> Tuple {
    let mut tuple = Vec::with_capacity(key.len() + value.len());
    tuple.extend_from_slice(key);
    tuple.extend_from_slice(value);
    tuple
}

/// A table of tuples keyed by their leading elements.
pub struct SimpleTable {
    meta_page_id: PageId,
    num_key_elems: usize,
}

impl SimpleTable {
    /// Creates a new table backed by a fresh B+ tree.
    pub fn create(bufmgr: &BufferPoolManager, num_key_elems: usize) -> Result<SimpleTable> {
        let tree = BTree::create(bufmgr)?;
        Ok(SimpleTable {
            meta_page_id: tree.meta_page_id(),
            num_key_elems,
        })
    }

    /// Opens an existing table by its tree's meta page id.
    pub fn open(meta_page_id: PageId, num_key_elems: usize) -> SimpleTable {
        SimpleTable {
            meta_page_id,
            num_key_elems,
        }
    }

    /// Returns the meta page id, the durable handle to this table.
    pub fn meta_page_id(&self) -> PageId {
        self.meta_page_id
    }

    fn btree(&self) -> BTree {
        BTree::new(self.meta_page_id)
    }

    /// Inserts one row. Fails with `DuplicateKey` when a row with the same
    /// key elements already exists.
    pub fn insert(&self, bufmgr: &BufferPoolManager, tuple: &[Bytes]) -> Result<()> {
        let (key, value) = split_tuple(tuple, self.num_key_elems);
        self.btree()
            .insert(bufmgr, &encode_tuple(key), &encode_tuple(value))
    }

    /// Scans every row in key order.
    pub fn scan<'a>(&self, bufmgr: &'a BufferPoolManager) -> Result<TableIter<'a>> {
        let iter = self.btree().search(bufmgr, SearchMode::Start)?;
        Ok(TableIter { iter })
    }

    /// Scans rows whose key is not less than `search_key`, in key order.
    pub fn scan_from<'a>(
        &self,
        bufmgr: &'a BufferPoolManager,
        search_key: &[Bytes],
    ) -> Result<TableIter<'a>> {
        let iter = self
            .btree()
            .search(bufmgr, SearchMode::Key(encode_tuple(search_key)))?;
        Ok(TableIter { iter })
    }
}

/// Iterator over a table's rows.
pub struct TableIter<'a> {
    iter: Iter<'a>,
}

impl TableIter<'_> {
    /// Returns the next row, or `None` when the scan is exhausted.
    pub fn next(&mut self) -> Result<Option<Tuple>> {
        match self.iter.next()? {
            Some(pair) => {
                let key = decode_tuple(&pair.key);
                let value = decode_tuple(&pair.value);
                Ok(Some(merge_tuple(&key, &value)))
            }
            None => Ok(None),
        }
    }
}
