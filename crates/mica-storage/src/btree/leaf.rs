//! Leaf node: a slotted page of sorted key/value pairs.
//!
//! Payload layout (after the node header):
//!
//! ```text
//! +-------------------------+ 0
//! | prev_page_id: u64       |   sentinel = no predecessor
//! +-------------------------+ 8
//! | next_page_id: u64       |   sentinel = no successor
//! +-------------------------+ 16
//! | num_pairs: u16          |
//! +-------------------------+ 18
//! | free_space_offset: u16  |
//! +-------------------------+ 20
//! | slot array: u16 * n     |   grows forward, offsets into pair data
//! +-------------------------+
//! |       free space        |
//! +-------------------------+ free_space_offset
//! | pair data               |   grows backward from the payload end
//! +-------------------------+ payload end
//! ```
//!
//! Pairs are kept in ascending key order (raw byte comparison); duplicate
//! keys are never stored.

use super::pair::{self, Pair};
use bytes::Bytes;
use mica_common::page::{PageId, PAGE_SIZE};

use super::node::NODE_HEADER_SIZE;

/// Size of the leaf header within the node payload.
pub const LEAF_HEADER_SIZE: usize = 20;

/// Size of one slot-array entry.
pub const LEAF_SLOT_SIZE: usize = 2;

/// Largest encoded pair a freshly initialized leaf can hold. Pairs above
/// this would make a split loop forever, so the tree rejects them up front.
pub const MAX_PAIR_SIZE: usize =
    PAGE_SIZE - NODE_HEADER_SIZE - LEAF_HEADER_SIZE - LEAF_SLOT_SIZE;

const PREV_PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 8;
const NUM_PAIRS_OFFSET: usize = 16;
const FREE_SPACE_OFFSET_OFFSET: usize = 18;

/// View of a leaf node over its payload bytes.
pub struct Leaf<B> {
    body: B,
}

impl<B: AsRef<[u8]>> Leaf<B> {
    /// Wraps a node payload as a leaf.
    pub fn new(body: B) -> Self {
        Self { body }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let b = self.body.as_ref();
        u16::from_le_bytes([b[offset], b[offset + 1]])
    }

    fn read_u64(&self, offset: usize) -> u64 {
        let b = self.body.as_ref();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    /// Returns the previous leaf in the chain, if any.
    pub fn prev_page_id(&self) -> Option<PageId> {
        PageId(self.read_u64(PREV_PAGE_ID_OFFSET)).to_option()
    }

    /// Returns the next leaf in the chain, if any.
    pub fn next_page_id(&self) -> Option<PageId> {
        PageId(self.read_u64(NEXT_PAGE_ID_OFFSET)).to_option()
    }

    /// Returns the number of pairs stored in this leaf.
    pub fn num_pairs(&self) -> usize {
        self.read_u16(NUM_PAIRS_OFFSET) as usize
    }

    fn free_space_offset(&self) -> usize {
        self.read_u16(FREE_SPACE_OFFSET_OFFSET) as usize
    }

    fn slot_array_offset(slot_id: usize) -> usize {
        LEAF_HEADER_SIZE + slot_id * LEAF_SLOT_SIZE
    }

    /// Returns the pair-data offset recorded in the given slot.
    fn slot(&self, slot_id: usize) -> usize {
        self.read_u16(Self::slot_array_offset(slot_id)) as usize
    }

    /// Returns the bytes remaining for one more slot plus pair data.
    pub fn free_space(&self) -> usize {
        self.free_space_offset() - Self::slot_array_offset(self.num_pairs())
    }

    /// Returns the key stored at the given slot, borrowed from the page.
    fn key_at(&self, slot_id: usize) -> &[u8] {
        let b = self.body.as_ref();
        let offset = self.slot(slot_id);
        let key_len = u16::from_le_bytes([b[offset], b[offset + 1]]) as usize;
        &b[offset + 4..offset + 4 + key_len]
    }

    /// Decodes the pair stored at the given slot.
    pub fn pair_at(&self, slot_id: usize) -> Pair {
        Pair::from_bytes(&self.body.as_ref()[self.slot(slot_id)..])
    }

    /// Binary-searches for `key`.
    ///
    /// Returns `(slot_id, true)` when the key is present, or
    /// `(insertion position, false)` when it is not — the lower bound,
    /// i.e. the first slot whose key is not less than `key`.
    pub fn search_slot_id(&self, key: &[u8]) -> (usize, bool) {
        let mut lo = 0;
        let mut hi = self.num_pairs();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.key_at(mid).cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return (mid, true),
            }
        }
        (lo, false)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Leaf<B> {
    fn write_u16(&mut self, offset: usize, value: u16) {
        self.body.as_mut()[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        self.body.as_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Initializes an empty leaf with no siblings.
    pub fn initialize(&mut self) {
        self.set_prev_page_id(None);
        self.set_next_page_id(None);
        self.set_num_pairs(0);
        let end = self.body.as_ref().len();
        self.set_free_space_offset(end);
    }

    /// Sets the previous leaf in the chain.
    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        self.write_u64(PREV_PAGE_ID_OFFSET, PageId::from_option(page_id).0);
    }

    /// Sets the next leaf in the chain.
    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        self.write_u64(NEXT_PAGE_ID_OFFSET, PageId::from_option(page_id).0);
    }

    fn set_num_pairs(&mut self, num_pairs: usize) {
        self.write_u16(NUM_PAIRS_OFFSET, num_pairs as u16);
    }

    fn set_free_space_offset(&mut self, offset: usize) {
        self.write_u16(FREE_SPACE_OFFSET_OFFSET, offset as u16);
    }

    fn set_slot(&mut self, slot_id: usize, data_offset: usize) {
        self.write_u16(Self::slot_array_offset(slot_id), data_offset as u16);
    }

    /// Inserts a pair at the given slot, shifting later slots right.
    ///
    /// Returns false when the leaf lacks space for the slot entry plus the
    /// encoded pair; the caller then splits.
    pub fn insert(&mut self, slot_id: usize, key: &[u8], value: &[u8]) -> bool {
        let pair_size = Pair::encoded_size(key.len(), value.len());
        if self.free_space() < LEAF_SLOT_SIZE + pair_size {
            return false;
        }

        let num_pairs = self.num_pairs();
        for i in ((slot_id + 1)..=num_pairs).rev() {
            let moved = self.slot(i - 1);
            self.set_slot(i, moved);
        }

        let data_offset = self.free_space_offset() - pair_size;
        pair::encode_into(
            &mut self.body.as_mut()[data_offset..data_offset + pair_size],
            key,
            value,
        );
        self.set_slot(slot_id, data_offset);
        self.set_free_space_offset(data_offset);
        self.set_num_pairs(num_pairs + 1);

        true
    }

    /// Splits an overflowing leaf while inserting one more pair.
    ///
    /// All pairs plus the new one are redistributed: `new_leaf` (the
    /// caller-provided empty sibling) takes the lower half, this node keeps
    /// the upper half. This node's sibling pointers survive the rebuild;
    /// the caller wires `new_leaf` into the chain.
    ///
    /// Returns the separator to propagate upward: the smallest key left in
    /// this node. Every key in `new_leaf` is strictly below it.
    pub fn split_insert<B2: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        new_leaf: &mut Leaf<B2>,
        key: &[u8],
        value: &[u8],
    ) -> Bytes {
        let mut pairs: Vec<Pair> = (0..self.num_pairs()).map(|i| self.pair_at(i)).collect();
        let insert_pos = pairs
            .iter()
            .take_while(|pair| pair.key.as_ref() < key)
            .count();
        pairs.insert(insert_pos, Pair::new(key, value));

        let mid = pairs.len() / 2;
        let prev = self.prev_page_id();
        let next = self.next_page_id();

        new_leaf.initialize();
        for (i, pair) in pairs[..mid].iter().enumerate() {
            let inserted = new_leaf.insert(i, &pair.key, &pair.value);
            debug_assert!(inserted);
        }

        self.initialize();
        for (i, pair) in pairs[mid..].iter().enumerate() {
            let inserted = self.insert(i, &pair.key, &pair.value);
            debug_assert!(inserted);
        }
        self.set_prev_page_id(prev);
        self.set_next_page_id(next);

        pairs[mid].key.clone()
    }
}
