//! Branch node: sorted separator keys over child page ids.
//!
//! Payload layout (after the node header):
//!
//! ```text
//! +-------------------------+ 0
//! | num_children: u16       |
//! +-------------------------+ 2
//! | free_space_offset: u16  |
//! +-------------------------+ 4
//! | key slots: u16 * 100    |   fixed reservation of MAX_KEYS slots
//! +-------------------------+ 4 + 200
//! | child ids: u64 * n      |   num_children entries
//! +-------------------------+
//! |       free space        |
//! +-------------------------+ free_space_offset
//! | key records             |   {key_len: u16, key} growing backward
//! +-------------------------+ payload end
//! ```
//!
//! A node with `n` children carries `n - 1` separator keys in ascending
//! order. Every key in the subtree under `children[i]` is strictly below
//! `keys[i]` and at least `keys[i - 1]`; searches descend right on equality.

use bytes::Bytes;
use mica_common::page::PageId;

/// Size of the branch header within the node payload.
pub const BRANCH_HEADER_SIZE: usize = 4;

/// Size of one key-slot entry.
pub const BRANCH_SLOT_SIZE: usize = 2;

/// Size of one child page id.
pub const BRANCH_CHILD_SIZE: usize = 8;

/// Number of key slots reserved in the layout. The slot array always
/// occupies this many entries regardless of occupancy.
pub const MAX_KEYS: usize = 100;

const NUM_CHILDREN_OFFSET: usize = 0;
const FREE_SPACE_OFFSET_OFFSET: usize = 2;

/// View of a branch node over its payload bytes.
pub struct Branch<B> {
    body: B,
}

impl<B: AsRef<[u8]>> Branch<B> {
    /// Wraps a node payload as a branch.
    pub fn new(body: B) -> Self {
        Self { body }
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let b = self.body.as_ref();
        u16::from_le_bytes([b[offset], b[offset + 1]])
    }

    /// Returns the number of child pointers.
    pub fn num_children(&self) -> usize {
        self.read_u16(NUM_CHILDREN_OFFSET) as usize
    }

    /// Returns the number of separator keys (`num_children - 1`).
    pub fn num_keys(&self) -> usize {
        self.num_children().saturating_sub(1)
    }

    fn free_space_offset(&self) -> usize {
        self.read_u16(FREE_SPACE_OFFSET_OFFSET) as usize
    }

    fn key_slot_offset(idx: usize) -> usize {
        BRANCH_HEADER_SIZE + idx * BRANCH_SLOT_SIZE
    }

    fn child_offset(idx: usize) -> usize {
        BRANCH_HEADER_SIZE + MAX_KEYS * BRANCH_SLOT_SIZE + idx * BRANCH_CHILD_SIZE
    }

    fn key_slot(&self, idx: usize) -> usize {
        self.read_u16(Self::key_slot_offset(idx)) as usize
    }

    /// Returns the separator key at the given index, borrowed from the page.
    pub fn key_at(&self, idx: usize) -> &[u8] {
        let b = self.body.as_ref();
        let offset = self.key_slot(idx);
        let key_len = u16::from_le_bytes([b[offset], b[offset + 1]]) as usize;
        &b[offset + 2..offset + 2 + key_len]
    }

    /// Returns the child page id at the given index.
    pub fn child_at(&self, idx: usize) -> PageId {
        let b = self.body.as_ref();
        let offset = Self::child_offset(idx);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[offset..offset + 8]);
        PageId(u64::from_le_bytes(raw))
    }

    /// Returns the index of the child whose subtree may contain `key`:
    /// the strict upper bound over the separators, so a key equal to a
    /// separator descends into the right child.
    pub fn search_child_idx(&self, key: &[u8]) -> usize {
        let mut lo = 0;
        let mut hi = self.num_keys();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Returns the child page id whose subtree may contain `key`.
    pub fn search_child(&self, key: &[u8]) -> PageId {
        self.child_at(self.search_child_idx(key))
    }

    /// Returns the bytes left between the child-id array and the key
    /// records. The reserved key-slot array is always accounted in full.
    pub fn free_space(&self) -> usize {
        let fixed_end = Self::child_offset(self.num_children());
        self.free_space_offset().saturating_sub(fixed_end)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Branch<B> {
    fn write_u16(&mut self, offset: usize, value: u16) {
        self.body.as_mut()[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn set_num_children(&mut self, num_children: usize) {
        self.write_u16(NUM_CHILDREN_OFFSET, num_children as u16);
    }

    fn set_free_space_offset(&mut self, offset: usize) {
        self.write_u16(FREE_SPACE_OFFSET_OFFSET, offset as u16);
    }

    fn set_key_slot(&mut self, idx: usize, data_offset: usize) {
        self.write_u16(Self::key_slot_offset(idx), data_offset as u16);
    }

    fn set_child(&mut self, idx: usize, page_id: PageId) {
        let offset = Self::child_offset(idx);
        self.body.as_mut()[offset..offset + 8].copy_from_slice(&page_id.0.to_le_bytes());
    }

    /// Writes a key record below the free-space watermark and points the
    /// given slot at it.
    fn write_key(&mut self, idx: usize, key: &[u8]) {
        let data_offset = self.free_space_offset() - (2 + key.len());
        let b = self.body.as_mut();
        b[data_offset..data_offset + 2].copy_from_slice(&(key.len() as u16).to_le_bytes());
        b[data_offset + 2..data_offset + 2 + key.len()].copy_from_slice(key);
        self.set_key_slot(idx, data_offset);
        self.set_free_space_offset(data_offset);
    }

    /// Rebuilds the node from scratch with the given separators and
    /// children. `children` must hold exactly one more entry than `keys`.
    fn write_entries<K: AsRef<[u8]>>(&mut self, keys: &[K], children: &[PageId]) {
        debug_assert_eq!(children.len(), keys.len() + 1);

        self.set_num_children(children.len());
        let end = self.body.as_ref().len();
        self.set_free_space_offset(end);
        for (i, key) in keys.iter().enumerate() {
            self.write_key(i, key.as_ref());
        }
        for (i, &child) in children.iter().enumerate() {
            self.set_child(i, child);
        }
    }

    /// Initializes a branch with one separator and two children: `left`
    /// holds the keys strictly below `key`, `right` the rest.
    pub fn initialize(&mut self, key: &[u8], left_child: PageId, right_child: PageId) {
        self.write_entries(&[key], &[left_child, right_child]);
    }

    /// Inserts a separator at `child_idx` with `child` as the subtree
    /// strictly below it; the previous occupant of that position shifts
    /// right. Used after a child split, where `child` is the new lower
    /// half and the upper half stays in the shifted entry.
    ///
    /// Returns false when the node is out of space or key slots; the
    /// caller then splits.
    pub fn insert(&mut self, child_idx: usize, key: &[u8], child: PageId) -> bool {
        let needed = 2 + key.len() + BRANCH_CHILD_SIZE;
        if self.num_keys() >= MAX_KEYS || self.free_space() < needed {
            return false;
        }

        let num_children = self.num_children();
        let num_keys = self.num_keys();

        for i in ((child_idx + 1)..=num_children).rev() {
            let moved = self.child_at(i - 1);
            self.set_child(i, moved);
        }
        self.set_child(child_idx, child);

        for i in ((child_idx + 1)..=num_keys).rev() {
            let moved = self.key_slot(i - 1);
            self.set_key_slot(i, moved);
        }
        self.write_key(child_idx, key);

        self.set_num_children(num_children + 1);

        true
    }

    /// Splits an overflowing branch while inserting one more separator.
    ///
    /// The median of the spliced key sequence is promoted, not kept in
    /// either half: `new_branch` takes the keys below it with their
    /// children, this node keeps the keys above it with theirs.
    ///
    /// Returns the promoted key.
    pub fn split_insert<B2: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        new_branch: &mut Branch<B2>,
        key: &[u8],
        child: PageId,
    ) -> Bytes {
        let num_keys = self.num_keys();
        let mut keys: Vec<Bytes> = (0..num_keys)
            .map(|i| Bytes::copy_from_slice(self.key_at(i)))
            .collect();
        let mut children: Vec<PageId> = (0..=num_keys).map(|i| self.child_at(i)).collect();

        // Upper bound: an equal existing separator keeps the new key to
        // its right, matching the search rule.
        let insert_pos = keys.iter().take_while(|k| k.as_ref() <= key).count();
        keys.insert(insert_pos, Bytes::copy_from_slice(key));
        children.insert(insert_pos, child);

        let mid = keys.len() / 2;
        let overflow_key = keys[mid].clone();

        new_branch.write_entries(&keys[..mid], &children[..=mid]);
        self.write_entries(&keys[mid + 1..], &children[mid + 1..]);

        overflow_key
    }
}
