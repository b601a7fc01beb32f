//! B+ tree index over the buffer pool.
//!
//! The tree stores arbitrary byte-string keys and values in sorted order.
//! A meta page holds the root pointer; leaf and branch nodes are slotted
//! pages reached by page id through the buffer pool manager. Leaves form a
//! doubly linked chain in key order, so every search yields an iterator
//! that continues across leaf boundaries.
//!
//! Insert-only: there is no delete or rebalance. Node overflow splits the
//! node, handing the lower half to a fresh page and propagating a
//! separator upward; an overflowing root is replaced by a new branch page
//! and the meta page is repointed.

mod branch;
mod leaf;
mod meta;
mod node;
mod pair;

pub use branch::{Branch, MAX_KEYS};
pub use leaf::{Leaf, MAX_PAIR_SIZE};
pub use meta::Meta;
pub use node::{NodeType, NODE_HEADER_SIZE};
pub use pair::Pair;

use crate::manager::{BufferPoolManager, PageGuard};
use bytes::Bytes;
use mica_common::page::PageId;
use mica_common::{MicaError, Result};

/// Largest accepted key, in bytes. Sized so that a branch split can always
/// place its halves within the reserved key space.
pub const MAX_KEY_SIZE: usize = 512;

/// Where a search positions its iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// Before the smallest key in the tree.
    Start,
    /// At the first key not less than the given one.
    Key(Bytes),
}

impl SearchMode {
    /// Convenience constructor copying the given key.
    pub fn key(key: &[u8]) -> Self {
        SearchMode::Key(Bytes::copy_from_slice(key))
    }

    fn child_page_id<B: AsRef<[u8]>>(&self, branch: &Branch<B>) -> PageId {
        match self {
            SearchMode::Start => branch.child_at(0),
            SearchMode::Key(key) => branch.search_child(key),
        }
    }

    fn tuple_slot_id<B: AsRef<[u8]>>(&self, leaf: &Leaf<B>) -> (usize, bool) {
        match self {
            SearchMode::Start => (0, false),
            SearchMode::Key(key) => leaf.search_slot_id(key),
        }
    }
}

/// Separator handed up from a split for the parent to apply.
struct Overflow {
    key: Bytes,
    child_page_id: PageId,
}

/// A B+ tree identified by its meta page.
pub struct BTree {
    meta_page_id: PageId,
}

impl BTree {
    /// Creates a fresh tree: a meta page plus an empty leaf root.
    pub fn create(bufmgr: &BufferPoolManager) -> Result<BTree> {
        let meta_guard = bufmgr.create_page()?;
        let root_guard = bufmgr.create_page()?;

        {
            let mut root_page = root_guard.data_mut();
            node::init_node(&mut root_page[..], NodeType::Leaf);
            let mut root = Leaf::new(node::body_mut(&mut root_page[..]));
            root.initialize();
        }
        {
            let mut meta_page = meta_guard.data_mut();
            Meta {
                root_page_id: root_guard.page_id(),
            }
            .write_to(&mut meta_page[..]);
        }
        meta_guard.mark_dirty();
        root_guard.mark_dirty();

        Ok(BTree {
            meta_page_id: meta_guard.page_id(),
        })
    }

    /// Opens an existing tree by its meta page id.
    pub fn new(meta_page_id: PageId) -> BTree {
        BTree { meta_page_id }
    }

    /// Returns the meta page id, the durable handle to this tree.
    pub fn meta_page_id(&self) -> PageId {
        self.meta_page_id
    }

    /// Inserts a key/value pair.
    ///
    /// Fails with `DuplicateKey` if the key is already present, leaving
    /// the tree unchanged.
    pub fn insert(&self, bufmgr: &BufferPoolManager, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(MicaError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        let pair_size = Pair::encoded_size(key.len(), value.len());
        if pair_size > MAX_PAIR_SIZE {
            return Err(MicaError::PairTooLarge {
                size: pair_size,
                max: MAX_PAIR_SIZE,
            });
        }

        let meta_guard = bufmgr.fetch_page(self.meta_page_id)?;
        let root_page_id = Meta::read_from(&meta_guard.data()[..]).root_page_id;
        let root_guard = bufmgr.fetch_page(root_page_id)?;

        if let Some(overflow) = Self::insert_internal(bufmgr, root_guard, key, value)? {
            // The root itself split: a new branch takes over, with the
            // split-off lower half on the left and the old root on the
            // right.
            let new_root_guard = bufmgr.create_page()?;
            {
                let mut page = new_root_guard.data_mut();
                node::init_node(&mut page[..], NodeType::Branch);
                let mut root = Branch::new(node::body_mut(&mut page[..]));
                root.initialize(&overflow.key, overflow.child_page_id, root_page_id);
            }
            {
                let mut meta_page = meta_guard.data_mut();
                Meta {
                    root_page_id: new_root_guard.page_id(),
                }
                .write_to(&mut meta_page[..]);
            }
            meta_guard.mark_dirty();
            new_root_guard.mark_dirty();
        }

        Ok(())
    }

    fn insert_internal(
        bufmgr: &BufferPoolManager,
        node_guard: PageGuard<'_>,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Overflow>> {
        let node_type = node::node_type(&node_guard.data()[..])?;
        match node_type {
            NodeType::Leaf => {
                {
                    let mut page = node_guard.data_mut();
                    let mut leaf = Leaf::new(node::body_mut(&mut page[..]));
                    let (slot_id, found) = leaf.search_slot_id(key);
                    if found {
                        return Err(MicaError::DuplicateKey);
                    }
                    if leaf.insert(slot_id, key, value) {
                        drop(page);
                        node_guard.mark_dirty();
                        return Ok(None);
                    }
                }

                // Leaf is full. The new sibling takes the lower half and
                // slots in as this leaf's predecessor in the chain.
                let prev_page_id = {
                    let page = node_guard.data();
                    Leaf::new(node::body(&page[..])).prev_page_id()
                };
                let prev_guard = match prev_page_id {
                    Some(page_id) => Some(bufmgr.fetch_page(page_id)?),
                    None => None,
                };
                let new_guard = bufmgr.create_page()?;

                if let Some(prev_guard) = &prev_guard {
                    let mut page = prev_guard.data_mut();
                    let mut prev_leaf = Leaf::new(node::body_mut(&mut page[..]));
                    prev_leaf.set_next_page_id(Some(new_guard.page_id()));
                    drop(page);
                    prev_guard.mark_dirty();
                }

                let overflow_key = {
                    let mut new_page = new_guard.data_mut();
                    node::init_node(&mut new_page[..], NodeType::Leaf);
                    let mut new_leaf = Leaf::new(node::body_mut(&mut new_page[..]));
                    new_leaf.initialize();

                    let mut page = node_guard.data_mut();
                    let mut leaf = Leaf::new(node::body_mut(&mut page[..]));
                    let overflow_key = leaf.split_insert(&mut new_leaf, key, value);

                    leaf.set_prev_page_id(Some(new_guard.page_id()));
                    new_leaf.set_next_page_id(Some(node_guard.page_id()));
                    new_leaf.set_prev_page_id(prev_page_id);
                    overflow_key
                };
                node_guard.mark_dirty();
                new_guard.mark_dirty();

                Ok(Some(Overflow {
                    key: overflow_key,
                    child_page_id: new_guard.page_id(),
                }))
            }
            NodeType::Branch => {
                let (child_idx, child_page_id) = {
                    let page = node_guard.data();
                    let branch = Branch::new(node::body(&page[..]));
                    let child_idx = branch.search_child_idx(key);
                    (child_idx, branch.child_at(child_idx))
                };

                let child_guard = bufmgr.fetch_page(child_page_id)?;
                let overflow = match Self::insert_internal(bufmgr, child_guard, key, value)? {
                    Some(overflow) => overflow,
                    None => return Ok(None),
                };

                {
                    let mut page = node_guard.data_mut();
                    let mut branch = Branch::new(node::body_mut(&mut page[..]));
                    if branch.insert(child_idx, &overflow.key, overflow.child_page_id) {
                        drop(page);
                        node_guard.mark_dirty();
                        return Ok(None);
                    }
                }

                // Branch is full as well; split it and keep propagating.
                let new_guard = bufmgr.create_page()?;
                let overflow_key = {
                    let mut new_page = new_guard.data_mut();
                    node::init_node(&mut new_page[..], NodeType::Branch);
                    let mut new_branch = Branch::new(node::body_mut(&mut new_page[..]));

                    let mut page = node_guard.data_mut();
                    let mut branch = Branch::new(node::body_mut(&mut page[..]));
                    branch.split_insert(&mut new_branch, &overflow.key, overflow.child_page_id)
                };
                node_guard.mark_dirty();
                new_guard.mark_dirty();

                Ok(Some(Overflow {
                    key: overflow_key,
                    child_page_id: new_guard.page_id(),
                }))
            }
        }
    }

    /// Positions an iterator according to `mode`.
    pub fn search<'a>(
        &self,
        bufmgr: &'a BufferPoolManager,
        mode: SearchMode,
    ) -> Result<Iter<'a>> {
        let meta_guard = bufmgr.fetch_page(self.meta_page_id)?;
        let root_page_id = Meta::read_from(&meta_guard.data()[..]).root_page_id;
        drop(meta_guard);

        let root_guard = bufmgr.fetch_page(root_page_id)?;
        Self::search_internal(bufmgr, root_guard, &mode)
    }

    fn search_internal<'a>(
        bufmgr: &'a BufferPoolManager,
        node_guard: PageGuard<'a>,
        mode: &SearchMode,
    ) -> Result<Iter<'a>> {
        let node_type = node::node_type(&node_guard.data()[..])?;
        match node_type {
            NodeType::Leaf => {
                let (slot_id, past_last) = {
                    let page = node_guard.data();
                    let leaf = Leaf::new(node::body(&page[..]));
                    let (slot_id, _) = mode.tuple_slot_id(&leaf);
                    (slot_id, slot_id == leaf.num_pairs())
                };

                let mut iter = Iter {
                    bufmgr,
                    guard: node_guard,
                    slot_id,
                };
                if past_last {
                    // The key sorts after everything here; hop to the next
                    // leaf (or run off the end of the chain).
                    iter.advance()?;
                }
                Ok(iter)
            }
            NodeType::Branch => {
                let child_page_id = {
                    let page = node_guard.data();
                    let branch = Branch::new(node::body(&page[..]));
                    mode.child_page_id(&branch)
                };
                drop(node_guard);

                let child_guard = bufmgr.fetch_page(child_page_id)?;
                Self::search_internal(bufmgr, child_guard, mode)
            }
        }
    }
}

/// Iterator over pairs in ascending key order, following the leaf chain.
pub struct Iter<'a> {
    bufmgr: &'a BufferPoolManager,
    guard: PageGuard<'a>,
    slot_id: usize,
}

impl Iter<'_> {
    /// Returns the pair under the cursor and steps forward.
    ///
    /// Yields `None` once the chain is exhausted.
    pub fn next(&mut self) -> Result<Option<Pair>> {
        let pair = self.get();
        self.advance()?;
        Ok(pair)
    }

    fn get(&self) -> Option<Pair> {
        let page = self.guard.data();
        let leaf = Leaf::new(node::body(&page[..]));
        if self.slot_id < leaf.num_pairs() {
            Some(leaf.pair_at(self.slot_id))
        } else {
            None
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.slot_id += 1;
        let next_page_id = {
            let page = self.guard.data();
            let leaf = Leaf::new(node::body(&page[..]));
            if self.slot_id < leaf.num_pairs() {
                return Ok(());
            }
            leaf.next_page_id()
        };

        if let Some(next_page_id) = next_page_id {
            self.guard = self.bufmgr.fetch_page(next_page_id)?;
            self.slot_id = 0;
        }
        Ok(())
    }
}
