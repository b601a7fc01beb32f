//! End-to-end integration tests for the MicaDB storage stack:
//! disk manager, buffer pool, B+ tree, and table layer working together
//! against a real heap file.

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

use mica_common::config::StorageConfig;
use mica_common::{MicaError, PageId};
use mica_storage::{BTree, BufferPoolManager, SearchMode, SimpleTable, Tuple};

fn test_config(dir: &TempDir, pool_frames: usize) -> StorageConfig {
    StorageConfig {
        path: dir.path().join("mica.db"),
        pool_frames,
        fsync_enabled: false,
    }
}

fn shuffled_keys(n: u32, seed: u64) -> Vec<String> {
    let mut keys: Vec<String> = (0..n).map(|i| format!("key{i:08}")).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    keys.shuffle(&mut rng);
    keys
}

fn tuple(elems: &[&str]) -> Tuple {
    elems
        .iter()
        .map(|e| Bytes::copy_from_slice(e.as_bytes()))
        .collect()
}

#[test]
fn test_btree_random_inserts_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, 16);

    let n = 1_000;
    let value = [b'v'; 64];
    let keys = shuffled_keys(n, 7);

    // Build the tree in random order, flush, and drop everything.
    let meta_page_id = {
        let bufmgr = BufferPoolManager::open(&config).unwrap();
        let tree = BTree::create(&bufmgr).unwrap();
        for key in &keys {
            tree.insert(&bufmgr, key.as_bytes(), &value).unwrap();
        }
        bufmgr.flush().unwrap();
        tree.meta_page_id()
    };
    assert_eq!(meta_page_id, PageId(0));

    // Reopen cold and verify everything came back.
    let bufmgr = BufferPoolManager::open(&config).unwrap();
    let tree = BTree::new(meta_page_id);

    let mut iter = tree.search(&bufmgr, SearchMode::Start).unwrap();
    let mut count = 0u32;
    let mut prev: Option<Vec<u8>> = None;
    while let Some(pair) = iter.next().unwrap() {
        if let Some(prev) = &prev {
            assert!(
                prev.as_slice() < pair.key.as_ref(),
                "keys out of order after reopen"
            );
        }
        assert_eq!(pair.value.as_ref(), &value[..]);
        prev = Some(pair.key.to_vec());
        count += 1;
    }
    assert_eq!(count, n);

    for key in &keys {
        let mut iter = tree
            .search(&bufmgr, SearchMode::key(key.as_bytes()))
            .unwrap();
        let pair = iter.next().unwrap().expect("persisted key must be found");
        assert_eq!(pair.key.as_ref(), key.as_bytes());
    }

    // The reopened tree still accepts new keys.
    tree.insert(&bufmgr, b"zzzzzzzz", &value).unwrap();
    let mut iter = tree.search(&bufmgr, SearchMode::key(b"zzzzzzzz")).unwrap();
    assert!(iter.next().unwrap().is_some());
}

#[test]
fn test_btree_duplicates_rejected_under_splits() {
    let dir = tempfile::tempdir().unwrap();
    let bufmgr = BufferPoolManager::open(&test_config(&dir, 16)).unwrap();
    let tree = BTree::create(&bufmgr).unwrap();

    let value = [b'd'; 64];
    let keys = shuffled_keys(500, 21);
    for key in &keys {
        tree.insert(&bufmgr, key.as_bytes(), &value).unwrap();
    }

    // Re-inserting the whole workload fails key by key and changes nothing.
    for key in &keys {
        let result = tree.insert(&bufmgr, key.as_bytes(), b"other");
        assert!(matches!(result, Err(MicaError::DuplicateKey)));
    }

    let mut iter = tree.search(&bufmgr, SearchMode::Start).unwrap();
    let mut count = 0;
    while let Some(pair) = iter.next().unwrap() {
        assert_eq!(pair.value.as_ref(), &value[..]);
        count += 1;
    }
    assert_eq!(count, keys.len());
}

#[test]
fn test_btree_range_scan_under_small_pool() {
    // A pool of ten frames, as small as the insert path allows, keeps
    // evicting pages mid-workload; scoped pinning must keep up.
    let dir = tempfile::tempdir().unwrap();
    let bufmgr = BufferPoolManager::open(&test_config(&dir, 10)).unwrap();
    let tree = BTree::create(&bufmgr).unwrap();

    let value = [b'r'; 64];
    for key in shuffled_keys(600, 3) {
        tree.insert(&bufmgr, key.as_bytes(), &value).unwrap();
    }

    let mut iter = tree
        .search(&bufmgr, SearchMode::key(b"key00000450"))
        .unwrap();
    let mut count = 0;
    while let Some(pair) = iter.next().unwrap() {
        assert!(pair.key.as_ref() >= &b"key00000450"[..]);
        count += 1;
    }
    // key00000450 .. key00000599
    assert_eq!(count, 150);
}

#[test]
fn test_pool_exhaustion_recovers_after_release() {
    let dir = tempfile::tempdir().unwrap();
    let bufmgr = BufferPoolManager::open(&test_config(&dir, 4)).unwrap();

    let guards: Vec<_> = (0..4).map(|_| bufmgr.create_page().unwrap()).collect();
    assert!(matches!(
        bufmgr.create_page(),
        Err(MicaError::NoFreeBuffer)
    ));

    drop(guards);
    assert!(bufmgr.create_page().is_ok());
}

#[test]
fn test_table_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, 10);

    let meta_page_id = {
        let bufmgr = BufferPoolManager::open(&config).unwrap();
        let table = SimpleTable::create(&bufmgr, 1).unwrap();

        table
            .insert(&bufmgr, &tuple(&["2", "Bob", "30"]))
            .unwrap();
        table
            .insert(&bufmgr, &tuple(&["1", "Alice", "25"]))
            .unwrap();

        // Scans see both rows, in key order, before any flush.
        let mut iter = table.scan(&bufmgr).unwrap();
        assert_eq!(iter.next().unwrap(), Some(tuple(&["1", "Alice", "25"])));
        assert_eq!(iter.next().unwrap(), Some(tuple(&["2", "Bob", "30"])));
        assert_eq!(iter.next().unwrap(), None);

        // Key-positioned scans skip the rows below the key.
        let mut iter = table.scan_from(&bufmgr, &tuple(&["2"])).unwrap();
        assert_eq!(iter.next().unwrap(), Some(tuple(&["2", "Bob", "30"])));
        assert_eq!(iter.next().unwrap(), None);

        drop(iter);
        bufmgr.flush().unwrap();
        table.meta_page_id()
    };

    // Everything survives a cold reopen.
    let bufmgr = BufferPoolManager::open(&config).unwrap();
    let table = SimpleTable::open(meta_page_id, 1);

    let mut iter = table.scan(&bufmgr).unwrap();
    assert_eq!(iter.next().unwrap(), Some(tuple(&["1", "Alice", "25"])));
    assert_eq!(iter.next().unwrap(), Some(tuple(&["2", "Bob", "30"])));
    assert_eq!(iter.next().unwrap(), None);
}
