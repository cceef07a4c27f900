//! B+Tree Tests
//!
//! Split/merge scenarios, lookups, iteration, persistence through the header
//! page, and behavior when the buffer pool runs dry.

use std::sync::Arc;

use pagetree::common::config::BPlusTreeConfig;
use pagetree::storage::page::{BPlusTreeInternalPage, BPlusTreeLeafPage, BPlusTreeNode};
use pagetree::{BPlusTree, BufferPoolManager, DiskManager, Error, GenericKey, PageId, RecordId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::{tempdir, TempDir};

fn rid(key: i64) -> RecordId {
    RecordId::from(key)
}

fn small_config(leaf_max: usize, internal_max: usize) -> BPlusTreeConfig {
    BPlusTreeConfig::for_key::<i64>()
        .with_leaf_max_size(leaf_max)
        .with_internal_max_size(internal_max)
}

fn create_tree(
    leaf_max: usize,
    internal_max: usize,
    pool_size: usize,
) -> (BPlusTree<i64>, Arc<BufferPoolManager>, TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("index.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    let config = small_config(leaf_max, internal_max);
    let tree = BPlusTree::new("idx", Arc::clone(&bpm), config).unwrap();
    (tree, bpm, dir)
}

fn collect_keys(tree: &BPlusTree<i64>) -> Vec<i64> {
    tree.begin().unwrap().map(|item| item.unwrap().0).collect()
}

// ============================================================================
// Split and merge scenarios
// ============================================================================

/// Leaf max 4, keys 1..=5 in order: one split, separator 3.
#[test]
fn test_split_scenario() {
    let (tree, bpm, _dir) = create_tree(4, 4, 16);
    for k in 1..=5 {
        assert!(tree.insert(k, rid(k)).unwrap());
    }

    let root = bpm.fetch_page_read(tree.root_page_id()).unwrap().unwrap();
    let root = BPlusTreeInternalPage::<i64, _>::new(root.as_slice());
    assert_eq!(root.size(), 2);
    assert_eq!(root.key_at(1), 3);

    let left_guard = bpm.fetch_page_read(root.value_at(0)).unwrap().unwrap();
    let left = BPlusTreeLeafPage::<i64, _>::new(left_guard.as_slice());
    assert_eq!(left.keys(), vec![1, 2]);
    assert_eq!(left.next_page_id(), root.value_at(1));

    let shape = tree.verify().unwrap();
    assert_eq!(shape.height, 2);
    assert_eq!(shape.leaf_count, 2);
}

/// Deleting from a two-leaf tree until a leaf underflows merges the leaves
/// and collapses the root back to a single leaf.
#[test]
fn test_merge_scenario() {
    let (tree, bpm, _dir) = create_tree(4, 4, 16);
    for k in 1..=5 {
        tree.insert(k, rid(k)).unwrap();
    }
    let old_root = tree.root_page_id();

    tree.remove(&5).unwrap();
    tree.remove(&4).unwrap();

    let shape = tree.verify().unwrap();
    assert_eq!(shape.height, 1);
    assert_eq!(shape.leaf_count, 1);
    assert_eq!(shape.internal_count, 0);
    assert_ne!(tree.root_page_id(), old_root);
    assert!(!bpm.contains_page(old_root));
    assert_eq!(collect_keys(&tree), vec![1, 2, 3]);
}

#[test]
fn test_internal_splits_and_merges() {
    let (tree, _bpm, _dir) = create_tree(3, 4, 64);
    for k in 0..300 {
        tree.insert(k, rid(k)).unwrap();
    }
    let grown = tree.verify().unwrap();
    assert!(grown.height >= 4);
    assert_eq!(grown.key_count, 300);

    for k in 0..300 {
        if k % 10 != 0 {
            tree.remove(&k).unwrap();
        }
    }
    let shrunk = tree.verify().unwrap();
    assert_eq!(shrunk.key_count, 30);
    assert!(shrunk.height < grown.height);
    assert_eq!(collect_keys(&tree), (0..300).step_by(10).collect::<Vec<_>>());
}

#[test]
fn test_descending_inserts_and_removes() {
    let (tree, _bpm, _dir) = create_tree(4, 5, 64);
    for k in (0..200).rev() {
        tree.insert(k, rid(k)).unwrap();
    }
    tree.verify().unwrap();

    for k in (0..200).rev().step_by(2) {
        tree.remove(&k).unwrap();
    }
    tree.verify().unwrap();
    assert_eq!(collect_keys(&tree), (0..200).step_by(2).collect::<Vec<_>>());
}

// ============================================================================
// Lookups
// ============================================================================

#[test]
fn test_round_trip_shuffled() {
    let (tree, _bpm, _dir) = create_tree(5, 5, 64);
    let mut keys: Vec<i64> = (0..1000).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));

    for &k in &keys {
        assert!(tree.insert(k, rid(k * 3)).unwrap());
    }
    for &k in &keys {
        assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k * 3)));
    }
    assert_eq!(tree.get_value(&-1).unwrap(), None);
    assert_eq!(tree.get_value(&1000).unwrap(), None);
    assert_eq!(tree.verify().unwrap().key_count, 1000);
}

#[test]
fn test_duplicate_insert_changes_nothing() {
    let (tree, _bpm, _dir) = create_tree(4, 4, 32);
    for k in 0..20 {
        tree.insert(k, rid(k)).unwrap();
    }
    let before = tree.dump().unwrap();

    assert!(!tree.insert(10, rid(999)).unwrap());
    assert_eq!(tree.get_value(&10).unwrap(), Some(rid(10)));
    assert_eq!(tree.dump().unwrap(), before);
}

#[test]
fn test_remove_missing_key_changes_nothing() {
    let (tree, _bpm, _dir) = create_tree(4, 4, 32);
    for k in (0..40).step_by(2) {
        tree.insert(k, rid(k)).unwrap();
    }
    let before = tree.dump().unwrap();

    tree.remove(&7).unwrap();
    tree.remove(&1000).unwrap();
    assert_eq!(tree.dump().unwrap(), before);
}

#[test]
fn test_generic_key_tree() {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("generic.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(32, dm));
    let config = BPlusTreeConfig::for_key::<GenericKey<16>>().with_leaf_max_size(4);
    let tree = BPlusTree::<GenericKey<16>>::new("names", bpm, config).unwrap();

    for i in (0..50u64).rev() {
        tree.insert(GenericKey::from_integer(i), rid(i as i64)).unwrap();
    }
    assert_eq!(
        tree.get_value(&GenericKey::from_integer(17)).unwrap(),
        Some(rid(17))
    );

    let keys: Vec<GenericKey<16>> = tree.begin().unwrap().map(|r| r.unwrap().0).collect();
    let expected: Vec<GenericKey<16>> = (0..50u64).map(GenericKey::from_integer).collect();
    assert_eq!(keys, expected);
    tree.verify().unwrap();
}

// ============================================================================
// Iteration
// ============================================================================

#[test]
fn test_iterator_completeness_after_churn() {
    let (tree, _bpm, _dir) = create_tree(3, 4, 64);
    let mut keys: Vec<i64> = (0..500).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(11));
    for &k in &keys {
        tree.insert(k, rid(k)).unwrap();
    }
    for &k in keys.iter().filter(|k| *k % 7 == 0) {
        tree.remove(&k).unwrap();
    }

    let items: Vec<(i64, RecordId)> = tree.begin().unwrap().map(|r| r.unwrap()).collect();
    let expected: Vec<(i64, RecordId)> =
        (0..500).filter(|k| k % 7 != 0).map(|k| (k, rid(k))).collect();
    assert_eq!(items, expected);
}

#[test]
fn test_begin_at_and_end() {
    let (tree, _bpm, _dir) = create_tree(4, 4, 32);
    for k in (0..100).map(|k| k * 5) {
        tree.insert(k, rid(k)).unwrap();
    }

    let from_exact: Vec<i64> = tree.begin_at(&250).unwrap().map(|r| r.unwrap().0).collect();
    assert_eq!(from_exact, (50..100).map(|k| k * 5).collect::<Vec<_>>());

    let mut from_gap = tree.begin_at(&251).unwrap();
    assert_eq!(from_gap.current().map(|(k, _)| k), Some(255));
    from_gap.advance().unwrap();
    assert_eq!(from_gap.current().map(|(k, _)| k), Some(260));
    drop(from_gap);

    let mut iter = tree.begin_at(&490).unwrap();
    assert_eq!(iter.next().unwrap().unwrap().0, 490);
    assert_eq!(iter.next().unwrap().unwrap().0, 495);
    assert!(iter.next().is_none());
    assert!(iter.is_end());
    assert!(iter == tree.end().unwrap());
}

#[test]
fn test_iterator_holds_one_pin() {
    let (tree, bpm, _dir) = create_tree(3, 4, 32);
    for k in 0..30 {
        tree.insert(k, rid(k)).unwrap();
    }

    let mut iter = tree.begin().unwrap();
    let mut visited = 0;
    while !iter.is_end() {
        assert_eq!(bpm.get_pin_count(iter.page_id()), Some(1));
        iter.advance().unwrap();
        visited += 1;
    }
    assert_eq!(visited, 30);
    drop(iter);
    assert_eq!(bpm.evictable_count(), bpm.page_count());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_from_header_page() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let config = small_config(4, 4);

    let root = {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(16, dm));
        let tree = BPlusTree::<i64>::new("orders_pk", Arc::clone(&bpm), config).unwrap();
        for k in 0..100 {
            tree.insert(k, rid(k)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
        tree.root_page_id()
    };

    let dm = DiskManager::open(&path).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(16, dm));
    let tree = BPlusTree::<i64>::open("orders_pk", bpm, config).unwrap();
    assert_eq!(tree.root_page_id(), root);
    assert_eq!(tree.get_value(&42).unwrap(), Some(rid(42)));
    assert_eq!(tree.verify().unwrap().key_count, 100);
}

#[test]
fn test_indexes_share_header_page() {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("shared.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(32, dm));
    let config = small_config(4, 4);

    let a = BPlusTree::<i64>::new("a", Arc::clone(&bpm), config).unwrap();
    let b = BPlusTree::<i64>::new("b", Arc::clone(&bpm), config).unwrap();
    for k in 0..30 {
        a.insert(k, rid(k)).unwrap();
        b.insert(-k, rid(k)).unwrap();
    }

    let a2 = BPlusTree::<i64>::open("a", Arc::clone(&bpm), config).unwrap();
    let b2 = BPlusTree::<i64>::open("b", Arc::clone(&bpm), config).unwrap();
    assert_eq!(a2.root_page_id(), a.root_page_id());
    assert_eq!(b2.root_page_id(), b.root_page_id());
    assert_ne!(a.root_page_id(), b.root_page_id());

    let missing = BPlusTree::<i64>::open("never_created", bpm, config).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn test_emptied_tree_records_invalid_root() {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("empty.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(16, dm));
    let config = small_config(4, 4);

    let tree = BPlusTree::<i64>::new("t", Arc::clone(&bpm), config).unwrap();
    for k in 0..10 {
        tree.insert(k, rid(k)).unwrap();
    }
    for k in 0..10 {
        tree.remove(&k).unwrap();
    }
    assert!(tree.is_empty());

    let reopened = BPlusTree::<i64>::open("t", bpm, config).unwrap();
    assert_eq!(reopened.root_page_id(), PageId::INVALID);
    assert!(reopened.begin().unwrap().is_end());
}

// ============================================================================
// Resource exhaustion
// ============================================================================

/// A split that can't get its pages fails cleanly and leaves the tree as it
/// was; the same insert succeeds once frames are released.
#[test]
fn test_pinned_merged_page_is_reclaimed_later() {
    let (tree, bpm, _dir) = create_tree(4, 4, 16);
    // leaves [1 2] [3 4 5]
    for k in 1..=5 {
        tree.insert(k, rid(k)).unwrap();
    }
    let right_id = {
        let root = bpm.fetch_page_read(tree.root_page_id()).unwrap().unwrap();
        BPlusTreeInternalPage::<i64, _>::new(root.as_slice()).value_at(1)
    };

    // someone else still has the right leaf pinned while it is merged away
    let pin = bpm.fetch_page(right_id).unwrap().unwrap();
    tree.remove(&5).unwrap();
    tree.remove(&4).unwrap();
    assert_eq!(tree.pending_reclaim(), vec![right_id]);
    assert!(bpm.contains_page(right_id));
    drop(pin);

    // the next write operation deletes it
    tree.remove(&3).unwrap();
    assert!(tree.pending_reclaim().is_empty());
    assert!(!bpm.contains_page(right_id));
    assert_eq!(collect_keys(&tree), vec![1, 2]);
    tree.verify().unwrap();
}

#[test]
fn test_split_without_frames_leaves_tree_unchanged() {
    let (tree, bpm, _dir) = create_tree(4, 4, 6);
    for k in 1..=3 {
        tree.insert(k, rid(k)).unwrap();
    }

    // four pinned pages leave two frames: the leaf plus one spare
    let held: Vec<_> = (0..4).map(|_| bpm.new_page().unwrap().unwrap()).collect();
    assert!(matches!(tree.insert(4, rid(4)), Err(Error::NoFreeFrames)));
    assert_eq!(tree.get_value(&4).unwrap(), None);

    drop(held);
    assert!(tree.insert(4, rid(4)).unwrap());
    let shape = tree.verify().unwrap();
    assert_eq!(shape.key_count, 4);
    assert_eq!(shape.leaf_count, 2);
}

#[test]
fn test_lookup_without_frames() {
    let (tree, bpm, _dir) = create_tree(4, 4, 3);
    tree.insert(1, rid(1)).unwrap();

    let held: Vec<_> = (0..3).map(|_| bpm.new_page().unwrap().unwrap()).collect();
    assert!(matches!(tree.get_value(&1), Err(Error::NoFreeFrames)));
    drop(held);
    assert_eq!(tree.get_value(&1).unwrap(), Some(rid(1)));
}

#[test]
fn test_node_views_agree_with_tree() {
    let (tree, bpm, _dir) = create_tree(4, 4, 16);
    for k in 0..12 {
        tree.insert(k, rid(k)).unwrap();
    }

    let root_id = tree.root_page_id();
    let guard = bpm.fetch_page_read(root_id).unwrap().unwrap();
    match BPlusTreeNode::<i64, _>::new(root_id, guard.as_slice()).unwrap() {
        BPlusTreeNode::Internal(root) => {
            assert!(root.is_root());
            assert!(root.size() >= 2);
        }
        BPlusTreeNode::Leaf(_) => panic!("12 keys should not fit in one leaf"),
    }
}
