//! Property tests: the tree against a `BTreeMap` model, and pin accounting
//! in the buffer pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use pagetree::common::config::BPlusTreeConfig;
use pagetree::{BPlusTree, BufferPoolManager, DiskManager, RecordId};
use proptest::prelude::*;
use tempfile::{tempdir, TempDir};

#[derive(Debug, Clone)]
enum Op {
    Insert(i64),
    Remove(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i64..300).prop_map(Op::Insert),
        2 => (0i64..300).prop_map(Op::Remove),
    ]
}

fn make_tree(leaf_max: usize, internal_max: usize) -> (BPlusTree<i64>, TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("prop.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(48, dm));
    let config = BPlusTreeConfig::for_key::<i64>()
        .with_leaf_max_size(leaf_max)
        .with_internal_max_size(internal_max);
    (BPlusTree::new("prop", bpm, config).unwrap(), dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Any sequence of inserts and removes leaves the tree holding exactly
    /// what a sorted map would hold, with every structural invariant intact.
    #[test]
    fn prop_matches_btreemap_model(
        ops in proptest::collection::vec(arb_op(), 1..400),
        leaf_max in 2usize..7,
        internal_max in 4usize..7,
    ) {
        let (tree, _dir) = make_tree(leaf_max, internal_max);
        let mut model = BTreeMap::new();

        for op in &ops {
            match *op {
                Op::Insert(k) => {
                    let fresh = !model.contains_key(&k);
                    if fresh {
                        model.insert(k, RecordId::from(k));
                    }
                    prop_assert_eq!(tree.insert(k, RecordId::from(k)).unwrap(), fresh);
                }
                Op::Remove(k) => {
                    model.remove(&k);
                    tree.remove(&k).unwrap();
                }
            }
        }

        let shape = tree.verify().unwrap();
        prop_assert_eq!(shape.key_count, model.len());
        prop_assert_eq!(tree.is_empty(), model.is_empty());

        let items: Vec<(i64, RecordId)> = tree.begin().unwrap().map(|r| r.unwrap()).collect();
        let expected: Vec<(i64, RecordId)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(items, expected);

        for k in 0..300 {
            prop_assert_eq!(tree.get_value(&k).unwrap(), model.get(&k).copied());
        }
    }

    /// `begin_at` yields exactly the keys at or above the start key.
    #[test]
    fn prop_begin_at_is_lower_bound(
        keys in proptest::collection::btree_set(0i64..1000, 0..200),
        start in 0i64..1000,
    ) {
        let (tree, _dir) = make_tree(4, 4);
        for &k in &keys {
            tree.insert(k, RecordId::from(k)).unwrap();
        }

        let got: Vec<i64> = tree.begin_at(&start).unwrap().map(|r| r.unwrap().0).collect();
        let expected: Vec<i64> = keys.range(start..).copied().collect();
        prop_assert_eq!(got, expected);
    }

    /// Pin counts go up once per live guard and back to zero when they drop.
    #[test]
    fn prop_pins_follow_guards(fetches in proptest::collection::vec(0usize..4, 0..12)) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("pins.db")).unwrap();
        let bpm = BufferPoolManager::new(8, dm);
        let page_ids: Vec<_> = (0..4)
            .map(|_| bpm.new_page().unwrap().unwrap().page_id())
            .collect();

        let mut expected = [0u32; 4];
        let mut guards = Vec::new();
        for &i in &fetches {
            guards.push(bpm.fetch_page(page_ids[i]).unwrap().unwrap());
            expected[i] += 1;
        }
        for (i, &pid) in page_ids.iter().enumerate() {
            prop_assert_eq!(bpm.get_pin_count(pid), Some(expected[i]));
        }

        drop(guards);
        for &pid in &page_ids {
            prop_assert_eq!(bpm.get_pin_count(pid), Some(0));
        }
        prop_assert_eq!(bpm.evictable_count(), bpm.page_count());
    }
}
