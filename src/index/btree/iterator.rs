//! Forward cursor over the leaf chain.

use tracing::trace;

use crate::buffer::PageReadGuard;
use crate::common::{Error, IndexKey, PageId, RecordId, Result};
use crate::storage::page::BPlusTreeLeafPage;

use super::b_plus_tree::BPlusTree;

/// Cursor over `(key, rid)` pairs in ascending key order.
///
/// The iterator owns exactly one pinned, read-latched leaf while it is not
/// at the end of an empty tree. Moving past the last entry of a leaf latches
/// the next leaf and only then releases the current one.
///
/// If the next leaf is write-latched by someone else, the current leaf is
/// released first so a writer crabbing across leaves is never blocked. That
/// writer may merge or rebalance the pair while the cursor holds nothing, so
/// the cursor then goes back down from the root to the first key after the
/// last one it yielded. Keys at or below that key are always skipped, so a
/// scan never repeats a key and never goes backwards.
///
/// Dropping the iterator releases its latch and pin.
///
/// # Example
/// ```ignore
/// for item in tree.begin()? {
///     let (key, rid) = item?;
///     println!("{key:?} -> {rid}");
/// }
/// ```
pub struct IndexIterator<'a, K> {
    tree: &'a BPlusTree<K>,
    leaf: Option<PageReadGuard<'a>>,
    index: usize,
    /// Last key handed out.
    last: Option<K>,
    /// Inclusive lower bound of a `begin_at` scan.
    start: Option<K>,
    /// Error hit while stepping to the next leaf, reported on the next call.
    pending: Option<Error>,
}

impl<'a, K: IndexKey> IndexIterator<'a, K> {
    pub(crate) fn new(
        tree: &'a BPlusTree<K>,
        leaf: Option<PageReadGuard<'a>>,
        index: usize,
        start: Option<K>,
    ) -> Result<Self> {
        let mut iter = Self {
            tree,
            leaf,
            index,
            last: None,
            start,
            pending: None,
        };
        iter.settle()?;
        Ok(iter)
    }

    /// True once there is nothing left to yield.
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(guard) => {
                let leaf = BPlusTreeLeafPage::<K, _>::new(guard.as_slice());
                self.index >= leaf.size() && !leaf.next_page_id().is_valid()
            }
        }
    }

    /// Entry under the cursor, or `None` at the end.
    pub fn current(&self) -> Option<(K, RecordId)> {
        let guard = self.leaf.as_ref()?;
        let leaf = BPlusTreeLeafPage::<K, _>::new(guard.as_slice());
        (self.index < leaf.size()).then(|| leaf.item(self.index))
    }

    /// Leaf the cursor is on, `INVALID` for an empty tree.
    pub fn page_id(&self) -> PageId {
        self.leaf
            .as_ref()
            .map_or(PageId::INVALID, |guard| guard.page_id())
    }

    /// Position within the current leaf.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Step to the next entry. Does nothing at the end.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` or I/O errors while loading the next leaf.
    pub fn advance(&mut self) -> Result<()> {
        let Some((key, _)) = self.current() else {
            return Ok(());
        };
        self.last = Some(key);
        self.index += 1;
        self.settle()
    }

    /// Walk forward until the cursor sits on an unseen entry or the chain
    /// ends.
    fn settle(&mut self) -> Result<()> {
        loop {
            let next = match &self.leaf {
                None => return Ok(()),
                Some(guard) => {
                    let leaf = BPlusTreeLeafPage::<K, _>::new(guard.as_slice());
                    if let Some(last) = self.last {
                        while self.index < leaf.size() && leaf.key_at(self.index) <= last {
                            self.index += 1;
                        }
                    }
                    if self.index < leaf.size() {
                        return Ok(());
                    }
                    leaf.next_page_id()
                }
            };
            if !next.is_valid() {
                return Ok(());
            }

            let tree = self.tree;
            let pinned = tree.bpm.fetch_page(next)?.ok_or(Error::NoFreeFrames)?;
            match pinned.try_read() {
                Ok(guard) => {
                    self.leaf = Some(guard);
                    self.index = 0;
                }
                Err(pinned) => {
                    // the writer may be waiting for our leaf
                    self.leaf = None;
                    drop(pinned.read());
                    self.reposition()?;
                }
            }
        }
    }

    /// Go back down from the root to where the scan left off.
    fn reposition(&mut self) -> Result<()> {
        let resume = self.last.or(self.start);
        let tree = self.tree;
        let (leaf, index) = tree.seek(resume.as_ref())?;
        trace!(leaf = ?leaf.as_ref().map(|guard| guard.page_id()), "iterator repositioned");
        self.leaf = leaf;
        self.index = index;
        Ok(())
    }
}

impl<K: IndexKey> Iterator for IndexIterator<'_, K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            self.leaf = None;
            return Some(Err(e));
        }

        let item = self.current()?;
        if let Err(e) = self.advance() {
            self.pending = Some(e);
        }
        Some(Ok(item))
    }
}

impl<K> PartialEq for IndexIterator<'_, K> {
    /// Two cursors are equal when they sit at the same slot of the same leaf.
    fn eq(&self, other: &Self) -> bool {
        let page = |it: &Self| it.leaf.as_ref().map(|guard| guard.page_id());
        page(self) == page(other) && self.index == other.index
    }
}

impl<K> std::fmt::Debug for IndexIterator<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexIterator")
            .field("page_id", &self.leaf.as_ref().map(|guard| guard.page_id()))
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::common::config::BPlusTreeConfig;
    use crate::storage::DiskManager;
    use tempfile::{tempdir, TempDir};

    fn tree_with(keys: impl IntoIterator<Item = i64>) -> (BPlusTree<i64>, TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("iter.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(32, dm));
        let config = BPlusTreeConfig::for_key::<i64>()
            .with_leaf_max_size(3)
            .with_internal_max_size(4);
        let tree = BPlusTree::new("iter_idx", bpm, config).unwrap();
        for k in keys {
            tree.insert(k, RecordId::from(k)).unwrap();
        }
        (tree, dir)
    }

    #[test]
    fn test_empty_tree_iterator_is_end() {
        let (tree, _dir) = tree_with([]);
        let mut iter = tree.begin().unwrap();
        assert!(iter.is_end());
        assert_eq!(iter.page_id(), PageId::INVALID);
        assert!(iter.next().is_none());
        assert!(iter == tree.end().unwrap());
    }

    #[test]
    fn test_walks_leaf_chain_in_order() {
        let (tree, _dir) = tree_with((0..30).rev());
        let items: Vec<_> = tree.begin().unwrap().map(|r| r.unwrap()).collect();
        let expected: Vec<_> = (0..30).map(|k| (k, RecordId::from(k))).collect();
        assert_eq!(items, expected);
    }

    #[test]
    fn test_begin_at_between_keys() {
        let (tree, _dir) = tree_with((0..40).map(|k| k * 2));
        let keys: Vec<i64> = tree
            .begin_at(&21)
            .unwrap()
            .map(|r| r.unwrap().0)
            .take(3)
            .collect();
        assert_eq!(keys, vec![22, 24, 26]);

        let mut past = tree.begin_at(&1000).unwrap();
        assert!(past.is_end());
        assert!(past.next().is_none());
    }

    #[test]
    fn test_advance_reaches_end() {
        let (tree, _dir) = tree_with(0..10);
        let mut iter = tree.begin().unwrap();
        let mut seen = 0;
        while !iter.is_end() {
            assert_eq!(iter.current().unwrap().0, seen);
            iter.advance().unwrap();
            seen += 1;
        }
        assert_eq!(seen, 10);
        assert!(iter.current().is_none());
        assert!(iter == tree.end().unwrap());
    }

    #[test]
    fn test_drop_releases_pin() {
        let (tree, _dir) = tree_with(0..10);
        let bpm = Arc::clone(tree.buffer_pool());
        let page_id = {
            let iter = tree.begin().unwrap();
            assert_eq!(bpm.get_pin_count(iter.page_id()), Some(1));
            iter.page_id()
        };
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
    }
}
