//! Concurrent B+Tree over buffer-pool pages.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use crate::common::config::{BPlusTreeConfig, HEADER_PAGE_ID, INDEX_NAME_MAX_LEN};
use crate::common::{Error, IndexKey, PageId, RecordId, Result};
use crate::storage::page::{
    BPlusTreeInternalPage, BPlusTreeLeafPage, BPlusTreeNode, BPlusTreePage, HeaderPage,
};

use super::context::Context;
use super::iterator::IndexIterator;

/// Which leaf a read descent is looking for.
#[derive(Clone, Copy)]
enum LeafTarget<'k, K> {
    Key(&'k K),
    Leftmost,
    Rightmost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Remove,
}

/// A unique-key B+Tree index mapping `K` to [`RecordId`].
///
/// # Structure
/// ```text
///                    ┌──────────────────────┐
///                    │ internal: [ · | 30 ] │  ◀── root_page_id
///                    └───┬───────────┬──────┘
///               ┌────────┘           └────────┐
///   ┌───────────▼────────────┐   ┌────────────▼───────────┐
///   │ leaf: 10 15 20         │──▶│ leaf: 30 40            │──▶ INVALID
///   └────────────────────────┘   └────────────────────────┘
/// ```
///
/// Nodes live in buffer-pool pages and are read through the typed views in
/// [`crate::storage::page`]. The root id is mirrored in the header page
/// (page 0) under the index name, so the tree can be reopened.
///
/// # Thread Safety
/// Readers crab down with shared latches, holding at most a parent and a
/// child at once. Writers take the tree-wide root lock, then crab down with
/// exclusive latches and release every ancestor (and the root lock) as soon
/// as they latch a node that cannot split or underflow. Latches are always
/// taken top-down, which keeps operations deadlock-free.
///
/// Do not insert or remove on a thread that is holding an [`IndexIterator`]
/// on the same tree: the iterator's shared latch would block the writer.
pub struct BPlusTree<K> {
    pub(super) index_name: String,
    pub(super) bpm: Arc<BufferPoolManager>,
    /// Guards root changes. Writers keep it until the root is known stable.
    pub(super) root_page_id: Mutex<PageId>,
    /// Unlinked pages that were still pinned when their operation ended.
    /// Every later write operation tries them again.
    reclaim: Mutex<Vec<PageId>>,
    leaf_max_size: usize,
    internal_max_size: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Create an empty index named `name`, replacing any header record of
    /// the same name.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` for an unusable name or node sizes
    /// - `Error::HeaderFull` if the header page has no room for the record
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        config: BPlusTreeConfig,
    ) -> Result<Self> {
        let tree = Self::build(name.into(), bpm, config, PageId::INVALID)?;
        tree.update_root_record(PageId::INVALID)?;
        debug!(index = %tree.index_name, "created index");
        Ok(tree)
    }

    /// Reopen the index recorded in the header page under `name`. An
    /// unknown name opens an empty tree.
    ///
    /// # Errors
    /// `Error::InvalidConfig` for an unusable name or node sizes, or any
    /// error reading the header page.
    pub fn open(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        config: BPlusTreeConfig,
    ) -> Result<Self> {
        let name = name.into();
        let root = {
            let guard = bpm
                .fetch_page_read(HEADER_PAGE_ID)?
                .ok_or(Error::NoFreeFrames)?;
            HeaderPage::new(guard.as_slice())
                .get_root_id(&name)
                .unwrap_or(PageId::INVALID)
        };
        let tree = Self::build(name, bpm, config, root)?;
        debug!(index = %tree.index_name, root = %root, "opened index");
        Ok(tree)
    }

    fn build(
        name: String,
        bpm: Arc<BufferPoolManager>,
        config: BPlusTreeConfig,
        root: PageId,
    ) -> Result<Self> {
        if name.is_empty() || name.len() > INDEX_NAME_MAX_LEN || name.contains('\0') {
            return Err(Error::InvalidConfig(format!(
                "index name must be 1..={} bytes without NUL, got {:?}",
                INDEX_NAME_MAX_LEN, name
            )));
        }
        config.validate::<K>()?;

        Ok(Self {
            index_name: name,
            bpm,
            root_page_id: Mutex::new(root),
            reclaim: Mutex::new(Vec::new()),
            leaf_max_size: config.leaf_max_size,
            internal_max_size: config.internal_max_size,
            _key: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    // ========================================================================
    // Public API: Search
    // ========================================================================

    /// Look up the record id stored under `key`.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` if a node on the path can't be brought into the
    /// pool, plus any I/O or corruption error from reading it.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        let Some(guard) = self.find_leaf_read(LeafTarget::Key(key))? else {
            return Ok(None);
        };
        Ok(BPlusTreeLeafPage::<K, _>::new(guard.as_slice()).lookup(key))
    }

    // ========================================================================
    // Public API: Iteration
    // ========================================================================

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<'_, K>> {
        let (leaf, index) = self.seek(None)?;
        IndexIterator::new(self, leaf, index, None)
    }

    /// Iterator positioned at the first key `>= key`.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<'_, K>> {
        let (leaf, index) = self.seek(Some(key))?;
        IndexIterator::new(self, leaf, index, Some(*key))
    }

    /// Iterator one past the largest key.
    ///
    /// It holds a shared latch on the last leaf, like any other iterator.
    pub fn end(&self) -> Result<IndexIterator<'_, K>> {
        let leaf = self.find_leaf_read(LeafTarget::Rightmost)?;
        let index = leaf
            .as_ref()
            .map(|guard| BPlusTreePage::new(guard.as_slice()).size())
            .unwrap_or(0);
        IndexIterator::new(self, leaf, index, None)
    }

    // ========================================================================
    // Public API: Insert
    // ========================================================================

    /// Insert `key → rid`. Returns `Ok(false)`, changing nothing, if `key`
    /// is already present.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` if the pool can't hold the pages the insert
    /// needs. Pages for any splits are allocated before the leaf is touched,
    /// so running out of frames there leaves the tree unchanged.
    pub fn insert(&self, key: K, rid: RecordId) -> Result<bool> {
        let mut ctx = Context::new(self.root_page_id.lock());

        if !ctx.root_page_id().is_valid() {
            self.start_new_tree(&mut ctx, key, rid)?;
            self.finish(ctx);
            return Ok(true);
        }

        self.descend_for_write(&mut ctx, &key, Operation::Insert)?;
        let inserted = self.insert_into_leaf(&mut ctx, key, rid)?;
        self.finish(ctx);
        Ok(inserted)
    }

    fn start_new_tree(&self, ctx: &mut Context<'_>, key: K, rid: RecordId) -> Result<()> {
        let mut guard = self.new_page_write()?;
        let root_id = guard.page_id();
        {
            let mut leaf = BPlusTreeLeafPage::<K, _>::new(guard.as_mut_slice());
            leaf.init(root_id, PageId::INVALID, self.leaf_max_size);
            leaf.insert(key, rid);
        }
        drop(guard);
        self.set_root(ctx, root_id)
    }

    fn insert_into_leaf<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        key: K,
        rid: RecordId,
    ) -> Result<bool> {
        let mut leaf_guard = ctx.pop_back()?;

        let (size, max_size) = {
            let leaf = BPlusTreeLeafPage::<K, _>::new(leaf_guard.as_slice());
            if leaf.lookup(&key).is_some() {
                return Ok(false);
            }
            (leaf.size(), leaf.max_size())
        };

        let mut spare = if size + 1 >= max_size {
            let needed = split_pages_needed(ctx);
            self.allocate_spares(needed)?
        } else {
            Vec::new()
        };

        let (left_id, separator, right_id) = {
            let mut leaf = BPlusTreeLeafPage::<K, _>::new(leaf_guard.as_mut_slice());
            leaf.insert(key, rid);
            if leaf.size() < leaf.max_size() {
                return Ok(true);
            }

            let mut sibling_guard = take_spare(&mut spare)?;
            let sibling_id = sibling_guard.page_id();
            let mut sibling = BPlusTreeLeafPage::<K, _>::new(sibling_guard.as_mut_slice());
            sibling.init(sibling_id, leaf.parent_page_id(), leaf.max_size());
            leaf.move_half_to(&mut sibling);
            sibling.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(sibling_id);

            debug!(left = %leaf.page_id(), right = %sibling_id, "split leaf");
            (leaf.page_id(), sibling.key_at(0), sibling_id)
        };
        drop(leaf_guard);

        let linked = self.insert_into_parent(ctx, left_id, separator, right_id, &mut spare);
        self.discard_spares(spare);
        linked.map(|()| true)
    }

    fn allocate_spares(&self, count: usize) -> Result<Vec<PageWriteGuard<'_>>> {
        let mut spare = Vec::with_capacity(count);
        for _ in 0..count {
            match self.new_page_write() {
                Ok(guard) => spare.push(guard),
                Err(e) => {
                    self.discard_spares(spare);
                    return Err(e);
                }
            }
        }
        Ok(spare)
    }

    /// Give back pre-allocated pages a split did not use.
    fn discard_spares(&self, spare: Vec<PageWriteGuard<'_>>) {
        for guard in spare {
            let page_id = guard.page_id();
            drop(guard);
            self.delete_quietly(page_id);
        }
    }

    /// Hook `right_id` into the parent of `left_id` under `key`, splitting
    /// upward as far as needed.
    fn insert_into_parent<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        left_id: PageId,
        key: K,
        right_id: PageId,
        spare: &mut Vec<PageWriteGuard<'a>>,
    ) -> Result<()> {
        if ctx.write_set.is_empty() {
            let mut root_guard = take_spare(spare)?;
            let root_id = root_guard.page_id();
            {
                let mut root = BPlusTreeInternalPage::<K, _>::new(root_guard.as_mut_slice());
                root.init(root_id, PageId::INVALID, self.internal_max_size);
                root.populate_new_root(left_id, &key, right_id);
            }
            drop(root_guard);

            self.set_root(ctx, root_id)?;
            self.adopt(&[left_id, right_id], root_id);
            debug!(root = %root_id, "grew new root");
            return Ok(());
        }

        let mut parent_guard = ctx.pop_back()?;
        let parent_id = parent_guard.page_id();

        let (separator, sibling_id, moved) = {
            let mut parent = BPlusTreeInternalPage::<K, _>::new(parent_guard.as_mut_slice());
            parent
                .insert_node_after(left_id, &key, right_id)
                .ok_or_else(|| Error::corrupt(parent_id, format!("{} is not a child", left_id)))?;
            if parent.size() < parent.max_size() {
                return Ok(());
            }

            let mut sibling_guard = take_spare(spare)?;
            let sibling_id = sibling_guard.page_id();
            let mut sibling = BPlusTreeInternalPage::<K, _>::new(sibling_guard.as_mut_slice());
            sibling.init(sibling_id, parent.parent_page_id(), parent.max_size());
            let moved = parent.move_half_to(&mut sibling);

            debug!(left = %parent_id, right = %sibling_id, "split internal node");
            (sibling.key_at(0), sibling_id, moved)
        };
        drop(parent_guard);

        self.insert_into_parent(ctx, parent_id, separator, sibling_id, spare)?;
        self.adopt(&moved, sibling_id);
        Ok(())
    }

    // ========================================================================
    // Public API: Remove
    // ========================================================================

    /// Remove `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` if a node on the path or a sibling can't be
    /// brought into the pool, plus I/O and corruption errors.
    pub fn remove(&self, key: &K) -> Result<()> {
        let mut ctx = Context::new(self.root_page_id.lock());
        if !ctx.root_page_id().is_valid() {
            return Ok(());
        }

        self.descend_for_write(&mut ctx, key, Operation::Remove)?;
        let mut leaf_guard = ctx.pop_back()?;

        if BPlusTreeLeafPage::<K, _>::new(leaf_guard.as_slice())
            .lookup(key)
            .is_none()
        {
            drop(leaf_guard);
            self.finish(ctx);
            return Ok(());
        }
        BPlusTreeLeafPage::<K, _>::new(leaf_guard.as_mut_slice()).remove(key);

        self.rebalance(&mut ctx, leaf_guard)?;
        self.finish(ctx);
        Ok(())
    }

    /// Fix an underfull node by borrowing from or merging with a sibling,
    /// then repeat on the parent if the merge left it underfull.
    fn rebalance<'a>(&'a self, ctx: &mut Context<'a>, mut guard: PageWriteGuard<'a>) -> Result<()> {
        let page_id = guard.page_id();
        let (size, min_size, max_size) = {
            let node = BPlusTreePage::new(guard.as_slice());
            (node.size(), node.min_size(), node.max_size())
        };

        if page_id == ctx.root {
            return self.adjust_root(ctx, guard);
        }
        if size >= min_size {
            return Ok(());
        }

        let mut parent_guard = ctx.pop_back()?;
        let (index, sibling_id) = {
            let parent = BPlusTreeInternalPage::<K, _>::new(parent_guard.as_slice());
            let index = parent.value_index(page_id).ok_or_else(|| {
                Error::corrupt(parent_guard.page_id(), format!("{} is not a child", page_id))
            })?;
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.value_at(sibling_index))
        };

        let mut sibling_guard = self.fetch_write(sibling_id)?;
        let sibling_size = BPlusTreePage::new(sibling_guard.as_slice()).size();

        if size + sibling_size >= max_size {
            return self.redistribute(&mut parent_guard, &mut guard, &mut sibling_guard, index);
        }

        // merge the right node of the pair into the left one
        let (mut left, mut right, right_index) = if index == 0 {
            (guard, sibling_guard, 1)
        } else {
            (sibling_guard, guard, index)
        };
        self.coalesce(&mut parent_guard, &mut left, &mut right, right_index)?;
        ctx.deleted.push(right.page_id());
        drop(right);
        drop(left);

        self.rebalance(ctx, parent_guard)
    }

    /// Move one entry from `sibling` into `node` and fix the separator.
    /// `index` is `node`'s position in the parent; the sibling is on the
    /// right when it is 0 and on the left otherwise.
    fn redistribute(
        &self,
        parent_guard: &mut PageWriteGuard<'_>,
        node_guard: &mut PageWriteGuard<'_>,
        sibling_guard: &mut PageWriteGuard<'_>,
        index: usize,
    ) -> Result<()> {
        let (node_id, sibling_id) = (node_guard.page_id(), sibling_guard.page_id());
        let mut parent = BPlusTreeInternalPage::<K, _>::new(parent_guard.as_mut_slice());
        let node = BPlusTreeNode::<K, _>::new(node_id, node_guard.as_mut_slice())?;
        let sibling = BPlusTreeNode::<K, _>::new(sibling_id, sibling_guard.as_mut_slice())?;

        match (node, sibling) {
            (BPlusTreeNode::Leaf(mut node), BPlusTreeNode::Leaf(mut sibling)) => {
                if index == 0 {
                    sibling.move_first_to_end_of(&mut node);
                    parent.set_key_at(1, &sibling.key_at(0));
                } else {
                    sibling.move_last_to_front_of(&mut node);
                    parent.set_key_at(index, &node.key_at(0));
                }
            }
            (BPlusTreeNode::Internal(mut node), BPlusTreeNode::Internal(mut sibling)) => {
                let moved = if index == 0 {
                    let middle = parent.key_at(1);
                    let child = sibling.move_first_to_end_of(&mut node, &middle);
                    parent.set_key_at(1, &sibling.key_at(0));
                    child
                } else {
                    let middle = parent.key_at(index);
                    let child = sibling.move_last_to_front_of(&mut node, &middle);
                    parent.set_key_at(index, &node.key_at(0));
                    child
                };
                self.adopt(&[moved], node_id);
            }
            _ => return Err(Error::corrupt(sibling_id, "sibling has a different node type")),
        }

        trace!(node = %node_id, sibling = %sibling_id, "redistributed");
        Ok(())
    }

    /// Append everything in `right` to `left` and drop `right`'s entry at
    /// `right_index` from the parent.
    fn coalesce(
        &self,
        parent_guard: &mut PageWriteGuard<'_>,
        left_guard: &mut PageWriteGuard<'_>,
        right_guard: &mut PageWriteGuard<'_>,
        right_index: usize,
    ) -> Result<()> {
        let (left_id, right_id) = (left_guard.page_id(), right_guard.page_id());
        let mut parent = BPlusTreeInternalPage::<K, _>::new(parent_guard.as_mut_slice());
        let left = BPlusTreeNode::<K, _>::new(left_id, left_guard.as_mut_slice())?;
        let right = BPlusTreeNode::<K, _>::new(right_id, right_guard.as_mut_slice())?;

        let moved = match (left, right) {
            (BPlusTreeNode::Leaf(mut left), BPlusTreeNode::Leaf(mut right)) => {
                right.move_all_to(&mut left);
                Vec::new()
            }
            (BPlusTreeNode::Internal(mut left), BPlusTreeNode::Internal(mut right)) => {
                let middle = parent.key_at(right_index);
                right.move_all_to(&mut left, &middle)
            }
            _ => return Err(Error::corrupt(right_id, "sibling has a different node type")),
        };
        parent.remove(right_index);

        self.adopt(&moved, left_id);
        debug!(left = %left_id, right = %right_id, "merged nodes");
        Ok(())
    }

    /// Shrink the tree after the root lost entries: an empty leaf root
    /// empties the tree; an internal root with one child hands the root to
    /// that child.
    fn adjust_root<'a>(&'a self, ctx: &mut Context<'a>, guard: PageWriteGuard<'a>) -> Result<()> {
        let root_id = guard.page_id();
        let new_root = match BPlusTreeNode::<K, _>::new(root_id, guard.as_slice())? {
            BPlusTreeNode::Leaf(leaf) if leaf.size() == 0 => PageId::INVALID,
            BPlusTreeNode::Internal(node) if node.size() == 1 => node.value_at(0),
            _ => return Ok(()),
        };
        drop(guard);

        self.set_root(ctx, new_root)?;
        ctx.deleted.push(root_id);
        if new_root.is_valid() {
            self.adopt(&[new_root], PageId::INVALID);
        }
        debug!(old = %root_id, new = %new_root, "collapsed root");
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Read-latched leaf for `target`, or `None` for an empty tree.
    fn find_leaf_read(&self, target: LeafTarget<'_, K>) -> Result<Option<PageReadGuard<'_>>> {
        let mut guard = {
            let root = self.root_page_id.lock();
            if !root.is_valid() {
                return Ok(None);
            }
            self.fetch_read(*root)?
        };

        loop {
            let next = match BPlusTreeNode::<K, _>::new(guard.page_id(), guard.as_slice())? {
                BPlusTreeNode::Leaf(_) => None,
                BPlusTreeNode::Internal(node) => Some(match target {
                    LeafTarget::Key(key) => node.lookup(key),
                    LeafTarget::Leftmost => node.value_at(0),
                    LeafTarget::Rightmost => node.value_at(node.size() - 1),
                }),
            };
            match next {
                // latch the child before the parent goes
                Some(child) => guard = self.fetch_read(child)?,
                None => return Ok(Some(guard)),
            }
        }
    }

    /// Read-latched leaf and slot of the first key `>= from`, or of the
    /// smallest key when `from` is `None`.
    pub(super) fn seek(&self, from: Option<&K>) -> Result<(Option<PageReadGuard<'_>>, usize)> {
        let Some(key) = from else {
            return Ok((self.find_leaf_read(LeafTarget::Leftmost)?, 0));
        };
        let leaf = self.find_leaf_read(LeafTarget::Key(key))?;
        let index = leaf
            .as_ref()
            .map(|guard| BPlusTreeLeafPage::<K, _>::new(guard.as_slice()).key_index(key))
            .unwrap_or(0);
        Ok((leaf, index))
    }

    /// Crab down to the leaf for `key` with write latches, leaving the
    /// unsafe suffix of the path (leaf last) in `ctx.write_set`.
    fn descend_for_write<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        key: &K,
        op: Operation,
    ) -> Result<()> {
        let mut page_id = ctx.root_page_id();
        loop {
            let guard = self.fetch_write(page_id)?;
            let (safe, next) = {
                let node = BPlusTreeNode::<K, _>::new(page_id, guard.as_slice())?;
                let safe = is_safe(&node, op, page_id == ctx.root);
                let next = match node {
                    BPlusTreeNode::Leaf(_) => None,
                    BPlusTreeNode::Internal(node) => Some(node.lookup(key)),
                };
                (safe, next)
            };

            if safe {
                ctx.release_ancestors();
            }
            ctx.write_set.push_back(guard);

            match next {
                Some(child) => page_id = child,
                None => {
                    trace!(leaf = %page_id, held = ctx.write_set.len(), ?op, "reached leaf");
                    return Ok(());
                }
            }
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(super) fn fetch_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        self.bpm.fetch_page_read(page_id)?.ok_or(Error::NoFreeFrames)
    }

    fn fetch_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        self.bpm.fetch_page_write(page_id)?.ok_or(Error::NoFreeFrames)
    }

    fn new_page_write(&self) -> Result<PageWriteGuard<'_>> {
        self.bpm.new_page_write()?.ok_or(Error::NoFreeFrames)
    }

    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.fetch_write(page_id)?;
        BPlusTreePage::new(guard.as_mut_slice()).set_parent_page_id(parent);
        Ok(())
    }

    /// Record `parent` in each of `children`, after the structural change
    /// that moved them is complete. Stored parent ids are never used to
    /// navigate or to find the root, so a child that can't be fetched keeps
    /// its old id and the tree stays usable; `verify` reports it.
    fn adopt(&self, children: &[PageId], parent: PageId) {
        for &child in children {
            if let Err(e) = self.set_parent(child, parent) {
                warn!(%child, %parent, error = %e, "failed to update parent id");
            }
        }
    }

    /// Point the tree at a new root. Only legal while the root lock is held.
    fn set_root(&self, ctx: &mut Context<'_>, root: PageId) -> Result<()> {
        let lock = ctx
            .root_lock
            .as_mut()
            .ok_or_else(|| Error::corrupt(root, "root changed without the root lock"))?;
        **lock = root;
        ctx.root = root;
        self.update_root_record(root)
    }

    /// Upsert this index's record in the header page.
    fn update_root_record(&self, root: PageId) -> Result<()> {
        let mut guard = self.fetch_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.as_mut_slice());
        if header.update_record(&self.index_name, root)
            || header.insert_record(&self.index_name, root)
        {
            Ok(())
        } else {
            Err(Error::HeaderFull)
        }
    }

    /// Release the operation's latches, then reclaim the pages it emptied
    /// along with any left over from earlier operations.
    fn finish(&self, ctx: Context<'_>) {
        let mut pages = std::mem::take(&mut *self.reclaim.lock());
        pages.extend(ctx.release());
        for page_id in pages {
            self.delete_quietly(page_id);
        }
    }

    /// Delete a page the tree no longer references. A page another thread
    /// still has pinned goes on the reclaim list for the next operation.
    fn delete_quietly(&self, page_id: PageId) {
        match self.bpm.delete_page(page_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(%page_id, "page still pinned, reclaim deferred");
                self.reclaim.lock().push(page_id);
            }
            Err(e) => {
                warn!(%page_id, error = %e, "failed to reclaim page");
                self.reclaim.lock().push(page_id);
            }
        }
    }

    /// Unlinked pages still waiting to be deleted.
    pub fn pending_reclaim(&self) -> Vec<PageId> {
        self.reclaim.lock().clone()
    }
}

/// Whether `node` can absorb `op` without changing its parent.
fn is_safe<K, B: AsRef<[u8]>>(node: &BPlusTreeNode<K, B>, op: Operation, is_root: bool) -> bool {
    match op {
        Operation::Insert => node.size() + 1 < node.max_size(),
        Operation::Remove if is_root => match node {
            BPlusTreeNode::Leaf(_) => node.size() > 1,
            BPlusTreeNode::Internal(_) => node.size() > 2,
        },
        Operation::Remove => node.size() > node.min_size(),
    }
}

/// Pages a leaf split will consume: one per splitting node, plus a new root
/// if the split climbs past the current root.
fn split_pages_needed(ctx: &Context<'_>) -> usize {
    let mut needed = 1;
    for guard in ctx.write_set.iter().rev() {
        let node = BPlusTreePage::new(guard.as_slice());
        if node.size() + 1 < node.max_size() {
            return needed;
        }
        needed += 1;
    }
    // every held node splits, so the topmost one is the root
    if ctx.root_lock.is_some() {
        needed += 1;
    }
    needed
}

fn take_spare<'a>(spare: &mut Vec<PageWriteGuard<'a>>) -> Result<PageWriteGuard<'a>> {
    spare.pop().ok_or(Error::NoFreeFrames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use tempfile::{tempdir, TempDir};

    fn rid(key: i64) -> RecordId {
        RecordId::from(key)
    }

    fn create_tree(leaf_max: usize, internal_max: usize, pool: usize) -> (BPlusTree<i64>, TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("tree.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(pool, dm));
        let config = BPlusTreeConfig::for_key::<i64>()
            .with_leaf_max_size(leaf_max)
            .with_internal_max_size(internal_max);
        (BPlusTree::new("test_idx", bpm, config).unwrap(), dir)
    }

    #[test]
    fn test_empty_tree() {
        let (tree, _dir) = create_tree(4, 4, 16);
        assert!(tree.is_empty());
        assert_eq!(tree.get_value(&1).unwrap(), None);
        tree.remove(&1).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_first_insert_creates_leaf_root() {
        let (tree, _dir) = create_tree(4, 4, 16);
        assert!(tree.insert(42, rid(42)).unwrap());

        let root = tree.root_page_id();
        assert!(root.is_valid());
        let guard = tree.fetch_read(root).unwrap();
        let leaf = BPlusTreeLeafPage::<i64, _>::new(guard.as_slice());
        assert!(leaf.is_leaf());
        assert!(leaf.is_root());
        assert_eq!(leaf.keys(), vec![42]);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let (tree, _dir) = create_tree(4, 4, 16);
        assert!(tree.insert(7, rid(7)).unwrap());
        assert!(!tree.insert(7, rid(99)).unwrap());
        assert_eq!(tree.get_value(&7).unwrap(), Some(rid(7)));
    }

    #[test]
    fn test_leaf_split_at_max_size() {
        let (tree, _dir) = create_tree(4, 4, 16);
        for k in 1..=5 {
            assert!(tree.insert(k, rid(k)).unwrap());
        }

        let root_guard = tree.fetch_read(tree.root_page_id()).unwrap();
        let root = BPlusTreeInternalPage::<i64, _>::new(root_guard.as_slice());
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), 3);

        let left = tree.fetch_read(root.value_at(0)).unwrap();
        let right = tree.fetch_read(root.value_at(1)).unwrap();
        let left = BPlusTreeLeafPage::<i64, _>::new(left.as_slice());
        let right = BPlusTreeLeafPage::<i64, _>::new(right.as_slice());
        assert_eq!(left.keys(), vec![1, 2]);
        assert_eq!(right.keys(), vec![3, 4, 5]);
        assert_eq!(left.next_page_id(), right.page_id());
        assert_eq!(right.next_page_id(), PageId::INVALID);
        assert_eq!(left.parent_page_id(), root.page_id());
        assert_eq!(right.parent_page_id(), root.page_id());
    }

    #[test]
    fn test_merge_collapses_root() {
        let (tree, _dir) = create_tree(4, 4, 16);
        for k in 1..=5 {
            tree.insert(k, rid(k)).unwrap();
        }
        let pages_before = tree.bpm.page_count();

        tree.remove(&5).unwrap();
        tree.remove(&4).unwrap();
        tree.remove(&3).unwrap();

        let root = tree.root_page_id();
        let guard = tree.fetch_read(root).unwrap();
        let leaf = BPlusTreeLeafPage::<i64, _>::new(guard.as_slice());
        assert!(leaf.is_leaf());
        assert!(leaf.is_root());
        assert_eq!(leaf.keys(), vec![1, 2]);
        drop(guard);
        assert!(tree.bpm.page_count() < pages_before);
    }

    #[test]
    fn test_redistribute_from_right_sibling() {
        let (tree, _dir) = create_tree(4, 4, 16);
        // leaves [1 2] [3 4 5] after the split
        for k in 1..=5 {
            tree.insert(k, rid(k)).unwrap();
        }
        // left leaf underflows and borrows 3
        tree.remove(&1).unwrap();

        let root_guard = tree.fetch_read(tree.root_page_id()).unwrap();
        let root = BPlusTreeInternalPage::<i64, _>::new(root_guard.as_slice());
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), 4);
        let left = tree.fetch_read(root.value_at(0)).unwrap();
        assert_eq!(BPlusTreeLeafPage::<i64, _>::new(left.as_slice()).keys(), vec![2, 3]);
    }

    #[test]
    fn test_remove_everything_empties_tree() {
        let (tree, _dir) = create_tree(3, 4, 32);
        for k in 0..50 {
            tree.insert(k, rid(k)).unwrap();
        }
        for k in 0..50 {
            tree.remove(&k).unwrap();
            assert_eq!(tree.get_value(&k).unwrap(), None);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.bpm.get_pin_count(HEADER_PAGE_ID).unwrap_or(0), 0);
    }

    #[test]
    fn test_root_recorded_in_header() {
        let (tree, _dir) = create_tree(4, 4, 16);
        for k in 0..20 {
            tree.insert(k, rid(k)).unwrap();
        }
        let guard = tree.fetch_read(HEADER_PAGE_ID).unwrap();
        let header = HeaderPage::new(guard.as_slice());
        assert_eq!(header.get_root_id("test_idx"), Some(tree.root_page_id()));
    }

    #[test]
    fn test_rejects_bad_name() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("tree.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(8, dm));
        let config = BPlusTreeConfig::for_key::<i64>();
        assert!(matches!(
            BPlusTree::<i64>::new("", Arc::clone(&bpm), config),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            BPlusTree::<i64>::new("x".repeat(INDEX_NAME_MAX_LEN + 1), bpm, config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rebalance_ignores_stale_parent_ids() {
        let (tree, _dir) = create_tree(4, 4, 16);
        // leaves [1 2] [3 4 5]
        for k in 1..=5 {
            tree.insert(k, rid(k)).unwrap();
        }
        let right_id = {
            let root_guard = tree.fetch_read(tree.root_page_id()).unwrap();
            BPlusTreeInternalPage::<i64, _>::new(root_guard.as_slice()).value_at(1)
        };
        // make the right leaf look like a root
        tree.set_parent(right_id, PageId::INVALID).unwrap();

        tree.remove(&5).unwrap();
        tree.remove(&4).unwrap();

        let root = tree.root_page_id();
        assert_ne!(root, right_id);
        let guard = tree.fetch_read(root).unwrap();
        assert_eq!(BPlusTreeLeafPage::<i64, _>::new(guard.as_slice()).keys(), vec![1, 2, 3]);
        drop(guard);
        assert_eq!(tree.verify().unwrap().key_count, 3);
    }

    #[test]
    fn test_adopt_skips_unreachable_children() {
        let (tree, _dir) = create_tree(4, 4, 16);
        for k in 1..=5 {
            tree.insert(k, rid(k)).unwrap();
        }
        let root = tree.root_page_id();
        let left_id = {
            let root_guard = tree.fetch_read(root).unwrap();
            BPlusTreeInternalPage::<i64, _>::new(root_guard.as_slice()).value_at(0)
        };
        tree.set_parent(left_id, PageId(900)).unwrap();

        // the bad id fails to fetch; the next child is still updated
        tree.adopt(&[PageId::INVALID, left_id], root);
        let guard = tree.fetch_read(left_id).unwrap();
        assert_eq!(BPlusTreePage::new(guard.as_slice()).parent_page_id(), root);
        drop(guard);
        tree.verify().unwrap();
    }

    #[test]
    fn test_no_pins_leak() {
        let (tree, _dir) = create_tree(3, 4, 16);
        for k in (0..40).rev() {
            tree.insert(k, rid(k)).unwrap();
        }
        for k in (0..40).step_by(3) {
            tree.remove(&k).unwrap();
        }
        tree.get_value(&10).unwrap();
        assert_eq!(tree.bpm.evictable_count(), tree.bpm.page_count());
    }
}
