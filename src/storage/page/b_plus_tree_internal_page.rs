//! Internal node layout.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::common::config::PAGE_SIZE;
use crate::common::{IndexKey, PageId};

use super::b_plus_tree_page::{read_u32, write_u32, BPlusTreePage, PageType, NODE_HEADER_SIZE};

/// View over an internal page: `size` child pointers separated by
/// `size - 1` keys.
///
/// # Layout
/// ```text
/// ┌──────────────────┬─────────────────┬─────────────────┬─────┐
/// │ common header 20 │ key_0 │ child_0 │ key_1 │ child_1 │ ... │
/// └──────────────────┴─────────────────┴─────────────────┴─────┘
/// ```
///
/// `key_0` is unused. Every key reachable through `child_i` is `>= key_i`
/// and `< key_{i+1}`.
///
/// Methods that move children between pages return the moved child ids;
/// the caller owns updating those children's parent links.
pub struct BPlusTreeInternalPage<K, B> {
    page: BPlusTreePage<B>,
    _key: PhantomData<K>,
}

impl<K: IndexKey, B: AsRef<[u8]>> BPlusTreeInternalPage<K, B> {
    pub const HEADER_SIZE: usize = NODE_HEADER_SIZE;
    const ENTRY_SIZE: usize = K::ENCODED_SIZE + 4;

    pub fn new(data: B) -> Self {
        Self {
            page: BPlusTreePage::new(data),
            _key: PhantomData,
        }
    }

    /// Most children a page can physically hold for this key type.
    pub fn capacity() -> usize {
        (PAGE_SIZE - NODE_HEADER_SIZE) / Self::ENTRY_SIZE
    }

    #[inline]
    fn offset(index: usize) -> usize {
        NODE_HEADER_SIZE + index * Self::ENTRY_SIZE
    }

    pub fn key_at(&self, index: usize) -> K {
        let off = Self::offset(index);
        K::decode(&self.data()[off..off + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId(read_u32(self.data(), Self::offset(index) + K::ENCODED_SIZE))
    }

    /// Position of `child` among this node's children.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose subtree covers `key`.
    pub fn lookup(&self, key: &K) -> PageId {
        // first index in [1, size) whose key is > key
        let (mut lo, mut hi) = (1, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) <= *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.value_at(lo - 1)
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

impl<K: IndexKey, B: AsRef<[u8]> + AsMut<[u8]>> BPlusTreeInternalPage<K, B> {
    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: usize) {
        debug_assert!(max_size <= Self::capacity());
        self.set_page_type(PageType::Internal);
        self.set_size(0);
        self.set_max_size(max_size);
        self.set_page_id(page_id);
        self.set_parent_page_id(parent);
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let off = Self::offset(index);
        key.encode(&mut self.data_mut()[off..off + K::ENCODED_SIZE]);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let off = Self::offset(index) + K::ENCODED_SIZE;
        write_u32(self.data_mut(), off, child.0);
    }

    fn write_item(&mut self, index: usize, key: &K, child: PageId) {
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    fn open_gap(&mut self, from: usize) {
        let size = self.size();
        let (start, end) = (Self::offset(from), Self::offset(size));
        self.data_mut()
            .copy_within(start..end, start + Self::ENTRY_SIZE);
    }

    /// Fill a fresh root after its only child split in two.
    pub fn populate_new_root(&mut self, left: PageId, key: &K, right: PageId) {
        self.set_value_at(0, left);
        self.write_item(1, key, right);
        self.set_size(2);
    }

    /// Insert `(key, new_child)` right after `old_child`. Returns the new
    /// size, or `None` if `old_child` is not a child of this node.
    ///
    /// # Panics
    /// Panics if the page is physically full.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &K,
        new_child: PageId,
    ) -> Option<usize> {
        let size = self.size();
        let index = self.value_index(old_child)? + 1;
        assert!(size < Self::capacity(), "internal page overflow");

        self.open_gap(index);
        self.write_item(index, key, new_child);
        self.set_size(size + 1);
        Some(size + 1)
    }

    /// Drop the entry at `index`, shifting later entries left.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        let (start, end) = (Self::offset(index + 1), Self::offset(size));
        self.data_mut().copy_within(start..end, start - Self::ENTRY_SIZE);
        self.set_size(size - 1);
    }

    fn copy_range_to<B2>(
        &self,
        from: usize,
        count: usize,
        recipient: &mut BPlusTreeInternalPage<K, B2>,
    ) -> Vec<PageId>
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let dst_size = recipient.size();
        assert!(dst_size + count <= Self::capacity(), "internal page overflow");

        let src = Self::offset(from)..Self::offset(from + count);
        let dst = Self::offset(dst_size);
        recipient.data_mut()[dst..dst + src.len()].copy_from_slice(&self.data()[src]);
        recipient.set_size(dst_size + count);

        (from..from + count).map(|i| self.value_at(i)).collect()
    }

    /// Split: keep the first `min_size` children, move the rest to
    /// `recipient`. The recipient's `key_0` is the separator to push up.
    pub fn move_half_to<B2>(
        &mut self,
        recipient: &mut BPlusTreeInternalPage<K, B2>,
    ) -> Vec<PageId>
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = self.min_size();
        let moved = self.copy_range_to(keep, size - keep, recipient);
        self.set_size(keep);
        moved
    }

    /// Merge into the left neighbour. `middle_key` is the parent's separator
    /// between the two nodes; it becomes the key in front of this node's
    /// first child.
    pub fn move_all_to<B2>(
        &mut self,
        recipient: &mut BPlusTreeInternalPage<K, B2>,
        middle_key: &K,
    ) -> Vec<PageId>
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.set_key_at(0, middle_key);
        let moved = self.copy_range_to(0, self.size(), recipient);
        self.set_size(0);
        moved
    }

    /// Move the first child to the end of the left neighbour, rotating
    /// `middle_key` down. The new separator is this node's `key_0` afterwards.
    pub fn move_first_to_end_of<B2>(
        &mut self,
        recipient: &mut BPlusTreeInternalPage<K, B2>,
        middle_key: &K,
    ) -> PageId
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let child = self.value_at(0);
        let dst_size = recipient.size();
        recipient.write_item(dst_size, middle_key, child);
        recipient.set_size(dst_size + 1);
        self.remove(0);
        child
    }

    /// Move the last child to the front of the right neighbour, rotating
    /// `middle_key` down. The new separator is the recipient's `key_0`.
    pub fn move_last_to_front_of<B2>(
        &mut self,
        recipient: &mut BPlusTreeInternalPage<K, B2>,
        middle_key: &K,
    ) -> PageId
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let key = self.key_at(size - 1);
        let child = self.value_at(size - 1);
        self.set_size(size - 1);

        let dst_size = recipient.size();
        recipient.set_key_at(0, middle_key);
        recipient.open_gap(0);
        recipient.write_item(0, &key, child);
        recipient.set_size(dst_size + 1);
        child
    }
}

impl<K, B> Deref for BPlusTreeInternalPage<K, B> {
    type Target = BPlusTreePage<B>;

    fn deref(&self) -> &BPlusTreePage<B> {
        &self.page
    }
}

impl<K, B> DerefMut for BPlusTreeInternalPage<K, B> {
    fn deref_mut(&mut self) -> &mut BPlusTreePage<B> {
        &mut self.page
    }
}
