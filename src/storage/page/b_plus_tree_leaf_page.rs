//! Leaf node layout.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::common::config::PAGE_SIZE;
use crate::common::{IndexKey, PageId, RecordId};

use super::b_plus_tree_page::{read_u32, write_u32, BPlusTreePage, PageType, NODE_HEADER_SIZE};

/// View over a leaf page: sorted `(key, RecordId)` entries plus a link to
/// the next leaf.
///
/// # Layout
/// ```text
/// ┌──────────────────┬──────────┬────────────────┬────────────────┬─────┐
/// │ common header 20 │ next (4) │ key_0 │ rid_0  │ key_1 │ rid_1  │ ... │
/// └──────────────────┴──────────┴────────────────┴────────────────┴─────┘
/// ```
///
/// Keys are unique and strictly ascending over `0..size`. The last leaf's
/// next link is `PageId::INVALID`.
pub struct BPlusTreeLeafPage<K, B> {
    page: BPlusTreePage<B>,
    _key: PhantomData<K>,
}

const OFFSET_NEXT: usize = NODE_HEADER_SIZE;
const LEAF_HEADER_SIZE: usize = NODE_HEADER_SIZE + 4;

impl<K: IndexKey, B: AsRef<[u8]>> BPlusTreeLeafPage<K, B> {
    pub const HEADER_SIZE: usize = LEAF_HEADER_SIZE;
    const ENTRY_SIZE: usize = K::ENCODED_SIZE + RecordId::SIZE;

    pub fn new(data: B) -> Self {
        Self {
            page: BPlusTreePage::new(data),
            _key: PhantomData,
        }
    }

    /// Most entries a page can physically hold for this key type.
    pub fn capacity() -> usize {
        (PAGE_SIZE - LEAF_HEADER_SIZE) / Self::ENTRY_SIZE
    }

    #[inline]
    fn offset(index: usize) -> usize {
        LEAF_HEADER_SIZE + index * Self::ENTRY_SIZE
    }

    pub fn next_page_id(&self) -> PageId {
        PageId(read_u32(self.data(), OFFSET_NEXT))
    }

    pub fn key_at(&self, index: usize) -> K {
        let off = Self::offset(index);
        K::decode(&self.data()[off..off + K::ENCODED_SIZE])
    }

    pub fn rid_at(&self, index: usize) -> RecordId {
        let off = Self::offset(index) + K::ENCODED_SIZE;
        RecordId::decode(&self.data()[off..off + RecordId::SIZE])
    }

    pub fn item(&self, index: usize) -> (K, RecordId) {
        (self.key_at(index), self.rid_at(index))
    }

    /// First index whose key is `>= key` (may be `size`).
    pub fn key_index(&self, key: &K) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn lookup(&self, key: &K) -> Option<RecordId> {
        let index = self.key_index(key);
        if index < self.size() && self.key_at(index) == *key {
            Some(self.rid_at(index))
        } else {
            None
        }
    }

    /// All keys in order; mostly for tests and debug output.
    pub fn keys(&self) -> Vec<K> {
        (0..self.size()).map(|i| self.key_at(i)).collect()
    }
}

impl<K: IndexKey, B: AsRef<[u8]> + AsMut<[u8]>> BPlusTreeLeafPage<K, B> {
    /// Format as an empty leaf with no successor.
    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: usize) {
        debug_assert!(max_size <= Self::capacity());
        self.set_page_type(PageType::Leaf);
        self.set_size(0);
        self.set_max_size(max_size);
        self.set_page_id(page_id);
        self.set_parent_page_id(parent);
        self.set_next_page_id(PageId::INVALID);
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_u32(self.data_mut(), OFFSET_NEXT, next.0);
    }

    fn write_item(&mut self, index: usize, key: &K, rid: &RecordId) {
        let off = Self::offset(index);
        let buf = self.data_mut();
        key.encode(&mut buf[off..off + K::ENCODED_SIZE]);
        rid.encode(&mut buf[off + K::ENCODED_SIZE..off + Self::ENTRY_SIZE]);
    }

    /// Shift entries `[from, size)` by one slot to the right.
    fn open_gap(&mut self, from: usize) {
        let size = self.size();
        let (start, end) = (Self::offset(from), Self::offset(size));
        self.data_mut()
            .copy_within(start..end, start + Self::ENTRY_SIZE);
    }

    /// Shift entries `(at, size)` one slot left, overwriting `at`.
    fn close_gap(&mut self, at: usize) {
        let size = self.size();
        let (start, end) = (Self::offset(at + 1), Self::offset(size));
        self.data_mut()
            .copy_within(start..end, start - Self::ENTRY_SIZE);
    }

    /// Insert in sorted position. Returns false, leaving the page untouched,
    /// if the key is already present.
    ///
    /// # Panics
    /// Panics if the page is physically full.
    pub fn insert(&mut self, key: K, rid: RecordId) -> bool {
        let size = self.size();
        let index = self.key_index(&key);
        if index < size && self.key_at(index) == key {
            return false;
        }
        assert!(size < Self::capacity(), "leaf page overflow");

        self.open_gap(index);
        self.write_item(index, &key, &rid);
        self.set_size(size + 1);
        true
    }

    /// Remove `key` if present.
    pub fn remove(&mut self, key: &K) -> bool {
        let size = self.size();
        let index = self.key_index(key);
        if index >= size || self.key_at(index) != *key {
            return false;
        }
        self.close_gap(index);
        self.set_size(size - 1);
        true
    }

    /// Append `count` entries starting at `from` onto the end of `recipient`.
    fn copy_range_to<B2>(&self, from: usize, count: usize, recipient: &mut BPlusTreeLeafPage<K, B2>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let dst_size = recipient.size();
        assert!(dst_size + count <= Self::capacity(), "leaf page overflow");

        let src = Self::offset(from)..Self::offset(from + count);
        let dst = Self::offset(dst_size);
        recipient.data_mut()[dst..dst + src.len()].copy_from_slice(&self.data()[src]);
        recipient.set_size(dst_size + count);
    }

    /// Split: keep the first `min_size` entries, move the rest to `recipient`.
    pub fn move_half_to<B2>(&mut self, recipient: &mut BPlusTreeLeafPage<K, B2>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = self.min_size();
        self.copy_range_to(keep, size - keep, recipient);
        self.set_size(keep);
    }

    /// Merge: append every entry to `recipient` (the left neighbour) and
    /// splice this page out of the leaf chain.
    pub fn move_all_to<B2>(&mut self, recipient: &mut BPlusTreeLeafPage<K, B2>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.copy_range_to(0, self.size(), recipient);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Redistribute: move this page's first entry to the end of `recipient`
    /// (the left neighbour).
    pub fn move_first_to_end_of<B2>(&mut self, recipient: &mut BPlusTreeLeafPage<K, B2>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        self.copy_range_to(0, 1, recipient);
        self.close_gap(0);
        self.set_size(size - 1);
    }

    /// Redistribute: move this page's last entry to the front of `recipient`
    /// (the right neighbour).
    pub fn move_last_to_front_of<B2>(&mut self, recipient: &mut BPlusTreeLeafPage<K, B2>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let (key, rid) = self.item(size - 1);
        self.set_size(size - 1);

        let dst_size = recipient.size();
        recipient.open_gap(0);
        recipient.write_item(0, &key, &rid);
        recipient.set_size(dst_size + 1);
    }
}

impl<K, B> Deref for BPlusTreeLeafPage<K, B> {
    type Target = BPlusTreePage<B>;

    fn deref(&self) -> &BPlusTreePage<B> {
        &self.page
    }
}

impl<K, B> DerefMut for BPlusTreeLeafPage<K, B> {
    fn deref_mut(&mut self) -> &mut BPlusTreePage<B> {
        &mut self.page
    }
}
