//! Configuration for pagetree.
//!
//! Sizes that are baked into the on-disk format are plain constants.
//! Tunables that callers pick at startup live in [`BufferPoolConfig`] and
//! [`BPlusTreeConfig`].

use crate::common::{Error, IndexKey, PageId, Result};

/// Size of a page in bytes (4KB). With 32-bit page ids a file tops out
/// at 16TB.
pub const PAGE_SIZE: usize = 4096;

/// Page 0 of every database file holds the index directory.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Frames in a buffer pool built from `BufferPoolConfig::default()`.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Longest index name the header page can store.
pub const INDEX_NAME_MAX_LEN: usize = 32;

/// Eviction policy used by a buffer pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerKind {
    /// Strict least-recently-unpinned list.
    #[default]
    Lru,
    /// Circular scan with second-chance bits.
    Clock,
}

/// Startup settings for a [`BufferPoolManager`](crate::buffer::BufferPoolManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames allocated up front.
    pub pool_size: usize,
    /// Which eviction policy picks victims.
    pub replacer: ReplacerKind,
}

impl BufferPoolConfig {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            replacer: ReplacerKind::default(),
        }
    }

    pub fn with_replacer(mut self, replacer: ReplacerKind) -> Self {
        self.replacer = replacer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// Node fan-out for a [`BPlusTree`](crate::index::btree::BPlusTree).
///
/// A node splits as soon as its size reaches the max, so a leaf never holds
/// more than `leaf_max_size - 1` entries once an operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BPlusTreeConfig {
    pub leaf_max_size: usize,
    pub internal_max_size: usize,
}

impl Default for BPlusTreeConfig {
    /// Page-filling sizes for 8-byte keys.
    fn default() -> Self {
        Self::for_key::<i64>()
    }
}

impl BPlusTreeConfig {
    /// Largest sizes whose entries fit in one page for key type `K`.
    pub fn for_key<K: IndexKey>() -> Self {
        use crate::storage::page::{BPlusTreeInternalPage, BPlusTreeLeafPage};

        Self {
            leaf_max_size: BPlusTreeLeafPage::<K, &[u8]>::capacity(),
            internal_max_size: BPlusTreeInternalPage::<K, &[u8]>::capacity(),
        }
    }

    pub fn with_leaf_max_size(mut self, size: usize) -> Self {
        self.leaf_max_size = size;
        self
    }

    pub fn with_internal_max_size(mut self, size: usize) -> Self {
        self.internal_max_size = size;
        self
    }

    /// Check the sizes against the page capacity for key type `K`.
    pub fn validate<K: IndexKey>(&self) -> Result<()> {
        let limits = Self::for_key::<K>();

        if self.leaf_max_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "leaf_max_size must be >= 2, got {}",
                self.leaf_max_size
            )));
        }
        // an internal node must keep two children so every child has a sibling
        if self.internal_max_size < 4 {
            return Err(Error::InvalidConfig(format!(
                "internal_max_size must be >= 4, got {}",
                self.internal_max_size
            )));
        }
        if self.leaf_max_size > limits.leaf_max_size {
            return Err(Error::InvalidConfig(format!(
                "leaf_max_size {} exceeds page capacity {}",
                self.leaf_max_size, limits.leaf_max_size
            )));
        }
        if self.internal_max_size > limits.internal_max_size {
            return Err(Error::InvalidConfig(format!(
                "internal_max_size {} exceeds page capacity {}",
                self.internal_max_size, limits.internal_max_size
            )));
        }
        Ok(())
    }
}
