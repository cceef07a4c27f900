//! pagetree - a paged storage engine with a concurrent B+Tree index.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            pagetree                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                 Index Layer (index/)                    │    │
//! │  │   BPlusTree: latch crabbing + root lock                 │    │
//! │  │   IndexIterator: one read-latched leaf at a time        │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                 Buffer Pool (buffer/)                   │    │
//! │  │   ┌─────────────────────────────────────────────────┐   │    │
//! │  │   │        Eviction Policies: LRU | CLOCK           │   │    │
//! │  │   └─────────────────────────────────────────────────┘   │    │
//! │  │   BufferPoolManager + Frame + RAII guards + Stats       │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                 Storage Layer (storage/)                │    │
//! │  │   DiskManager + Page + node/header page layouts         │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, RecordId, keys, Error, config)
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - The B+Tree index
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use pagetree::{BPlusTree, BPlusTreeConfig, BufferPoolManager, DiskManager, RecordId};
//!
//! let dm = DiskManager::create("my_index.db")?;
//! let bpm = Arc::new(BufferPoolManager::new(64, dm));
//! let tree = BPlusTree::<i64>::new("orders_pk", bpm, BPlusTreeConfig::for_key::<i64>())?;
//!
//! tree.insert(42, RecordId::from(42))?;
//! assert_eq!(tree.get_value(&42)?, Some(RecordId::from(42)));
//!
//! for item in tree.begin()? {
//!     let (key, rid) = item?;
//!     println!("{key} -> {rid}");
//! }
//! # Ok::<(), pagetree::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BPlusTreeConfig, BufferPoolConfig, ReplacerKind, PAGE_SIZE};
pub use common::{Error, FrameId, GenericKey, IndexKey, PageId, RecordId, Result};

pub use buffer::{
    BufferPoolManager, BufferPoolStats, Frame, PageReadGuard, PageWriteGuard, PinnedPage,
    StatsSnapshot,
};
pub use index::{BPlusTree, IndexIterator, TreeShape};
pub use storage::page::{Page, PageType};
pub use storage::DiskManager;
