//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache between the index and disk. It
//! manages a fixed pool of frames, each holding one page.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache
//! - [`Frame`] - A slot in the pool holding a page + metadata
//! - [`PinnedPage`], [`PageReadGuard`], [`PageWriteGuard`] - RAII pins and latches
//! - [`BufferPoolStats`] - Hit/miss/eviction counters
//! - [`replacer`] - Eviction policies

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use page_guard::{PageReadGuard, PageWriteGuard, PinnedPage};
pub use stats::{BufferPoolStats, StatsSnapshot};
