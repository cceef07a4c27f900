//! B+Tree index over the buffer pool.
//!
//! - [`BPlusTree`] - search, insert and remove with latch crabbing
//! - [`IndexIterator`] - ordered scan along the leaf chain
//! - [`TreeShape`] - result of [`BPlusTree::verify`]
//!
//! Node layouts live in [`crate::storage::page`]; this module only decides
//! which pages to latch and how entries move between them.

mod b_plus_tree;
mod context;
mod iterator;
mod verify;

pub use b_plus_tree::BPlusTree;
pub use iterator::IndexIterator;
pub use verify::TreeShape;
