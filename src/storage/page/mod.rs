//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`BPlusTreePage`] - Header shared by every B+Tree node
//! - [`BPlusTreeLeafPage`] / [`BPlusTreeInternalPage`] - Node layouts
//! - [`BPlusTreeNode`] - Either layout, chosen by the page type tag
//! - [`HeaderPage`] - The index directory stored in page 0
//!
//! The typed pages are views: they borrow a page's bytes (`&[u8]` for reads,
//! `&mut [u8]` for writes) and never copy them.

mod b_plus_tree_internal_page;
mod b_plus_tree_leaf_page;
mod b_plus_tree_node;
mod b_plus_tree_page;
mod header_page;
#[allow(clippy::module_inception)]
mod page;

pub use b_plus_tree_internal_page::BPlusTreeInternalPage;
pub use b_plus_tree_leaf_page::BPlusTreeLeafPage;
pub use b_plus_tree_node::BPlusTreeNode;
pub use b_plus_tree_page::{BPlusTreePage, PageType};
pub use header_page::HeaderPage;
pub use page::Page;
