//! Leaf-or-internal dispatch over a page's type tag.

use std::ops::{Deref, DerefMut};

use crate::common::{Error, IndexKey, PageId, Result};

use super::b_plus_tree_page::{BPlusTreePage, PageType};
use super::{BPlusTreeInternalPage, BPlusTreeLeafPage};

/// A B+Tree node, typed by the `page_type` field of its header.
///
/// Callers `match` on the variant instead of checking `is_leaf()` and
/// re-wrapping the bytes by hand. Both variants deref to the common header.
pub enum BPlusTreeNode<K, B> {
    Leaf(BPlusTreeLeafPage<K, B>),
    Internal(BPlusTreeInternalPage<K, B>),
}

impl<K: IndexKey, B: AsRef<[u8]>> BPlusTreeNode<K, B> {
    /// Wrap the bytes of `page_id`.
    ///
    /// # Errors
    /// `Error::CorruptPage` if the type tag is neither leaf nor internal.
    pub fn new(page_id: PageId, data: B) -> Result<Self> {
        let page_type = BPlusTreePage::new(data.as_ref()).page_type();
        match page_type {
            PageType::Leaf => Ok(BPlusTreeNode::Leaf(BPlusTreeLeafPage::new(data))),
            PageType::Internal => Ok(BPlusTreeNode::Internal(BPlusTreeInternalPage::new(data))),
            PageType::Invalid => Err(Error::corrupt(page_id, "not a B+Tree node")),
        }
    }
}

impl<K, B> Deref for BPlusTreeNode<K, B> {
    type Target = BPlusTreePage<B>;

    fn deref(&self) -> &BPlusTreePage<B> {
        match self {
            BPlusTreeNode::Leaf(leaf) => leaf,
            BPlusTreeNode::Internal(internal) => internal,
        }
    }
}

impl<K, B> DerefMut for BPlusTreeNode<K, B> {
    fn deref_mut(&mut self) -> &mut BPlusTreePage<B> {
        match self {
            BPlusTreeNode::Leaf(leaf) => leaf,
            BPlusTreeNode::Internal(internal) => internal,
        }
    }
}
