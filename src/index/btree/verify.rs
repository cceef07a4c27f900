//! Structural checks and a printable dump of a tree.

use std::fmt::Write;

use crate::common::{Error, IndexKey, PageId, Result};
use crate::storage::page::BPlusTreeNode;

use super::b_plus_tree::BPlusTree;

/// Summary returned by [`BPlusTree::verify`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeShape {
    /// Levels from root to leaf; 0 for an empty tree.
    pub height: usize,
    pub leaf_count: usize,
    pub internal_count: usize,
    pub key_count: usize,
}

/// Key range a subtree must stay inside: `lower <= key < upper`.
#[derive(Clone, Copy)]
struct Bounds<K> {
    lower: Option<K>,
    upper: Option<K>,
}

impl<K: IndexKey> Bounds<K> {
    fn contains(&self, key: &K) -> bool {
        self.lower.map_or(true, |lo| lo <= *key) && self.upper.map_or(true, |hi| *key < hi)
    }
}

impl<K: IndexKey> BPlusTree<K> {
    /// Walk the whole tree and check its invariants:
    ///
    /// - every node records its own page id and its real parent
    /// - sizes stay below `max_size`, and at or above `min_size` off the root
    /// - keys are strictly ascending and inside the range their parent routes
    /// - all leaves sit at the same depth
    /// - the leaf chain visits every leaf left to right and ends in `INVALID`
    ///
    /// The root lock is held for the whole walk, so no writer can start.
    ///
    /// # Errors
    /// `Error::CorruptPage` naming the first page that breaks an invariant.
    pub fn verify(&self) -> Result<TreeShape> {
        let root = self.root_page_id.lock();
        let mut shape = TreeShape::default();
        if !root.is_valid() {
            return Ok(shape);
        }

        let mut leaves = Vec::new();
        let bounds = Bounds {
            lower: None,
            upper: None,
        };
        let height = self.check_node(*root, PageId::INVALID, bounds, &mut shape, &mut leaves)?;
        shape.height = height;

        for pair in leaves.windows(2) {
            let ((left, next), (right, _)) = (pair[0], pair[1]);
            if next != right {
                return Err(Error::corrupt(
                    left,
                    format!("leaf chain points to {} instead of {}", next, right),
                ));
            }
        }
        if let Some(&(last, next)) = leaves.last() {
            if next.is_valid() {
                return Err(Error::corrupt(last, format!("last leaf points to {}", next)));
            }
        }

        Ok(shape)
    }

    /// Check the subtree at `page_id` and return its height. Leaves are
    /// appended to `leaves` as `(page, next)` in key order.
    fn check_node(
        &self,
        page_id: PageId,
        parent: PageId,
        bounds: Bounds<K>,
        shape: &mut TreeShape,
        leaves: &mut Vec<(PageId, PageId)>,
    ) -> Result<usize> {
        let guard = self.fetch_read(page_id)?;
        let node = BPlusTreeNode::<K, _>::new(page_id, guard.as_slice())?;
        let fail = |reason: String| Error::corrupt(page_id, reason);

        if node.page_id() != page_id {
            return Err(fail(format!("header says {}", node.page_id())));
        }
        if node.parent_page_id() != parent {
            return Err(fail(format!(
                "parent is {}, expected {}",
                node.parent_page_id(),
                parent
            )));
        }
        let (size, is_root) = (node.size(), !parent.is_valid());
        if size >= node.max_size() {
            return Err(fail(format!("size {} reached max {}", size, node.max_size())));
        }
        if !is_root && size < node.min_size() {
            return Err(fail(format!("size {} below min {}", size, node.min_size())));
        }

        match node {
            BPlusTreeNode::Leaf(leaf) => {
                if size == 0 {
                    return Err(fail("empty leaf".to_string()));
                }
                let keys = leaf.keys();
                if keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(fail(format!("keys out of order: {:?}", keys)));
                }
                if let Some(key) = keys.iter().find(|k| !bounds.contains(k)) {
                    return Err(fail(format!("key {:?} outside parent range", key)));
                }

                shape.leaf_count += 1;
                shape.key_count += size;
                leaves.push((page_id, leaf.next_page_id()));
                Ok(1)
            }
            BPlusTreeNode::Internal(internal) => {
                if size < 2 {
                    return Err(fail(format!("internal node with {} children", size)));
                }
                let keys: Vec<K> = (1..size).map(|i| internal.key_at(i)).collect();
                if keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(fail(format!("separators out of order: {:?}", keys)));
                }
                if let Some(key) = keys.iter().find(|k| !bounds.contains(k)) {
                    return Err(fail(format!("separator {:?} outside parent range", key)));
                }

                let mut depth = None;
                for i in 0..size {
                    let child_bounds = Bounds {
                        lower: if i == 0 { bounds.lower } else { Some(internal.key_at(i)) },
                        upper: if i + 1 < size {
                            Some(internal.key_at(i + 1))
                        } else {
                            bounds.upper
                        },
                    };
                    let child = internal.value_at(i);
                    let height = self.check_node(child, page_id, child_bounds, shape, leaves)?;
                    match depth {
                        None => depth = Some(height),
                        Some(d) if d != height => {
                            return Err(fail(format!("children at depths {} and {}", d, height)));
                        }
                        Some(_) => {}
                    }
                }

                shape.internal_count += 1;
                Ok(depth.unwrap_or(0) + 1)
            }
        }
    }

    /// Render the tree level by level, one line per level.
    ///
    /// ```text
    /// L0: Page(5)[· 30]
    /// L1: Page(3)[10 15 20] Page(4)[30 40]
    /// ```
    pub fn dump(&self) -> Result<String> {
        let root = self.root_page_id.lock();
        let mut out = String::new();
        if !root.is_valid() {
            out.push_str("(empty)\n");
            return Ok(out);
        }

        let mut level = vec![*root];
        let mut depth = 0;
        while !level.is_empty() {
            let mut next_level = Vec::new();
            let _ = write!(out, "L{}:", depth);

            for page_id in level {
                let guard = self.fetch_read(page_id)?;
                match BPlusTreeNode::<K, _>::new(page_id, guard.as_slice())? {
                    BPlusTreeNode::Leaf(leaf) => {
                        let keys: Vec<String> =
                            leaf.keys().iter().map(|k| format!("{:?}", k)).collect();
                        let _ = write!(out, " {}[{}]", page_id, keys.join(" "));
                    }
                    BPlusTreeNode::Internal(internal) => {
                        let keys: Vec<String> = (1..internal.size())
                            .map(|i| format!("{:?}", internal.key_at(i)))
                            .collect();
                        let _ = write!(out, " {}[· {}]", page_id, keys.join(" "));
                        next_level.extend(internal.children());
                    }
                }
            }

            out.push('\n');
            level = next_level;
            depth += 1;
        }
        Ok(out)
    }
}
