//! Latches held by one write traversal.

use std::collections::VecDeque;

use parking_lot::MutexGuard;

use crate::buffer::PageWriteGuard;
use crate::common::{Error, PageId, Result};

/// Everything an insert or remove has locked so far.
///
/// ```text
///   root_lock ─▶ write_set.front() ─▶ ... ─▶ write_set.back()
///   (tree-wide)  (highest unsafe node)        (deepest node)
/// ```
///
/// Latches are released top-down: first the ancestors once a safe node is
/// reached, then the rest when the operation ends. Pages emptied by a merge
/// are collected in `deleted` and reclaimed only after everything here has
/// been dropped.
pub(crate) struct Context<'a> {
    pub(crate) root_lock: Option<MutexGuard<'a, PageId>>,
    /// Root this operation started from, kept after the root lock is
    /// released. A held page is the root exactly when its id matches.
    pub(crate) root: PageId,
    pub(crate) write_set: VecDeque<PageWriteGuard<'a>>,
    pub(crate) deleted: Vec<PageId>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(root_lock: MutexGuard<'a, PageId>) -> Self {
        Self {
            root: *root_lock,
            root_lock: Some(root_lock),
            write_set: VecDeque::new(),
            deleted: Vec::new(),
        }
    }

    /// Root as seen under the root lock, or `INVALID` once it is released.
    pub(crate) fn root_page_id(&self) -> PageId {
        self.root_lock.as_deref().copied().unwrap_or(PageId::INVALID)
    }

    /// Drop every held ancestor latch, oldest first, then the root lock.
    pub(crate) fn release_ancestors(&mut self) {
        while let Some(guard) = self.write_set.pop_front() {
            drop(guard);
        }
        self.root_lock = None;
    }

    /// Take the deepest held latch.
    ///
    /// # Errors
    /// `Error::CorruptPage` if nothing is held, which means a node that
    /// needed its parent was wrongly judged safe.
    pub(crate) fn pop_back(&mut self) -> Result<PageWriteGuard<'a>> {
        self.write_set
            .pop_back()
            .ok_or_else(|| Error::corrupt(PageId::INVALID, "parent latch not held"))
    }

    /// Release all latches and hand back the pages waiting to be deleted.
    pub(crate) fn release(self) -> Vec<PageId> {
        let Context {
            root_lock,
            mut write_set,
            deleted,
            ..
        } = self;
        while let Some(guard) = write_set.pop_front() {
            drop(guard);
        }
        drop(root_lock);
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::DiskManager;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    #[test]
    fn test_release_ancestors_drops_root_lock_and_latches() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("ctx.db")).unwrap();
        let bpm = BufferPoolManager::new(4, dm);
        let root = Mutex::new(PageId(7));

        let a = bpm.new_page_write().unwrap().unwrap();
        let b = bpm.new_page_write().unwrap().unwrap();
        let (a_id, b_id) = (a.page_id(), b.page_id());

        let mut ctx = Context::new(root.lock());
        assert_eq!(ctx.root_page_id(), PageId(7));
        ctx.write_set.push_back(a);
        ctx.write_set.push_back(b);

        ctx.release_ancestors();
        assert_eq!(ctx.root_page_id(), PageId::INVALID);
        assert_eq!(ctx.root, PageId(7));
        assert!(ctx.write_set.is_empty());
        assert!(root.try_lock().is_some());
        assert_eq!(bpm.get_pin_count(a_id), Some(0));
        assert_eq!(bpm.get_pin_count(b_id), Some(0));
        assert!(ctx.pop_back().is_err());
    }

    #[test]
    fn test_release_returns_deleted_pages() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("ctx.db")).unwrap();
        let bpm = BufferPoolManager::new(4, dm);
        let root = Mutex::new(PageId::INVALID);

        let guard = bpm.new_page_write().unwrap().unwrap();
        let id = guard.page_id();
        let mut ctx = Context::new(root.lock());
        ctx.write_set.push_back(guard);
        ctx.deleted.push(PageId(3));

        assert_eq!(ctx.release(), vec![PageId(3)]);
        assert_eq!(bpm.get_pin_count(id), Some(0));
        assert!(root.try_lock().is_some());
    }
}
