//! RAII guards for page access.
//!
//! - [`PinnedPage`] - Page is pinned in memory but not latched
//! - [`PageReadGuard`] - Pinned + shared latch
//! - [`PageWriteGuard`] - Pinned + exclusive latch
//!
//! Every guard unpins its page when dropped. Latched guards release the latch
//! *before* unpinning, so a frame with pin count 0 is never latched.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// A pinned page that nobody has latched yet.
///
/// Returned by [`BufferPoolManager::fetch_page`] and
/// [`BufferPoolManager::new_page`]. Turn it into a latched guard with
/// [`read`](Self::read), [`write`](Self::write) or [`try_read`](Self::try_read).
pub struct PinnedPage<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> PinnedPage<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Hand the pin over to a latched guard without unpinning in between.
    fn disarm(self) -> (&'a BufferPoolManager, FrameId, PageId) {
        let this = ManuallyDrop::new(self);
        (this.bpm, this.frame_id, this.page_id)
    }

    /// Block until the shared latch is available.
    pub fn read(self) -> PageReadGuard<'a> {
        let (bpm, frame_id, page_id) = self.disarm();
        let lock = bpm.frame(frame_id).latch_shared();
        PageReadGuard::new(bpm, frame_id, page_id, lock)
    }

    /// Block until the exclusive latch is available.
    pub fn write(self) -> PageWriteGuard<'a> {
        let (bpm, frame_id, page_id) = self.disarm();
        let lock = bpm.frame(frame_id).latch_exclusive();
        PageWriteGuard::new(bpm, frame_id, page_id, lock)
    }

    /// Take the shared latch only if it is free right now. On contention the
    /// page stays pinned and is handed back.
    pub fn try_read(self) -> Result<PageReadGuard<'a>, PinnedPage<'a>> {
        let bpm = self.bpm;
        match bpm.frame(self.frame_id).try_latch_shared() {
            Some(lock) => {
                let (bpm, frame_id, page_id) = self.disarm();
                Ok(PageReadGuard::new(bpm, frame_id, page_id, lock))
            }
            None => Err(self),
        }
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, false);
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(page_id)?.ok_or(Error::NoFreeFrames)?;
/// let first = guard.as_slice()[0];  // Deref to &Page
/// // guard drops here: latch released, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// `None` once released.
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now. Calling it again does nothing.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_page(self.page_id, false);
        }
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    /// # Panics
    /// Panics if the guard was already released with `drop_guard`.
    #[inline]
    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => &**lock,
            None => panic!("{} accessed after drop_guard", self.page_id),
        }
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Guard for exclusive write access to a page.
///
/// Only one `PageWriteGuard` can exist for a page at a time. The page is
/// reported dirty on release only if it was mutably dereferenced.
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: Option<RwLockWriteGuard<'a, Page>>,
    dirty: bool,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock: Some(lock),
            dirty: false,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Release the latch and the pin now. Calling it again does nothing.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_page(self.page_id, self.dirty);
        }
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    /// # Panics
    /// Panics if the guard was already released with `drop_guard`.
    #[inline]
    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => &**lock,
            None => panic!("{} accessed after drop_guard", self.page_id),
        }
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.dirty = true;
        match &mut self.lock {
            Some(lock) => &mut **lock,
            None => panic!("{} accessed after drop_guard", self.page_id),
        }
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}
