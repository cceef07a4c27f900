//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata the pool needs to manage it:
//! - Which page is loaded (`PageId::INVALID` if none)
//! - Pin count
//! - Dirty flag
//!
//! The page's `RwLock` doubles as the page latch that callers hold through
//! [`PageReadGuard`](super::PageReadGuard) and
//! [`PageWriteGuard`](super::PageWriteGuard).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool.
///
/// # Thread Safety
/// `page_id` and `pin_count` are only *changed* while the pool's bookkeeping
/// lock is held; they are atomics so that lock-free readers (stats, tests,
/// debug output) see whole values. The dirty flag may be set by any thread
/// holding a pin.
pub struct Frame {
    /// Page bytes; the lock is the page latch.
    page: RwLock<Page>,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page latch
    // ========================================================================

    #[inline]
    pub fn latch_shared(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn latch_exclusive(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    #[inline]
    pub fn try_latch_shared(&self) -> Option<RwLockReadGuard<'_, Page>> {
        self.page.try_read()
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Page currently loaded, or `PageId::INVALID`.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new count, or `None` if the
    /// frame was not pinned.
    #[inline]
    pub(crate) fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|old| old - 1)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub(crate) fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.page_id().is_valid()
    }

    /// Forget the loaded page without touching its bytes.
    pub(crate) fn clear_metadata(&self) {
        self.set_page_id(PageId::INVALID);
        self.pin_count.store(0, Ordering::Release);
        self.clear_dirty();
    }

    /// Zero the page and forget it.
    ///
    /// Must only be called on an unpinned frame, so the latch is free.
    pub(crate) fn reset(&self) {
        self.latch_exclusive().reset();
        self.clear_metadata();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
