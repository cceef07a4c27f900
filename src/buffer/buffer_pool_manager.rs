//! Buffer Pool Manager - the page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - A fixed pool of frames caching disk pages
//! - Pin-based reference counting
//! - Write-back of dirty pages on eviction and flush
//! - A pluggable eviction policy ([`Replacer`])

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::replacer::{new_replacer, Replacer};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard, PinnedPage};
use crate::common::config::BufferPoolConfig;
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Bookkeeping guarded by one mutex.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page. Always preferred over eviction.
    free_list: VecDeque<FrameId>,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────────────────┐  ┌────────────────────────┐   │
/// │  │ state: Mutex<PoolState>  │  │   frames: Vec<Frame>   │   │
/// │  │  page_table PageId → Fid │─▶│ [F0] [F1] [F2] ...     │   │
/// │  │  free_list               │  └────────────────────────┘   │
/// │  └──────────────────────────┘                               │
/// │  ┌──────────────────────────┐  ┌────────────────────────┐   │
/// │  │ replacer: dyn Replacer   │  │ disk_manager: Mutex    │   │
/// │  │  (LRU | Clock)           │  │                        │   │
/// │  └──────────────────────────┘  └────────────────────────┘   │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Pin protocol
/// A page can only be evicted while its pin count is 0. Every successful
/// `fetch_page`/`new_page` pins once; every pin must be matched by exactly
/// one `unpin_page`, which the guards do on drop.
///
/// # Thread Safety
/// All page-table, free-list, pin-count and replacer updates happen under
/// `state`. Lock order is `state → frame latch → disk_manager`; the only
/// latch taken under `state` belongs to an unpinned frame, which no guard
/// can hold. `flush_page` pins first and then writes *outside* `state`.
///
/// # Usage
/// ```no_run
/// use pagetree::{BufferPoolManager, DiskManager};
///
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// let page_id = {
///     let mut guard = bpm.new_page_write()?.expect("pool has free frames");
///     guard.as_mut_slice()[0] = 0xAB;
///     guard.page_id()
/// };
///
/// let guard = bpm.fetch_page_read(page_id)?.expect("pool has free frames");
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// # Ok::<(), pagetree::Error>(())
/// ```
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    replacer: Box<dyn Replacer>,
    disk_manager: Mutex<DiskManager>,
    stats: BufferPoolStats,
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create an LRU buffer pool with `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self::build(BufferPoolConfig::new(pool_size), disk_manager)
    }

    /// Create a buffer pool from a validated config.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if the config is rejected.
    pub fn with_config(config: BufferPoolConfig, disk_manager: DiskManager) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, disk_manager))
    }

    fn build(config: BufferPoolConfig, disk_manager: DiskManager) -> Self {
        let pool_size = config.pool_size;
        debug!(pool_size, replacer = ?config.replacer, "buffer pool created");

        Self {
            frames: (0..pool_size).map(|_| Frame::new()).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).map(FrameId::new).collect(),
            }),
            replacer: new_replacer(config.replacer, pool_size),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Pin `page_id` in memory, loading it from disk if needed.
    ///
    /// Returns `Ok(None)` when the page is not resident and every frame is
    /// pinned.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for `PageId::INVALID`
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - I/O errors from the read or from writing back a dirty victim
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PinnedPage<'_>>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.0].pin();
            self.replacer.pin(frame_id);
            self.stats.record_hit();
            trace!(%page_id, %frame_id, "buffer pool hit");
            return Ok(Some(PinnedPage::new(self, frame_id, page_id)));
        }

        self.stats.record_miss();
        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let frame = &self.frames[frame_id.0];
        let read = {
            let mut page = frame.latch_exclusive();
            self.disk_manager.lock().read_page(page_id, &mut page)
        };
        if let Err(e) = read {
            frame.reset();
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        self.stats.record_read();
        self.install(&mut state, frame_id, page_id);
        debug!(%page_id, %frame_id, "buffer pool miss, page loaded");
        Ok(Some(PinnedPage::new(self, frame_id, page_id)))
    }

    /// Fetch and take the shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<PageReadGuard<'_>>> {
        Ok(self.fetch_page(page_id)?.map(PinnedPage::read))
    }

    /// Fetch and take the exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<PageWriteGuard<'_>>> {
        Ok(self.fetch_page(page_id)?.map(PinnedPage::write))
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a fresh page id and pin a zeroed frame for it.
    ///
    /// The new page starts dirty so its zeroes reach disk even if nobody
    /// writes to it. Returns `Ok(None)` if every frame is pinned; no page id
    /// is consumed in that case.
    ///
    /// # Errors
    /// I/O errors from allocation or from writing back a dirty victim.
    pub fn new_page(&self) -> Result<Option<PinnedPage<'_>>> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let page_id = match self.disk_manager.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.0];
        frame.latch_exclusive().reset();
        frame.mark_dirty();
        self.install(&mut state, frame_id, page_id);
        debug!(%page_id, %frame_id, "new page");
        Ok(Some(PinnedPage::new(self, frame_id, page_id)))
    }

    /// `new_page` plus the exclusive latch.
    pub fn new_page_write(&self) -> Result<Option<PageWriteGuard<'_>>> {
        Ok(self.new_page()?.map(PinnedPage::write))
    }

    /// Drop a page from the pool and release its id on disk.
    ///
    /// Returns `Ok(false)` if the page is resident and still pinned. A dirty
    /// resident page is written back before its id is released. A page that
    /// is not resident is only deallocated on disk.
    ///
    /// # Errors
    /// Errors from `DiskManager::deallocate_page`.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0];
            if frame.is_pinned() {
                return Ok(false);
            }

            if frame.is_dirty() {
                let page = frame.latch_shared();
                self.disk_manager.lock().write_page(page_id, &page)?;
                self.stats.record_write();
            }

            self.replacer.pin(frame_id);
            state.page_table.remove(&page_id);
            frame.reset();
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.lock().deallocate_page(page_id)?;
        self.stats.record_delete();
        debug!(%page_id, "page deleted");
        Ok(true)
    }

    // ========================================================================
    // Public API: Unpin and flush
    // ========================================================================

    /// Release one pin on `page_id`, OR-ing in `is_dirty`.
    ///
    /// Returns false if the page is resident but not pinned; a dirty hint is
    /// still recorded in that case. Unpinning a page that is not resident is
    /// a no-op that returns true.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };

        let frame = &self.frames[frame_id.0];
        if is_dirty {
            frame.mark_dirty();
        }
        if !frame.is_pinned() {
            return false;
        }
        if frame.unpin() == Some(0) {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write `page_id` to disk and clear its dirty flag.
    ///
    /// Returns `Ok(false)` if the page is not resident. The write happens
    /// under the page's shared latch, so it waits for any writer holding the
    /// page to finish.
    ///
    /// # Errors
    /// I/O errors from the write.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame_id = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            self.frames[frame_id.0].pin();
            self.replacer.pin(frame_id);
            frame_id
        };

        let frame = &self.frames[frame_id.0];
        let written = {
            let page = frame.latch_shared();
            let written = self.disk_manager.lock().write_page(page_id, &page);
            if written.is_ok() {
                frame.clear_dirty();
                self.stats.record_write();
            }
            written
        };

        self.unpin_page(page_id, false);
        written.map(|()| true)
    }

    /// Flush every dirty resident page, then sync the file.
    ///
    /// # Errors
    /// The first I/O error encountered.
    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty: Vec<PageId> = {
            let state = self.state.lock();
            state
                .page_table
                .iter()
                .filter(|(_, fid)| self.frames[fid.0].is_dirty())
                .map(|(&pid, _)| pid)
                .collect()
        };

        for page_id in &dirty {
            self.flush_page(*page_id)?;
        }
        self.disk_manager.lock().sync()?;
        debug!(pages = dirty.len(), "flushed all dirty pages");
        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|fid| self.frames[fid.0].pin_count())
    }

    /// Dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|fid| self.frames[fid.0].is_dirty())
    }

    /// Number of frames the replacer could evict right now.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    #[inline]
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    /// Map `page_id` to `frame_id` with a single pin.
    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
    }

    /// Find an empty frame: free list first, then a replacer victim.
    ///
    /// A dirty victim is written back before its mapping is dropped. If that
    /// write fails the victim goes back to the replacer untouched.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.victim() else {
            debug!("no evictable frame");
            return Ok(None);
        };

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id();
        let dirty = frame.is_dirty();

        if dirty {
            let page = frame.latch_shared();
            if let Err(e) = self.disk_manager.lock().write_page(old_page_id, &page) {
                drop(page);
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            self.stats.record_write();
        }

        state.page_table.remove(&old_page_id);
        frame.clear_metadata();
        self.stats.record_eviction(dirty);
        debug!(page_id = %old_page_id, %frame_id, dirty, "evicted page");
        Ok(Some(frame_id))
    }
}
