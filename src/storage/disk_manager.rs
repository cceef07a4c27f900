//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating and deallocating page ids
//! - Reserving page 0 for the index directory

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::common::config::{HEADER_PAGE_ID, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │  Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (header) │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Page 0 always exists and holds the index directory (see
/// [`HeaderPage`](crate::storage::page::HeaderPage)).
///
/// # Free pages
/// Deallocated ids go on an in-memory free list and are handed out again by
/// [`allocate_page`](Self::allocate_page) before the file grows. The list is
/// not persisted: ids freed before a restart are leaked.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` serializes
/// access to it behind a mutex.
pub struct DiskManager {
    file: File,
    /// Number of pages in the file.
    page_count: u32,
    free_pages: Vec<PageId>,
}

impl DiskManager {
    /// Create a new database file with an empty header page.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut dm = Self {
            file,
            page_count: 0,
            free_pages: Vec::new(),
        };
        dm.extend()?;
        Ok(dm)
    }

    /// Open an existing database file.
    ///
    /// A zero-length file gets its header page written on open.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        let mut dm = Self {
            file,
            page_count,
            free_pages: Vec::new(),
        };
        if dm.page_count == 0 {
            dm.extend()?;
        }
        Ok(dm)
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a page from disk into `page`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page is past the end of the file.
    pub fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        self.check_bounds(page_id)?;

        self.file.seek(SeekFrom::Start(page_id.offset()))?;
        self.file.read_exact(page.as_mut_slice())?;
        Ok(())
    }

    /// Write a page to disk.
    ///
    /// The write reaches the OS but is not synced; call [`sync`](Self::sync)
    /// for durability.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_bounds(page_id)?;

        self.file.seek(SeekFrom::Start(page_id.offset()))?;
        self.file.write_all(page.as_slice())?;
        Ok(())
    }

    /// Allocate a page id, reusing a freed one if available.
    ///
    /// A fresh id extends the file with a zeroed page. A reused id keeps
    /// whatever bytes were last written there; the buffer pool zeroes the
    /// frame before handing it out.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(page_id) = self.free_pages.pop() {
            debug!(%page_id, "reusing freed page");
            return Ok(page_id);
        }
        self.extend()
    }

    /// Return a page id to the free list.
    ///
    /// Freeing an id twice is a no-op.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for the header page or `PageId::INVALID`
    /// - `Error::PageNotFound` for ids past the end of the file
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        if page_id == HEADER_PAGE_ID || !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.check_bounds(page_id)?;

        if !self.free_pages.contains(&page_id) {
            debug!(%page_id, "deallocated page");
            self.free_pages.push(page_id);
        }
        Ok(())
    }

    /// Flush OS buffers for the database file.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the number of pages in the database file.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Number of ids waiting on the free list.
    #[inline]
    pub fn free_page_count(&self) -> usize {
        self.free_pages.len()
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }

    fn check_bounds(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() || page_id.0 >= self.page_count {
            return Err(Error::PageNotFound(page_id.0));
        }
        Ok(())
    }

    /// Append a zeroed page and return its id.
    fn extend(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);

        self.file.seek(SeekFrom::Start(page_id.offset()))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;

        self.page_count += 1;
        Ok(page_id)
    }
}
