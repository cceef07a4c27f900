//! Index directory stored in page 0.

use crate::common::config::{INDEX_NAME_MAX_LEN, PAGE_SIZE};
use crate::common::PageId;

use super::b_plus_tree_page::{read_u32, write_u32};

/// View over the header page: a table mapping index names to root pages.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     record count
/// 4       32    record 0 name (zero-padded)
/// 36      4     record 0 root page id
/// 40      ...   record 1, ...
/// ```
///
/// A zeroed page is a valid, empty directory.
pub struct HeaderPage<B> {
    data: B,
}

const OFFSET_COUNT: usize = 0;
const OFFSET_RECORDS: usize = 4;
const RECORD_SIZE: usize = INDEX_NAME_MAX_LEN + 4;

impl<B: AsRef<[u8]>> HeaderPage<B> {
    /// Records that fit in one page.
    pub const MAX_RECORDS: usize = (PAGE_SIZE - OFFSET_RECORDS) / RECORD_SIZE;

    pub fn new(data: B) -> Self {
        assert!(data.as_ref().len() >= PAGE_SIZE, "header view needs a full page");
        Self { data }
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn record_count(&self) -> usize {
        (read_u32(self.data(), OFFSET_COUNT) as usize).min(Self::MAX_RECORDS)
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let off = OFFSET_RECORDS + index * RECORD_SIZE;
        &self.data()[off..off + INDEX_NAME_MAX_LEN]
    }

    fn root_at(&self, index: usize) -> PageId {
        PageId(read_u32(self.data(), OFFSET_RECORDS + index * RECORD_SIZE + INDEX_NAME_MAX_LEN))
    }

    fn find(&self, name: &str) -> Option<usize> {
        let padded = pad_name(name)?;
        (0..self.record_count()).find(|&i| self.name_at(i) == padded)
    }

    /// Root page recorded for `name`.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find(name).map(|i| self.root_at(i))
    }

    /// Every `(name, root)` pair, in insertion order.
    pub fn records(&self) -> Vec<(String, PageId)> {
        (0..self.record_count())
            .map(|i| {
                let raw = self.name_at(i);
                let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                (String::from_utf8_lossy(&raw[..len]).into_owned(), self.root_at(i))
            })
            .collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    fn write_record(&mut self, index: usize, name: &[u8; INDEX_NAME_MAX_LEN], root: PageId) {
        let off = OFFSET_RECORDS + index * RECORD_SIZE;
        let buf = self.data.as_mut();
        buf[off..off + INDEX_NAME_MAX_LEN].copy_from_slice(name);
        write_u32(buf, off + INDEX_NAME_MAX_LEN, root.0);
    }

    fn set_record_count(&mut self, count: usize) {
        write_u32(self.data.as_mut(), OFFSET_COUNT, count as u32);
    }

    /// Add a record. Returns false if the name is taken, unusable, or the
    /// page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        let Some(padded) = pad_name(name) else {
            return false;
        };
        let count = self.record_count();
        if count >= Self::MAX_RECORDS || self.find(name).is_some() {
            return false;
        }
        self.write_record(count, &padded, root);
        self.set_record_count(count + 1);
        true
    }

    /// Point an existing record at a new root. Returns false if absent.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        match (self.find(name), pad_name(name)) {
            (Some(index), Some(padded)) => {
                self.write_record(index, &padded, root);
                true
            }
            _ => false,
        }
    }

    /// Remove a record, moving the last record into its slot.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = self.find(name) else {
            return false;
        };
        let last = self.record_count() - 1;
        if index != last {
            let mut moved = [0u8; INDEX_NAME_MAX_LEN];
            moved.copy_from_slice(self.name_at(last));
            let root = self.root_at(last);
            self.write_record(index, &moved, root);
        }
        self.write_record(last, &[0u8; INDEX_NAME_MAX_LEN], PageId(0));
        self.set_record_count(last);
        true
    }
}

/// Zero-padded fixed-width form of `name`, or `None` if it can't be stored.
fn pad_name(name: &str) -> Option<[u8; INDEX_NAME_MAX_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > INDEX_NAME_MAX_LEN || bytes.contains(&0) {
        return None;
    }
    let mut padded = [0u8; INDEX_NAME_MAX_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);
    Some(padded)
}
