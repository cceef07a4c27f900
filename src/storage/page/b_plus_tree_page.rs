//! Header shared by B+Tree internal and leaf pages.

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

/// Kind of B+Tree node stored in a page.
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Zeroed or unrecognized page.
    #[default]
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl PageType {
    /// Convert from the on-disk tag, returning Invalid for unknown values.
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => PageType::Leaf,
            2 => PageType::Internal,
            _ => PageType::Invalid,
        }
    }
}

/// Bytes taken by the common header.
pub(crate) const NODE_HEADER_SIZE: usize = 20;

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// View over the common node header.
///
/// # Layout (20 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_type
/// 4       4     size (entries currently stored)
/// 8       4     max_size
/// 12      4     page_id
/// 16      4     parent_page_id (INVALID for the root)
/// ```
///
/// `min_size` is derived, not stored: `max_size / 2`.
pub struct BPlusTreePage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> BPlusTreePage<B> {
    pub const HEADER_SIZE: usize = NODE_HEADER_SIZE;

    const OFFSET_PAGE_TYPE: usize = 0;
    const OFFSET_SIZE: usize = 4;
    const OFFSET_MAX_SIZE: usize = 8;
    const OFFSET_PAGE_ID: usize = 12;
    const OFFSET_PARENT: usize = 16;

    /// # Panics
    /// Panics if `data` is shorter than a page.
    pub fn new(data: B) -> Self {
        assert!(data.as_ref().len() >= PAGE_SIZE, "node view needs a full page");
        Self { data }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_u32(read_u32(self.data(), Self::OFFSET_PAGE_TYPE))
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.page_type() == PageType::Leaf
    }

    #[inline]
    pub fn size(&self) -> usize {
        read_u32(self.data(), Self::OFFSET_SIZE) as usize
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        read_u32(self.data(), Self::OFFSET_MAX_SIZE) as usize
    }

    #[inline]
    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(read_u32(self.data(), Self::OFFSET_PAGE_ID))
    }

    #[inline]
    pub fn parent_page_id(&self) -> PageId {
        PageId(read_u32(self.data(), Self::OFFSET_PARENT))
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        !self.parent_page_id().is_valid()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BPlusTreePage<B> {
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        write_u32(self.data_mut(), Self::OFFSET_PAGE_TYPE, page_type as u32);
    }

    #[inline]
    pub fn set_size(&mut self, size: usize) {
        write_u32(self.data_mut(), Self::OFFSET_SIZE, size as u32);
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        write_u32(self.data_mut(), Self::OFFSET_MAX_SIZE, max_size as u32);
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        write_u32(self.data_mut(), Self::OFFSET_PAGE_ID, page_id.0);
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        write_u32(self.data_mut(), Self::OFFSET_PARENT, parent.0);
    }
}
