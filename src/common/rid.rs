//! Record identifier stored as the value half of a leaf entry.

use std::fmt;

use crate::common::PageId;

/// Location of a tuple: the page it lives on plus its slot within that page.
///
/// The index treats it as an opaque 8-byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RecordId {
    /// Encoded width in a leaf entry.
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut pid = [0u8; 4];
        let mut slot = [0u8; 4];
        pid.copy_from_slice(&buf[0..4]);
        slot.copy_from_slice(&buf[4..8]);
        Self {
            page_id: PageId::from_le_bytes(pid),
            slot: u32::from_le_bytes(slot),
        }
    }
}

/// Handy for tests and callers that key rids off a single integer.
impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        let v = v as u64;
        Self {
            page_id: PageId((v >> 32) as u32),
            slot: v as u32,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_id.0, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_layout() {
        let rid = RecordId::new(PageId(1), 2);
        let mut buf = [0u8; RecordId::SIZE];
        rid.encode(&mut buf);
        assert_eq!(buf, [1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(RecordId::decode(&buf), rid);
    }

    #[test]
    fn test_rid_from_i64() {
        let rid = RecordId::from(7i64);
        assert_eq!(rid, RecordId::new(PageId(0), 7));

        let rid = RecordId::from((3i64 << 32) | 9);
        assert_eq!(rid, RecordId::new(PageId(3), 9));
    }
}
