//! Frame identifier type.

use std::fmt;

/// Index of a slot in the buffer pool.
///
/// Frames are stored in a `Vec<Frame>` sized once at startup, so a frame id
/// is always in `0..pool_size` and can index the vector directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_ordering() {
        assert!(FrameId::new(1) < FrameId::new(2));
        assert_eq!(FrameId::new(5), FrameId(5));
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(format!("{}", FrameId::new(42)), "Frame(42)");
    }
}
