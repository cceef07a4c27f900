//! LRU (Least Recently Used) replacement policy.

use hashlink::LinkedHashSet;
use parking_lot::Mutex;

use crate::buffer::replacer::Replacer;
use crate::common::FrameId;

/// Evicts the frame that became unpinned longest ago.
///
/// Recency is the moment a frame was last *unpinned*. Unpinning a frame that
/// is already a candidate does not move it, so a page that is repeatedly
/// pinned and released without ever being fetched keeps its place in line.
///
/// ```text
///   front (victim)                        back (newest)
///   ┌────┐   ┌────┐   ┌────┐   ┌────┐
///   │ F3 │ ─ │ F0 │ ─ │ F7 │ ─ │ F2 │
///   └────┘   └────┘   └────┘   └────┘
/// ```
///
/// All operations are O(1).
pub struct LruReplacer {
    capacity: usize,
    candidates: Mutex<LinkedHashSet<FrameId>>,
}

impl LruReplacer {
    /// Create a replacer tracking at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            candidates: Mutex::new(LinkedHashSet::with_capacity(capacity)),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        self.candidates.lock().pop_front()
    }

    fn pin(&self, frame_id: FrameId) {
        self.candidates.lock().remove(&frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut candidates = self.candidates.lock();
        if candidates.contains(&frame_id) || candidates.len() >= self.capacity {
            return;
        }
        candidates.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.candidates.lock().len()
    }
}
