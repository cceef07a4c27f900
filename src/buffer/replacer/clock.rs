//! CLOCK (second chance) replacement policy.

use parking_lot::Mutex;

use crate::buffer::replacer::Replacer;
use crate::common::FrameId;

/// Per-frame state in the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Not a candidate: never unpinned, currently pinned, or already evicted.
    EmptyOrPinned,
    /// Candidate whose reference bit is set.
    Accessed,
    /// Candidate whose reference bit has been cleared by the hand.
    Untouched,
}

struct ClockState {
    slots: Vec<Slot>,
    hand: usize,
}

/// Approximates LRU with one reference bit per frame.
///
/// ```text
///            hand
///             ↓
///   ┌───┬───┬───┬───┬───┐
///   │ A │ - │ A │ U │ A │     A = accessed, U = untouched, - = pinned
///   └───┴───┴───┴───┴───┘
/// ```
///
/// `victim` sweeps from the hand: accessed slots get their bit cleared,
/// the first untouched slot is the victim and the hand parks on it. At most
/// two full sweeps are needed.
pub struct ClockReplacer {
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: Mutex::new(ClockState {
                slots: vec![Slot::EmptyOrPinned; num_frames],
                hand: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let n = state.slots.len();
        if n == 0 || state.slots.iter().all(|&s| s == Slot::EmptyOrPinned) {
            return None;
        }

        let start = state.hand;
        for step in 0..2 * n {
            let i = (start + step) % n;
            match state.slots[i] {
                Slot::Accessed => state.slots[i] = Slot::Untouched,
                Slot::Untouched => {
                    state.slots[i] = Slot::EmptyOrPinned;
                    state.hand = i;
                    return Some(FrameId::new(i));
                }
                Slot::EmptyOrPinned => {}
            }
        }
        None
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(frame_id.0) {
            *slot = Slot::EmptyOrPinned;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(frame_id.0) {
            *slot = Slot::Accessed;
        }
    }

    fn size(&self) -> usize {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|&&s| s != Slot::EmptyOrPinned)
            .count()
    }
}
