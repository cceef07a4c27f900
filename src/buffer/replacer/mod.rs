//! Eviction policy implementations (replacers).
//!
//! A replacer tracks the frames that currently hold an unpinned page and
//! picks one of them when the pool needs space:
//! - [`LruReplacer`] - evicts the frame unpinned longest ago
//! - [`ClockReplacer`] - second-chance sweep over a circular buffer
//!
//! The buffer pool owns one replacer as a `Box<dyn Replacer>`, chosen by
//! [`ReplacerKind`](crate::common::config::ReplacerKind).

mod clock;
mod lru;

pub use clock::ClockReplacer;
pub use lru::LruReplacer;

use crate::common::config::ReplacerKind;
use crate::common::FrameId;

/// Eviction policy over the frames of one buffer pool.
///
/// Implementations synchronize internally; every method takes `&self`.
///
/// # Contract
/// - `unpin(f)` makes `f` a candidate; `pin(f)` withdraws it.
/// - `victim()` removes and returns one candidate, or `None` if there are none.
/// - `size()` is the number of current candidates.
pub trait Replacer: Send + Sync {
    fn victim(&self) -> Option<FrameId>;

    fn pin(&self, frame_id: FrameId);

    fn unpin(&self, frame_id: FrameId);

    fn size(&self) -> usize;
}

/// Build the replacer for a pool of `num_frames` frames.
pub fn new_replacer(kind: ReplacerKind, num_frames: usize) -> Box<dyn Replacer> {
    match kind {
        ReplacerKind::Lru => Box::new(LruReplacer::new(num_frames)),
        ReplacerKind::Clock => Box::new(ClockReplacer::new(num_frames)),
    }
}
