//! Common types shared across pagetree.
//!
//! - Configuration constants and startup configs
//! - Error types
//! - Identifiers (PageId, FrameId, RecordId)
//! - The key trait used by the index

pub mod config;
pub mod error;
mod frame_id;
mod key;
mod page_id;
mod rid;

pub use error::{Error, Result};
pub use frame_id::FrameId;
pub use key::{GenericKey, IndexKey};
pub use page_id::PageId;
pub use rid::RecordId;
