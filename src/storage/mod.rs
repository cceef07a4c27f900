//! Storage layer - disk I/O and page formats.
//!
//! - [`DiskManager`] - File I/O and page id allocation
//! - [`page`] - Raw pages and the typed views laid over them

mod disk_manager;
pub mod page;

pub use disk_manager::DiskManager;
