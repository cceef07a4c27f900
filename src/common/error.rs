//! Error types for pagetree.

use thiserror::Error;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagetree.
///
/// Running out of frames is *not* an error at the buffer pool level:
/// `fetch_page`/`new_page` report it as `Ok(None)` so the caller can decide
/// what to do. The index layer turns it into [`Error::NoFreeFrames`] because
/// it cannot make progress without the page.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// The provided page ID can't be used for this operation.
    #[error("Invalid page ID: {0}")]
    InvalidPageId(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// A page's bytes don't decode into the format the caller expected.
    #[error("Page {page_id} is corrupt: {reason}")]
    CorruptPage { page_id: u32, reason: String },

    /// The header page has no room for another index record.
    #[error("Header page is full")]
    HeaderFull,

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn corrupt(page_id: crate::common::PageId, reason: impl Into<String>) -> Self {
        Error::CorruptPage {
            page_id: page_id.0,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(42);
        assert_eq!(format!("{}", err), "Page 42 not found");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "No free frames available in buffer pool");

        let err = Error::CorruptPage {
            page_id: 7,
            reason: "bad page type 9".into(),
        };
        assert_eq!(format!("{}", err), "Page 7 is corrupt: bad page type 9");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err: Error = io_err.into();
        assert!(err.source().is_some());
        assert!(Error::HeaderFull.source().is_none());
    }
}
