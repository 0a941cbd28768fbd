//! Error types for framepool.

use thiserror::Error;

use crate::common::{FileId, FrameId, PageId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in framepool.
///
/// Every variant carries enough identifying context (file identity, page
/// id, frame index) to diagnose the failing operation. Lookup misses are
/// not errors: a page absent from the cache is normal control flow for
/// `unpin_page` and `dispose_page`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist in the file (never allocated, or
    /// deleted).
    #[error("page {page} not found in {file}")]
    PageNotFound { file: FileId, page: PageId },

    /// Every frame in the pool is pinned; no victim is available. Callers
    /// must unpin pages before retrying — the pool never blocks waiting
    /// for a frame to free.
    #[error("buffer pool exhausted: all {pool_size} frames are pinned")]
    BufferExhausted { pool_size: usize },

    /// Unpin requested on a page whose pin count is already zero. Unpins
    /// must match pins, so this is a caller bug.
    #[error("page {page} of {file} is not pinned ({frame})")]
    PageNotPinned {
        file: FileId,
        page: PageId,
        frame: FrameId,
    },

    /// Flush or dispose requested on a page that is currently pinned.
    /// Callers must unpin first.
    #[error("page {page} of {file} is pinned in {frame} (pin count {pin_count})")]
    PagePinned {
        file: FileId,
        page: PageId,
        frame: FrameId,
        pin_count: u32,
    },

    /// A frame descriptor failed an internal consistency check. Signals a
    /// bug in the pool itself, not a recoverable condition.
    #[error("corrupt descriptor for {frame}: valid={valid} dirty={dirty} referenced={referenced}")]
    CorruptDescriptor {
        frame: FrameId,
        valid: bool,
        dirty: bool,
        referenced: bool,
    },
}
