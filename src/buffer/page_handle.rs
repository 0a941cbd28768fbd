//! Handles to pinned pages.
//!
//! [`PageHandle`] is what `read_page`/`alloc_page` return: a cheap handle
//! naming the frame that caches the page, with accessors for the page
//! bytes. It replaces a raw pointer into the pool — the frame cannot be
//! recycled while the caller's pin is outstanding, so the handle stays
//! meaningful until the matching
//! [`unpin_page`](super::BufferManager::unpin_page).

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FileId, FrameId, PageId};
use crate::storage::page::Page;

/// Handle to a pinned page in the buffer pool.
///
/// The handle does not unpin on drop: every `read_page`/`alloc_page` must
/// be balanced by an `unpin_page` call, which is also where dirtiness is
/// declared. Writing through [`write`](Self::write) does not set the dirty
/// flag by itself. Drop any byte guard before unpinning — once the pin is
/// released the frame may be recycled, and a lingering guard would stall
/// the eviction.
///
/// # Example
/// ```ignore
/// let handle = pool.read_page(&file, page_id)?;
/// handle.write().as_mut_slice()[0] = 0xFF;
/// pool.unpin_page(&file, page_id, true)?;
/// ```
pub struct PageHandle<'a> {
    /// Frame holding this page.
    frame_id: FrameId,
    /// Page this handle refers to.
    page_id: PageId,
    /// Identity of the owning file.
    file_id: FileId,
    /// The frame's byte buffer.
    page: &'a RwLock<Page>,
}

impl<'a> PageHandle<'a> {
    /// Called by `BufferManager` once the page is pinned in a frame.
    pub(crate) fn new(
        frame_id: FrameId,
        page_id: PageId,
        file_id: FileId,
        page: &'a RwLock<Page>,
    ) -> Self {
        Self {
            frame_id,
            page_id,
            file_id,
            page,
        }
    }

    /// Frame caching the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Page this handle refers to.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Identity of the owning file.
    #[inline]
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Acquire shared access to the page bytes. Multiple readers may hold
    /// the page simultaneously.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'a, Page> {
        self.page.read()
    }

    /// Acquire exclusive access to the page bytes.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'a, Page> {
        self.page.write()
    }
}
