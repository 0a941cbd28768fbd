//! Frame descriptors - per-frame bookkeeping for the buffer pool.
//!
//! A [`FrameDesc`] records which page (if any) a frame caches, how many
//! callers have it pinned, and the dirty/reference bits the pool needs to
//! cache it safely. The descriptor table is a plain `Vec<FrameDesc>` owned
//! by the pool behind its mutex; descriptors are never aliased or shared.

use crate::common::{FileId, FrameId, PageId};
use crate::storage::FileRef;

/// Metadata for one frame in the buffer pool.
///
/// Invariants:
/// - `!valid` implies `pin_count == 0` and `!dirty`
/// - `valid` exactly when `file` is `Some`
pub struct FrameDesc {
    /// Owning file of the cached page, or None if the frame is empty.
    file: Option<FileRef>,
    /// Page cached in this frame. Meaningless while invalid.
    page_id: PageId,
    /// Number of callers currently holding this page pinned.
    pin_count: u32,
    /// Whether the cached page differs from its on-disk copy.
    dirty: bool,
    /// Whether the frame caches a real page.
    valid: bool,
    /// Second-chance bit, set on access and cleared by the clock sweep.
    referenced: bool,
}

impl FrameDesc {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self {
            file: None,
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            valid: false,
            referenced: false,
        }
    }

    /// Install a freshly loaded page: pinned once, clean, referenced.
    pub fn set(&mut self, file: FileRef, page_id: PageId) {
        self.file = Some(file);
        self.page_id = page_id;
        self.pin_count = 1;
        self.dirty = false;
        self.valid = true;
        self.referenced = true;
    }

    /// Reset to the empty state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// The owning file and page id, if the frame is valid.
    pub fn owner(&self) -> Option<(FileRef, PageId)> {
        if self.valid {
            self.file.clone().map(|f| (f, self.page_id))
        } else {
            None
        }
    }

    /// Whether this frame caches the given file's page.
    pub fn owned_by(&self, file: FileId) -> bool {
        self.file.as_ref().map(|f| f.id()) == Some(file)
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    /// Increment the pin count.
    #[inline]
    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Decrement the pin count.
    ///
    /// # Panics
    /// Panics if the pin count is already 0; callers check first.
    #[inline]
    pub fn unpin(&mut self) {
        assert!(self.pin_count > 0, "pin count underflow");
        self.pin_count -= 1;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Set the dirty flag. Monotonic: only `clear_dirty` (after a
    /// write-back) or `clear` resets it.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    #[inline]
    pub fn mark_referenced(&mut self) {
        self.referenced = true;
    }

    #[inline]
    pub fn clear_referenced(&mut self) {
        self.referenced = false;
    }

    /// Copyable snapshot for introspection.
    pub fn snapshot(&self, frame: FrameId) -> FrameInfo {
        FrameInfo {
            frame,
            file: self.file.as_ref().map(|f| f.id()),
            page: self.valid.then_some(self.page_id),
            pin_count: self.pin_count,
            dirty: self.dirty,
            valid: self.valid,
            referenced: self.referenced,
        }
    }
}

impl Default for FrameDesc {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of one frame's descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame: FrameId,
    pub file: Option<FileId>,
    pub page: Option<PageId>,
    pub pin_count: u32,
    pub dirty: bool,
    pub valid: bool,
    pub referenced: bool,
}

impl std::fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.file, self.page) {
            (Some(file), Some(page)) => write!(
                f,
                "{}: {} {} pins={} dirty={} referenced={}",
                self.frame, file, page, self.pin_count, self.dirty, self.referenced
            ),
            _ => write!(f, "{}: empty", self.frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DbFile;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_file() -> (FileRef, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = DbFile::create(dir.path().join("test.db")).unwrap();
        (file, dir)
    }

    #[test]
    fn test_new_is_empty() {
        let desc = FrameDesc::new();
        assert!(!desc.is_valid());
        assert!(!desc.is_pinned());
        assert!(!desc.is_dirty());
        assert!(!desc.is_referenced());
        assert!(desc.owner().is_none());
    }

    #[test]
    fn test_set_installs_page() {
        let (file, _dir) = test_file();
        let mut desc = FrameDesc::new();

        desc.set(Arc::clone(&file), PageId::new(3));

        assert!(desc.is_valid());
        assert!(desc.is_referenced());
        assert!(!desc.is_dirty());
        assert_eq!(desc.pin_count(), 1);
        assert_eq!(desc.page_id(), PageId::new(3));
        assert!(desc.owned_by(file.id()));

        let (owner, page) = desc.owner().unwrap();
        assert_eq!(owner.id(), file.id());
        assert_eq!(page, PageId::new(3));
    }

    #[test]
    fn test_clear_restores_invariant() {
        let (file, _dir) = test_file();
        let mut desc = FrameDesc::new();

        desc.set(file, PageId::new(3));
        desc.mark_dirty();
        desc.pin();

        desc.clear();

        // !valid implies unpinned and clean
        assert!(!desc.is_valid());
        assert_eq!(desc.pin_count(), 0);
        assert!(!desc.is_dirty());
        assert!(desc.owner().is_none());
    }

    #[test]
    fn test_pin_unpin() {
        let (file, _dir) = test_file();
        let mut desc = FrameDesc::new();
        desc.set(file, PageId::new(0));

        desc.pin();
        assert_eq!(desc.pin_count(), 2);

        desc.unpin();
        desc.unpin();
        assert_eq!(desc.pin_count(), 0);
        assert!(!desc.is_pinned());
    }

    #[test]
    #[should_panic(expected = "pin count underflow")]
    fn test_unpin_underflow() {
        let mut desc = FrameDesc::new();
        desc.unpin();
    }

    #[test]
    fn test_snapshot() {
        let (file, _dir) = test_file();
        let mut desc = FrameDesc::new();

        let empty = desc.snapshot(FrameId::new(0));
        assert!(!empty.valid);
        assert_eq!(empty.file, None);
        assert_eq!(empty.page, None);
        assert_eq!(format!("{}", empty), "Frame(0): empty");

        desc.set(Arc::clone(&file), PageId::new(9));
        let info = desc.snapshot(FrameId::new(0));
        assert_eq!(info.file, Some(file.id()));
        assert_eq!(info.page, Some(PageId::new(9)));
        assert_eq!(info.pin_count, 1);
        assert!(info.referenced);
    }
}
