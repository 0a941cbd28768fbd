//! DbFile - page-granular file I/O.
//!
//! A [`DbFile`] owns one on-disk file and hands out page-level
//! read/write/allocate/delete operations to the buffer pool. Each open
//! file carries a process-unique [`FileId`]; the pool keys its page index
//! on (file id, page id) pairs.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, FileId, PageId, Result};
use crate::storage::page::Page;

/// Shared handle to an open file. Descriptors in the buffer pool hold
/// clones of this, so a file stays open while any of its pages is cached.
pub type FileRef = Arc<DbFile>;

/// Source of process-unique file ids.
static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(0);

/// Manages page I/O for a single file.
///
/// # File Layout
/// Pages are laid out sequentially; page N lives at offset `N × PAGE_SIZE`.
///
/// # Page lifecycle
/// `allocate_page` extends the file with a zeroed page, or reuses the
/// lowest previously deleted page id. `delete_page` marks a page's storage
/// reusable; reading a deleted page fails until it is reallocated. The
/// deleted-id set is in-memory only and rebuilt empty on open.
///
/// # Thread Safety
/// Mutable file state lives behind an internal mutex, so all methods take
/// `&self` and the handle can be shared as [`FileRef`].
///
/// # Durability
/// Writes and allocations are followed by `fsync()`.
pub struct DbFile {
    id: FileId,
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    /// Number of pages the file has been extended to, including deleted ones.
    page_count: u32,
    /// Page ids whose storage has been reclaimed and may be reallocated.
    deleted: BTreeSet<u32>,
}

impl DbFile {
    /// Create a new file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<FileRef> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Arc::new(Self {
            id: FileId::new(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)),
            inner: Mutex::new(FileInner {
                file,
                page_count: 0,
                deleted: BTreeSet::new(),
            }),
        }))
    }

    /// Open an existing file. The page count is recovered from the file
    /// length.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileRef> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let metadata = file.metadata()?;
        let page_count = (metadata.len() / PAGE_SIZE as u64) as u32;

        Ok(Arc::new(Self {
            id: FileId::new(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)),
            inner: Mutex::new(FileInner {
                file,
                page_count,
                deleted: BTreeSet::new(),
            }),
        }))
    }

    /// Open an existing file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<FileRef> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// The process-unique identity of this file.
    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Read a page's persisted contents.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page was never allocated or
    /// has been deleted.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        inner.check_allocated(self.id, page_id)?;

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::new();
        inner.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Persist a page's contents. Safe to call repeatedly (idempotent
    /// overwrite).
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page was never allocated or
    /// has been deleted.
    pub fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_allocated(self.id, page_id)?;

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(page.as_slice())?;
        inner.file.sync_all()?;

        Ok(())
    }

    /// Reserve a fresh page and return its id. The page starts zeroed.
    ///
    /// Reuses the lowest deleted page id when one exists; otherwise the
    /// file is extended by one page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let page_id = match inner.deleted.pop_first() {
            Some(reused) => PageId::new(reused),
            None => {
                let id = PageId::new(inner.page_count);
                inner.page_count += 1;
                id
            }
        };

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;
        inner.file.sync_all()?;

        Ok(page_id)
    }

    /// Reclaim a page's storage. The id becomes invalid for reads and
    /// writes until `allocate_page` hands it out again.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page was never allocated or is
    /// already deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_allocated(self.id, page_id)?;
        inner.deleted.insert(page_id.0);
        Ok(())
    }

    /// Number of live (allocated, not deleted) pages.
    pub fn page_count(&self) -> u32 {
        let inner = self.inner.lock();
        inner.page_count - inner.deleted.len() as u32
    }

    /// Total size of the file in bytes, including deleted pages.
    pub fn file_size(&self) -> u64 {
        (self.inner.lock().page_count as u64) * (PAGE_SIZE as u64)
    }
}

impl FileInner {
    fn check_allocated(&self, file: FileId, page_id: PageId) -> Result<()> {
        if page_id.0 >= self.page_count || self.deleted.contains(&page_id.0) {
            return Err(Error::PageNotFound {
                file,
                page: page_id,
            });
        }
        Ok(())
    }
}

impl PartialEq for DbFile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DbFile {}

impl std::fmt::Debug for DbFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbFile").field("id", &self.id).finish()
    }
}
