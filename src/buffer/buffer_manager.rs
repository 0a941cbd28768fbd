//! Buffer Manager - the core page caching layer.
//!
//! The [`BufferManager`] provides:
//! - Page caching between files and memory, keyed by (file, page id)
//! - Pin-based reference counting
//! - Automatic dirty page write-back on eviction
//! - CLOCK second-chance eviction

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::buffer::descriptor::{FrameDesc, FrameInfo};
use crate::buffer::page_handle::PageHandle;
use crate::buffer::replacer::ClockSweep;
use crate::buffer::stats::PoolStats;
use crate::common::{Error, FileId, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::FileRef;

/// Composite key for the page index: page ids are only unique per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PageKey {
    file: FileId,
    page: PageId,
}

impl PageKey {
    fn new(file: &FileRef, page: PageId) -> Self {
        Self {
            file: file.id(),
            page,
        }
    }
}

/// Mutable pool state, serialized by one mutex: the descriptor table, the
/// page index over it, and the clock hand. Two callers racing on the same
/// miss must not both claim a frame, and a frame being recycled must not
/// be visible to a concurrent lookup, so these always change together.
struct PoolCore {
    /// One descriptor per frame.
    descriptors: Vec<FrameDesc>,

    /// Maps (file, page id) to the frame caching that page.
    page_index: HashMap<PageKey, FrameId>,

    /// Eviction policy state.
    clock: ClockSweep,
}

/// Manages a fixed pool of frames caching pages from any number of files.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                       BufferManager                         │
/// │  ┌────────────────────────────────────────────────┐         │
/// │  │ core: Mutex<PoolCore>                          │         │
/// │  │   page_index   (file,page) → frame             │         │
/// │  │   descriptors  owner / pins / dirty / refbit   │         │
/// │  │   clock        hand cursor                     │         │
/// │  └────────────────────────────────────────────────┘         │
/// │  ┌────────────────────────────────────────────────┐         │
/// │  │ frames: Vec<RwLock<Page>>   (the byte buffers) │         │
/// │  └────────────────────────────────────────────────┘         │
/// │  stats: PoolStats (atomics, no lock)                        │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Pinning
/// `read_page`/`alloc_page` pin the page and return a [`PageHandle`];
/// every such call must be balanced by [`unpin_page`](Self::unpin_page),
/// which is also where dirtiness is declared. A nonzero pin count is an
/// absolute exclusion from eviction, never advisory. When every frame is
/// pinned, operations needing a frame fail with [`Error::BufferExhausted`]
/// rather than blocking; callers unpin and retry.
///
/// # Thread Safety
/// - `core`: one mutex over all metadata, held across each operation
///   including any file I/O it issues
/// - `frames`: per-frame `RwLock` — byte access by handle holders does not
///   take the pool lock
/// - `stats`: atomic counters
///
/// # Usage
/// ```ignore
/// let file = DbFile::create("data.db")?;
/// let pool = BufferManager::new(64);
///
/// let (page_id, handle) = pool.alloc_page(&file)?;
/// handle.write().as_mut_slice()[0] = 0xAB;
/// pool.unpin_page(&file, page_id, true)?;
///
/// pool.flush_file(&file)?;
/// ```
pub struct BufferManager {
    /// The frame pool: the only place page bytes live in memory.
    frames: Vec<RwLock<Page>>,

    /// Descriptor table, page index and clock hand.
    core: Mutex<PoolCore>,

    /// Performance counters.
    stats: PoolStats,

    /// Number of frames (immutable after construction).
    pool_size: usize,
}

impl BufferManager {
    /// Create a buffer manager with `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            frames: (0..pool_size).map(|_| RwLock::new(Page::new())).collect(),
            core: Mutex::new(PoolCore {
                descriptors: (0..pool_size).map(|_| FrameDesc::new()).collect(),
                page_index: HashMap::new(),
                clock: ClockSweep::new(pool_size),
            }),
            stats: PoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: read and allocate pages
    // ========================================================================

    /// Pin `page_id` of `file` into the pool and return a handle to it.
    ///
    /// A cached page is returned without I/O (its reference bit is set and
    /// its pin count incremented). Otherwise a frame is freed — possibly
    /// writing back a dirty victim — and the page is read from the file.
    ///
    /// # Errors
    /// - `Error::BufferExhausted` if every frame is pinned
    /// - `Error::PageNotFound` if the file does not have such a page
    pub fn read_page(&self, file: &FileRef, page_id: PageId) -> Result<PageHandle<'_>> {
        let key = PageKey::new(file, page_id);
        let mut core = self.core.lock();

        if let Some(&frame_id) = core.page_index.get(&key) {
            let desc = &mut core.descriptors[frame_id.0];
            desc.mark_referenced();
            desc.pin();
            self.stats.record_hit();
            return Ok(self.handle(frame_id, file, page_id));
        }

        self.stats.record_miss();
        let frame_id = self.alloc_frame(&mut core)?;

        // A failed read leaves the frame empty and unindexed.
        let page = file.read_page(page_id)?;
        self.stats.record_disk_read();
        self.frames[frame_id.0].write().copy_from(&page);

        core.descriptors[frame_id.0].set(Arc::clone(file), page_id);
        core.page_index.insert(key, frame_id);

        Ok(self.handle(frame_id, file, page_id))
    }

    /// Allocate a fresh page in `file` and pin it into the pool.
    ///
    /// The frame is claimed before the on-disk allocation so a
    /// pool-exhausted failure cannot leak a page in the file.
    ///
    /// # Errors
    /// - `Error::BufferExhausted` if every frame is pinned
    /// - I/O errors from the file's allocation
    pub fn alloc_page(&self, file: &FileRef) -> Result<(PageId, PageHandle<'_>)> {
        let mut core = self.core.lock();

        let frame_id = self.alloc_frame(&mut core)?;
        let page_id = file.allocate_page()?;

        self.frames[frame_id.0].write().reset();
        core.descriptors[frame_id.0].set(Arc::clone(file), page_id);
        core.page_index.insert(PageKey::new(file, page_id), frame_id);

        Ok((page_id, self.handle(frame_id, file, page_id)))
    }

    // ========================================================================
    // Public API: unpin
    // ========================================================================

    /// Release one pin on `page_id` of `file`, optionally marking the page
    /// dirty.
    ///
    /// A page absent from the cache has nothing to unpin: that case is a
    /// no-op, not an error. The dirty flag is monotonic here — `false`
    /// never clears a previously set flag.
    ///
    /// The page stays cached at pin count zero; it is only reclaimed when
    /// the clock sweep later selects it.
    ///
    /// # Errors
    /// - `Error::PageNotPinned` if the pin count is already zero (unpin
    ///   without a matching pin is a caller bug); no state is changed
    pub fn unpin_page(&self, file: &FileRef, page_id: PageId, mark_dirty: bool) -> Result<()> {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_index.get(&PageKey::new(file, page_id)) else {
            return Ok(());
        };

        let desc = &mut core.descriptors[frame_id.0];
        if !desc.is_pinned() {
            return Err(Error::PageNotPinned {
                file: file.id(),
                page: page_id,
                frame: frame_id,
            });
        }

        if mark_dirty {
            desc.mark_dirty();
        }
        desc.unpin();

        Ok(())
    }

    // ========================================================================
    // Public API: flush and dispose
    // ========================================================================

    /// Write back and drop every cached page of `file`.
    ///
    /// Afterwards no frame belongs to the file and all its dirty data has
    /// been persisted. Pins are checked before anything is written: a
    /// pinned page fails the flush up front, leaving that frame and all
    /// frames after it (in frame order) untouched — callers resolve the
    /// pins and retry.
    ///
    /// # Errors
    /// - `Error::PagePinned` if any page of the file is currently pinned
    /// - `Error::CorruptDescriptor` if a frame claims the file but is
    ///   marked invalid (internal invariant violation)
    /// - I/O errors from write-back
    pub fn flush_file(&self, file: &FileRef) -> Result<()> {
        let mut core = self.core.lock();
        let PoolCore {
            descriptors,
            page_index,
            ..
        } = &mut *core;

        for (i, desc) in descriptors.iter_mut().enumerate() {
            if !desc.owned_by(file.id()) {
                continue;
            }
            let frame_id = FrameId::new(i);

            if desc.is_pinned() {
                return Err(Error::PagePinned {
                    file: file.id(),
                    page: desc.page_id(),
                    frame: frame_id,
                    pin_count: desc.pin_count(),
                });
            }
            if !desc.is_valid() {
                return Err(Error::CorruptDescriptor {
                    frame: frame_id,
                    valid: desc.is_valid(),
                    dirty: desc.is_dirty(),
                    referenced: desc.is_referenced(),
                });
            }

            if desc.is_dirty() {
                let page = self.frames[i].read();
                file.write_page(desc.page_id(), &page)?;
                drop(page);
                desc.clear_dirty();
                self.stats.record_disk_write();
            }

            page_index.remove(&PageKey {
                file: file.id(),
                page: desc.page_id(),
            });
            desc.clear();
        }

        Ok(())
    }

    /// Delete `page_id` of `file`, dropping it from the cache if present.
    ///
    /// No write-back occurs — the page's storage is being reclaimed, not
    /// preserved. Disposal succeeds even if the page was never cached; the
    /// deletion is always forwarded to the file.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is cached and pinned (the page is
    ///   neither dropped nor deleted)
    /// - `Error::PageNotFound` from the file if the page was never
    ///   allocated
    pub fn dispose_page(&self, file: &FileRef, page_id: PageId) -> Result<()> {
        let key = PageKey::new(file, page_id);

        {
            let mut core = self.core.lock();
            let PoolCore {
                descriptors,
                page_index,
                ..
            } = &mut *core;

            if let Some(&frame_id) = page_index.get(&key) {
                let desc = &mut descriptors[frame_id.0];
                if desc.is_pinned() {
                    return Err(Error::PagePinned {
                        file: file.id(),
                        page: page_id,
                        frame: frame_id,
                        pin_count: desc.pin_count(),
                    });
                }
                desc.clear();
                page_index.remove(&key);
            }
        }

        file.delete_page(page_id)
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    /// Snapshot every frame's descriptor plus the valid-frame count.
    /// Read-only; no side effects.
    pub fn introspect(&self) -> PoolSnapshot {
        let core = self.core.lock();
        let frames: Vec<FrameInfo> = core
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, desc)| desc.snapshot(FrameId::new(i)))
            .collect();
        let valid_frames = frames.iter().filter(|f| f.valid).count();

        PoolSnapshot {
            frames,
            valid_frames,
        }
    }

    /// Whether `page_id` of `file` is currently cached. Does not pin or
    /// touch the reference bit.
    pub fn contains_page(&self, file: &FileRef, page_id: PageId) -> bool {
        self.core
            .lock()
            .page_index
            .contains_key(&PageKey::new(file, page_id))
    }

    /// Number of pages currently cached.
    pub fn cached_page_count(&self) -> usize {
        self.core.lock().page_index.len()
    }

    /// Number of frames in the pool.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Performance counters.
    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    // ========================================================================
    // Internal: frame allocation and eviction
    // ========================================================================

    /// Free a frame for reuse, evicting the clock's victim if necessary.
    ///
    /// On return the frame's descriptor is invalid and it has no page
    /// index entry. A write-back failure propagates with the victim still
    /// intact (mapped, dirty), so nothing is half-updated.
    fn alloc_frame(&self, core: &mut PoolCore) -> Result<FrameId> {
        let PoolCore {
            descriptors,
            page_index,
            clock,
        } = core;

        let frame_id = clock.select(descriptors)?;
        let desc = &mut descriptors[frame_id.0];

        if let Some((file, page_id)) = desc.owner() {
            if desc.is_dirty() {
                let page = self.frames[frame_id.0].read();
                file.write_page(page_id, &page)?;
                self.stats.record_disk_write();
            }

            page_index.remove(&PageKey {
                file: file.id(),
                page: page_id,
            });
            desc.clear();
            self.stats.record_eviction();
            log::trace!("evicted page {} of {} from {}", page_id, file.id(), frame_id);
        }

        Ok(frame_id)
    }

    fn handle(&self, frame_id: FrameId, file: &FileRef, page_id: PageId) -> PageHandle<'_> {
        PageHandle::new(frame_id, page_id, file.id(), &self.frames[frame_id.0])
    }
}

impl Drop for BufferManager {
    /// Write back every dirty frame before the pool is released. Frames
    /// without a valid descriptor are skipped; write failures are logged,
    /// not propagated.
    fn drop(&mut self) {
        let core = self.core.get_mut();

        for (i, desc) in core.descriptors.iter().enumerate() {
            if !desc.is_dirty() {
                continue;
            }
            if let Some((file, page_id)) = desc.owner() {
                let page = self.frames[i].read();
                if let Err(e) = file.write_page(page_id, &page) {
                    log::error!(
                        "shutdown write-back of page {} of {} failed: {}",
                        page_id,
                        file.id(),
                        e
                    );
                }
            }
        }
    }
}

/// Point-in-time view of the whole pool, from
/// [`BufferManager::introspect`].
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    /// One entry per frame, in frame order.
    pub frames: Vec<FrameInfo>,
    /// Number of frames currently caching a page.
    pub valid_frames: usize,
}

impl PoolSnapshot {
    /// Descriptor snapshot for one frame.
    pub fn frame(&self, frame_id: FrameId) -> &FrameInfo {
        &self.frames[frame_id.0]
    }
}

impl std::fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for info in &self.frames {
            writeln!(f, "{}", info)?;
        }
        write!(f, "Total Number of Valid Frames: {}", self.valid_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DbFile;
    use tempfile::tempdir;

    /// Helper to create a pool plus one file to cache pages from.
    fn create_test_pool(pool_size: usize) -> (BufferManager, FileRef, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = DbFile::create(dir.path().join("test.db")).unwrap();
        (BufferManager::new(pool_size), file, dir)
    }

    #[test]
    fn test_alloc_page() {
        let (pool, file, _dir) = create_test_pool(10);

        let (pid, _handle) = pool.alloc_page(&file).unwrap();
        assert_eq!(pid, PageId::new(0));
        pool.unpin_page(&file, pid, false).unwrap();

        let (pid, _handle) = pool.alloc_page(&file).unwrap();
        assert_eq!(pid, PageId::new(1));
        pool.unpin_page(&file, pid, false).unwrap();

        assert_eq!(pool.cached_page_count(), 2);
    }

    #[test]
    fn test_read_page_roundtrip() {
        let (pool, file, _dir) = create_test_pool(10);

        let (pid, handle) = pool.alloc_page(&file).unwrap();
        handle.write().as_mut_slice()[0] = 0xAB;
        pool.unpin_page(&file, pid, true).unwrap();

        let handle = pool.read_page(&file, pid).unwrap();
        assert_eq!(handle.read().as_slice()[0], 0xAB);
        pool.unpin_page(&file, pid, false).unwrap();
    }

    #[test]
    fn test_cache_hit_avoids_io() {
        let (pool, file, _dir) = create_test_pool(10);

        let (pid, _handle) = pool.alloc_page(&file).unwrap();
        pool.unpin_page(&file, pid, false).unwrap();

        let before = pool.stats().snapshot();
        let _handle = pool.read_page(&file, pid).unwrap();
        pool.unpin_page(&file, pid, false).unwrap();
        let after = pool.stats().snapshot();

        assert_eq!(after.hits, before.hits + 1);
        assert_eq!(after.disk_reads, before.disk_reads);
    }

    #[test]
    fn test_read_missing_page_fails() {
        let (pool, file, _dir) = create_test_pool(10);

        let result = pool.read_page(&file, PageId::new(999));
        assert!(matches!(result, Err(Error::PageNotFound { .. })));
        // The failed miss left no mapping behind
        assert_eq!(pool.cached_page_count(), 0);
    }

    #[test]
    fn test_pin_counts_via_introspect() {
        let (pool, file, _dir) = create_test_pool(10);

        let (pid, _h) = pool.alloc_page(&file).unwrap();
        let h2 = pool.read_page(&file, pid).unwrap();
        let frame_id = h2.frame_id();

        assert_eq!(pool.introspect().frame(frame_id).pin_count, 2);

        pool.unpin_page(&file, pid, false).unwrap();
        pool.unpin_page(&file, pid, false).unwrap();
        assert_eq!(pool.introspect().frame(frame_id).pin_count, 0);

        // Still cached after the pins are gone
        assert!(pool.contains_page(&file, pid));
    }

    #[test]
    fn test_unpin_unpinned_page_fails() {
        let (pool, file, _dir) = create_test_pool(10);

        let (pid, _h) = pool.alloc_page(&file).unwrap();
        pool.unpin_page(&file, pid, false).unwrap();

        let result = pool.unpin_page(&file, pid, false);
        assert!(matches!(result, Err(Error::PageNotPinned { .. })));
    }

    #[test]
    fn test_unpin_uncached_page_is_noop() {
        let (pool, file, _dir) = create_test_pool(10);
        assert!(pool.unpin_page(&file, PageId::new(5), true).is_ok());
    }

    #[test]
    fn test_eviction_writes_back_dirty_page() {
        let (pool, file, _dir) = create_test_pool(1);

        let (pid, handle) = pool.alloc_page(&file).unwrap();
        handle.write().as_mut_slice()[0] = 0x42;
        pool.unpin_page(&file, pid, true).unwrap();

        // Allocating a second page evicts the first through the only frame
        let (pid2, _h) = pool.alloc_page(&file).unwrap();
        pool.unpin_page(&file, pid2, false).unwrap();

        let snapshot = pool.stats().snapshot();
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.disk_writes, 1);
        assert!(!pool.contains_page(&file, pid));

        // The evicted page's data survived on disk
        let handle = pool.read_page(&file, pid).unwrap();
        assert_eq!(handle.read().as_slice()[0], 0x42);
        pool.unpin_page(&file, pid, false).unwrap();
    }

    #[test]
    fn test_exhaustion_and_retry() {
        let (pool, file, _dir) = create_test_pool(2);

        let (pid0, _h0) = pool.alloc_page(&file).unwrap();
        let (_pid1, _h1) = pool.alloc_page(&file).unwrap();

        let result = pool.alloc_page(&file);
        assert!(matches!(result, Err(Error::BufferExhausted { pool_size: 2 })));

        pool.unpin_page(&file, pid0, false).unwrap();
        let (pid2, _h2) = pool.alloc_page(&file).unwrap();
        assert_eq!(pid2, PageId::new(2));
    }

    #[test]
    fn test_two_files_same_page_id() {
        let dir = tempdir().unwrap();
        let a = DbFile::create(dir.path().join("a.db")).unwrap();
        let b = DbFile::create(dir.path().join("b.db")).unwrap();
        let pool = BufferManager::new(4);

        let (pa, ha) = pool.alloc_page(&a).unwrap();
        let (pb, hb) = pool.alloc_page(&b).unwrap();
        assert_eq!(pa, pb);
        assert_ne!(ha.frame_id(), hb.frame_id());

        ha.write().as_mut_slice()[0] = 0xAA;
        hb.write().as_mut_slice()[0] = 0xBB;
        pool.unpin_page(&a, pa, true).unwrap();
        pool.unpin_page(&b, pb, true).unwrap();

        assert_eq!(pool.read_page(&a, pa).unwrap().read().as_slice()[0], 0xAA);
        pool.unpin_page(&a, pa, false).unwrap();
        assert_eq!(pool.read_page(&b, pb).unwrap().read().as_slice()[0], 0xBB);
        pool.unpin_page(&b, pb, false).unwrap();
    }

    #[test]
    fn test_introspect_display() {
        let (pool, file, _dir) = create_test_pool(2);

        let (pid, _h) = pool.alloc_page(&file).unwrap();
        pool.unpin_page(&file, pid, false).unwrap();

        let snapshot = pool.introspect();
        assert_eq!(snapshot.valid_frames, 1);

        let rendered = format!("{}", snapshot);
        assert!(rendered.contains("Frame(1): empty"));
        assert!(rendered.contains("Total Number of Valid Frames: 1"));
    }

    #[test]
    fn test_shutdown_writes_back_dirty_pages() {
        let dir = tempdir().unwrap();
        let file = DbFile::create(dir.path().join("test.db")).unwrap();

        {
            let pool = BufferManager::new(4);
            let (pid, handle) = pool.alloc_page(&file).unwrap();
            assert_eq!(pid, PageId::new(0));
            handle.write().as_mut_slice()[0] = 0x77;
            pool.unpin_page(&file, pid, true).unwrap();
            // No flush: the pool's teardown must persist the page
        }

        let page = file.read_page(PageId::new(0)).unwrap();
        assert_eq!(page.as_slice()[0], 0x77);
    }
}
