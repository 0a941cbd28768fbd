//! framepool - A multi-file page cache with CLOCK second-chance eviction.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    storage clients                          │
//! │        (record layout, index structures, executors)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                              ↓                              │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │              Buffer Pool (buffer/)                    │  │
//! │  │   BufferManager: read / alloc / unpin / flush /       │  │
//! │  │                  dispose / introspect                 │  │
//! │  │   ┌─────────────────────────────────────────────┐     │  │
//! │  │   │  page index  (file, page) → frame           │     │  │
//! │  │   │  descriptor table  pins / dirty / refbit    │     │  │
//! │  │   │  ClockSweep  second-chance eviction         │     │  │
//! │  │   └─────────────────────────────────────────────┘     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │                              ↓                              │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │             Storage Layer (storage/)                  │  │
//! │  │        DbFile (page-granular I/O) + Page              │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All page access goes through the [`BufferManager`]: a bounded pool of
//! page-sized frames, a reverse index from (file, page id) to frame, and
//! a CLOCK replacement engine that respects pin counts absolutely. Pages
//! from any number of [`DbFile`]s share one pool.
//!
//! # Modules
//! - [`common`] - Shared primitives (FileId, PageId, FrameId, Error, config)
//! - [`buffer`] - The buffer manager, descriptor table and eviction engine
//! - [`storage`] - File I/O and the raw page
//!
//! # Quick Start
//! ```no_run
//! use framepool::{BufferManager, DbFile};
//!
//! let file = DbFile::create("data.db").unwrap();
//! let pool = BufferManager::new(64);
//!
//! // Allocate a page, write into it, declare it dirty on unpin
//! let (page_id, handle) = pool.alloc_page(&file).unwrap();
//! handle.write().as_mut_slice()[0] = 0xAB;
//! pool.unpin_page(&file, page_id, true).unwrap();
//!
//! // Persist and drop every cached page of the file
//! pool.flush_file(&file).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FileId, FrameId, PageId, Result};

pub use buffer::{BufferManager, FrameInfo, PageHandle, PoolSnapshot, PoolStats, StatsSnapshot};
pub use storage::{DbFile, FileRef, Page};
