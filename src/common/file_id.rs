//! File identifier type.

use std::fmt;

/// Identifies an open [`DbFile`](crate::storage::DbFile) for the lifetime
/// of the process.
///
/// Assigned from a monotonic counter when a file is created or opened.
/// Two handles that compare equal refer to the same `DbFile` value, which
/// is what the page index and frame descriptors key on — page ids are only
/// unique within their file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl FileId {
    /// Create a new FileId.
    #[inline]
    pub fn new(id: u64) -> Self {
        FileId(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}
