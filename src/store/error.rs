//! Store errors.

use crate::vfs::VfsError;

/// Errors produced by store page I/O.
#[derive(Debug)]
pub enum StoreError {
    /// The store has been closed and no longer accepts page I/O.
    ///
    /// A store transitions to this state through `PageStore::close`, either
    /// explicitly or because the pool closed it after a failed dirty
    /// write-back.
    Closed,

    /// Underlying file error.
    Vfs(VfsError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Closed => write!(f, "store is closed"),
            StoreError::Vfs(e) => write!(f, "store file error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Vfs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VfsError> for StoreError {
    fn from(e: VfsError) -> Self {
        StoreError::Vfs(e)
    }
}
