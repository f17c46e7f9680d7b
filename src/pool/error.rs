//! Page pool errors.

use crate::store::StoreError;

/// Errors that can occur while fetching a page into the pool.
#[derive(Debug)]
pub enum PoolError {
    /// Every frame is pinned and the pool is at capacity.
    ///
    /// Recoverable: unpinning frames makes them evictable again.
    PoolFull,

    /// The store failed to read the requested page.
    ///
    /// The frame that was allocated for the fetch has been returned to the
    /// free list; no other pool state changed.
    Store(StoreError),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::PoolFull => {
                write!(f, "page pool is at capacity and every frame is pinned")
            }
            PoolError::Store(e) => write!(f, "page fetch failed: {}", e),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PoolError {
    fn from(e: StoreError) -> Self {
        PoolError::Store(e)
    }
}
