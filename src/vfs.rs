//! Platform file services.
//!
//! Stores do all of their I/O through the traits in this module, so the rest
//! of the crate never touches the filesystem directly. The default
//! implementation (`StdVfs`) proxies to `std::fs`; `MemoryVfs` provides the
//! same observable semantics entirely in memory.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | StoreFile         |
//! +-------------------+
//!     |           |
//!     v           v
//! +-----------+ +------------------+
//! | RandomAc- | | BlockAccessFile  |
//! | cessFile  | | (data file)      |
//! | (log)     | +------------------+
//! +-----------+
//!       opened through the Vfs trait
//! ```
//!
//! There is no process-wide default: embedders inject a `Vfs` wherever a
//! store is opened.

pub mod error;
pub mod fault;
pub mod file;
pub mod memory;

pub use error::VfsError;
pub use fault::{FaultSwitch, FaultyBlockFile};
pub use file::StdVfs;
pub use memory::MemoryVfs;

use std::path::{Path, PathBuf};

/// Platform services used to open and delete the files backing a store.
///
/// A `Vfs` is injected into store construction; nothing in this crate holds a
/// global instance.
pub trait Vfs: Send + Sync {
    /// Opens a file without any assumptions on the I/O access pattern.
    ///
    /// This method is used for transaction logs.
    ///
    /// Returns the opened file together with its size in bytes at open time;
    /// the caller is responsible for tracking size changes it causes.
    ///
    /// # Errors
    ///
    /// Opening a missing file with `create_if_missing == false` yields
    /// `VfsError::NotFound`. All other failures yield `VfsError::Io`.
    fn open_for_random_access(
        &self,
        path: &Path,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn RandomAccessFile>, u64), VfsError>;

    /// Opens a file designed for reads and writes at block granularity.
    ///
    /// This method is used for store data files. The block size is
    /// `1 << block_shift` and is guaranteed to be a power of two; reads and
    /// writes must use offsets and lengths that are multiples of it.
    ///
    /// Returns the opened file together with its size in bytes at open time.
    ///
    /// # Errors
    ///
    /// Opening a missing file with `create_if_missing == false` yields
    /// `VfsError::NotFound`. All other failures yield `VfsError::Io`.
    fn open_for_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn BlockAccessFile>, u64), VfsError>;

    /// Deletes a file from the filesystem.
    ///
    /// # Errors
    ///
    /// Deleting a missing file yields `VfsError::NotFound`.
    fn remove_file(&self, path: &Path) -> Result<(), VfsError>;
}

/// File I/O interface without any assumptions on the access pattern.
///
/// Used for transaction log files. Implementations may buffer, but any
/// buffering must obey `flush` and `sync`.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Reading past the end of the file is an I/O error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError>;

    /// Writes all of `data` starting at `offset`, extending the file if
    /// needed.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError>;

    /// Pushes application-level buffers to the operating system.
    ///
    /// After a successful flush the data survives an application crash, but
    /// not necessarily a system crash or power failure; use `sync` for that.
    fn flush(&self) -> Result<(), VfsError>;

    /// Forces written data to persistent storage (fsync).
    fn sync(&self) -> Result<(), VfsError>;

    /// Closes the file. Further I/O on the handle fails.
    fn close(&self) -> Result<(), VfsError>;
}

/// Interface for accessing files via block-based I/O.
///
/// Used for store data files, where the block size is the store page size.
/// Offsets and buffer lengths passed to `read_at` and `write_at` must be
/// multiples of the block size the file was opened with; implementations
/// check this in debug builds.
pub trait BlockAccessFile: Send + Sync {
    /// Reads a whole number of blocks starting at `offset`.
    ///
    /// # Errors
    ///
    /// Reading past the end of the file is an I/O error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError>;

    /// Writes a whole number of blocks starting at `offset`, extending the
    /// file if needed.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError>;

    /// Forces written data to persistent storage (fsync).
    fn sync(&self) -> Result<(), VfsError>;

    /// Acquires an advisory exclusive lock on the file.
    ///
    /// The lock is held until the file is closed.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::AlreadyLocked` if another user holds the lock.
    fn lock(&self) -> Result<(), VfsError>;

    /// Closes the file, releasing the lock if held. Further I/O on the
    /// handle fails.
    fn close(&self) -> Result<(), VfsError>;
}

/// Derives the transaction-log path for a store data file path.
///
/// The log lives next to the data file, with `.log` appended to the full
/// file name.
pub fn log_file_path(store_path: &Path) -> PathBuf {
    let mut path = store_path.as_os_str().to_os_string();
    path.push(".log");
    PathBuf::from(path)
}
