//! File-backed store implementation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::pool::{FrameId, PagePool};
use crate::vfs::{BlockAccessFile, RandomAccessFile, Vfs, log_file_path};

use super::error::StoreError;
use super::{PageId, PageStore, PoolTransaction};

/// Options for opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the store files if they do not exist.
    pub create_if_missing: bool,

    /// Fail if the store data file already exists. Requires
    /// `create_if_missing`.
    pub error_if_exists: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

/// An open store: a block-access data file plus its transaction log.
///
/// `StoreFile` is the pool's I/O delegate for one database file. Pages live
/// at `page_id << page_shift` in the data file; the store must be created
/// with the same `page_shift` as the pool that caches its pages.
///
/// The log file is owned and closed with the store. Log replay and
/// write-ahead ordering are the transaction manager's concern, not the
/// store's.
///
/// # Shutdown
///
/// Closing is permanent and idempotent; after `close` every page I/O fails
/// with [`StoreError::Closed`]. For an orderly shutdown, call
/// [`release_pages`](StoreFile::release_pages) first so dirty cached pages
/// are written back; dropping the pool instead discards them.
pub struct StoreFile {
    data_file: Box<dyn BlockAccessFile>,
    log_file: Box<dyn RandomAccessFile>,
    page_shift: usize,
    closed: AtomicBool,
    bootstrap: Arc<BootstrapTransaction>,
}

impl StoreFile {
    /// Creates a store over already-open files.
    ///
    /// The data file should hold the advisory lock; `open` arranges this.
    pub fn create(
        data_file: Box<dyn BlockAccessFile>,
        log_file: Box<dyn RandomAccessFile>,
        page_shift: usize,
    ) -> Arc<StoreFile> {
        Arc::new_cyclic(|store| StoreFile {
            data_file,
            log_file,
            page_shift,
            closed: AtomicBool::new(false),
            bootstrap: Arc::new(BootstrapTransaction {
                store: store.clone(),
                frames: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Opens (or creates) the store at `path` through the given vfs.
    ///
    /// Takes the advisory lock on the data file and opens the transaction
    /// log next to it (the data file path with `.log` appended).
    ///
    /// # Errors
    ///
    /// - `StoreError::Vfs(VfsError::NotFound)` if the data file is missing
    ///   and `create_if_missing` is off
    /// - `StoreError::Vfs(VfsError::AlreadyLocked)` if another user holds
    ///   the data file lock
    pub fn open(
        vfs: &dyn Vfs,
        path: &Path,
        page_shift: usize,
        options: &StoreOptions,
    ) -> Result<Arc<StoreFile>, StoreError> {
        let (data_file, _data_size) = vfs.open_for_block_access(
            path,
            page_shift,
            options.create_if_missing,
            options.error_if_exists,
        )?;
        data_file.lock()?;

        // A missing log next to an existing data file is a valid state (the
        // store was closed cleanly), so the log is always created on demand.
        let log_path = log_file_path(path);
        let (log_file, _log_size) = vfs.open_for_random_access(&log_path, true, false)?;

        Ok(Self::create(data_file, log_file, page_shift))
    }

    /// The base-2 logarithm of the store's page size.
    pub fn page_shift(&self) -> usize {
        self.page_shift
    }

    /// The store's page size in bytes.
    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of pool frames currently caching this store's pages.
    pub fn cached_page_count(&self) -> usize {
        self.bootstrap.frames.lock().len()
    }

    /// Writes back and releases every pool frame caching this store's pages.
    ///
    /// Dirty frames are written to the data file as part of being
    /// unassigned; all frames return to the pool's free list. Call this
    /// before [`close`](PageStore::close) for an orderly shutdown.
    ///
    /// The caller must not hold pins on any of this store's pages.
    pub fn release_pages(&self, pool: &mut PagePool) {
        let frames: Vec<FrameId> = self.bootstrap.frames.lock().clone();
        pool.pin_transaction_pages(&frames);
        for frame in frames {
            pool.unassign_page_from_store(frame);
            pool.unpin_unassigned_frame(frame);
        }
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id.as_u64() << self.page_shift
    }
}

impl PageStore for StoreFile {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        debug_assert_eq!(buf.len(), self.page_size());
        self.data_file.read_at(self.page_offset(page_id), buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        debug_assert_eq!(buf.len(), self.page_size());
        self.data_file.write_at(buf, self.page_offset(page_id))?;
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("closing store");
        if let Err(error) = self.data_file.close() {
            log::warn!("closing store data file failed: {error}");
        }
        if let Err(error) = self.log_file.close() {
            log::warn!("closing store log file failed: {error}");
        }
    }

    fn init_transaction(&self) -> Arc<dyn PoolTransaction> {
        Arc::clone(&self.bootstrap) as Arc<dyn PoolTransaction>
    }
}

/// The store's bootstrap transaction.
///
/// Owns every frame the pool caches for the store. A transaction manager
/// layered on top would move frames to its own transactions on first
/// modification; until then they all live here.
struct BootstrapTransaction {
    store: Weak<StoreFile>,
    frames: Mutex<Vec<FrameId>>,
}

impl PoolTransaction for BootstrapTransaction {
    fn assign_page(&self, frame: FrameId, _page_id: PageId) {
        self.frames.lock().push(frame);
    }

    fn unassign_page(&self, frame: FrameId) {
        let mut frames = self.frames.lock();
        match frames.iter().position(|&id| id == frame) {
            Some(index) => {
                frames.swap_remove(index);
            }
            None => debug_assert!(false, "unassigned frame was not tracked"),
        }
    }

    fn unassign_persisted_page(&self, frame: FrameId) {
        // The bootstrap transaction keeps no undo log, so the persisted and
        // clean detach paths are identical here.
        self.unassign_page(frame);
    }

    fn store(&self) -> Arc<dyn PageStore> {
        let store: Arc<StoreFile> = self
            .store
            .upgrade()
            .expect("store released while its pages were still cached");
        store
    }
}
