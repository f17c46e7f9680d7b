//! Page pool coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{PageId, PageStore, StoreId};

use super::error::PoolError;
use super::frame::{Frame, FrameId, ListTag};
use super::list::FrameList;

/// Configuration for a page pool.
#[derive(Debug, Clone)]
pub struct PagePoolOptions {
    /// The base-2 logarithm of the page size. Fixed for the pool's lifetime;
    /// every store cached by the pool must use the same value.
    ///
    /// Typical values are 9 (512B) through 16 (64KB).
    pub page_shift: usize,

    /// Maximum number of frames the pool will ever create.
    ///
    /// This bounds the pool's memory at `page_capacity << page_shift` bytes.
    /// Frames are created lazily, so an idle pool costs nothing.
    pub page_capacity: usize,
}

impl Default for PagePoolOptions {
    fn default() -> Self {
        Self {
            page_shift: 12,     // 4KB pages
            page_capacity: 1024, // 1024 * 4KB = 4MB
        }
    }
}

/// Whether a page fetch must load the on-disk contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFetchMode {
    /// Read the page from the store into the frame.
    FetchData,

    /// Skip the read; the buffer contents are unspecified and the caller
    /// commits to overwriting the frame before reading from it.
    IgnoreData,
}

/// A bounded, shared cache of fixed-size page frames.
///
/// The pool serves page-fetch requests for any number of stores, keeping at
/// most one resident frame per `(store, page)` and at most `page_capacity`
/// frames in total. Returned frames are pinned; unpinned frames park on the
/// LRU list and are evicted, with dirty write-back, when a fetch needs a
/// frame and none is free.
///
/// # Pinning discipline
///
/// Every successful [`store_page`](PagePool::store_page) (and every raw
/// [`alloc_page`](PagePool::alloc_page)) adds one pin that the caller must
/// return through [`unpin_store_page`](PagePool::unpin_store_page) (or
/// [`unpin_unassigned_frame`](PagePool::unpin_unassigned_frame)). Unpinning
/// more than was pinned is a programming error, caught in debug builds.
///
/// # Dropping the pool
///
/// Dropping a pool releases all frame memory without writing anything back:
/// dirty frames still on the LRU list are silently discarded. An orderly
/// shutdown writes them back first by releasing each store's cached pages
/// (`StoreFile::release_pages`); dropping without doing so is the crash-close
/// path, where further I/O is undesirable.
pub struct PagePool {
    page_shift: usize,
    page_size: usize,
    page_capacity: usize,

    /// Frame slab. Grows lazily up to `page_capacity`; frames are never
    /// freed individually.
    frames: Vec<Frame>,

    /// Unpinned, unassigned frames. Used LIFO so the most recently freed
    /// frame, likeliest to still be in CPU caches, is reused first.
    free_list: FrameList,

    /// Unpinned, assigned frames, least recently unpinned at the front.
    lru_list: FrameList,

    /// Maps `(store, page)` to its unique resident frame.
    resident: HashMap<(StoreId, PageId), FrameId>,

    /// Number of frames with at least one pin.
    pinned_frames: usize,
}

impl PagePool {
    /// Creates an empty pool.
    ///
    /// No frames are allocated up front.
    ///
    /// # Example
    ///
    /// ```
    /// use pagepool::pool::{PagePool, PagePoolOptions};
    ///
    /// let pool = PagePool::new(PagePoolOptions {
    ///     page_shift: 12,
    ///     page_capacity: 64,
    /// });
    /// assert_eq!(pool.page_size(), 4096);
    /// assert_eq!(pool.allocated_pages(), 0);
    /// ```
    pub fn new(options: PagePoolOptions) -> Self {
        Self {
            page_shift: options.page_shift,
            page_size: 1 << options.page_shift,
            page_capacity: options.page_capacity,
            frames: Vec::new(),
            free_list: FrameList::new(ListTag::Free),
            lru_list: FrameList::new(ListTag::Lru),
            resident: HashMap::new(),
            pinned_frames: 0,
        }
    }

    /// The base-2 logarithm of the page size.
    pub fn page_shift(&self) -> usize {
        self.page_shift
    }

    /// The page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The maximum number of frames the pool will create.
    pub fn page_capacity(&self) -> usize {
        self.page_capacity
    }

    /// Number of frames created so far.
    pub fn allocated_pages(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames on the free list.
    pub fn unused_pages(&self) -> usize {
        self.free_list.len()
    }

    /// Number of frames with at least one pin.
    pub fn pinned_pages(&self) -> usize {
        self.pinned_frames
    }

    /// Fetches a store page into the pool and pins its frame.
    ///
    /// If `(store, page_id)` is already resident, the existing frame is
    /// re-pinned and returned. Otherwise a frame is obtained from the free
    /// list, by lazy growth, or by evicting the least recently unpinned
    /// frame (writing it back first if dirty), and the page is bound to it,
    /// reading its contents from the store under
    /// [`PageFetchMode::FetchData`].
    ///
    /// Every successful call must be matched by an
    /// [`unpin_store_page`](PagePool::unpin_store_page).
    ///
    /// Note that a dirty eviction performed on behalf of this call can fail
    /// to write back; that failure closes the *evicted* page's store and is
    /// not reported here, because this caller asked for an unrelated page.
    ///
    /// # Errors
    ///
    /// - [`PoolError::PoolFull`] if every frame is pinned and the pool is at
    ///   capacity; nothing changed.
    /// - [`PoolError::Store`] if the store failed to read the page; the
    ///   frame went back to the free list.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::path::Path;
    /// # use std::sync::Arc;
    /// # use pagepool::pool::{PageFetchMode, PagePool, PagePoolOptions};
    /// # use pagepool::store::{PageId, PageStore, StoreFile, StoreOptions};
    /// # use pagepool::vfs::MemoryVfs;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut pool = PagePool::new(PagePoolOptions::default());
    /// let vfs = MemoryVfs::new();
    /// let store: Arc<dyn PageStore> = StoreFile::open(
    ///     &vfs,
    ///     Path::new("db.pages"),
    ///     pool.page_shift(),
    ///     &StoreOptions::default(),
    /// )?;
    /// let frame = pool.store_page(&store, PageId::new(0), PageFetchMode::IgnoreData)?;
    /// pool.page_data_mut(frame)[0] = 42;
    /// pool.mark_dirty(frame);
    /// pool.unpin_store_page(frame);
    /// # Ok(())
    /// # }
    /// ```
    pub fn store_page(
        &mut self,
        store: &Arc<dyn PageStore>,
        page_id: PageId,
        fetch_mode: PageFetchMode,
    ) -> Result<FrameId, PoolError> {
        let key = (StoreId::of(store), page_id);
        if let Some(&frame_id) = self.resident.get(&key) {
            debug_assert_eq!(
                self.frames[frame_id.as_usize()]
                    .assignment()
                    .map(|a| (a.store_id, a.page_id)),
                Some(key)
            );
            // The frame is either pinned by another caller or waiting on the
            // LRU list; pin_store_page handles both.
            self.pin_store_page(frame_id);
            return Ok(frame_id);
        }

        let Some(frame_id) = self.alloc_page() else {
            return Err(PoolError::PoolFull);
        };

        match self.assign_page_to_store(frame_id, store, page_id, fetch_mode) {
            Ok(()) => Ok(frame_id),
            Err(error) => {
                self.unpin_unassigned_frame(frame_id);
                Err(error)
            }
        }
    }

    /// Removes one pin from an assigned frame.
    ///
    /// When the last pin goes away, the frame joins the back of the LRU list
    /// and becomes an eviction candidate.
    pub fn unpin_store_page(&mut self, frame_id: FrameId) {
        debug_assert!(self.frames[frame_id.as_usize()].assignment().is_some());
        if self.remove_pin(frame_id) {
            self.lru_list.push_back(&mut self.frames, frame_id);
        }
    }

    /// Removes one pin from an unassigned frame.
    ///
    /// When the last pin goes away, the frame is pushed onto the free list.
    pub fn unpin_unassigned_frame(&mut self, frame_id: FrameId) {
        debug_assert!(self.frames[frame_id.as_usize()].assignment().is_none());
        if self.remove_pin(frame_id) {
            self.free_list.push_front(&mut self.frames, frame_id);
        }
    }

    /// Adds a pin to an assigned frame, removing it from the LRU list if it
    /// was unpinned.
    pub fn pin_store_page(&mut self, frame_id: FrameId) {
        debug_assert!(self.frames[frame_id.as_usize()].assignment().is_some());
        if self.frames[frame_id.as_usize()].is_unpinned() {
            self.lru_list.remove(&mut self.frames, frame_id);
        }
        self.add_pin(frame_id);
    }

    /// Re-pins an externally maintained list of frames.
    ///
    /// The frames' assignments must all name the same transaction. Used by
    /// the transaction layer to protect a transaction's pages from eviction
    /// while it operates on them.
    pub fn pin_transaction_pages(&mut self, frames: &[FrameId]) {
        for &frame_id in frames {
            self.pin_store_page(frame_id);
        }
    }

    /// Obtains a pinned, unassigned frame, or `None` when the pool is full.
    ///
    /// Tried in order: the free list (LIFO), lazy growth below
    /// `page_capacity`, then eviction of the LRU frame, which writes the
    /// victim back first when dirty.
    pub fn alloc_page(&mut self) -> Option<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front(&mut self.frames) {
            let frame = &self.frames[frame_id.as_usize()];
            debug_assert!(frame.assignment().is_none());
            debug_assert!(!frame.is_dirty());
            self.add_pin(frame_id);
            return Some(frame_id);
        }

        if self.frames.len() < self.page_capacity {
            let frame_id = FrameId::new(self.frames.len());
            self.frames.push(Frame::new(self.page_size));
            self.add_pin(frame_id);
            return Some(frame_id);
        }

        if let Some(frame_id) = self.lru_list.pop_front(&mut self.frames) {
            self.add_pin(frame_id);
            self.unassign_page_from_store(frame_id);
            return Some(frame_id);
        }

        None
    }

    /// Binds a pinned, unassigned frame to `(store, page_id)`.
    ///
    /// Registers the frame with the store's bootstrap transaction, loads the
    /// page contents under [`PageFetchMode::FetchData`], and enters the
    /// frame in the resident map.
    ///
    /// # Errors
    ///
    /// [`PoolError::Store`] if the read fails; the frame is unassigned again
    /// (but still pinned) and nothing was entered in the resident map.
    pub fn assign_page_to_store(
        &mut self,
        frame_id: FrameId,
        store: &Arc<dyn PageStore>,
        page_id: PageId,
        fetch_mode: PageFetchMode,
    ) -> Result<(), PoolError> {
        let store_id = StoreId::of(store);
        let transaction = store.init_transaction();

        self.frames[frame_id.as_usize()].assign(Arc::clone(&transaction), store_id, page_id);
        transaction.assign_page(frame_id, page_id);

        match fetch_mode {
            PageFetchMode::FetchData => {
                let buf = self.frames[frame_id.as_usize()].data_mut().as_mut_slice();
                if let Err(error) = store.read_page(page_id, buf) {
                    transaction.unassign_page(frame_id);
                    self.frames[frame_id.as_usize()].clear_assignment();
                    return Err(error.into());
                }
            }
            PageFetchMode::IgnoreData => {
                // Recognizable garbage, so code reading page data it never
                // wrote stands out in debug builds.
                #[cfg(debug_assertions)]
                self.frames[frame_id.as_usize()]
                    .data_mut()
                    .as_mut_slice()
                    .fill(0xCD);
            }
        }

        let previous = self.resident.insert((store_id, page_id), frame_id);
        debug_assert!(previous.is_none(), "page was already resident");
        Ok(())
    }

    /// Detaches a frame from its store, writing the page back first if
    /// dirty.
    ///
    /// The resident map entry is removed before any write-back I/O starts,
    /// so the evicted page is never observable through a lookup mid-flight.
    /// A failed write-back is not reported to the caller; it closes the
    /// store instead (the page's data is already lost, so the store stops
    /// accepting writes), and the detach itself always completes.
    ///
    /// The frame keeps its pins and becomes unassigned and clean.
    pub fn unassign_page_from_store(&mut self, frame_id: FrameId) {
        debug_assert!(
            self.frames[frame_id.as_usize()].assignment().is_some(),
            "frame is not assigned to a store"
        );
        let Some(assignment) = self.frames[frame_id.as_usize()].assignment() else {
            return;
        };
        let (transaction, store_id, page_id) = (
            Arc::clone(&assignment.transaction),
            assignment.store_id,
            assignment.page_id,
        );

        let removed = self.resident.remove(&(store_id, page_id));
        debug_assert_eq!(removed, Some(frame_id));

        if self.frames[frame_id.as_usize()].is_dirty() {
            let store = transaction.store();
            let write_result =
                store.write_page(page_id, self.frames[frame_id.as_usize()].data().as_slice());
            transaction.unassign_persisted_page(frame_id);
            if let Err(error) = write_result {
                log::warn!(
                    "write-back of evicted page {page_id:?} failed, closing its store: {error}"
                );
                store.close();
            }
        } else {
            transaction.unassign_page(frame_id);
        }

        self.frames[frame_id.as_usize()].clear_assignment();
    }

    /// Read access to a pinned frame's page buffer.
    pub fn page_data(&self, frame_id: FrameId) -> &[u8] {
        let frame = &self.frames[frame_id.as_usize()];
        debug_assert!(!frame.is_unpinned(), "page data access requires a pin");
        frame.data().as_slice()
    }

    /// Write access to a pinned frame's page buffer.
    ///
    /// Mutating the buffer does not set the dirty flag; callers that change
    /// page contents must also call [`mark_dirty`](PagePool::mark_dirty).
    pub fn page_data_mut(&mut self, frame_id: FrameId) -> &mut [u8] {
        let frame = &mut self.frames[frame_id.as_usize()];
        debug_assert!(!frame.is_unpinned(), "page data access requires a pin");
        frame.data_mut().as_mut_slice()
    }

    /// Marks an assigned frame's buffer as diverged from the on-disk page.
    ///
    /// Dirty frames are written back through their store before eviction.
    pub fn mark_dirty(&mut self, frame_id: FrameId) {
        self.frames[frame_id.as_usize()].mark_dirty();
    }

    /// Clears a frame's dirty flag.
    ///
    /// For the transaction layer, after it persisted the page itself.
    pub fn clear_dirty(&mut self, frame_id: FrameId) {
        self.frames[frame_id.as_usize()].clear_dirty();
    }

    /// Whether the frame's buffer diverges from the on-disk page.
    pub fn is_dirty(&self, frame_id: FrameId) -> bool {
        self.frames[frame_id.as_usize()].is_dirty()
    }

    /// Whether the frame has no pins.
    pub fn is_unpinned(&self, frame_id: FrameId) -> bool {
        self.frames[frame_id.as_usize()].is_unpinned()
    }

    /// The page the frame is assigned to, if any.
    pub fn page_id(&self, frame_id: FrameId) -> Option<PageId> {
        self.frames[frame_id.as_usize()].page_id()
    }

    fn add_pin(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.as_usize()];
        frame.pin();
        if frame.pin_count() == 1 {
            self.pinned_frames += 1;
        }
    }

    /// Removes one pin; returns true when the frame just became unpinned.
    fn remove_pin(&mut self, frame_id: FrameId) -> bool {
        let frame = &mut self.frames[frame_id.as_usize()];
        frame.unpin();
        if frame.is_unpinned() {
            self.pinned_frames -= 1;
            true
        } else {
            false
        }
    }
}

impl Drop for PagePool {
    /// Releases all frame memory.
    ///
    /// Dirty frames still on the LRU list are discarded without write-back;
    /// see the type-level documentation. Dropping with outstanding pins is a
    /// programming error, caught in debug builds.
    fn drop(&mut self) {
        debug_assert_eq!(self.pinned_frames, 0, "page pool dropped with pinned frames");
    }
}
