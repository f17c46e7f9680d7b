//! Integration tests for store lifecycle against the pool.
//!
//! Orderly shutdown (flush-then-close), the crash-close path that discards
//! dirty buffers, and data-file locking across store opens.

use std::path::Path;
use std::sync::Arc;

use pagepool::pool::{PageFetchMode, PagePool, PagePoolOptions, PoolError};
use pagepool::store::{PageId, PageStore, StoreError, StoreFile, StoreOptions};
use pagepool::vfs::{MemoryVfs, StdVfs, Vfs, VfsError};
use tempfile::tempdir;

const PAGE_SHIFT: usize = 12;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

fn new_pool() -> PagePool {
    PagePool::new(PagePoolOptions {
        page_shift: PAGE_SHIFT,
        page_capacity: 8,
    })
}

fn open_store(vfs: &dyn Vfs, path: &Path) -> Arc<StoreFile> {
    StoreFile::open(vfs, path, PAGE_SHIFT, &StoreOptions::default()).unwrap()
}

fn handle(store: &Arc<StoreFile>) -> Arc<dyn PageStore> {
    Arc::clone(store) as Arc<dyn PageStore>
}

fn write_page(pool: &mut PagePool, store: &Arc<dyn PageStore>, page_id: PageId, fill: u8) {
    let frame = pool
        .store_page(store, page_id, PageFetchMode::IgnoreData)
        .unwrap();
    pool.page_data_mut(frame).fill(fill);
    pool.mark_dirty(frame);
    pool.unpin_store_page(frame);
}

#[test]
fn test_release_pages_flushes_dirty_frames() {
    let vfs = MemoryVfs::new();
    let mut pool = new_pool();

    {
        let store = open_store(&vfs, Path::new("store.pages"));
        let store_handle = handle(&store);
        for num in 0..3 {
            write_page(&mut pool, &store_handle, PageId::new(num), 0x10 + num as u8);
        }
        assert_eq!(store.cached_page_count(), 3);

        store.release_pages(&mut pool);
        assert_eq!(store.cached_page_count(), 0);
        assert_eq!(pool.unused_pages(), 3);
        store.close();
    }

    // A fresh store over the same file sees the flushed pages.
    let store = open_store(&vfs, Path::new("store.pages"));
    let store_handle = handle(&store);
    for num in 0..3 {
        let frame = pool
            .store_page(&store_handle, PageId::new(num), PageFetchMode::FetchData)
            .unwrap();
        assert!(pool.page_data(frame).iter().all(|&b| b == 0x10 + num as u8));
        pool.unpin_store_page(frame);
    }
    store.release_pages(&mut pool);
    store.close();
}

#[test]
fn test_dropping_the_pool_discards_dirty_frames() {
    let vfs = MemoryVfs::new();
    let store = open_store(&vfs, Path::new("store.pages"));
    let store_handle = handle(&store);

    {
        let mut pool = new_pool();
        write_page(&mut pool, &store_handle, PageId::new(0), 0x77);
        // No release: the dirty frame dies with the pool.
    }
    store.close();

    // The page never reached the data file.
    let store = open_store(&vfs, Path::new("store.pages"));
    let store_handle = handle(&store);
    let mut pool = new_pool();
    let result = pool.store_page(&store_handle, PageId::new(0), PageFetchMode::FetchData);
    assert!(matches!(
        result,
        Err(PoolError::Store(StoreError::Vfs(VfsError::Io(_))))
    ));
    store.close();
}

#[test]
fn test_fetch_from_closed_store_fails() {
    let vfs = MemoryVfs::new();
    let mut pool = new_pool();
    let store = open_store(&vfs, Path::new("store.pages"));
    let store_handle = handle(&store);

    write_page(&mut pool, &store_handle, PageId::new(0), 0x42);
    store.release_pages(&mut pool);
    store.close();

    let result = pool.store_page(&store_handle, PageId::new(0), PageFetchMode::FetchData);
    assert!(matches!(
        result,
        Err(PoolError::Store(StoreError::Closed))
    ));
}

#[test]
fn test_store_lock_blocks_concurrent_open() {
    let dir = tempdir().unwrap();
    let vfs = StdVfs::new();
    let path = dir.path().join("store.pages");

    let store = open_store(&vfs, &path);
    let second = StoreFile::open(&vfs, &path, PAGE_SHIFT, &StoreOptions::default());
    assert!(matches!(
        second,
        Err(StoreError::Vfs(VfsError::AlreadyLocked))
    ));

    store.close();
    open_store(&vfs, &path).close();
}

#[test]
fn test_store_survives_reopen_on_disk() {
    let dir = tempdir().unwrap();
    let vfs = StdVfs::new();
    let path = dir.path().join("store.pages");
    let mut pool = new_pool();

    {
        let store = open_store(&vfs, &path);
        let store_handle = handle(&store);
        write_page(&mut pool, &store_handle, PageId::new(5), 0x5A);
        store.release_pages(&mut pool);
        store.close();
    }

    let store = open_store(&vfs, &path);
    let store_handle = handle(&store);
    let frame = pool
        .store_page(&store_handle, PageId::new(5), PageFetchMode::FetchData)
        .unwrap();
    assert_eq!(pool.page_data(frame), &[0x5A; PAGE_SIZE][..]);
    pool.unpin_store_page(frame);
    store.release_pages(&mut pool);
    store.close();
}

#[test]
fn test_log_file_is_created_next_to_the_data_file() {
    let dir = tempdir().unwrap();
    let vfs = StdVfs::new();
    let path = dir.path().join("store.pages");

    let store = open_store(&vfs, &path);
    store.close();

    assert!(path.exists());
    assert!(dir.path().join("store.pages.log").exists());
}
