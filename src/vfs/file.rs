//! `std::fs`-backed platform file services.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use super::{BlockAccessFile, RandomAccessFile, Vfs, VfsError};

/// Platform file services backed by `std::fs`.
///
/// File handles are serialized behind a mutex, so a single open file can be
/// shared across threads while I/O calls stay whole-operation atomic.
///
/// NOTE: For production systems with better concurrency:
/// - Use pread/pwrite so reads at different offsets don't serialize
/// - Use Direct I/O for the block files to bypass the OS cache
#[derive(Debug, Default, Clone, Copy)]
pub struct StdVfs;

impl StdVfs {
    /// Creates the standard vfs.
    pub fn new() -> Self {
        StdVfs
    }

    fn open_file(
        path: &Path,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(File, u64), VfsError> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if error_if_exists {
            options.create_new(true);
        } else {
            options.create(create_if_missing);
        }

        let file = options.open(path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }
}

impl Vfs for StdVfs {
    fn open_for_random_access(
        &self,
        path: &Path,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn RandomAccessFile>, u64), VfsError> {
        let (file, size) = Self::open_file(path, create_if_missing, error_if_exists)?;
        Ok((Box::new(StdRandomAccessFile::new(file)), size))
    }

    fn open_for_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn BlockAccessFile>, u64), VfsError> {
        let (file, size) = Self::open_file(path, create_if_missing, error_if_exists)?;
        Ok((Box::new(StdBlockFile::new(file, 1 << block_shift)), size))
    }

    fn remove_file(&self, path: &Path) -> Result<(), VfsError> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}

fn closed_file_error() -> VfsError {
    VfsError::Io(std::io::Error::other("file is closed"))
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

fn write_all_at(file: &mut File, data: &[u8], offset: u64) -> Result<(), VfsError> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(())
}

/// Log-file handle over `std::fs::File`.
struct StdRandomAccessFile {
    file: Mutex<Option<File>>,
}

impl StdRandomAccessFile {
    fn new(file: File) -> Self {
        Self {
            file: Mutex::new(Some(file)),
        }
    }
}

impl RandomAccessFile for StdRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(closed_file_error)?;
        read_exact_at(file, offset, buf)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(closed_file_error)?;
        write_all_at(file, data, offset)
    }

    fn flush(&self) -> Result<(), VfsError> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(closed_file_error)?;
        file.flush()?;
        Ok(())
    }

    fn sync(&self) -> Result<(), VfsError> {
        let guard = self.file.lock();
        let file = guard.as_ref().ok_or_else(closed_file_error)?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<(), VfsError> {
        // Dropping the handle closes the descriptor; double close is a no-op.
        self.file.lock().take();
        Ok(())
    }
}

/// Data-file handle over `std::fs::File`.
///
/// The advisory lock uses `File::try_lock` and is released when the file is
/// closed (or the handle dropped).
struct StdBlockFile {
    file: Mutex<Option<File>>,
    block_size: usize,
}

impl StdBlockFile {
    fn new(file: File, block_size: usize) -> Self {
        Self {
            file: Mutex::new(Some(file)),
            block_size,
        }
    }

    fn check_block_aligned(&self, offset: u64, len: usize) {
        debug_assert_eq!(offset % self.block_size as u64, 0, "offset not block-aligned");
        debug_assert_eq!(len % self.block_size, 0, "length not a whole number of blocks");
    }
}

impl BlockAccessFile for StdBlockFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        self.check_block_aligned(offset, buf.len());
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(closed_file_error)?;
        read_exact_at(file, offset, buf)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError> {
        self.check_block_aligned(offset, data.len());
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(closed_file_error)?;
        write_all_at(file, data, offset)
    }

    fn sync(&self) -> Result<(), VfsError> {
        let guard = self.file.lock();
        let file = guard.as_ref().ok_or_else(closed_file_error)?;
        file.sync_all()?;
        Ok(())
    }

    fn lock(&self) -> Result<(), VfsError> {
        let guard = self.file.lock();
        let file = guard.as_ref().ok_or_else(closed_file_error)?;
        match file.try_lock() {
            Ok(()) => Ok(()),
            Err(TryLockError::WouldBlock) => Err(VfsError::AlreadyLocked),
            Err(TryLockError::Error(e)) => Err(VfsError::Io(e)),
        }
    }

    fn close(&self) -> Result<(), VfsError> {
        self.file.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_without_create() {
        let dir = tempdir().unwrap();
        let vfs = StdVfs::new();
        let result = vfs.open_for_block_access(&dir.path().join("missing"), 12, false, false);
        assert!(matches!(result, Err(VfsError::NotFound)));
    }

    #[test]
    fn test_error_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let vfs = StdVfs::new();

        let (file, size) = vfs.open_for_block_access(&path, 12, true, true).unwrap();
        assert_eq!(size, 0);
        file.close().unwrap();

        let result = vfs.open_for_block_access(&path, 12, true, true);
        assert!(matches!(result, Err(VfsError::Io(_))));
    }

    #[test]
    fn test_block_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let vfs = StdVfs::new();

        let (file, _) = vfs.open_for_block_access(&path, 9, true, false).unwrap();
        let block = vec![0xA5u8; 512];
        file.write_at(&block, 512).unwrap();
        file.sync().unwrap();

        let mut buf = vec![0u8; 512];
        file.read_at(512, &mut buf).unwrap();
        assert_eq!(buf, block);

        // The skipped first block reads back as zeros.
        file.read_at(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let vfs = StdVfs::new();
        let (file, _) = vfs
            .open_for_block_access(&dir.path().join("data"), 9, true, false)
            .unwrap();

        let mut buf = vec![0u8; 512];
        assert!(matches!(file.read_at(0, &mut buf), Err(VfsError::Io(_))));
    }

    #[test]
    fn test_io_after_close_fails() {
        let dir = tempdir().unwrap();
        let vfs = StdVfs::new();
        let (file, _) = vfs
            .open_for_block_access(&dir.path().join("data"), 9, true, false)
            .unwrap();

        file.close().unwrap();
        file.close().unwrap(); // idempotent

        let mut buf = vec![0u8; 512];
        assert!(matches!(file.read_at(0, &mut buf), Err(VfsError::Io(_))));
        assert!(matches!(file.write_at(&buf, 0), Err(VfsError::Io(_))));
    }

    #[test]
    fn test_lock_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let vfs = StdVfs::new();

        let (first, _) = vfs.open_for_block_access(&path, 9, true, false).unwrap();
        first.lock().unwrap();

        let (second, _) = vfs.open_for_block_access(&path, 9, true, false).unwrap();
        assert!(matches!(second.lock(), Err(VfsError::AlreadyLocked)));

        // Closing the first handle releases the lock.
        first.close().unwrap();
        second.lock().unwrap();
    }

    #[test]
    fn test_random_access_file() {
        let dir = tempdir().unwrap();
        let vfs = StdVfs::new();
        let (file, size) = vfs
            .open_for_random_access(&dir.path().join("wal"), true, false)
            .unwrap();
        assert_eq!(size, 0);

        file.write_at(b"record", 3).unwrap();
        file.flush().unwrap();
        file.sync().unwrap();

        let mut buf = [0u8; 6];
        file.read_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"record");
    }

    #[test]
    fn test_remove_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let vfs = StdVfs::new();

        let (file, _) = vfs.open_for_block_access(&path, 9, true, false).unwrap();
        file.close().unwrap();

        vfs.remove_file(&path).unwrap();
        assert!(matches!(vfs.remove_file(&path), Err(VfsError::NotFound)));
    }
}
