//! In-memory platform file services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{BlockAccessFile, RandomAccessFile, Vfs, VfsError};

/// In-memory file services for tests and development.
///
/// Cloning a `MemoryVfs` yields a handle onto the same filesystem, so a file
/// written through one clone can be reopened through another. Open handles
/// keep their contents alive even after `remove_file`, matching POSIX
/// unlink semantics.
#[derive(Default, Clone)]
pub struct MemoryVfs {
    files: Arc<Mutex<HashMap<PathBuf, MemNode>>>,
}

/// A file registered in the in-memory filesystem.
#[derive(Clone)]
struct MemNode {
    data: Arc<Mutex<Vec<u8>>>,
    /// Advisory lock state, shared with every open handle of this file.
    locked: Arc<AtomicBool>,
}

impl MemoryVfs {
    /// Creates an empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn open_node(
        &self,
        path: &Path,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(MemNode, u64), VfsError> {
        let mut files = self.files.lock();
        if let Some(node) = files.get(path) {
            if error_if_exists {
                return Err(VfsError::Io(std::io::Error::other("file already exists")));
            }
            let size = node.data.lock().len() as u64;
            return Ok((node.clone(), size));
        }

        if !create_if_missing {
            return Err(VfsError::NotFound);
        }

        let node = MemNode {
            data: Arc::new(Mutex::new(Vec::new())),
            locked: Arc::new(AtomicBool::new(false)),
        };
        files.insert(path.to_path_buf(), node.clone());
        Ok((node, 0))
    }
}

impl Vfs for MemoryVfs {
    fn open_for_random_access(
        &self,
        path: &Path,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn RandomAccessFile>, u64), VfsError> {
        let (node, size) = self.open_node(path, create_if_missing, error_if_exists)?;
        Ok((Box::new(MemFile::new(node)), size))
    }

    fn open_for_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        create_if_missing: bool,
        error_if_exists: bool,
    ) -> Result<(Box<dyn BlockAccessFile>, u64), VfsError> {
        let (node, size) = self.open_node(path, create_if_missing, error_if_exists)?;
        Ok((Box::new(MemBlockFile::new(node, 1 << block_shift)), size))
    }

    fn remove_file(&self, path: &Path) -> Result<(), VfsError> {
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(VfsError::NotFound),
        }
    }
}

fn closed_file_error() -> VfsError {
    VfsError::Io(std::io::Error::other("file is closed"))
}

/// An open handle onto an in-memory file.
struct MemFile {
    node: MemNode,
    closed: AtomicBool,
    holds_lock: AtomicBool,
}

impl MemFile {
    fn new(node: MemNode) -> Self {
        Self {
            node,
            closed: AtomicBool::new(false),
            holds_lock: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), VfsError> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_file_error())
        } else {
            Ok(())
        }
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        self.check_open()?;
        let data = self.node.data.lock();
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| VfsError::Io(std::io::Error::other("read past end of file")))?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, bytes: &[u8], offset: u64) -> Result<(), VfsError> {
        self.check_open()?;
        let mut data = self.node.data.lock();
        let start = offset as usize;
        let end = start + bytes.len();
        if data.len() < end {
            // Writes past the current end leave a zero-filled hole.
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn lock(&self) -> Result<(), VfsError> {
        self.check_open()?;
        if self.holds_lock.load(Ordering::Acquire) {
            return Ok(());
        }
        if self
            .node
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VfsError::AlreadyLocked);
        }
        self.holds_lock.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> Result<(), VfsError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.holds_lock.swap(false, Ordering::AcqRel) {
            self.node.locked.store(false, Ordering::Release);
        }
        Ok(())
    }
}

impl Drop for MemFile {
    /// Dropping a handle closes it, releasing the advisory lock if held,
    /// matching what dropping a `std::fs::File` does.
    fn drop(&mut self) {
        let _ = MemFile::close(self);
    }
}

impl RandomAccessFile for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        MemFile::read_at(self, offset, buf)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError> {
        MemFile::write_at(self, data, offset)
    }

    fn flush(&self) -> Result<(), VfsError> {
        self.check_open()
    }

    fn sync(&self) -> Result<(), VfsError> {
        self.check_open()
    }

    fn close(&self) -> Result<(), VfsError> {
        MemFile::close(self)
    }
}

/// An open block-access handle onto an in-memory file.
struct MemBlockFile {
    file: MemFile,
    block_size: usize,
}

impl MemBlockFile {
    fn new(node: MemNode, block_size: usize) -> Self {
        Self {
            file: MemFile::new(node),
            block_size,
        }
    }

    fn check_block_aligned(&self, offset: u64, len: usize) {
        debug_assert_eq!(offset % self.block_size as u64, 0, "offset not block-aligned");
        debug_assert_eq!(len % self.block_size, 0, "length not a whole number of blocks");
    }
}

impl BlockAccessFile for MemBlockFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        self.check_block_aligned(offset, buf.len());
        self.file.read_at(offset, buf)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError> {
        self.check_block_aligned(offset, data.len());
        self.file.write_at(data, offset)
    }

    fn sync(&self) -> Result<(), VfsError> {
        self.file.check_open()
    }

    fn lock(&self) -> Result<(), VfsError> {
        self.file.lock()
    }

    fn close(&self) -> Result<(), VfsError> {
        self.file.close()
    }
}
