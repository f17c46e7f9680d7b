//! Fault injection for the block-access file collaborator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BlockAccessFile, VfsError};

/// Shared switch controlling a [`FaultyBlockFile`].
///
/// Cloned freely; flipping any clone affects the wrapped file.
#[derive(Default, Clone)]
pub struct FaultSwitch {
    failing: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Starts or stops failing data access on the associated file.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Whether data access is currently failing.
    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Acquire)
    }
}

/// A `BlockAccessFile` wrapper that forwards I/O until its switch is tripped.
///
/// Once failing, `read_at`, `write_at`, `sync` and `lock` return an injected
/// I/O error without touching the inner file. `close` always forwards, so the
/// wrapped file's resources are released regardless of the injected fault.
pub struct FaultyBlockFile {
    inner: Box<dyn BlockAccessFile>,
    switch: FaultSwitch,
}

impl FaultyBlockFile {
    /// Wraps `inner`, returning the wrapper and the switch that controls it.
    pub fn wrap(inner: Box<dyn BlockAccessFile>) -> (FaultyBlockFile, FaultSwitch) {
        let switch = FaultSwitch::default();
        let file = FaultyBlockFile {
            inner,
            switch: switch.clone(),
        };
        (file, switch)
    }

    fn check_fault(&self) -> Result<(), VfsError> {
        if self.switch.is_failing() {
            Err(VfsError::Io(std::io::Error::other("injected I/O fault")))
        } else {
            Ok(())
        }
    }
}

impl BlockAccessFile for FaultyBlockFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        self.check_fault()?;
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<(), VfsError> {
        self.check_fault()?;
        self.inner.write_at(data, offset)
    }

    fn sync(&self) -> Result<(), VfsError> {
        self.check_fault()?;
        self.inner.sync()
    }

    fn lock(&self) -> Result<(), VfsError> {
        self.check_fault()?;
        self.inner.lock()
    }

    fn close(&self) -> Result<(), VfsError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{MemoryVfs, Vfs};
    use std::path::Path;

    fn open_wrapped() -> (FaultyBlockFile, FaultSwitch) {
        let vfs = MemoryVfs::new();
        let (inner, _) = vfs
            .open_for_block_access(Path::new("data"), 9, true, false)
            .unwrap();
        FaultyBlockFile::wrap(inner)
    }

    #[test]
    fn test_forwards_until_tripped() {
        let (file, switch) = open_wrapped();
        let block = vec![1u8; 512];

        file.write_at(&block, 0).unwrap();
        let mut buf = vec![0u8; 512];
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, block);

        switch.set_failing(true);
        assert!(matches!(file.read_at(0, &mut buf), Err(VfsError::Io(_))));
        assert!(matches!(file.write_at(&block, 0), Err(VfsError::Io(_))));
        assert!(matches!(file.sync(), Err(VfsError::Io(_))));
    }

    #[test]
    fn test_recovers_when_reset() {
        let (file, switch) = open_wrapped();
        let block = vec![2u8; 512];
        file.write_at(&block, 0).unwrap();

        switch.set_failing(true);
        let mut buf = vec![0u8; 512];
        assert!(file.read_at(0, &mut buf).is_err());

        switch.set_failing(false);
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, block);
    }

    #[test]
    fn test_close_forwards_while_failing() {
        let (file, switch) = open_wrapped();
        switch.set_failing(true);
        file.close().unwrap();
    }
}
