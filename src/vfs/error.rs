//! Vfs layer errors.

/// Errors produced by the platform file services.
#[derive(Debug)]
pub enum VfsError {
    /// The file does not exist and the open did not ask for creation.
    NotFound,

    /// The advisory lock on the file is already held by another user.
    AlreadyLocked,

    /// I/O error from the underlying filesystem.
    Io(std::io::Error),
}

impl std::fmt::Display for VfsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VfsError::NotFound => write!(f, "file not found"),
            VfsError::AlreadyLocked => write!(f, "file is locked by another user"),
            VfsError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound,
            _ => VfsError::Io(e),
        }
    }
}
