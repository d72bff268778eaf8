use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend io error: {0}")]
    BackendIo(String),

    #[error("backend call timed out")]
    BackendTimeout,

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("backend is read-only")]
    ReadOnly,

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
