use thiserror::Error;
use wildland_storage::StorageError;

/// SyncDaemon's own error taxonomy (spec.md §7 as it applies to this
/// crate's surface, per SPEC_FULL.md §11.2): the backend-level failures a
/// job's state machine can hit, plus the job-table failures that have no
/// backend-level analogue.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("backend call timed out")]
    BackendTimeout,

    #[error("backend io error: {0}")]
    BackendIo(String),

    #[error("conflicting write on {0}")]
    Conflict(String),

    #[error("job already exists: {0}")]
    JobAlreadyExists(String),

    #[error("job not found: {0}")]
    JobNotFound(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::BackendTimeout => SyncError::BackendTimeout,
            other => SyncError::BackendIo(other.to_string()),
        }
    }
}

impl SyncError {
    /// Maps onto the errno vocabulary spec.md §7 assigns `MountCore`;
    /// `SyncDaemon` reports the same storage-layer failures over its own
    /// control socket rather than to a FUSE caller, so the mapping is kept
    /// here for `status`/`job-state` responses that surface a raw code.
    pub fn errno(&self) -> i32 {
        match self {
            SyncError::BackendTimeout => libc::ETIMEDOUT,
            SyncError::BackendIo(_) => libc::EIO,
            SyncError::Conflict(_) => libc::EIO,
            SyncError::JobAlreadyExists(_) => libc::EEXIST,
            SyncError::JobNotFound(_) => libc::ENOENT,
        }
    }
}
