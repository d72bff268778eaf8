use thiserror::Error;

/// MountCore's own error taxonomy, narrowed to the closest POSIX errno when
/// it crosses into a FUSE reply (spec.md §4.6/§7).
#[derive(Debug, Error)]
pub enum MountError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage is read-only")]
    ReadOnly,

    #[error(transparent)]
    Storage(#[from] wildland_storage::StorageError),

    #[error("no storage registered for storage-id {0}")]
    UnknownStorageId(u64),

    #[error("bad command arguments: {0}")]
    BadArgs(String),
}

pub type Result<T> = std::result::Result<T, MountError>;

impl MountError {
    /// The errno surfaced to the FUSE caller (spec.md §7: `ENOENT`, `EROFS`,
    /// `EIO`, `ETIMEDOUT`).
    pub fn errno(&self) -> libc::c_int {
        match self {
            MountError::NotFound(_) => libc::ENOENT,
            MountError::ReadOnly => libc::EROFS,
            MountError::UnknownStorageId(_) => libc::ENOENT,
            MountError::BadArgs(_) => libc::EINVAL,
            MountError::Storage(e) => match e {
                wildland_storage::StorageError::NotFound(_) => libc::ENOENT,
                wildland_storage::StorageError::ReadOnly => libc::EROFS,
                wildland_storage::StorageError::BackendTimeout => libc::ETIMEDOUT,
                wildland_storage::StorageError::BackendIo(_) => libc::EIO,
                wildland_storage::StorageError::Watcher(_) => libc::EIO,
                wildland_storage::StorageError::Io(_) => libc::EIO,
            },
        }
    }
}
