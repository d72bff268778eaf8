use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::error::Result;
use crate::watch::WatchStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub is_dir: bool,
    pub mtime_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// A manifest reachable through a backend that hosts subcontainers
/// (`manifest-pattern`), surfaced so MountCore can mount/remount them
/// (spec.md §4.5/§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcontainerLink {
    pub path: String,
    pub manifest_bytes: Vec<u8>,
}

/// Uniform file/dir I/O, watcher, and manifest-discovery contract every
/// storage driver must satisfy (spec.md §4.5). Paths are always absolute
/// and relative to the backend's own root, never the mounted tree's.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Establishes whatever connection/handle the backend needs. Called
    /// eagerly on mount, or lazily on first access when `lazy: true`
    /// (spec.md §4.6).
    async fn open(&self) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<FileMeta>;
    async fn read(&self, path: &str, offset: u64, len: u32) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<u32>;
    async fn truncate(&self, path: &str, size: u64) -> Result<()>;
    async fn create(&self, path: &str) -> Result<()>;
    async fn unlink(&self, path: &str) -> Result<()>;

    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn mkdir(&self, path: &str) -> Result<()>;
    async fn rmdir(&self, path: &str) -> Result<()>;
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn capabilities(&self) -> Capabilities;

    /// A stream of change events under `pattern`, if this driver can watch
    /// natively. `None` means the caller should fall back to
    /// [`crate::watch::periodic_scan_watcher`].
    async fn watcher(&self, _pattern: &str, _ignore_own: bool) -> Result<Option<WatchStream>> {
        Ok(None)
    }

    /// Manifests for subcontainers this backend hosts, if any
    /// (`manifest-pattern`, spec.md §4.5/§4.6).
    async fn list_subcontainers(&self) -> Result<Option<Vec<SubcontainerLink>>> {
        Ok(None)
    }
}
