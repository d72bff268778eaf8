use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::backend::{DirEntry, FileMeta, StorageBackend, SubcontainerLink};
use crate::capability::Capabilities;
use crate::error::{Result, StorageError};
use crate::watch::{WatchEvent, WatchEventKind, WatchStream};

/// The one concrete backend in scope per spec.md §4.5/§10: a plain local
/// directory tree, used as the reference implementation of the
/// `StorageBackend` contract and by tests elsewhere in the workspace.
pub struct LocalFilesystemBackend {
    root: PathBuf,
    read_only: bool,
    manifest_pattern: Option<String>,
}

impl LocalFilesystemBackend {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            read_only: false,
            manifest_pattern: None,
        }
    }

    pub fn read_only(root: PathBuf) -> Self {
        Self {
            root,
            read_only: true,
            manifest_pattern: None,
        }
    }

    pub fn with_manifest_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.manifest_pattern = Some(pattern.into());
        self
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = path.trim_start_matches('/');
        let full = self.root.join(relative);
        // Refuse to resolve outside of the backend's own root.
        if !full.starts_with(&self.root) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(full)
    }

    fn require_writable(&self) -> Result<()> {
        if self.read_only {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFilesystemBackend {
    async fn open(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileMeta> {
        let full = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|_| StorageError::NotFound(path.to_string()))?;
        let mtime_unix = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(FileMeta {
            size: meta.len(),
            is_dir: meta.is_dir(),
            mtime_unix,
        })
    }

    async fn read(&self, path: &str, offset: u64, len: u32) -> Result<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};
        let full = self.resolve(path)?;
        let mut file = tokio::fs::File::open(&full)
            .await
            .map_err(|_| StorageError::NotFound(path.to_string()))?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        let n = file.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<u32> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};
        self.require_writable()?;
        let full = self.resolve(path)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&full)
            .await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(data.len() as u32)
    }

    async fn truncate(&self, path: &str, size: u64) -> Result<()> {
        self.require_writable()?;
        let full = self.resolve(path)?;
        let file = tokio::fs::OpenOptions::new().write(true).open(&full).await?;
        file.set_len(size).await?;
        Ok(())
    }

    async fn create(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&full)
            .await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|_| StorageError::NotFound(path.to_string()))
    }

    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let mut rd = tokio::fs::read_dir(&full)
            .await
            .map_err(|_| StorageError::NotFound(path.to_string()))?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let file_type = entry.file_type().await?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(out)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let full = self.resolve(path)?;
        tokio::fs::remove_dir(&full)
            .await
            .map_err(|_| StorageError::NotFound(path.to_string()))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.require_writable()?;
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        tokio::fs::rename(&from_full, &to_full).await?;
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        let base = if self.read_only {
            Capabilities::read_only()
        } else {
            Capabilities::read_write()
        };
        base.with_native_watcher()
    }

    async fn watcher(&self, pattern: &str, ignore_own: bool) -> Result<Option<WatchStream>> {
        let root = self.resolve(pattern)?;
        let (raw_tx, mut raw_rx) = std::sync::mpsc::channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(raw_tx)
            .map_err(|e| StorageError::Watcher(e.to_string()))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| StorageError::Watcher(e.to_string()))?;

        let (tx, rx) = mpsc::channel(256);
        let root_for_strip = self.root.clone();

        // `notify`'s blocking channel is drained on a dedicated blocking
        // thread and re-published onto the async `WatchStream`; the
        // watcher itself is kept alive by moving it into the task's
        // closure.
        tokio::task::spawn_blocking(move || {
            let _watcher = watcher;
            while let Ok(event) = raw_rx.recv() {
                let kind = match event.kind {
                    notify::EventKind::Create(_) => WatchEventKind::Create,
                    notify::EventKind::Modify(_) => WatchEventKind::Modify,
                    notify::EventKind::Remove(_) => WatchEventKind::Delete,
                    _ => continue,
                };
                for path in event.paths {
                    let relative = path
                        .strip_prefix(&root_for_strip)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    let wl_path = format!("/{relative}");
                    if tx.blocking_send(WatchEvent { kind, path: wl_path }).is_err() {
                        return;
                    }
                }
            }
        });

        let _ = ignore_own; // own-write suppression is the caller's responsibility (spec.md §4.5).
        Ok(Some(rx))
    }

    async fn list_subcontainers(&self) -> Result<Option<Vec<SubcontainerLink>>> {
        let Some(pattern) = &self.manifest_pattern else {
            return Ok(None);
        };
        let mut out = Vec::new();
        collect_matching(&self.root, &self.root, pattern, &mut out).await?;
        Ok(Some(out))
    }
}

async fn collect_matching(
    root: &Path,
    dir: &Path,
    pattern: &str,
    out: &mut Vec<SubcontainerLink>,
) -> Result<()> {
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            Box::pin(collect_matching(root, &path, pattern, out)).await?;
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if glob_match(pattern, &name) {
            let bytes = tokio::fs::read(&path).await?;
            let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
            out.push(SubcontainerLink {
                path: format!("/{relative}"),
                manifest_bytes: bytes,
            });
        }
    }
    Ok(())
}

fn glob_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, suffix)) => name.starts_with(prefix) && name.ends_with(suffix),
    }
}
