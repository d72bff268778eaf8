use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use wildland_storage::{Capabilities, StorageBackend, StorageRegistry, SubcontainerLink};

use crate::error::{MountError, Result};
use crate::manifest::PseudoManifest;
use crate::subcontainer::{SubcontainerAction, SubcontainerCoalescer};
use crate::table::{MountTable, MountedStorage};

/// Polling cadence for the subcontainer watcher when a backend has no
/// native watch stream (spec.md §4.5 "watcher-interval").
const SUBCONTAINER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A resolved mount-item: one storage, the paths it should be visible under,
/// and its `lazy`/`remount` flags (spec.md §6 `fs-commands.json` `mount`
/// item shape).
pub struct MountItem {
    pub backend_id: String,
    pub backend: Arc<dyn StorageBackend>,
    pub paths: Vec<String>,
    pub read_only: bool,
    pub primary: bool,
    pub lazy: bool,
    pub remount: bool,
    pub pseudo_manifest: Option<PseudoManifest>,
}

/// MountCore's in-process state: the mount table, the pending pseudo-manifest
/// buffers keyed by container root path, and the driver registry used to
/// build backends from manifest `type` strings (spec.md §4.6, §9).
pub struct MountCore {
    table: RwLock<MountTable>,
    manifests: RwLock<std::collections::HashMap<String, PseudoManifest>>,
    registry: StorageRegistry,
    /// Background `add-watch`/`add-subcontainer-watch` tasks, keyed by the
    /// storage-id they were started against so a later `unmount` can stop
    /// them.
    watch_tasks: RwLock<HashMap<u64, tokio::task::JoinHandle<()>>>,
    /// Storage-ids mounted on behalf of a subcontainer manifest, keyed by
    /// that manifest's path, so an `Unmount` action can tear them down
    /// again (spec.md §4.6 "Subcontainer remount").
    subcontainer_mounts: RwLock<HashMap<String, Vec<u64>>>,
}

impl MountCore {
    pub fn new(registry: StorageRegistry) -> Self {
        Self {
            table: RwLock::new(MountTable::new()),
            manifests: RwLock::new(std::collections::HashMap::new()),
            registry,
            watch_tasks: RwLock::new(HashMap::new()),
            subcontainer_mounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Mounts or remounts one item (spec.md §4.6 "Remount semantics": reuse
    /// the storage-id when identity matches, otherwise unmount-then-mount
    /// with no observable gap — both code paths here replace the table entry
    /// under a single write lock, so no reader observes a half-applied
    /// remount).
    pub fn mount(&self, item: MountItem) -> Result<u64> {
        let mut table = self.table.write();

        let existing = if item.remount {
            table.all().into_iter().find(|s| s.paths.first() == item.paths.first())
        } else {
            None
        };

        let storage_id = match existing {
            Some(existing) if existing.backend_id == item.backend_id => existing.storage_id,
            Some(existing) => {
                table.remove(existing.storage_id);
                table.next_storage_id()
            }
            None => table.next_storage_id(),
        };

        table.insert_at(
            storage_id,
            item.backend_id,
            item.backend,
            item.paths.clone(),
            item.read_only,
            item.primary,
            item.lazy,
        );

        if let (Some(root), Some(manifest)) = (item.paths.first(), item.pseudo_manifest) {
            self.manifests.write().insert(root.clone(), manifest);
        }

        Ok(storage_id)
    }

    pub fn unmount(&self, storage_id: u64) -> Result<()> {
        let mut table = self.table.write();
        table.remove(storage_id).ok_or(MountError::UnknownStorageId(storage_id))?;
        drop(table);
        if let Some(handle) = self.watch_tasks.write().remove(&storage_id) {
            handle.abort();
        }
        Ok(())
    }

    /// Starts a live watch against `storage_id`'s own tree (`add-watch`,
    /// spec.md §6). Native `StorageBackend::watcher` when available, else
    /// the periodic-scan fallback; either way every observed change clears
    /// whatever cache the backend keeps for `storage_id`, since there is no
    /// reader-facing cache invalidation path beyond that (spec.md §4.5).
    pub fn spawn_watch(core: Arc<Self>, storage_id: u64, pattern: String, ignore_own: bool) -> Result<()> {
        let backend = core
            .table
            .read()
            .get(storage_id)
            .map(|s| s.backend.clone())
            .ok_or(MountError::UnknownStorageId(storage_id))?;

        let task_core = core.clone();
        let handle = tokio::spawn(async move {
            let mut stream = match backend.watcher(&pattern, ignore_own).await {
                Ok(Some(s)) => s,
                _ => wildland_storage::periodic_scan_watcher(backend.clone(), pattern.clone(), SUBCONTAINER_POLL_INTERVAL),
            };
            while let Some(event) = stream.recv().await {
                tracing::debug!(storage_id, path = %event.path, kind = ?event.kind, "watch event");
                task_core.clear_cache(Some(storage_id));
            }
        });

        core.watch_tasks.write().insert(storage_id, handle);
        Ok(())
    }

    /// Starts the subcontainer watcher for `storage_id` (`add-subcontainer-
    /// watch`, spec.md §4.6 "Subcontainer remount"). Watches the backend's
    /// whole tree, keeps only the events that touch a path
    /// `list_subcontainers` currently (or previously) reported, coalesces
    /// them per-path, and turns the drained actions into real
    /// `mount`/`unmount` calls.
    pub fn spawn_subcontainer_watch(core: Arc<Self>, storage_id: u64, ignore_own: bool) -> Result<()> {
        let backend = core
            .table
            .read()
            .get(storage_id)
            .map(|s| s.backend.clone())
            .ok_or(MountError::UnknownStorageId(storage_id))?;

        let task_core = core.clone();
        let handle = tokio::spawn(async move {
            let mut stream = match backend.watcher("/", ignore_own).await {
                Ok(Some(s)) => s,
                _ => wildland_storage::periodic_scan_watcher(backend.clone(), "/".to_string(), SUBCONTAINER_POLL_INTERVAL),
            };
            let mut coalescer = SubcontainerCoalescer::new();
            let mut known_subcontainers: HashSet<String> = HashSet::new();

            while let Some(event) = stream.recv().await {
                let links = backend.list_subcontainers().await.unwrap_or(None).unwrap_or_default();
                let is_subcontainer = links.iter().any(|l| l.path == event.path);
                if !is_subcontainer && !known_subcontainers.contains(&event.path) {
                    continue;
                }
                if is_subcontainer {
                    known_subcontainers.insert(event.path.clone());
                } else {
                    known_subcontainers.remove(&event.path);
                }

                coalescer.observe(event);
                for action in coalescer.drain() {
                    task_core.apply_subcontainer_action(&links, action).await;
                }
            }
        });

        core.watch_tasks.write().insert(storage_id, handle);
        Ok(())
    }

    async fn apply_subcontainer_action(&self, links: &[SubcontainerLink], action: SubcontainerAction) {
        match action {
            SubcontainerAction::Mount { path } => {
                let Some(link) = links.iter().find(|l| l.path == path) else {
                    return;
                };
                match self.mount_subcontainer_manifest(&link.manifest_bytes) {
                    Ok(ids) => {
                        self.subcontainer_mounts.write().insert(path, ids);
                    }
                    Err(e) => tracing::warn!(path = %path, error = %e, "failed to mount subcontainer"),
                }
            }
            SubcontainerAction::Unmount { path } => {
                if let Some(ids) = self.subcontainer_mounts.write().remove(&path) {
                    for id in ids {
                        let _ = self.unmount(id);
                    }
                }
            }
        }
    }

    /// Parses a subcontainer manifest's bytes as a container envelope and
    /// mounts every storage it declares. Signature verification is the
    /// resolver/object-model layer's job (spec.md §4.2); a subcontainer is
    /// only reachable at all through a backend MountCore already mounted,
    /// so this only needs the envelope's body.
    fn mount_subcontainer_manifest(&self, manifest_bytes: &[u8]) -> Result<Vec<u64>> {
        let text = std::str::from_utf8(manifest_bytes).map_err(|e| MountError::BadArgs(e.to_string()))?;
        let (_header, body_text) =
            wildland_manifest::parse_envelope(text).map_err(|e| MountError::BadArgs(e.to_string()))?;
        let container: wildland_model::Container =
            serde_yaml::from_str(&body_text).map_err(|e| MountError::BadArgs(e.to_string()))?;

        let mut ids = Vec::new();
        for storage in &container.backends.storage {
            let backend = self.registry.build(storage).map_err(MountError::Storage)?;
            let id = self.mount(MountItem {
                backend_id: storage.backend_id.clone(),
                backend,
                paths: container.paths.clone(),
                read_only: storage.read_only,
                primary: storage.primary,
                lazy: false,
                remount: true,
                pseudo_manifest: None,
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn clear_cache(&self, _storage_id: Option<u64>) {
        // Backends own their own caching (spec.md §4.5 "each backend driver
        // is responsible for its own internal concurrency"); nothing to
        // clear at this layer beyond the pseudo-manifest buffers, which are
        // always current.
    }

    pub fn table(&self) -> parking_lot::RwLockReadGuard<'_, MountTable> {
        self.table.read()
    }

    pub fn pseudo_manifest_for(&self, container_root: &str) -> Option<PseudoManifest> {
        self.manifests.read().get(container_root).cloned()
    }

    /// Publishes (or replaces) the `.manifest.wildland.yaml` buffer for a
    /// container root, independent of any particular mount call (spec.md
    /// §4.6 "Pseudo-manifests").
    pub fn set_pseudo_manifest(&self, container_root: &str, bytes: Vec<u8>) {
        self.manifests.write().insert(container_root.to_string(), PseudoManifest::new(bytes));
    }

    /// Reads `path`, falling back through every storage that owns it in
    /// priority order (primary first) when a candidate returns
    /// [`wildland_storage::StorageError::BackendIo`] (spec.md §4.6, tested by
    /// spec.md §8 scenario 3).
    pub async fn read_with_fallback(&self, path: &str, offset: u64, len: u32) -> Result<Vec<u8>> {
        let candidates = self.table.read().storages_owning(path);
        if candidates.is_empty() {
            return Err(MountError::NotFound(path.to_string()));
        }

        let mut last_err = None;
        for storage in candidates {
            self.ensure_open(&storage).await?;
            match storage.backend.read(path, offset, len).await {
                Ok(data) => return Ok(data),
                Err(e @ wildland_storage::StorageError::BackendIo(_)) => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.expect("candidates is non-empty").into())
    }

    async fn ensure_open(&self, storage: &MountedStorage) -> Result<()> {
        if storage.lazy && !storage.is_open() {
            storage.backend.open().await?;
            storage.mark_open();
        }
        Ok(())
    }
}

/// Storage capability gate applied before a write reaches the backend
/// (spec.md §4.6/§7: writes to a read-only storage surface `EROFS`).
pub fn check_writable(caps: Capabilities, read_only_mount: bool) -> Result<()> {
    if caps.read_only || read_only_mount {
        return Err(MountError::ReadOnly);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wildland_storage::{DirEntry, FileMeta, StorageError};

    /// Always fails reads with `BackendIo`, so fallback tests can force the
    /// primary candidate to miss.
    struct FailingBackend;

    #[async_trait]
    impl StorageBackend for FailingBackend {
        async fn open(&self) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn stat(&self, _path: &str) -> wildland_storage::Result<FileMeta> {
            Err(StorageError::BackendIo("down".into()))
        }
        async fn read(&self, _path: &str, _offset: u64, _len: u32) -> wildland_storage::Result<Vec<u8>> {
            Err(StorageError::BackendIo("down".into()))
        }
        async fn write(&self, _path: &str, _offset: u64, _data: &[u8]) -> wildland_storage::Result<u32> {
            Err(StorageError::BackendIo("down".into()))
        }
        async fn truncate(&self, _path: &str, _size: u64) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn create(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn unlink(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn readdir(&self, _path: &str) -> wildland_storage::Result<Vec<DirEntry>> {
            Ok(vec![])
        }
        async fn mkdir(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn rmdir(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn rename(&self, _from: &str, _to: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::read_write()
        }
    }

    struct OkBackend(Vec<u8>);

    #[async_trait]
    impl StorageBackend for OkBackend {
        async fn open(&self) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn stat(&self, _path: &str) -> wildland_storage::Result<FileMeta> {
            Ok(FileMeta { size: self.0.len() as u64, is_dir: false, mtime_unix: 0 })
        }
        async fn read(&self, _path: &str, _offset: u64, _len: u32) -> wildland_storage::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
        async fn write(&self, _path: &str, _offset: u64, data: &[u8]) -> wildland_storage::Result<u32> {
            Ok(data.len() as u32)
        }
        async fn truncate(&self, _path: &str, _size: u64) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn create(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn unlink(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn readdir(&self, _path: &str) -> wildland_storage::Result<Vec<DirEntry>> {
            Ok(vec![])
        }
        async fn mkdir(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn rmdir(&self, _path: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        async fn rename(&self, _from: &str, _to: &str) -> wildland_storage::Result<()> {
            Ok(())
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::read_write()
        }
    }

    fn item(backend_id: &str, backend: Arc<dyn StorageBackend>, path: &str, primary: bool) -> MountItem {
        MountItem {
            backend_id: backend_id.to_string(),
            backend,
            paths: vec![path.to_string()],
            read_only: false,
            primary,
            lazy: false,
            remount: false,
            pseudo_manifest: None,
        }
    }

    #[tokio::test]
    async fn test_read_falls_back_from_failing_primary() {
        let core = MountCore::new(StorageRegistry::new());
        core.mount(item("s1", Arc::new(FailingBackend), "/c", true)).unwrap();
        core.mount(item("s2", Arc::new(OkBackend(b"hello".to_vec())), "/c", false)).unwrap();

        let data = core.read_with_fallback("/c/a.txt", 0, 5).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_read_surfaces_io_error_when_all_fail() {
        let core = MountCore::new(StorageRegistry::new());
        core.mount(item("s1", Arc::new(FailingBackend), "/c", true)).unwrap();

        let err = core.read_with_fallback("/c/a.txt", 0, 5).await.unwrap_err();
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn test_remount_reuses_storage_id_on_identity_match() {
        let core = MountCore::new(StorageRegistry::new());
        let id1 = core.mount(item("s1", Arc::new(OkBackend(vec![])), "/c", true)).unwrap();

        let mut remount_item = item("s1", Arc::new(OkBackend(vec![])), "/c", true);
        remount_item.remount = true;
        let id2 = core.mount(remount_item).unwrap();

        assert_eq!(id1, id2);
    }

    #[test]
    fn test_remount_with_different_backend_id_gets_new_storage_id() {
        let core = MountCore::new(StorageRegistry::new());
        let id1 = core.mount(item("s1", Arc::new(OkBackend(vec![])), "/c", true)).unwrap();

        let mut remount_item = item("s2", Arc::new(OkBackend(vec![])), "/c", true);
        remount_item.remount = true;
        let id2 = core.mount(remount_item).unwrap();

        assert_ne!(id1, id2);
        assert!(core.table().get(id1).is_none());
    }

    #[test]
    fn test_unmount_unknown_storage_id_errors() {
        let core = MountCore::new(StorageRegistry::new());
        assert!(matches!(core.unmount(999), Err(MountError::UnknownStorageId(999))));
    }

    fn local_registry() -> StorageRegistry {
        let mut registry = StorageRegistry::new();
        registry.register(
            "local",
            Arc::new(|storage: &wildland_model::Storage| {
                let path = storage.params.get("path").and_then(|v| v.as_str()).unwrap_or("/tmp").to_string();
                Ok(Arc::new(wildland_storage::LocalFilesystemBackend::new(path.into())) as Arc<dyn StorageBackend>)
            }),
        );
        registry
    }

    fn container_manifest_text(child_path: &std::path::Path) -> String {
        format!(
            "signature: |\n  0xowner:AAAA\n---\nversion: \"1\"\nowner: \"0xowner\"\npaths:\n  - /sub\nbackends:\n  storage:\n    - version: \"1\"\n      owner: \"0xowner\"\n      type: local\n      container-path: /sub\n      backend-id: sub-backend\n      primary: true\n      path: {}\n",
            child_path.to_str().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_subcontainer_watch_mounts_then_unmounts_on_manifest_lifecycle() {
        let parent_dir = tempfile::tempdir().unwrap();
        let child_dir = tempfile::tempdir().unwrap();

        let core = Arc::new(MountCore::new(local_registry()));
        let parent_backend: Arc<dyn StorageBackend> = Arc::new(
            wildland_storage::LocalFilesystemBackend::new(parent_dir.path().to_path_buf())
                .with_manifest_pattern("*.container.yaml"),
        );
        let storage_id = core.mount(item("forest", parent_backend, "/forest", true)).unwrap();

        MountCore::spawn_subcontainer_watch(core.clone(), storage_id, false).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(parent_dir.path().join("a.container.yaml"), container_manifest_text(child_dir.path())).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if core.table().all().len() == 2 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for subcontainer mount");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        std::fs::remove_file(parent_dir.path().join("a.container.yaml")).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if core.table().all().len() == 1 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for subcontainer unmount");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_add_watch_unmount_aborts_the_watch_task() {
        let core = Arc::new(MountCore::new(StorageRegistry::new()));
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(wildland_storage::LocalFilesystemBackend::new(dir.path().to_path_buf()));
        let storage_id = core.mount(item("s1", backend, "/c", true)).unwrap();

        MountCore::spawn_watch(core.clone(), storage_id, "/".to_string(), false).unwrap();
        assert!(core.watch_tasks.read().contains_key(&storage_id));

        core.unmount(storage_id).unwrap();
        assert!(!core.watch_tasks.read().contains_key(&storage_id));
    }
}
