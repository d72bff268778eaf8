use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use wildland_storage::StorageBackend;

/// A live backend plus the paths it is mounted under (spec.md §4.6: "The
/// core keeps a map from mounted storage-id ... to a live backend plus the
/// set of paths under which it is visible").
pub struct MountedStorage {
    pub storage_id: u64,
    pub backend_id: String,
    pub backend: Arc<dyn StorageBackend>,
    pub paths: Vec<String>,
    pub read_only: bool,
    pub primary: bool,
    pub lazy: bool,
    opened: AtomicBool,
}

impl MountedStorage {
    /// Whether `open()` has run yet. Lazy-mounted storages defer this until
    /// first access (spec.md §4.6).
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    pub fn mark_open(&self) {
        self.opened.store(true, Ordering::Release);
    }
}

/// The process-wide map from storage-id to live backend, and the derived
/// path → candidate-storages index used for path multiplexing (spec.md
/// §4.6). Single-writer, many-reader, guarded by a short critical section
/// (spec.md §5 "Shared state").
#[derive(Default)]
pub struct MountTable {
    by_id: HashMap<u64, Arc<MountedStorage>>,
    next_id: AtomicU64,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_storage_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn insert(&mut self, entry: MountedStorage) -> u64 {
        let id = entry.storage_id;
        self.by_id.insert(id, Arc::new(entry));
        id
    }

    /// Inserts a fresh entry under `storage_id`, replacing whatever was
    /// there before (used by remount, which has already decided which id to
    /// reuse).
    #[allow(clippy::too_many_arguments)]
    pub fn insert_at(
        &mut self,
        storage_id: u64,
        backend_id: String,
        backend: Arc<dyn StorageBackend>,
        paths: Vec<String>,
        read_only: bool,
        primary: bool,
        lazy: bool,
    ) -> u64 {
        let entry = MountedStorage {
            storage_id,
            backend_id,
            backend,
            paths,
            read_only,
            primary,
            lazy,
            opened: AtomicBool::new(!lazy),
        };
        self.by_id.insert(storage_id, Arc::new(entry));
        storage_id
    }

    pub fn remove(&mut self, storage_id: u64) -> Option<Arc<MountedStorage>> {
        self.by_id.remove(&storage_id)
    }

    pub fn get(&self, storage_id: u64) -> Option<Arc<MountedStorage>> {
        self.by_id.get(&storage_id).cloned()
    }

    pub fn find_by_backend_id(&self, backend_id: &str) -> Option<Arc<MountedStorage>> {
        self.by_id.values().find(|s| s.backend_id == backend_id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<MountedStorage>> {
        self.by_id.values().cloned().collect()
    }

    /// Every mounted storage whose path set contains `path` as a prefix,
    /// primary storages first — the candidate list a read or stat falls
    /// through on `BackendIO` (spec.md §4.6 "File lookups resolve to the
    /// primary-owning storage; on read error the core falls back to the
    /// next storage of the same container").
    pub fn storages_owning(&self, path: &str) -> Vec<Arc<MountedStorage>> {
        let mut matches: Vec<Arc<MountedStorage>> = self
            .by_id
            .values()
            .filter(|s| s.paths.iter().any(|mp| is_under(mp, path)))
            .cloned()
            .collect();
        matches.sort_by_key(|s| !s.primary);
        matches
    }

    /// The union of every synthetic intermediate directory implied by
    /// mounted paths, plus each backend's own listing, at `dir` (spec.md
    /// §4.6 "Path multiplexing").
    pub fn synthetic_children(&self, dir: &str) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        for storage in self.by_id.values() {
            for mounted_path in &storage.paths {
                if let Some(child) = next_segment_after(mounted_path, dir) {
                    names.insert(child);
                }
            }
        }
        names.into_iter().collect()
    }
}

/// Whether `query` names `mount_path` itself or something nested under it.
fn is_under(mount_path: &str, query: &str) -> bool {
    let trimmed = mount_path.trim_end_matches('/');
    query == trimmed || query.starts_with(&format!("{trimmed}/"))
}

/// If `mounted_path` lies strictly under `dir`, the single path segment
/// immediately below `dir` on the way to it (a synthetic intermediate
/// directory name, or the final component itself).
fn next_segment_after(mounted_path: &str, dir: &str) -> Option<String> {
    let dir_norm = if dir == "/" { "" } else { dir.trim_end_matches('/') };
    let rest = mounted_path.strip_prefix(dir_norm)?.strip_prefix('/')?;
    let first = rest.split('/').next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

/// Builds a [`MountedStorage`], assigning it the next storage-id.
pub fn new_mounted_storage(
    table: &MountTable,
    backend_id: String,
    backend: Arc<dyn StorageBackend>,
    paths: Vec<String>,
    read_only: bool,
    primary: bool,
    lazy: bool,
) -> MountedStorage {
    MountedStorage {
        storage_id: table.next_storage_id(),
        backend_id,
        backend,
        paths,
        read_only,
        primary,
        lazy,
        opened: AtomicBool::new(!lazy),
    }
}
