use std::collections::BTreeMap;
use std::sync::Arc;

use wildland_storage::{StorageBackend, StorageError};

/// One file's index entry: its content hash and modification time, the pair
/// the per-job state machine diffs against the other side's index (spec.md
/// §4.7 "both sides produce complete file indexes (path → content hash +
/// mtime)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: String,
    pub mtime_unix: u64,
}

pub type FileIndex = BTreeMap<String, IndexEntry>;

/// Reads every regular file under `root` from `backend`, hashing its full
/// contents with blake3. Directories are walked but not indexed themselves;
/// only leaf files participate in the diff.
pub async fn build_index(backend: &Arc<dyn StorageBackend>, root: &str) -> Result<FileIndex, StorageError> {
    let mut index = FileIndex::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let entries = backend.readdir(&dir).await?;
        for entry in entries {
            let full = join(&dir, &entry.name);
            if entry.is_dir {
                stack.push(full);
                continue;
            }

            let meta = backend.stat(&full).await?;
            let hash = hash_file(backend, &full, meta.size).await?;
            index.insert(
                full,
                IndexEntry {
                    hash,
                    mtime_unix: meta.mtime_unix,
                },
            );
        }
    }

    Ok(index)
}

async fn hash_file(backend: &Arc<dyn StorageBackend>, path: &str, size: u64) -> Result<String, StorageError> {
    let mut hasher = blake3::Hasher::new();
    let mut offset = 0u64;
    const CHUNK: u32 = 1 << 20;

    while offset < size {
        let len = std::cmp::min(CHUNK as u64, size - offset) as u32;
        let data = backend.read(path, offset, len).await?;
        if data.is_empty() {
            break;
        }
        hasher.update(&data);
        offset += data.len() as u64;
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wildland_storage::LocalFilesystemBackend;

    #[tokio::test]
    async fn test_build_index_hashes_files_and_skips_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalFilesystemBackend::new(dir.path().to_path_buf()));
        backend.mkdir("/sub").await.unwrap();
        backend.create("/a.txt").await.unwrap();
        backend.write("/a.txt", 0, b"hello").await.unwrap();
        backend.create("/sub/b.txt").await.unwrap();
        backend.write("/sub/b.txt", 0, b"world").await.unwrap();

        let index = build_index(&backend, "/").await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains_key("/a.txt"));
        assert!(index.contains_key("/sub/b.txt"));
        assert_ne!(index["/a.txt"].hash, index["/sub/b.txt"].hash);
    }

    #[tokio::test]
    async fn test_identical_content_hashes_equal() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalFilesystemBackend::new(dir.path().to_path_buf()));
        backend.create("/a.txt").await.unwrap();
        backend.write("/a.txt", 0, b"same").await.unwrap();
        backend.create("/b.txt").await.unwrap();
        backend.write("/b.txt", 0, b"same").await.unwrap();

        let index = build_index(&backend, "/").await.unwrap();
        assert_eq!(index["/a.txt"].hash, index["/b.txt"].hash);
    }
}
