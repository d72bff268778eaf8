use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::backend::StorageBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// A channel of watch events. The sending half lives with whatever produced
/// the events (a native OS watcher thread, or the periodic-scan fallback
/// below); `StorageBackend::watcher` hands the receiving half to the
/// caller.
pub type WatchStream = mpsc::Receiver<WatchEvent>;

/// Substitutes a periodic `readdir`-diff scan for a backend whose driver
/// lacks `supports-watcher-native` (spec.md §4.5). Spawns a background task
/// that snapshots the tree under `pattern` every `interval` and emits
/// Create/Modify/Delete events for what changed since the last snapshot.
///
/// `ignore_own` events are not distinguishable from a polling scan (there is
/// no origin to compare against); callers that need own-write suppression
/// must do so at the call site that issued the write.
pub fn periodic_scan_watcher(
    backend: Arc<dyn StorageBackend>,
    pattern: String,
    interval: Duration,
) -> WatchStream {
    let (tx, rx) = mpsc::channel(256);

    tokio::spawn(async move {
        let mut previous: HashMap<String, u64> = HashMap::new();
        loop {
            let current = match snapshot(&*backend, &pattern).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("periodic scan watcher failed to list {pattern}: {e}");
                    tokio::time::sleep(interval).await;
                    continue;
                }
            };

            for (path, mtime) in &current {
                match previous.get(path) {
                    None => {
                        if tx
                            .send(WatchEvent {
                                kind: WatchEventKind::Create,
                                path: path.clone(),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(prev_mtime) if prev_mtime != mtime => {
                        if tx
                            .send(WatchEvent {
                                kind: WatchEventKind::Modify,
                                path: path.clone(),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    _ => {}
                }
            }

            for path in previous.keys() {
                if !current.contains_key(path) {
                    if tx
                        .send(WatchEvent {
                            kind: WatchEventKind::Delete,
                            path: path.clone(),
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }

            previous = current;
            tokio::time::sleep(interval).await;
        }
    });

    rx
}

async fn snapshot(
    backend: &dyn StorageBackend,
    pattern: &str,
) -> crate::error::Result<HashMap<String, u64>> {
    let mut out = HashMap::new();
    let mut stack = vec![pattern.to_string()];

    while let Some(dir) = stack.pop() {
        let entries = backend.readdir(&dir).await?;
        for entry in entries {
            let full = if dir.ends_with('/') {
                format!("{dir}{}", entry.name)
            } else {
                format!("{dir}/{}", entry.name)
            };
            if entry.is_dir {
                stack.push(full);
            } else if let Ok(meta) = backend.stat(&full).await {
                out.insert(full, meta.mtime_unix);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFilesystemBackend;
    use std::time::Duration;

    #[tokio::test]
    async fn test_periodic_scan_detects_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> =
            Arc::new(LocalFilesystemBackend::new(dir.path().to_path_buf()));

        let mut rx = periodic_scan_watcher(backend.clone(), "/".to_string(), Duration::from_millis(20));

        backend.create("/a.txt").await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WatchEventKind::Create);
        assert_eq!(event.path, "/a.txt");
    }
}
