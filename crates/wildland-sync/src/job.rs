use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use wildland_storage::{StorageBackend, WatchEventKind};

use crate::backoff::with_backoff;
use crate::error::SyncError;
use crate::index::{build_index, FileIndex};

/// States of the per-job state machine (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Init,
    Scanning,
    Syncing,
    Synced,
    Stopped,
    Error,
}

/// The job's externally-visible state, shared between the background task
/// and every `job-state`/`status` reader.
#[derive(Debug, Clone, Serialize)]
pub struct JobStateSnapshot {
    pub state: JobState,
    pub last_error: Option<String>,
}

/// Control messages a running job's task selects on alongside watcher
/// events.
enum JobControl {
    Stop,
    TestError(String),
    SetActiveEvents(HashSet<String>),
}

/// A running sync job: two backends, direction/continuity flags, and the
/// shared state a control-socket reader consults. The actual state machine
/// runs on a detached tokio task; this handle only carries what the control
/// socket needs to read or steer it (spec.md §5 "single-writer, many-reader"
/// job table).
pub struct SyncJob {
    pub job_id: String,
    pub container_name: String,
    state: Arc<RwLock<JobStateSnapshot>>,
    active_events: Arc<RwLock<HashSet<String>>>,
    control_tx: mpsc::Sender<JobControl>,
    task: tokio::task::JoinHandle<()>,
}

pub struct JobSpec {
    pub job_id: String,
    pub container_name: String,
    pub source: Arc<dyn StorageBackend>,
    pub target: Arc<dyn StorageBackend>,
    pub continuous: bool,
    pub unidirectional: bool,
    pub active_events: HashSet<String>,
}

impl SyncJob {
    pub fn spawn(spec: JobSpec) -> Self {
        let state = Arc::new(RwLock::new(JobStateSnapshot {
            state: JobState::Init,
            last_error: None,
        }));
        let active_events = Arc::new(RwLock::new(spec.active_events));
        let (control_tx, control_rx) = mpsc::channel(16);

        let task_state = state.clone();
        let task_events = active_events.clone();
        let job_id = spec.job_id.clone();
        let source = spec.source;
        let target = spec.target;
        let continuous = spec.continuous;
        let unidirectional = spec.unidirectional;

        let task = tokio::spawn(async move {
            run(job_id, source, target, continuous, unidirectional, task_state, task_events, control_rx).await;
        });

        Self {
            job_id: spec.job_id,
            container_name: spec.container_name,
            state,
            active_events,
            control_tx,
            task,
        }
    }

    pub fn snapshot(&self) -> JobStateSnapshot {
        self.state.read().clone()
    }

    pub fn set_active_events(&self, events: HashSet<String>) {
        *self.active_events.write() = events.clone();
        let _ = self.control_tx.try_send(JobControl::SetActiveEvents(events));
    }

    /// Injects a synthetic `ERROR`, for suite use (spec.md §4.7 `test-error`).
    pub fn inject_test_error(&self) {
        let _ = self.control_tx.try_send(JobControl::TestError("synthetic test-error".to_string()));
    }

    /// Signals the job's task to stop; does not wait for it to finish —
    /// callers that need to observe `STOPPED` should poll `snapshot()`.
    pub fn stop(&self) {
        let _ = self.control_tx.try_send(JobControl::Stop);
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    job_id: String,
    source: Arc<dyn StorageBackend>,
    target: Arc<dyn StorageBackend>,
    continuous: bool,
    unidirectional: bool,
    state: Arc<RwLock<JobStateSnapshot>>,
    active_events: Arc<RwLock<HashSet<String>>>,
    mut control_rx: mpsc::Receiver<JobControl>,
) {
    set_state(&state, JobState::Scanning, None);

    let mut source_deletes: HashSet<String> = HashSet::new();
    let mut target_deletes: HashSet<String> = HashSet::new();

    loop {
        let source_index = match with_backoff(|| build_index(&source, "/")).await {
            Ok(i) => i,
            Err(e) => return set_state(&state, JobState::Error, Some(SyncError::from(e).to_string())),
        };
        let target_index = match with_backoff(|| build_index(&target, "/")).await {
            Ok(i) => i,
            Err(e) => return set_state(&state, JobState::Error, Some(SyncError::from(e).to_string())),
        };

        let cycle_source_deletes = std::mem::take(&mut source_deletes);
        let cycle_target_deletes = std::mem::take(&mut target_deletes);
        let actions = diff(&source_index, &target_index, unidirectional, &cycle_source_deletes, &cycle_target_deletes);
        set_state(&state, JobState::Syncing, None);

        for action in actions {
            tokio::select! {
                biased;
                msg = control_rx.recv() => {
                    match msg {
                        Some(JobControl::Stop) | None => return set_state(&state, JobState::Stopped, None),
                        Some(JobControl::TestError(msg)) => return set_state(&state, JobState::Error, Some(msg)),
                        Some(JobControl::SetActiveEvents(_)) => {}
                    }
                }
                result = apply(&source, &target, &action) => {
                    if let Err(e) = result {
                        return set_state(&state, JobState::Error, Some(SyncError::from(e).to_string()));
                    }
                }
            }
        }

        if !continuous {
            return set_state(&state, JobState::Synced, None);
        }

        set_state(&state, JobState::Synced, None);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let mut source_events = source.watcher("/", true).await.unwrap_or(None);
        let mut target_events = target.watcher("/", true).await.unwrap_or(None);
        if source_events.is_none() {
            source_events = Some(wildland_storage::periodic_scan_watcher(source.clone(), "/".to_string(), std::time::Duration::from_secs(2)));
        }
        if target_events.is_none() {
            target_events = Some(wildland_storage::periodic_scan_watcher(target.clone(), "/".to_string(), std::time::Duration::from_secs(2)));
        }
        let mut source_events = source_events.expect("fallback watcher always set");
        let mut target_events = target_events.expect("fallback watcher always set");

        // Wait for an event worth re-scanning over. A disallowed event must
        // re-arm the watch without ever reaching the diff/apply path or
        // touching `state` (spec.md §4.7 "Events not in the set are dropped
        // before state changes") — so filtered-out events loop back to the
        // same `select!` instead of falling through to the outer loop.
        'wait: loop {
            tokio::select! {
                msg = control_rx.recv() => {
                    match msg {
                        Some(JobControl::Stop) | None => { let _ = shutdown_tx.send(()); return set_state(&state, JobState::Stopped, None); }
                        Some(JobControl::TestError(msg)) => { let _ = shutdown_tx.send(()); return set_state(&state, JobState::Error, Some(msg)); }
                        Some(JobControl::SetActiveEvents(_)) => continue 'wait,
                    }
                }
                event = source_events.recv() => match event {
                    Some(e) if event_allowed(&active_events, e.kind) => {
                        if e.kind == WatchEventKind::Delete {
                            source_deletes.insert(e.path);
                        }
                        break 'wait;
                    }
                    Some(_) => continue 'wait,
                    None => break 'wait,
                },
                event = target_events.recv() => match event {
                    Some(e) if event_allowed(&active_events, e.kind) => {
                        if e.kind == WatchEventKind::Delete {
                            target_deletes.insert(e.path);
                        }
                        break 'wait;
                    }
                    Some(_) => continue 'wait,
                    None => break 'wait,
                },
                _ = shutdown_rx.changed() => break 'wait,
            }
        }
    }
}

fn event_allowed(active_events: &Arc<RwLock<HashSet<String>>>, kind: WatchEventKind) -> bool {
    let set = active_events.read();
    if set.is_empty() {
        return true;
    }
    set.contains(event_name(kind))
}

fn event_name(kind: WatchEventKind) -> &'static str {
    match kind {
        WatchEventKind::Create => "create",
        WatchEventKind::Modify => "modify",
        WatchEventKind::Delete => "delete",
    }
}

fn set_state(state: &Arc<RwLock<JobStateSnapshot>>, new_state: JobState, error: Option<String>) {
    let mut guard = state.write();
    guard.state = new_state;
    if error.is_some() {
        guard.last_error = error;
    }
}

enum SyncAction {
    /// Copy `path` from one side to the other.
    Copy { path: String, reverse: bool },
    /// Unlink `path` on the named side, propagating a watcher-confirmed
    /// delete from the other side.
    Delete { path: String, on_source: bool },
}

/// Diffs two file indexes into the work queue `SYNCING` replays (spec.md
/// §4.7). Unidirectional jobs only ever copy source → target; bidirectional
/// jobs apply last-writer-wins by mtime, breaking ties by lexicographic
/// hash order (SPEC_FULL.md §12).
///
/// A path missing from one side is ambiguous on its own: it may never have
/// existed there, or it may have just been removed. `source_deletes` and
/// `target_deletes` hold the paths each side's watcher specifically
/// reported as `Delete` since the last diff; only those are propagated as
/// deletes on the peer. Every other one-sided absence is treated as a
/// plain gap and recreated from the side that still has the file.
fn diff(
    source: &FileIndex,
    target: &FileIndex,
    unidirectional: bool,
    source_deletes: &HashSet<String>,
    target_deletes: &HashSet<String>,
) -> Vec<SyncAction> {
    let mut actions = Vec::new();
    let mut paths: Vec<&String> = source.keys().chain(target.keys()).collect();
    paths.sort();
    paths.dedup();

    for path in paths {
        match (source.get(path), target.get(path)) {
            (Some(_), None) => {
                if !unidirectional && target_deletes.contains(path) {
                    actions.push(SyncAction::Delete { path: path.clone(), on_source: true });
                } else {
                    actions.push(SyncAction::Copy { path: path.clone(), reverse: false });
                }
            }
            (None, Some(_)) => {
                if source_deletes.contains(path) {
                    actions.push(SyncAction::Delete { path: path.clone(), on_source: false });
                } else if !unidirectional {
                    actions.push(SyncAction::Copy { path: path.clone(), reverse: true });
                }
            }
            (Some(s), Some(t)) if s.hash != t.hash => {
                if unidirectional || s.mtime_unix > t.mtime_unix || (s.mtime_unix == t.mtime_unix && s.hash > t.hash) {
                    actions.push(SyncAction::Copy { path: path.clone(), reverse: false });
                } else {
                    actions.push(SyncAction::Copy { path: path.clone(), reverse: true });
                }
            }
            _ => {}
        }
    }

    actions
}

async fn apply(source: &Arc<dyn StorageBackend>, target: &Arc<dyn StorageBackend>, action: &SyncAction) -> Result<(), wildland_storage::StorageError> {
    match action {
        SyncAction::Copy { path, reverse } => {
            let (from, to): (&Arc<dyn StorageBackend>, &Arc<dyn StorageBackend>) =
                if *reverse { (target, source) } else { (source, target) };

            with_backoff(|| async {
                let meta = from.stat(path).await?;
                if to.stat(path).await.is_err() {
                    to.create(path).await?;
                }
                let data = from.read(path, 0, meta.size as u32).await?;
                to.truncate(path, 0).await?;
                to.write(path, 0, &data).await?;
                Ok(())
            })
            .await
        }
        SyncAction::Delete { path, on_source } => {
            let backend = if *on_source { source } else { target };
            with_backoff(|| async {
                match backend.unlink(path).await {
                    Ok(()) => Ok(()),
                    Err(wildland_storage::StorageError::NotFound(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wildland_storage::LocalFilesystemBackend;

    fn backend(dir: &std::path::Path) -> Arc<dyn StorageBackend> {
        Arc::new(LocalFilesystemBackend::new(dir.to_path_buf()))
    }

    #[tokio::test]
    async fn test_one_shot_bidirectional_converges_and_reports_synced() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = backend(src_dir.path());
        let target = backend(dst_dir.path());
        source.create("/only-source.txt").await.unwrap();
        source.write("/only-source.txt", 0, b"from source").await.unwrap();
        target.create("/only-target.txt").await.unwrap();
        target.write("/only-target.txt", 0, b"from target").await.unwrap();

        let job = SyncJob::spawn(JobSpec {
            job_id: "owner|uuid".into(),
            container_name: "demo".into(),
            source: source.clone(),
            target: target.clone(),
            continuous: false,
            unidirectional: false,
            active_events: HashSet::new(),
        });

        job.join().await;

        assert!(target.stat("/only-source.txt").await.is_ok());
        assert!(source.stat("/only-target.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_unidirectional_never_copies_target_only_file_back() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = backend(src_dir.path());
        let target = backend(dst_dir.path());
        target.create("/only-target.txt").await.unwrap();
        target.write("/only-target.txt", 0, b"keep me put").await.unwrap();

        let job = SyncJob::spawn(JobSpec {
            job_id: "owner|uuid2".into(),
            container_name: "demo".into(),
            source: source.clone(),
            target: target.clone(),
            continuous: false,
            unidirectional: true,
            active_events: HashSet::new(),
        });

        job.join().await;
        assert!(source.stat("/only-target.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_stop_transitions_to_stopped() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = backend(src_dir.path());
        let target = backend(dst_dir.path());

        let job = SyncJob::spawn(JobSpec {
            job_id: "owner|uuid3".into(),
            container_name: "demo".into(),
            source,
            target,
            continuous: true,
            unidirectional: false,
            active_events: HashSet::new(),
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        job.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job.snapshot().state, JobState::Stopped);
    }

    #[tokio::test]
    async fn test_test_error_injection() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = backend(src_dir.path());
        let target = backend(dst_dir.path());

        let job = SyncJob::spawn(JobSpec {
            job_id: "owner|uuid4".into(),
            container_name: "demo".into(),
            source,
            target,
            continuous: true,
            unidirectional: false,
            active_events: HashSet::new(),
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        job.inject_test_error();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = job.snapshot();
        assert_eq!(snapshot.state, JobState::Error);
        assert!(snapshot.last_error.is_some());
    }
}
