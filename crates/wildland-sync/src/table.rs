use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::job::{JobStateSnapshot, SyncJob};

/// The single-writer, many-reader job table (spec.md §5), keyed by job-id.
#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<String, SyncJob>>,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub container_name: String,
    #[serde(flatten)]
    pub snapshot: JobStateSnapshot,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.read().contains_key(job_id)
    }

    pub fn insert(&self, job: SyncJob) {
        self.jobs.write().insert(job.job_id.clone(), job);
    }

    pub fn set_active_events(&self, job_id: &str, events: std::collections::HashSet<String>) -> bool {
        match self.jobs.read().get(job_id) {
            Some(job) => {
                job.set_active_events(events);
                true
            }
            None => false,
        }
    }

    pub fn inject_test_error(&self, job_id: &str) -> bool {
        match self.jobs.read().get(job_id) {
            Some(job) => {
                job.inject_test_error();
                true
            }
            None => false,
        }
    }

    /// Signals `stop` and removes the job from the table; the task itself
    /// finishes asynchronously.
    pub fn stop(&self, job_id: &str) -> bool {
        let job = self.jobs.write().remove(job_id);
        match job {
            Some(job) => {
                job.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let jobs: Vec<SyncJob> = self.jobs.write().drain().map(|(_, job)| job).collect();
        for job in jobs {
            job.stop();
        }
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobStateSnapshot> {
        self.jobs.read().get(job_id).map(|job| job.snapshot())
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        self.jobs
            .read()
            .values()
            .map(|job| JobSummary {
                job_id: job.job_id.clone(),
                container_name: job.container_name.clone(),
                snapshot: job.snapshot(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSpec, JobState};
    use std::collections::HashSet;
    use std::sync::Arc;
    use wildland_storage::{LocalFilesystemBackend, StorageBackend};

    fn backend() -> (tempfile::TempDir, Arc<dyn StorageBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalFilesystemBackend::new(dir.path().to_path_buf()));
        (dir, backend)
    }

    #[tokio::test]
    async fn test_insert_contains_and_stop() {
        let (_src_dir, source) = backend();
        let (_dst_dir, target) = backend();
        let table = JobTable::new();

        let job = SyncJob::spawn(JobSpec {
            job_id: "a|b".into(),
            container_name: "demo".into(),
            source,
            target,
            continuous: true,
            unidirectional: false,
            active_events: HashSet::new(),
        });
        table.insert(job);

        assert!(table.contains("a|b"));
        assert!(table.stop("a|b"));
        assert!(!table.contains("a|b"));
        assert!(!table.stop("a|b"));
    }

    #[tokio::test]
    async fn test_snapshot_reflects_running_state() {
        let (_src_dir, source) = backend();
        let (_dst_dir, target) = backend();
        let table = JobTable::new();

        let job = SyncJob::spawn(JobSpec {
            job_id: "a|c".into(),
            container_name: "demo".into(),
            source,
            target,
            continuous: true,
            unidirectional: false,
            active_events: HashSet::new(),
        });
        table.insert(job);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = table.snapshot("a|c").unwrap();
        assert_eq!(snapshot.state, JobState::Synced);
    }
}
