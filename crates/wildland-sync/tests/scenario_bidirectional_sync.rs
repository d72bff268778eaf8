//! spec.md §8 scenario 4: bidirectional sync convergence. Job `J` between
//! local dirs L and R, continuous=true. Write `L/x="1"`; wait `SYNCED`;
//! write `R/x="2"` with a later mtime; expect `L/x="2"` after the next
//! `SYNCED`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use wildland_storage::{LocalFilesystemBackend, StorageBackend};
use wildland_sync::{JobSpec, JobState, SyncJob};

async fn wait_for_state(job: &SyncJob, state: JobState, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if job.snapshot().state == state {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {state:?}, last saw {:?}", job.snapshot().state);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_content(backend: &Arc<dyn StorageBackend>, path: &str, expected: &[u8], timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(data) = backend.read(path, 0, 16).await {
            if data == expected {
                return;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {path} to converge to {expected:?}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_bidirectional_sync_converges_on_later_mtime() {
    let left_dir = tempfile::tempdir().unwrap();
    let right_dir = tempfile::tempdir().unwrap();
    let left: Arc<dyn StorageBackend> = Arc::new(LocalFilesystemBackend::new(left_dir.path().to_path_buf()));
    let right: Arc<dyn StorageBackend> = Arc::new(LocalFilesystemBackend::new(right_dir.path().to_path_buf()));

    left.create("/x").await.unwrap();
    left.write("/x", 0, b"1").await.unwrap();

    let job = SyncJob::spawn(JobSpec {
        job_id: "0xalice|container-1".into(),
        container_name: "demo".into(),
        source: left.clone(),
        target: right.clone(),
        continuous: true,
        unidirectional: false,
        active_events: HashSet::new(),
    });

    wait_for_state(&job, JobState::Synced, Duration::from_secs(5)).await;
    let synced = right.read("/x", 0, 16).await.unwrap();
    assert_eq!(synced, b"1");

    // Local filesystem mtimes are second-granular; sleep past the tick so
    // the write below is unambiguously later than the initial sync.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    right.truncate("/x", 0).await.unwrap();
    right.write("/x", 0, b"2").await.unwrap();

    wait_for_content(&left, "/x", b"2", Duration::from_secs(10)).await;
    assert_ne!(job.snapshot().state, JobState::Error);

    job.stop();
}
