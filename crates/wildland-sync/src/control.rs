use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use wildland_model::Storage;
use wildland_rpc::{RpcError, RpcHandler};
use wildland_storage::StorageRegistry;

use crate::error::SyncError;
use crate::job::{JobSpec, SyncJob};
use crate::table::JobTable;

#[derive(Debug, Deserialize)]
struct StartArgs {
    #[serde(rename = "container-name")]
    container_name: String,
    #[serde(rename = "job-id")]
    job_id: String,
    source: Storage,
    target: Storage,
    continuous: bool,
    unidirectional: bool,
    #[serde(default, rename = "active-events")]
    active_events: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JobIdArgs {
    #[serde(rename = "job-id")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct ActiveEventsArgs {
    #[serde(rename = "job-id")]
    job_id: String,
    #[serde(rename = "active-events")]
    active_events: Vec<String>,
}

fn bad_args(e: impl std::fmt::Display) -> RpcError {
    tracing::debug!("bad-args: {e}");
    RpcError::BadArgs
}

/// Dispatches every `sync-commands.json` command (spec.md §6) against a
/// shared [`JobTable`], building backends for each job's `source`/`target`
/// descriptors through a [`StorageRegistry`] exactly as `MountControl` does
/// for mount items.
pub struct SyncControl {
    table: Arc<JobTable>,
    registry: StorageRegistry,
}

impl SyncControl {
    pub fn new(table: Arc<JobTable>, registry: StorageRegistry) -> Self {
        Self { table, registry }
    }
}

#[async_trait]
impl RpcHandler for SyncControl {
    async fn handle(&self, cmd: &str, args: Value) -> Result<Value, RpcError> {
        match cmd {
            "start" => {
                let args: StartArgs = serde_json::from_value(args).map_err(bad_args)?;
                if self.table.contains(&args.job_id) {
                    return Err(RpcError::Internal(SyncError::JobAlreadyExists(args.job_id).to_string()));
                }
                let source = self.registry.build(&args.source).map_err(|e| RpcError::Internal(e.to_string()))?;
                let target = self.registry.build(&args.target).map_err(|e| RpcError::Internal(e.to_string()))?;

                let job = SyncJob::spawn(JobSpec {
                    job_id: args.job_id.clone(),
                    container_name: args.container_name,
                    source,
                    target,
                    continuous: args.continuous,
                    unidirectional: args.unidirectional,
                    active_events: args.active_events.into_iter().collect(),
                });
                self.table.insert(job);
                Ok(json!({ "job-id": args.job_id }))
            }
            "active-events" => {
                let args: ActiveEventsArgs = serde_json::from_value(args).map_err(bad_args)?;
                let events: HashSet<String> = args.active_events.into_iter().collect();
                if self.table.set_active_events(&args.job_id, events) {
                    Ok(json!({}))
                } else {
                    Err(RpcError::Internal(SyncError::JobNotFound(args.job_id).to_string()))
                }
            }
            "stop" => {
                let args: JobIdArgs = serde_json::from_value(args).map_err(bad_args)?;
                if self.table.stop(&args.job_id) {
                    Ok(json!({}))
                } else {
                    Err(RpcError::Internal(SyncError::JobNotFound(args.job_id).to_string()))
                }
            }
            "stop-all" => {
                self.table.stop_all();
                Ok(json!({}))
            }
            "job-state" => {
                let args: JobIdArgs = serde_json::from_value(args).map_err(bad_args)?;
                match self.table.snapshot(&args.job_id) {
                    Some(snapshot) => serde_json::to_value(snapshot).map_err(|e| RpcError::Internal(e.to_string())),
                    None => Err(RpcError::Internal(SyncError::JobNotFound(args.job_id).to_string())),
                }
            }
            "status" => {
                let summaries = self.table.summaries();
                Ok(json!({ "jobs": summaries }))
            }
            "test-error" => {
                let args: JobIdArgs = serde_json::from_value(args).map_err(bad_args)?;
                if self.table.inject_test_error(&args.job_id) {
                    Ok(json!({}))
                } else {
                    Err(RpcError::Internal(SyncError::JobNotFound(args.job_id).to_string()))
                }
            }
            "shutdown" => {
                self.table.stop_all();
                Ok(json!({}))
            }
            _ => Err(RpcError::UnknownCommand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wildland_storage::{LocalFilesystemBackend, StorageBackend};

    fn registry() -> StorageRegistry {
        let mut r = StorageRegistry::new();
        r.register(
            "local",
            Arc::new(|storage: &Storage| {
                let path = storage.params.get("path").and_then(|v| v.as_str()).unwrap_or("/tmp").to_string();
                Ok(Arc::new(LocalFilesystemBackend::new(path.into())) as Arc<dyn StorageBackend>)
            }),
        );
        r
    }

    fn storage_value(path: &str, backend_id: &str) -> Value {
        json!({
            "version": "1",
            "owner": "0xowner",
            "type": "local",
            "container-path": "/.uuid/11111111-1111-1111-1111-111111111111",
            "backend-id": backend_id,
            "primary": true,
            "path": path,
        })
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let control = SyncControl::new(Arc::new(JobTable::new()), registry());
        let err = control.handle("no-such-command", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownCommand));
    }

    #[tokio::test]
    async fn test_start_then_status_reports_job() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let control = SyncControl::new(Arc::new(JobTable::new()), registry());

        let args = json!({
            "container-name": "demo",
            "job-id": "0xowner|uuid-1",
            "source": storage_value(src.path().to_str().unwrap(), "s1"),
            "target": storage_value(dst.path().to_str().unwrap(), "s2"),
            "continuous": false,
            "unidirectional": false,
        });
        control.handle("start", args).await.unwrap();

        let status = control.handle("status", json!({})).await.unwrap();
        assert_eq!(status["jobs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_duplicate_job_id_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let control = SyncControl::new(Arc::new(JobTable::new()), registry());

        let args = json!({
            "container-name": "demo",
            "job-id": "0xowner|uuid-2",
            "source": storage_value(src.path().to_str().unwrap(), "s1"),
            "target": storage_value(dst.path().to_str().unwrap(), "s2"),
            "continuous": true,
            "unidirectional": false,
        });
        control.handle("start", args.clone()).await.unwrap();
        let err = control.handle("start", args).await.unwrap_err();
        assert!(matches!(err, RpcError::Internal(_)));
    }

    #[tokio::test]
    async fn test_stop_unknown_job_rejected() {
        let control = SyncControl::new(Arc::new(JobTable::new()), registry());
        let err = control.handle("stop", json!({"job-id": "nope"})).await.unwrap_err();
        assert!(matches!(err, RpcError::Internal(_)));
    }
}
