use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use wildland_model::Storage;
use wildland_rpc::{RpcError, RpcHandler};

use crate::core::{MountCore, MountItem};

#[derive(Debug, Deserialize)]
struct MountArgs {
    items: Vec<MountItemArgs>,
    #[serde(default)]
    lazy: bool,
}

#[derive(Debug, Deserialize)]
struct MountItemArgs {
    paths: Vec<String>,
    storage: Storage,
    #[serde(default, rename = "read-only")]
    read_only: bool,
    #[serde(default)]
    extra: Value,
    #[serde(default)]
    remount: bool,
}

#[derive(Debug, Deserialize)]
struct UnmountArgs {
    #[serde(rename = "storage-id")]
    storage_id: u64,
}

#[derive(Debug, Deserialize)]
struct ClearCacheArgs {
    #[serde(default, rename = "storage-id")]
    storage_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileInfoArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct AddWatchArgs {
    #[serde(rename = "storage-id")]
    storage_id: u64,
    pattern: String,
    #[serde(default, rename = "ignore-own")]
    ignore_own: bool,
}

#[derive(Debug, Deserialize)]
struct AddSubcontainerWatchArgs {
    #[serde(rename = "backend-param")]
    storage_id: u64,
    #[serde(default, rename = "ignore-own")]
    ignore_own: bool,
}

/// Dispatches every `fs-commands.json` command (spec.md §6) against a shared
/// [`MountCore`]. Plugs into [`wildland_rpc::RpcServer`] as its
/// [`RpcHandler`].
pub struct MountControl {
    core: Arc<MountCore>,
}

impl MountControl {
    pub fn new(core: Arc<MountCore>) -> Self {
        Self { core }
    }
}

fn bad_args(e: impl std::fmt::Display) -> RpcError {
    tracing::debug!("bad-args: {e}");
    RpcError::BadArgs
}

#[async_trait]
impl RpcHandler for MountControl {
    async fn handle(&self, cmd: &str, args: Value) -> Result<Value, RpcError> {
        match cmd {
            "mount" => {
                let args: MountArgs = serde_json::from_value(args).map_err(bad_args)?;
                let mut storage_ids = Vec::new();
                for mount_item in args.items {
                    let backend = self
                        .core
                        .registry()
                        .build(&mount_item.storage)
                        .map_err(|e| RpcError::Internal(e.to_string()))?;
                    let id = self
                        .core
                        .mount(MountItem {
                            backend_id: mount_item.storage.backend_id.clone(),
                            backend,
                            paths: mount_item.paths,
                            read_only: mount_item.read_only,
                            primary: mount_item.storage.primary,
                            lazy: args.lazy,
                            remount: mount_item.remount,
                            pseudo_manifest: None,
                        })
                        .map_err(|e| RpcError::Internal(e.to_string()))?;
                    storage_ids.push(id);
                }
                Ok(json!({ "storage-ids": storage_ids }))
            }
            "unmount" => {
                let args: UnmountArgs = serde_json::from_value(args).map_err(bad_args)?;
                self.core.unmount(args.storage_id).map_err(|e| RpcError::Internal(e.to_string()))?;
                Ok(json!({}))
            }
            "clear-cache" => {
                let args: ClearCacheArgs = serde_json::from_value(args).map_err(bad_args)?;
                self.core.clear_cache(args.storage_id);
                Ok(json!({}))
            }
            "add-watch" => {
                let args: AddWatchArgs = serde_json::from_value(args).map_err(bad_args)?;
                MountCore::spawn_watch(self.core.clone(), args.storage_id, args.pattern, args.ignore_own)
                    .map_err(|e| RpcError::Internal(e.to_string()))?;
                Ok(json!({}))
            }
            "add-subcontainer-watch" => {
                let args: AddSubcontainerWatchArgs = serde_json::from_value(args).map_err(bad_args)?;
                MountCore::spawn_subcontainer_watch(self.core.clone(), args.storage_id, args.ignore_own)
                    .map_err(|e| RpcError::Internal(e.to_string()))?;
                Ok(json!({}))
            }
            "fileinfo" => {
                let args: FileInfoArgs = serde_json::from_value(args).map_err(bad_args)?;
                let owners = self.core.table().storages_owning(&args.path);
                Ok(json!({
                    "path": args.path,
                    "storage-ids": owners.iter().map(|s| s.storage_id).collect::<Vec<_>>(),
                }))
            }
            "dirinfo" => {
                let args: FileInfoArgs = serde_json::from_value(args).map_err(bad_args)?;
                let children = self.core.table().synthetic_children(&args.path);
                Ok(json!({ "path": args.path, "children": children }))
            }
            "paths" => {
                let all = self.core.table().all();
                let mut paths: Vec<String> = all.iter().flat_map(|s| s.paths.clone()).collect();
                paths.sort();
                paths.dedup();
                Ok(json!({ "paths": paths }))
            }
            "info" => {
                let all = self.core.table().all();
                let storages: Vec<Value> = all
                    .iter()
                    .map(|s| {
                        json!({
                            "storage-id": s.storage_id,
                            "backend-id": s.backend_id,
                            "paths": s.paths,
                            "read-only": s.read_only,
                            "primary": s.primary,
                            "lazy": s.lazy,
                            "open": s.is_open(),
                        })
                    })
                    .collect();
                Ok(json!({ "storages": storages }))
            }
            "status" => Ok(json!({ "mounted": self.core.table().all().len() })),
            "breakpoint" => Ok(json!({})),
            "test" => Ok(json!({ "ok": true })),
            _ => Err(RpcError::UnknownCommand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wildland_storage::StorageRegistry;

    fn registry() -> StorageRegistry {
        let mut r = StorageRegistry::new();
        r.register(
            "local",
            Arc::new(|storage: &Storage| {
                let path = storage.params.get("path").and_then(|v| v.as_str()).unwrap_or("/tmp").to_string();
                Ok(Arc::new(wildland_storage::LocalFilesystemBackend::new(path.into())) as Arc<dyn wildland_storage::StorageBackend>)
            }),
        );
        r
    }

    fn storage_value(path: &str) -> Value {
        json!({
            "version": "1",
            "owner": "0xowner",
            "type": "local",
            "container-path": "/.uuid/11111111-1111-1111-1111-111111111111",
            "backend-id": "11111111-1111-1111-1111-111111111111",
            "primary": true,
            "path": path,
        })
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let core = Arc::new(MountCore::new(registry()));
        let control = MountControl::new(core);
        let err = control.handle("no-such-command", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownCommand));
    }

    #[tokio::test]
    async fn test_mount_then_paths_reflects_mount_paths() {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(MountCore::new(registry()));
        let control = MountControl::new(core);

        let args = json!({
            "items": [{
                "paths": ["/.uuid/11111111-1111-1111-1111-111111111111"],
                "storage": storage_value(dir.path().to_str().unwrap()),
            }],
        });
        control.handle("mount", args).await.unwrap();

        let result = control.handle("paths", json!({})).await.unwrap();
        let paths = result["paths"].as_array().unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[tokio::test]
    async fn test_add_watch_starts_a_watch_against_a_mounted_storage() {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(MountCore::new(registry()));
        let control = MountControl::new(core.clone());

        let mount_args = json!({
            "items": [{
                "paths": ["/.uuid/11111111-1111-1111-1111-111111111111"],
                "storage": storage_value(dir.path().to_str().unwrap()),
            }],
        });
        let result = control.handle("mount", mount_args).await.unwrap();
        let storage_id = result["storage-ids"][0].as_u64().unwrap();

        let watch_args = json!({ "storage-id": storage_id, "pattern": "/" });
        assert!(control.handle("add-watch", watch_args).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_watch_unknown_storage_id_rejected() {
        let core = Arc::new(MountCore::new(registry()));
        let control = MountControl::new(core);
        let err = control
            .handle("add-watch", json!({"storage-id": 999, "pattern": "/"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Internal(_)));
    }

    #[tokio::test]
    async fn test_mount_bad_args_rejected() {
        let core = Arc::new(MountCore::new(registry()));
        let control = MountControl::new(core);
        let err = control.handle("mount", json!({"items": "not-an-array"})).await.unwrap_err();
        assert!(matches!(err, RpcError::BadArgs));
    }
}
