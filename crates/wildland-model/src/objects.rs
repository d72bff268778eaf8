use serde::{Deserialize, Serialize};
use wildland_manifest::Versioned;

use crate::access::AccessEntry;

fn default_version() -> String {
    "1".to_string()
}

/// `{owner, paths[>=1], pubkeys[>=1], manifests-catalog[], members[]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    #[serde(default = "default_version")]
    pub version: String,
    pub owner: String,
    pub paths: Vec<String>,
    pub pubkeys: Vec<String>,
    #[serde(default, rename = "manifests-catalog")]
    pub manifests_catalog: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Versioned for User {
    fn version(&self) -> &str {
        &self.version
    }
}

/// `{owner, type, container-path, backend-id, read-only?, trusted?,
/// manifest-pattern?, watcher-interval?, access?, primary?}` plus
/// type-specific fields collected in `params`.
// `deny_unknown_fields` is not used here: it is incompatible with
// `#[serde(flatten)]` (serde rejects the combination at derive time), and
// `params` must absorb every type-specific field a driver defines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default = "default_version")]
    pub version: String,
    pub owner: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "container-path")]
    pub container_path: String,
    #[serde(rename = "backend-id")]
    pub backend_id: String,
    #[serde(default, rename = "read-only")]
    pub read_only: bool,
    #[serde(default)]
    pub trusted: bool,
    #[serde(default, rename = "manifest-pattern")]
    pub manifest_pattern: Option<String>,
    #[serde(default, rename = "watcher-interval")]
    pub watcher_interval: Option<u64>,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
    #[serde(default)]
    pub primary: bool,
    #[serde(flatten, default)]
    pub params: std::collections::BTreeMap<String, serde_yaml::Value>,
}

impl Versioned for Storage {
    fn version(&self) -> &str {
        &self.version
    }
}

/// `{owner, paths[>=1] (first is /.uuid/<UUID>), title?, categories[],
/// backends.storage[], access[]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Container {
    #[serde(default = "default_version")]
    pub version: String,
    pub owner: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub backends: Backends,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Backends {
    #[serde(default)]
    pub storage: Vec<ContainerStorageRef>,
}

/// Inline storage descriptor as embedded in a container's `backends.storage`
/// list. Separate from [`Storage`] because a container may embed only the
/// fields needed to instantiate a backend, without the envelope's own
/// `owner`/`version` bookkeeping duplicated per entry — callers that need
/// the fully validated [`Storage`] view go through [`super::ObjectModel`].
pub type ContainerStorageRef = Storage;

impl Versioned for Container {
    fn version(&self) -> &str {
        &self.version
    }
}

/// `{owner, user (manifest-url or link), pubkey, paths[>=1]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bridge {
    #[serde(default = "default_version")]
    pub version: String,
    pub owner: String,
    pub user: BridgeTarget,
    pub pubkey: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeTarget {
    Url(String),
    Link(Link),
}

impl Versioned for Bridge {
    fn version(&self) -> &str {
        &self.version
    }
}

/// `{storage (inline), file}` — an indirection to a manifest living inside
/// a storage rather than at a fetchable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    pub storage: Box<Storage>,
    pub file: String,
}

