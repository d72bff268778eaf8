use uuid::Uuid;

use crate::access::{is_public_access, AccessEntry};
use crate::error::{ModelError, Result};
use crate::objects::{Bridge, Container, Storage, User};

/// Invariant 2: the first path of a container must be `/.uuid/<UUID>`, and
/// that UUID is immutable for the container's lifetime.
pub fn validate_container_uuid_path(container: &Container) -> Result<Uuid> {
    let first = container
        .paths
        .first()
        .ok_or_else(|| ModelError::SchemaError("container has no paths".into()))?;
    let uuid_str = first
        .strip_prefix("/.uuid/")
        .ok_or_else(|| ModelError::SchemaError(format!("first path {first:?} is not /.uuid/<UUID>")))?;
    Uuid::parse_str(uuid_str)
        .map_err(|e| ModelError::SchemaError(format!("invalid container UUID: {e}")))
}

/// Invariant 4: at most one `primary: true` storage; two or more is
/// rejected at load (spec.md §9 open question (b)). Zero means the first
/// declared storage is primary.
pub fn validate_single_primary(storages: &[Storage]) -> Result<()> {
    let primaries = storages.iter().filter(|s| s.primary).count();
    if primaries > 1 {
        return Err(ModelError::SchemaError(
            "container has more than one storage marked primary: true".into(),
        ));
    }
    Ok(())
}

/// Invariant 3: each storage's `container-path` must match exactly one path
/// of its owning container.
pub fn validate_storage_container_path(container: &Container, storage: &Storage) -> Result<()> {
    if !container.paths.iter().any(|p| p == &storage.container_path) {
        return Err(ModelError::SchemaError(format!(
            "storage container-path {:?} does not match any path of container {:?}",
            storage.container_path, container.paths
        )));
    }
    Ok(())
}

/// Invariant 1: a manifest's signature key must be one of the owner's known
/// pubkeys at verification time.
pub fn validate_owner_pubkey(user: &User, signer_pubkey_hex: &str) -> Result<()> {
    if user.pubkeys.iter().any(|p| p == signer_pubkey_hex) {
        Ok(())
    } else {
        Err(ModelError::SchemaError(format!(
            "signing key {signer_pubkey_hex} is not among owner {}'s known pubkeys",
            user.owner
        )))
    }
}

/// Invariant 6: a bridge's `pubkey` must match a `pubkeys[]` entry in the
/// user manifest it resolves to.
pub fn validate_bridge_pubkey(bridge: &Bridge, target_user: &User) -> Result<()> {
    if target_user.pubkeys.iter().any(|p| p == &bridge.pubkey) {
        Ok(())
    } else {
        Err(ModelError::SchemaError(format!(
            "bridge pubkey {} not found among target user {}'s pubkeys",
            bridge.pubkey, target_user.owner
        )))
    }
}

/// Invariant 5: encrypted manifests must wrap exactly one key per access
/// entry; a fully-public access list forbids encryption entirely.
pub fn validate_access_for_encryption(access: &[AccessEntry], wrapped_key_count: usize) -> Result<()> {
    if is_public_access(access) {
        return Err(ModelError::SchemaError(
            "access: [{user: \"*\"}] forbids encryption".into(),
        ));
    }
    if access.len() != wrapped_key_count {
        return Err(ModelError::SchemaError(format!(
            "expected one wrapped key per access entry ({} entries, {} keys)",
            access.len(),
            wrapped_key_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Backends;

    fn user(pubkeys: Vec<&str>) -> User {
        User {
            version: "1".into(),
            owner: "0xowner".into(),
            paths: vec!["/users/alice".into()],
            pubkeys: pubkeys.into_iter().map(String::from).collect(),
            manifests_catalog: vec![],
            members: vec![],
        }
    }

    fn storage(container_path: &str, primary: bool) -> Storage {
        Storage {
            version: "1".into(),
            owner: "0xowner".into(),
            kind: "local".into(),
            container_path: container_path.into(),
            backend_id: "11111111-1111-1111-1111-111111111111".into(),
            read_only: false,
            trusted: false,
            manifest_pattern: None,
            watcher_interval: None,
            access: vec![],
            primary,
            params: Default::default(),
        }
    }

    fn container(paths: Vec<&str>, storages: Vec<Storage>) -> Container {
        Container {
            version: "1".into(),
            owner: "0xowner".into(),
            paths: paths.into_iter().map(String::from).collect(),
            title: None,
            categories: vec![],
            backends: Backends { storage: storages },
            access: vec![],
        }
    }

    #[test]
    fn test_valid_uuid_path() {
        let c = container(vec!["/.uuid/11111111-1111-1111-1111-111111111111"], vec![]);
        assert!(validate_container_uuid_path(&c).is_ok());
    }

    #[test]
    fn test_missing_uuid_path_rejected() {
        let c = container(vec!["/not/a/uuid"], vec![]);
        assert!(validate_container_uuid_path(&c).is_err());
    }

    #[test]
    fn test_two_primary_storages_rejected() {
        let storages = vec![storage("/.uuid/x", true), storage("/.uuid/x", true)];
        assert!(validate_single_primary(&storages).is_err());
    }

    #[test]
    fn test_zero_primary_storages_allowed() {
        let storages = vec![storage("/.uuid/x", false), storage("/.uuid/x", false)];
        assert!(validate_single_primary(&storages).is_ok());
    }

    #[test]
    fn test_storage_container_path_mismatch_rejected() {
        let c = container(vec!["/.uuid/a"], vec![]);
        let s = storage("/.uuid/b", false);
        assert!(validate_storage_container_path(&c, &s).is_err());
    }

    #[test]
    fn test_public_access_forbids_encryption() {
        assert!(validate_access_for_encryption(&[AccessEntry::public()], 0).is_err());
    }

    #[test]
    fn test_access_key_count_mismatch_rejected() {
        let access = vec![AccessEntry::User {
            user: "0xabc".into(),
        }];
        assert!(validate_access_for_encryption(&access, 2).is_err());
        assert!(validate_access_for_encryption(&access, 1).is_ok());
    }

    #[test]
    fn test_owner_pubkey_check() {
        let u = user(vec!["pub1", "pub2"]);
        assert!(validate_owner_pubkey(&u, "pub1").is_ok());
        assert!(validate_owner_pubkey(&u, "pub3").is_err());
    }
}
