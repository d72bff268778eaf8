use crate::access::AccessEntry;
use crate::error::Result;
use crate::invariants::{validate_container_uuid_path, validate_single_primary, validate_storage_container_path};
use crate::objects::{Container, Storage, User};

/// Resolves a user-path (e.g. `/users/bob`) to the `User` it names, so that
/// `User::effective_pubkeys` can recurse through `members`. Implemented by
/// `wildland-resolver`; kept here as a trait so this crate never depends on
/// the resolver.
pub trait MemberLookup {
    fn lookup_user_path(&mut self, user_path: &str) -> Option<User>;
}

/// A container manifest that has passed construction-time invariant checks.
#[derive(Debug, Clone)]
pub struct ContainerView {
    inner: Container,
}

impl ContainerView {
    pub fn new(container: Container) -> Result<Self> {
        validate_container_uuid_path(&container)?;
        validate_single_primary(&container.backends.storage)?;
        for storage in &container.backends.storage {
            validate_storage_container_path(&container, storage)?;
        }
        Ok(Self { inner: container })
    }

    pub fn inner(&self) -> &Container {
        &self.inner
    }

    /// The container's `/.uuid/<UUID>` path.
    pub fn uuid_path(&self) -> &str {
        &self.inner.paths[0]
    }

    /// All paths the container is mounted at: the declared `paths[]` plus
    /// synthetic category paths, the cross-product of `categories` with
    /// `title` (e.g. `/cat1/title`, `/cat2/title`, `/cat1/@cat2/title`).
    pub fn mount_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.paths.clone();

        if let Some(title) = &self.inner.title {
            let cats = &self.inner.categories;
            for cat in cats {
                paths.push(join_path(cat, title));
            }
            // Category permutations: `/cat1/@cat2/title` for every ordered
            // pair of distinct categories.
            for i in 0..cats.len() {
                for j in 0..cats.len() {
                    if i == j {
                        continue;
                    }
                    let joined = format!("{}/@{}", cats[i].trim_end_matches('/'), cats[j].trim_start_matches('/'));
                    paths.push(join_path(&joined, title));
                }
            }
        }

        paths
    }

    /// The container's primary storage: the one explicitly marked
    /// `primary: true`, or the first declared storage if none is.
    pub fn primary_storage(&self) -> Option<&Storage> {
        self.inner
            .backends
            .storage
            .iter()
            .find(|s| s.primary)
            .or_else(|| self.inner.backends.storage.first())
    }

    /// The subjects allowed to access this container: `None` for fully
    /// public (`[{user: "*"}]`), `Some(entries)` otherwise.
    pub fn access_subjects(&self) -> Option<&[AccessEntry]> {
        if crate::access::is_public_access(&self.inner.access) {
            None
        } else {
            Some(&self.inner.access)
        }
    }
}

fn join_path(prefix: &str, title: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), title.trim_start_matches('/'))
}

/// A user manifest that has passed construction-time invariant checks.
#[derive(Debug, Clone)]
pub struct UserView {
    inner: User,
}

impl UserView {
    pub fn new(user: User) -> Result<Self> {
        if user.paths.is_empty() {
            return Err(crate::error::ModelError::SchemaError("user has no paths".into()));
        }
        if user.pubkeys.is_empty() {
            return Err(crate::error::ModelError::SchemaError("user has no pubkeys".into()));
        }
        Ok(Self { inner: user })
    }

    pub fn inner(&self) -> &User {
        &self.inner
    }

    /// `pubkeys` plus those reachable transitively through `members`,
    /// resolved via `lookup`. Cycles in the member graph are broken by
    /// tracking visited user-paths.
    pub fn effective_pubkeys(&self, lookup: &mut dyn MemberLookup) -> Vec<String> {
        let mut seen_paths = std::collections::HashSet::new();
        let mut out = self.inner.pubkeys.clone();
        let mut frontier: Vec<String> = self.inner.members.clone();

        while let Some(path) = frontier.pop() {
            if !seen_paths.insert(path.clone()) {
                continue;
            }
            if let Some(member) = lookup.lookup_user_path(&path) {
                out.extend(member.pubkeys.iter().cloned());
                frontier.extend(member.members.iter().cloned());
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Backends;

    fn storage(path: &str, primary: bool) -> Storage {
        Storage {
            version: "1".into(),
            owner: "0xowner".into(),
            kind: "local".into(),
            container_path: path.into(),
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

    #[test]
    fn test_mount_paths_category_cross_product() {
        let c = Container {
            version: "1".into(),
            owner: "0xowner".into(),
            paths: vec!["/.uuid/11111111-1111-1111-1111-111111111111".into()],
            title: Some("photos".into()),
            categories: vec!["/cat1".into(), "/cat2".into()],
            backends: Backends { storage: vec![] },
            access: vec![],
        };
        let view = ContainerView::new(c).unwrap();
        let paths = view.mount_paths();
        assert!(paths.contains(&"/.uuid/11111111-1111-1111-1111-111111111111".to_string()));
        assert!(paths.contains(&"/cat1/photos".to_string()));
        assert!(paths.contains(&"/cat2/photos".to_string()));
        assert!(paths.contains(&"/cat1/@cat2/photos".to_string()));
        assert!(paths.contains(&"/cat2/@cat1/photos".to_string()));
    }

    #[test]
    fn test_primary_storage_fallback_to_first() {
        let uuid_path = "/.uuid/11111111-1111-1111-1111-111111111111";
        let storages = vec![storage(uuid_path, false), storage(uuid_path, false)];
        let c = Container {
            version: "1".into(),
            owner: "0xowner".into(),
            paths: vec![uuid_path.to_string()],
            title: None,
            categories: vec![],
            backends: Backends {
                storage: storages.clone(),
            },
            access: vec![],
        };
        let view = ContainerView::new(c).unwrap();
        assert_eq!(view.primary_storage().unwrap().backend_id, storages[0].backend_id);
    }

    struct NoLookup;
    impl MemberLookup for NoLookup {
        fn lookup_user_path(&mut self, _user_path: &str) -> Option<User> {
            None
        }
    }

    #[test]
    fn test_effective_pubkeys_without_members() {
        let u = User {
            version: "1".into(),
            owner: "0xowner".into(),
            paths: vec!["/users/alice".into()],
            pubkeys: vec!["pub1".into()],
            manifests_catalog: vec![],
            members: vec![],
        };
        let view = UserView::new(u).unwrap();
        assert_eq!(view.effective_pubkeys(&mut NoLookup), vec!["pub1".to_string()]);
    }
}
