use serde::{Deserialize, Serialize};

/// One entry of an object's access list. Either names a user by key
/// fingerprint, a public marker (`"*"`), or a user-path to be resolved
/// recursively (spec.md §3 "Access list").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum AccessEntry {
    User { user: String },
    #[serde(rename_all = "kebab-case")]
    UserPath { user_path: String },
}

impl AccessEntry {
    pub fn public() -> Self {
        Self::User {
            user: "*".to_string(),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::User { user } if user == "*")
    }
}

/// Returns whether an access list is the fully-public, unencrypted form
/// (`[{user: "*"}]`).
pub fn is_public_access(entries: &[AccessEntry]) -> bool {
    matches!(entries, [only] if only.is_public())
}
