use crate::error::{ResolveError, Result};

/// A parsed Wildland URL: `wildland:<owner-prefix>?:<segment>(:<segment>)+:`.
///
/// `owner_prefix` may be empty (self), a `0x`-prefixed fingerprint, a
/// configured alias (`@name`), or `<fpr>@https{...}` (key plus a bootstrap
/// location hint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildlandUrl {
    pub owner_prefix: String,
    pub segments: Vec<String>,
}

impl WildlandUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix("wildland:")
            .ok_or_else(|| ResolveError::BadUrl(format!("{raw:?} missing 'wildland:' scheme")))?;

        // Split on ':' but keep it simple: at least three colon-delimited
        // parts are required (owner-prefix, >=1 segment, trailing marker
        // from the final separator).
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() < 3 {
            return Err(ResolveError::BadUrl(format!(
                "{raw:?} needs at least three colon-delimited parts"
            )));
        }

        let owner_prefix = parts[0].to_string();
        // Segments are every middle part; a trailing empty part from the
        // closing ':' is dropped.
        let mut segments: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();
        if segments.last().map(String::is_empty).unwrap_or(false) {
            segments.pop();
        }
        if segments.is_empty() {
            return Err(ResolveError::BadUrl(format!("{raw:?} has no path segments")));
        }

        Ok(Self {
            owner_prefix,
            segments,
        })
    }

    pub fn is_self_owner(&self) -> bool {
        self.owner_prefix.is_empty()
    }

    pub fn is_alias(&self) -> bool {
        self.owner_prefix.starts_with('@')
    }
}
