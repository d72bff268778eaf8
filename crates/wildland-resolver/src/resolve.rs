use std::collections::HashMap;

use wildland_crypto::Fingerprint;
use wildland_model::{ContainerView, UserView};

use crate::catalog::{CatalogEntry, CatalogSource};
use crate::error::{ResolveError, Result};
use crate::url::WildlandUrl;

/// Default bound on bridge-hop depth before a walk is aborted with `Cycle`
/// (spec.md §4.4).
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// The manifest(s) a Wildland URL resolves to. A glob segment in the final
/// position can produce more than one container (spec.md §4.4 "Output: a
/// manifest (or stream of manifests for a glob segment)").
#[derive(Debug, Clone)]
pub enum ResolvedManifest {
    Container(ContainerView),
    User(UserView),
}

/// Walks Wildland URLs through bridges and manifest catalogs into concrete
/// manifests (spec.md §4.4).
pub struct Resolver {
    max_depth: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Resolves `url` starting from `start_owner`'s catalog. The final
    /// segment must resolve to one or more containers, or (for `user
    /// import`-style URLs) a user.
    pub fn resolve(
        &self,
        url: &WildlandUrl,
        start_owner: &Fingerprint,
        source: &mut dyn CatalogSource,
    ) -> Result<Vec<ResolvedManifest>> {
        let mut ctx = ResolveCtx {
            source,
            cache: HashMap::new(),
            max_depth: self.max_depth,
        };
        resolve_segments(&mut ctx, &url.segments, start_owner.clone(), 0)
    }
}

struct ResolveCtx<'a> {
    source: &'a mut dyn CatalogSource,
    cache: HashMap<Fingerprint, Vec<CatalogEntry>>,
    max_depth: usize,
}

impl<'a> ResolveCtx<'a> {
    fn catalog(&mut self, owner: &Fingerprint) -> Result<Vec<CatalogEntry>> {
        if let Some(entries) = self.cache.get(owner) {
            return Ok(entries.clone());
        }
        let entries = self.source.catalog(owner)?;
        self.cache.insert(owner.clone(), entries.clone());
        Ok(entries)
    }
}

fn resolve_segments(
    ctx: &mut ResolveCtx<'_>,
    segments: &[String],
    owner: Fingerprint,
    hops: usize,
) -> Result<Vec<ResolvedManifest>> {
    let (segment, rest) = segments
        .split_first()
        .expect("WildlandUrl::parse guarantees at least one segment");
    let is_last = rest.is_empty();

    let entries = ctx.catalog(&owner)?;
    let matches: Vec<&CatalogEntry> = entries.iter().filter(|e| e.matches(segment)).collect();
    if matches.is_empty() {
        return Err(ResolveError::NotFound(segment.clone()));
    }

    let mut out = Vec::new();
    for entry in matches {
        match entry {
            CatalogEntry::Container(container) => {
                if is_last {
                    out.push(ResolvedManifest::Container(container.clone()));
                }
                // A container is a leaf: a non-final segment matching one
                // has nothing further beneath it to resolve, so it simply
                // contributes nothing to this branch.
            }
            CatalogEntry::Bridge(bridge) => {
                let hops = hops + 1;
                if hops > ctx.max_depth {
                    return Err(ResolveError::Cycle(hops));
                }

                let target_user = ctx.source.fetch_user(&bridge.user, &owner)?;
                wildland_model::validate_bridge_pubkey(bridge, target_user.inner())
                    .map_err(|_| ResolveError::Untrusted(bridge.pubkey.clone()))?;

                let target_owner = Fingerprint::try_from(target_user.inner().owner.clone())?;

                if is_last {
                    out.push(ResolvedManifest::User(target_user));
                } else {
                    out.extend(resolve_segments(ctx, rest, target_owner, hops)?);
                }
            }
        }
    }

    if out.is_empty() {
        return Err(ResolveError::NotFound(segment.clone()));
    }
    Ok(out)
}
