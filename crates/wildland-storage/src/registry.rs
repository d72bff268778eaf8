use std::collections::HashMap;
use std::sync::Arc;

use wildland_model::Storage;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};

/// Builds a live [`StorageBackend`] from a manifest's `type` string and its
/// type-specific params.
pub type BackendFactory = Arc<dyn Fn(&Storage) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// A registry of storage drivers keyed by manifest `type`, populated at
/// daemon startup (spec.md §9 "dynamic dispatch over backends" — the source
/// relies on runtime class loading via entry points; here that becomes a
/// plain keyed registry of trait object factories).
#[derive(Clone, Default)]
pub struct StorageRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(type_name.into(), factory);
    }

    pub fn build(&self, storage: &Storage) -> Result<Arc<dyn StorageBackend>> {
        let factory = self
            .factories
            .get(&storage.kind)
            .ok_or_else(|| StorageError::BackendIo(format!("no driver registered for type {:?}", storage.kind)))?;
        factory(storage)
    }
}
