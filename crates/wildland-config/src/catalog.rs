use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;

/// The manifest object types a [`Catalog`] directory holds, matching
/// spec.md §4.8's `<name>.<object-type>.yaml` naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    User,
    Container,
    Storage,
    Bridge,
}

impl ObjectType {
    fn suffix(self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Container => "container",
            ObjectType::Storage => "storage",
            ObjectType::Bridge => "bridge",
        }
    }
}

/// Writes `bytes` to `path` via write-temp-then-rename, so a reader never
/// observes a partially written manifest (spec.md §4.8 "Catalog operations
/// MUST be atomic").
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Local per-type manifest directories (spec.md §4.8 "Manifests live in
/// per-type directories as `<name>.<object-type>.yaml`").
pub struct Catalog<'a> {
    config: &'a Config,
}

impl<'a> Catalog<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn dir_for(&self, object_type: ObjectType) -> &Path {
        match object_type {
            ObjectType::User => &self.config.user_dir,
            ObjectType::Container => &self.config.container_dir,
            ObjectType::Storage => &self.config.storage_dir,
            ObjectType::Bridge => &self.config.bridge_dir,
        }
    }

    fn path_for(&self, object_type: ObjectType, name: &str) -> PathBuf {
        self.dir_for(object_type).join(format!("{name}.{}.yaml", object_type.suffix()))
    }

    pub fn write(&self, object_type: ObjectType, name: &str, envelope_text: &str) -> Result<PathBuf> {
        let path = self.path_for(object_type, name);
        atomic_write(&path, envelope_text.as_bytes())?;
        Ok(path)
    }

    pub fn read(&self, object_type: ObjectType, name: &str) -> Result<String> {
        let path = self.path_for(object_type, name);
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn remove(&self, object_type: ObjectType, name: &str) -> Result<()> {
        let path = self.path_for(object_type, name);
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Every manifest name present for `object_type` (the file stem before
    /// `.<object-type>.yaml`).
    pub fn list(&self, object_type: ObjectType) -> Result<Vec<String>> {
        let dir = self.dir_for(object_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let suffix = format!(".{}.yaml", object_type.suffix());
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file_name.strip_suffix(&suffix) {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}
