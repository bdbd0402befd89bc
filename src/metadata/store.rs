use super::engine::{MetadataEngine, MetadataError};
use super::lock::PathLocks;
use super::{HERO_TAG, MetadataUpdate, PhotoMetadata, normalize_tags};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The metadata adapter: one shared engine plus the per-path lock registry.
///
/// Every method takes the lock for its path, so a read-modify-write such
/// as [`add_tags`](Self::add_tags) can never interleave with another write
/// to the same file.
pub struct MetadataStore {
    engine: Arc<dyn MetadataEngine>,
    locks: PathLocks,
}

impl MetadataStore {
    pub fn new(engine: Arc<dyn MetadataEngine>) -> Self {
        Self {
            engine,
            locks: PathLocks::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn MetadataEngine> {
        &self.engine
    }

    pub fn read(&self, path: &Path) -> Result<PhotoMetadata, MetadataError> {
        self.locks.with_lock(path, || self.engine.read(path))
    }

    pub fn write(&self, path: &Path, update: &MetadataUpdate) -> Result<(), MetadataError> {
        let update = MetadataUpdate {
            tags: update.tags.as_ref().map(normalize_tags),
            description: update.description.clone(),
        };
        self.locks.with_lock(path, || self.engine.write(path, &update))
    }

    /// Read the tag list, let `edit` change it, and write it back if it
    /// changed. Returns the tags now stored in the file.
    pub fn modify_tags(
        &self,
        path: &Path,
        edit: impl FnOnce(&mut Vec<String>),
    ) -> Result<Vec<String>, MetadataError> {
        self.locks.with_lock(path, || {
            let current = self.engine.read(path)?.tags;
            let mut tags = current.clone();
            edit(&mut tags);
            let tags = normalize_tags(&tags);
            if tags != current {
                self.engine.write(path, &MetadataUpdate::tags(tags.clone()))?;
            }
            Ok(tags)
        })
    }

    /// Append tags that are not already present.
    pub fn add_tags(&self, path: &Path, add: &[String]) -> Result<Vec<String>, MetadataError> {
        self.modify_tags(path, |tags| tags.extend(add.iter().cloned()))
    }

    pub fn remove_tags(&self, path: &Path, remove: &[String]) -> Result<Vec<String>, MetadataError> {
        self.modify_tags(path, |tags| tags.retain(|t| !remove.contains(t)))
    }

    /// Make `target` the only file carrying [`HERO_TAG`].
    ///
    /// Sweeps every path instead of toggling, so a collection that somehow
    /// ended up with several heroes (or none) converges to exactly one.
    /// Files already in the right state are not rewritten.
    pub fn set_hero_tag(&self, all_paths: &[PathBuf], target: &Path) -> Result<(), MetadataError> {
        let mut seen_target = false;
        for path in all_paths {
            let is_target = path == target;
            seen_target |= is_target;
            self.modify_tags(path, |tags| {
                if is_target {
                    tags.push(HERO_TAG.to_string());
                } else {
                    tags.retain(|t| t != HERO_TAG);
                }
            })?;
        }
        if !seen_target {
            self.add_tags(target, &[HERO_TAG.to_string()])?;
        }
        tracing::info!(target = %target.display(), "hero tag assigned");
        Ok(())
    }

    pub fn close(&self) -> Result<(), MetadataError> {
        self.engine.close()
    }
}
