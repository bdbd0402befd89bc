//! Stable ID → source path lookup for the serving side.
//!
//! Resolving an ID means hashing every source file, which is far too slow to
//! do per request. [`SourceIndex`] keeps the last scan for a fixed TTL and
//! only rescans when it expires, when a caller forces it, or after
//! [`SourceIndex::invalidate`].

use crate::identity::{IdentityError, StableId, generate_stable_id};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub type IdMap = BTreeMap<StableId, PathBuf>;

/// True for `.jpg`/`.jpeg` in any case.
pub fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

/// JPEG files directly inside `dir`, sorted by file name.
///
/// A missing directory has no files.
pub fn list_jpegs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_jpeg(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Hash `files` in parallel into an ID map.
///
/// Files with identical pixels share an ID; the later file name wins.
pub fn build_id_map(files: &[PathBuf]) -> Result<IdMap, IdentityError> {
    let ids = files
        .par_iter()
        .map(|path| generate_stable_id(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut map = IdMap::new();
    for (id, path) in ids.into_iter().zip(files) {
        if let Some(previous) = map.insert(id.clone(), path.clone()) {
            tracing::warn!(
                %id,
                kept = %path.display(),
                dropped = %previous.display(),
                "duplicate image content"
            );
        }
    }
    Ok(map)
}

struct Snapshot {
    built_at: Instant,
    ids: Arc<IdMap>,
}

pub struct SourceIndex {
    source_dir: PathBuf,
    ttl: Duration,
    state: Mutex<Option<Snapshot>>,
}

impl SourceIndex {
    pub fn new(source_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            source_dir: source_dir.into(),
            ttl,
            state: Mutex::new(None),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    fn state(&self) -> MutexGuard<'_, Option<Snapshot>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current map, rescanning if it is missing, expired or `force`d.
    ///
    /// Concurrent callers that find the cache stale wait for one rescan
    /// rather than each hashing the whole folder.
    pub fn get(&self, force: bool) -> Result<Arc<IdMap>, IndexError> {
        let mut state = self.state();
        if !force
            && let Some(snapshot) = state.as_ref()
            && snapshot.built_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&snapshot.ids));
        }

        let started = Instant::now();
        let files = list_jpegs(&self.source_dir)?;
        let ids = Arc::new(build_id_map(&files)?);
        tracing::info!(
            photos = ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "source index built"
        );
        *state = Some(Snapshot {
            built_at: Instant::now(),
            ids: Arc::clone(&ids),
        });
        Ok(ids)
    }

    pub fn resolve(&self, id: &str) -> Result<Option<PathBuf>, IndexError> {
        Ok(self.get(false)?.get(id).cloned())
    }

    /// Every indexed source path.
    pub fn paths(&self) -> Result<Vec<PathBuf>, IndexError> {
        Ok(self.get(false)?.values().cloned().collect())
    }

    /// Drop the cache so the next lookup rescans.
    pub fn invalidate(&self) {
        *self.state() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{write_gradient_jpeg, write_solid_jpeg};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_jpegs_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.JPG", "a.jpeg", "c.png", "notes.txt", "d.Jpg"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(tmp.path().join("sub.jpg")).unwrap();

        let names: Vec<_> = list_jpegs(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPG", "d.Jpg"]);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(list_jpegs(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn resolves_ids_to_paths() {
        let tmp = TempDir::new().unwrap();
        write_solid_jpeg(&tmp.path().join("red.jpg"), 32, 32, [200, 0, 0]);
        write_solid_jpeg(&tmp.path().join("blue.jpg"), 32, 32, [0, 0, 200]);

        let index = SourceIndex::new(tmp.path(), Duration::from_secs(60));
        let map = index.get(false).unwrap();
        assert_eq!(map.len(), 2);
        let red_id = generate_stable_id(&tmp.path().join("red.jpg")).unwrap();
        assert_eq!(
            index.resolve(red_id.as_str()).unwrap(),
            Some(tmp.path().join("red.jpg"))
        );
        assert_eq!(index.resolve("00000000000000000000").unwrap(), None);
    }

    #[test]
    fn cached_until_ttl_or_invalidation() {
        let tmp = TempDir::new().unwrap();
        write_gradient_jpeg(&tmp.path().join("a.jpg"), 32, 32);
        let index = SourceIndex::new(tmp.path(), Duration::from_secs(3600));
        assert_eq!(index.get(false).unwrap().len(), 1);

        write_solid_jpeg(&tmp.path().join("b.jpg"), 32, 32, [10, 200, 10]);
        assert_eq!(index.get(false).unwrap().len(), 1);
        assert_eq!(index.get(true).unwrap().len(), 2);

        fs::remove_file(tmp.path().join("b.jpg")).unwrap();
        assert_eq!(index.get(false).unwrap().len(), 2);
        index.invalidate();
        assert_eq!(index.get(false).unwrap().len(), 1);
    }

    #[test]
    fn zero_ttl_always_rescans() {
        let tmp = TempDir::new().unwrap();
        let index = SourceIndex::new(tmp.path(), Duration::ZERO);
        assert!(index.get(false).unwrap().is_empty());
        write_gradient_jpeg(&tmp.path().join("a.jpg"), 32, 32);
        assert_eq!(index.get(false).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_content_keeps_later_filename() {
        let tmp = TempDir::new().unwrap();
        write_gradient_jpeg(&tmp.path().join("a.jpg"), 32, 32);
        fs::copy(tmp.path().join("a.jpg"), tmp.path().join("b.jpg")).unwrap();

        let map = build_id_map(&list_jpegs(tmp.path()).unwrap()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.values().next().unwrap(), &tmp.path().join("b.jpg"));
    }

    #[test]
    fn undecodable_file_fails_the_scan() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.jpg"), b"not a jpeg").unwrap();
        let index = SourceIndex::new(tmp.path(), Duration::from_secs(60));
        assert!(matches!(index.get(false), Err(IndexError::Identity(_))));
    }
}
