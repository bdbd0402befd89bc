//! Admin operations on the source photos.
//!
//! [`AdminService`] is what the HTTP layer calls; it is usable on its own
//! from tests or other front ends. Photos are addressed by stable ID,
//! resolved through the TTL-cached [`SourceIndex`]. Metadata edits go
//! through the [`MetadataStore`], so every read-modify-write holds that
//! file's lock.
//!
//! | Operation | HTTP |
//! |---|---|
//! | [`list_photos`](AdminService::list_photos) | `GET /api/photos` |
//! | [`get_photo`](AdminService::get_photo) | `GET /api/photos/{id}` |
//! | [`update_photo`](AdminService::update_photo) | `PATCH /api/photos/{id}` |
//! | [`set_hero`](AdminService::set_hero) | `POST /api/photos/{id}/hero` |
//! | [`bulk_add_tags`](AdminService::bulk_add_tags) | `POST /api/photos/bulk/tags/add` |
//! | [`bulk_remove_tags`](AdminService::bulk_remove_tags) | `POST /api/photos/bulk/tags/remove` |
//! | [`list_tags`](AdminService::list_tags) | `GET /api/tags` |
//! | [`thumbnail`](AdminService::thumbnail) | `GET /api/thumb/{filename}` |
//! | [`refresh`](AdminService::refresh) | `POST /api/cache/refresh` |

use crate::config::Config;
use crate::identity::StableId;
use crate::imaging::{ImageBackend, Quality, RustBackend, ThumbnailParams};
use crate::metadata::{MetadataError, MetadataStore, MetadataUpdate, PhotoMetadata, is_internal_tag};
use crate::source_index::{IndexError, SourceIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// One row of the photo list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSummary {
    pub id: StableId,
    pub filename: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub taken_at: Option<String>,
}

/// A photo with its full metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoDetail {
    pub id: StableId,
    pub filename: String,
    #[serde(flatten)]
    pub metadata: PhotoMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    pub photo_ids: Vec<String>,
    pub tags: Vec<String>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct AdminService {
    index: SourceIndex,
    store: MetadataStore,
    backend: Arc<dyn ImageBackend + Send>,
    thumbnail_size: u32,
    thumbnail_quality: Quality,
    thumbnails: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
}

impl AdminService {
    pub fn new(config: &Config, store: MetadataStore) -> Self {
        Self::with_backend(config, store, Arc::new(RustBackend::new()))
    }

    pub fn with_backend(
        config: &Config,
        store: MetadataStore,
        backend: Arc<dyn ImageBackend + Send>,
    ) -> Self {
        Self {
            index: SourceIndex::new(&config.paths.source_dir, config.server.index_ttl()),
            store,
            backend,
            thumbnail_size: config.server.thumbnail_size,
            thumbnail_quality: Quality::new(config.server.thumbnail_quality),
            thumbnails: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    fn thumbnails(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<[u8]>>> {
        self.thumbnails.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, id: &str) -> Result<(StableId, PathBuf), AdminError> {
        let ids = self.index.get(false)?;
        ids.get_key_value(id)
            .map(|(id, path)| (id.clone(), path.clone()))
            .ok_or_else(|| AdminError::NotFound("Photo not found".into()))
    }

    /// Build the ID index now instead of on the first request.
    pub fn preload(&self) -> Result<usize, AdminError> {
        Ok(self.index.get(true)?.len())
    }

    pub fn list_photos(&self) -> Result<Vec<PhotoSummary>, AdminError> {
        let ids = self.index.get(false)?;
        let photos = ids
            .par_iter()
            .map(|(id, path)| {
                let meta = self.store.read(path)?;
                Ok::<_, AdminError>(PhotoSummary {
                    id: id.clone(),
                    filename: file_name(path),
                    tags: meta.tags,
                    description: meta.description,
                    taken_at: meta.taken_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn get_photo(&self, id: &str) -> Result<PhotoDetail, AdminError> {
        let (id, path) = self.resolve(id)?;
        let metadata = self.store.read(&path)?;
        Ok(PhotoDetail {
            id,
            filename: file_name(&path),
            metadata,
        })
    }

    /// Apply a partial update and return the photo as now stored.
    pub fn update_photo(&self, id: &str, update: &MetadataUpdate) -> Result<PhotoDetail, AdminError> {
        let (id, path) = self.resolve(id)?;
        self.store.write(&path, update)?;
        let metadata = self.store.read(&path)?;
        tracing::info!(%id, "photo metadata updated");
        Ok(PhotoDetail {
            id,
            filename: file_name(&path),
            metadata,
        })
    }

    /// Make `id` the only hero photo.
    pub fn set_hero(&self, id: &str) -> Result<StableId, AdminError> {
        let (id, target) = self.resolve(id)?;
        let all: Vec<PathBuf> = self.index.paths()?;
        self.store.set_hero_tag(&all, &target)?;
        Ok(id)
    }

    /// Add tags to every listed photo. Unknown IDs are skipped.
    ///
    /// Returns how many photos were found.
    pub fn bulk_add_tags(&self, request: &BulkTagRequest) -> Result<usize, AdminError> {
        self.bulk_edit(&request.photo_ids, |path| {
            self.store.add_tags(path, &request.tags).map(|_| ())
        })
    }

    pub fn bulk_remove_tags(&self, request: &BulkTagRequest) -> Result<usize, AdminError> {
        self.bulk_edit(&request.photo_ids, |path| {
            self.store.remove_tags(path, &request.tags).map(|_| ())
        })
    }

    fn bulk_edit(
        &self,
        photo_ids: &[String],
        edit: impl Fn(&Path) -> Result<(), MetadataError> + Sync,
    ) -> Result<usize, AdminError> {
        let ids = self.index.get(false)?;
        let mut paths: Vec<&PathBuf> = photo_ids.iter().filter_map(|id| ids.get(id.as_str())).collect();
        paths.sort();
        paths.dedup();
        paths.par_iter().try_for_each(|path| edit(path))?;
        Ok(paths.len())
    }

    /// Every tag in use, sorted. Internal `_` tags only with `include_internal`.
    pub fn list_tags(&self, include_internal: bool) -> Result<Vec<String>, AdminError> {
        let tags: BTreeSet<String> = self
            .list_photos()?
            .into_iter()
            .flat_map(|p| p.tags)
            .filter(|t| include_internal || !is_internal_tag(t))
            .collect();
        Ok(tags.into_iter().collect())
    }

    /// Square JPEG preview of a source file, cached by path.
    ///
    /// Anything that is not a plain file name in the source directory, or
    /// that cannot be decoded, is reported as not found.
    pub fn thumbnail(&self, filename: &str) -> Result<Arc<[u8]>, AdminError> {
        let not_found = || AdminError::NotFound("Image not found".into());
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename == "."
            || filename == ".."
        {
            return Err(not_found());
        }
        let path = self.index.source_dir().join(filename);
        if let Some(cached) = self.thumbnails().get(&path) {
            return Ok(Arc::clone(cached));
        }

        let bytes: Arc<[u8]> = self
            .backend
            .thumbnail(&ThumbnailParams {
                source: path.clone(),
                size: self.thumbnail_size,
                quality: self.thumbnail_quality,
            })
            .map_err(|e| {
                tracing::debug!(file = %path.display(), error = %e, "thumbnail failed");
                not_found()
            })?
            .into();
        self.thumbnails().insert(path, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Drop the ID index and thumbnail cache, then rebuild the index.
    pub fn refresh(&self) -> Result<usize, AdminError> {
        self.index.invalidate();
        self.thumbnails().clear();
        let count = self.index.get(true)?.len();
        tracing::info!(photos = count, "caches refreshed");
        Ok(count)
    }
}
