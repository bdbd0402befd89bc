//! Manifest reconciliation: the `sync` command.
//!
//! ## Flow
//!
//! 1. List JPEGs in the source directory. With none, write an empty
//!    manifest and stop.
//! 2. Load the previous manifest if it is readable (best-effort).
//! 3. Hash every file to its stable ID, in parallel.
//! 4. Per photo, in parallel:
//!    - **Cached**: the ID is in the previous manifest and all nine tier
//!      files are on disk. Reuse its tiers and placeholder, re-read the
//!      embedded metadata (tags and descriptions change without touching
//!      pixels) and rebuild the `original` entry.
//!    - **New**: read metadata, compute the placeholder and render every
//!      derivative concurrently. A cached ID with any tier file missing
//!      takes this path too.
//! 5. Delete derivative files whose ID is no longer present.
//! 6. Sort photos, build the tag index and write the manifest atomically.
//!
//! Any per-photo failure aborts the whole run before the manifest is
//! written: a stale manifest is better than a half-built one.
//!
//! Changing tier sizes or encoder settings does not invalidate cached
//! tiers; delete `generated/` to force a full rebuild.

use crate::config::Config;
use crate::derivatives::{self, Derivatives};
use crate::identity::{IdentityError, StableId};
use crate::imaging::{ImageBackend, ImagingError, RustBackend, aspect_ratio};
use crate::manifest::{Manifest, ManifestError, OriginalVariant, Photo, VariantSet};
use crate::metadata::{MetadataError, MetadataStore, PhotoMetadata};
use crate::placeholder::generate_placeholder;
use crate::source_index::{build_id_map, list_jpegs};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] ImagingError),
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// Whether a photo's derivatives were reused or rendered this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoStatus {
    Cached,
    Generated,
}

/// Progress events for the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started {
        source_dir: String,
        file_count: usize,
    },
    PhotoSynced {
        filename: String,
        id: StableId,
        status: PhotoStatus,
    },
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub manifest: Manifest,
    pub cached: usize,
    pub generated: usize,
    /// Stale derivative files deleted.
    pub removed: usize,
}

/// Run a sync with the production image backend.
pub fn sync(
    config: &Config,
    metadata: &MetadataStore,
    events: Option<Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    sync_with_backend(&RustBackend::new(), config, metadata, events)
}

/// Run a sync with a specific backend (allows testing with mock).
pub fn sync_with_backend<B: ImageBackend + ?Sized>(
    backend: &B,
    config: &Config,
    metadata: &MetadataStore,
    events: Option<Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    let paths = &config.paths;
    let manifest_path = config.manifest_path();
    let emit = |event: SyncEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };

    let files = list_jpegs(&paths.source_dir)?;
    emit(SyncEvent::Started {
        source_dir: paths.source_dir.display().to_string(),
        file_count: files.len(),
    });

    if files.is_empty() {
        std::fs::create_dir_all(&paths.source_dir)?;
        let manifest = Manifest::empty();
        manifest.save(&manifest_path)?;
        tracing::info!(source = %paths.source_dir.display(), "no source photos, wrote empty manifest");
        return Ok(SyncReport {
            manifest,
            cached: 0,
            generated: 0,
            removed: 0,
        });
    }

    let previous: HashMap<StableId, Photo> = Manifest::load_existing(&manifest_path)
        .map(|m| m.photos.into_iter().map(|p| (p.id.clone(), p)).collect())
        .unwrap_or_default();
    tracing::info!(files = files.len(), cached = previous.len(), "sync started");

    let ids = build_id_map(&files)?;

    let synced = ids
        .par_iter()
        .map(|(id, path)| {
            let reusable = previous
                .get(id)
                .filter(|_| derivatives::derivatives_present(&paths.output_dir, id));
            let (photo, status) = match reusable {
                Some(cached) => (refresh_cached(cached, path, config, metadata)?, PhotoStatus::Cached),
                None => (build_photo(backend, id, path, config, metadata)?, PhotoStatus::Generated),
            };
            tracing::debug!(%id, file = %photo.original_filename, ?status, "photo synced");
            emit(SyncEvent::PhotoSynced {
                filename: photo.original_filename.clone(),
                id: id.clone(),
                status,
            });
            Ok::<_, SyncError>((photo, status))
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    let cached = synced
        .iter()
        .filter(|(_, s)| *s == PhotoStatus::Cached)
        .count();
    let generated = synced.len() - cached;

    let valid_ids: HashSet<StableId> = ids.keys().cloned().collect();
    let cleanup = derivatives::cleanup_stale_files(&valid_ids, &paths.output_dir);

    let manifest = Manifest::from_photos(synced.into_iter().map(|(p, _)| p).collect());
    manifest.save(&manifest_path)?;
    tracing::info!(
        photos = manifest.photos.len(),
        tags = manifest.tag_index.len(),
        cached,
        generated,
        removed = cleanup.removed,
        path = %manifest_path.display(),
        "manifest written"
    );

    Ok(SyncReport {
        manifest,
        cached,
        generated,
        removed: cleanup.removed,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn original_variant(
    path: &Path,
    filename: &str,
    width: u32,
    height: u32,
    config: &Config,
) -> Result<OriginalVariant, std::io::Error> {
    let prefix = config.paths.original_url_prefix.trim_end_matches('/');
    Ok(OriginalVariant {
        jpg_url: format!("{prefix}/{filename}"),
        width,
        height,
        bytes: std::fs::metadata(path)?.len(),
    })
}

fn apply_metadata(photo: &mut Photo, meta: PhotoMetadata) {
    photo.taken_at = meta.taken_at;
    photo.tags = meta.tags;
    photo.description = meta.description;
    photo.exif = meta.exif;
}

/// Reuse cached tiers and placeholder; everything else comes from the file.
fn refresh_cached(
    cached: &Photo,
    path: &Path,
    config: &Config,
    metadata: &MetadataStore,
) -> Result<Photo, SyncError> {
    let filename = file_name(path);
    let meta = metadata.read(path)?;
    let mut photo = cached.clone();
    photo.variants.original = original_variant(path, &filename, cached.width, cached.height, config)?;
    photo.original_filename = filename;
    apply_metadata(&mut photo, meta);
    Ok(photo)
}

fn build_photo<B: ImageBackend + ?Sized>(
    backend: &B,
    id: &StableId,
    path: &Path,
    config: &Config,
    metadata: &MetadataStore,
) -> Result<Photo, SyncError> {
    let (meta, (placeholder, rendered)) = rayon::join(
        || metadata.read(path),
        || {
            rayon::join(
                || generate_placeholder(path),
                || {
                    derivatives::generate_derivatives(
                        backend,
                        path,
                        id,
                        &config.paths,
                        &config.derivatives,
                    )
                },
            )
        },
    );
    let meta = meta?;
    let placeholder = placeholder?;
    let Derivatives {
        source,
        thumb,
        medium,
        large,
    } = rendered?;

    let filename = file_name(path);
    let original = original_variant(path, &filename, source.width, source.height, config)?;
    let mut photo = Photo {
        id: id.clone(),
        original_filename: filename,
        width: source.width,
        height: source.height,
        aspect_ratio: aspect_ratio(source.width, source.height),
        taken_at: None,
        tags: Vec::new(),
        description: None,
        placeholder,
        variants: VariantSet {
            thumb,
            medium,
            large,
            original,
        },
        exif: None,
    };
    apply_metadata(&mut photo, meta);
    Ok(photo)
}
