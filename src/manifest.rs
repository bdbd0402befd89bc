//! The photo manifest: the single JSON file the public site reads.
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "generatedAt": "2024-03-15T12:30:00.000Z",
//!   "photos": [ { "id": "…", "originalFilename": "…", "variants": { … } } ],
//!   "tagIndex": { "safari": ["…"] }
//! }
//! ```
//!
//! The manifest is regenerated wholesale on every sync and written
//! atomically (temp file + rename), so readers never observe a partial
//! file. Loading the previous manifest is best-effort: a missing or corrupt
//! file simply means "nothing cached".

use crate::identity::StableId;
use crate::metadata::ExifData;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Format version written into every manifest.
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One rendered derivative tier.
///
/// `bytes` is the smallest of the encodings, a rough size for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avif_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp_url: Option<String>,
    pub jpg_url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

/// The unmodified source file, JPEG only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalVariant {
    pub jpg_url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    pub thumb: Variant,
    pub medium: Variant,
    pub large: Variant,
    pub original: OriginalVariant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: StableId,
    pub original_filename: String,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub taken_at: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub placeholder: String,
    pub variants: VariantSet,
    pub exif: Option<ExifData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub generated_at: String,
    pub photos: Vec<Photo>,
    pub tag_index: BTreeMap<String, Vec<StableId>>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            generated_at: now_timestamp(),
            photos: Vec::new(),
            tag_index: BTreeMap::new(),
        }
    }

    /// Sort `photos`, derive the tag index and stamp the generation time.
    pub fn from_photos(mut photos: Vec<Photo>) -> Self {
        sort_photos(&mut photos);
        let tag_index = build_tag_index(&photos);
        Self {
            photos,
            tag_index,
            ..Self::empty()
        }
    }

    pub fn path_in(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILENAME)
    }

    /// Strict load, for validation and tests.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the previous manifest if there is a usable one.
    pub fn load_existing(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(m) => Some(m),
            Err(ManifestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable manifest");
                None
            }
        }
    }

    /// Write to `path` via a sibling temp file and a rename.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn find(&self, id: &StableId) -> Option<&Photo> {
        self.photos.iter().find(|p| &p.id == id)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.sssZ` in UTC.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Map every tag to the sorted, de-duplicated IDs of the photos carrying it.
pub fn build_tag_index(photos: &[Photo]) -> BTreeMap<String, Vec<StableId>> {
    let mut index: BTreeMap<String, Vec<StableId>> = BTreeMap::new();
    for photo in photos {
        for tag in &photo.tags {
            index.entry(tag.clone()).or_default().push(photo.id.clone());
        }
    }
    for ids in index.values_mut() {
        ids.sort();
        ids.dedup();
    }
    index
}

/// Timestamped photos first (oldest first), then the rest; ties broken by
/// filename and finally by ID so the order is total.
pub fn sort_photos(photos: &mut [Photo]) {
    photos.sort_by(compare_photos);
}

fn compare_photos(a: &Photo, b: &Photo) -> Ordering {
    let by_time = match (&a.taken_at, &b.taken_at) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time
        .then_with(|| a.original_filename.cmp(&b.original_filename))
        .then_with(|| a.id.cmp(&b.id))
}
