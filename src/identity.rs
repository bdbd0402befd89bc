//! Content-addressed photo identity.
//!
//! A photo's ID is derived from its pixels, not its filename: decode, apply
//! EXIF orientation, stretch to a 64×64 grid, drop alpha, SHA-256 the raw
//! RGB bytes and keep the first 20 hex characters (80 bits).
//!
//! Because the grid is tiny, re-encoding a file losslessly or rewriting its
//! embedded metadata leaves the ID unchanged, while an actual pixel edit
//! changes it. Decode failures are hard errors; there is no fallback scheme.

use crate::imaging::{ImagingError, load_oriented};
use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Side length of the normalization grid.
const GRID: u32 = 64;
/// Hex characters kept from the digest.
pub const ID_LEN: usize = 20;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("cannot derive id for {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: ImagingError,
    },
    #[error("invalid stable id {0:?}: expected {ID_LEN} lowercase hex characters")]
    Invalid(String),
}

/// A 20-character lowercase hex photo identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StableId(String);

impl StableId {
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if is_valid_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(IdentityError::Invalid(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `^[a-f0-9]{20}$`
pub fn is_valid_id(s: &str) -> bool {
    s.len() == ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TryFrom<String> for StableId {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_valid_id(&s) {
            Ok(Self(s))
        } else {
            Err(IdentityError::Invalid(s))
        }
    }
}

impl From<StableId> for String {
    fn from(id: StableId) -> Self {
        id.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the stable ID of the image at `path`.
pub fn generate_stable_id(path: &Path) -> Result<StableId, IdentityError> {
    let img = load_oriented(path).map_err(|source| IdentityError::Image {
        path: path.display().to_string(),
        source,
    })?;
    Ok(stable_id_for_image(&img))
}

/// Hash an already-decoded, already-oriented image.
pub fn stable_id_for_image(img: &DynamicImage) -> StableId {
    let grid = img.resize_exact(GRID, GRID, FilterType::Lanczos3).to_rgb8();
    let digest = Sha256::digest(grid.as_raw());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    StableId(hex[..ID_LEN].to_string())
}
