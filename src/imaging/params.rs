//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the derivative planner (which decides what files to
//! create) and the [`backend`](super::backend) (which does the pixel work).
//! Keeping them plain data lets tests swap in a mock backend and assert on
//! the planned operations without encoding anything.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`OutputFormat`]: One of the three encodings written per tier.
//! - [`EncodeTarget`]: A format, quality and output path for one encoded file.
//! - [`RenderParams`]: Decode once, resize once, encode to every target.
//! - [`ThumbnailParams`]: Square center-crop thumbnail rendered in memory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the `u8` the encoders take.
    pub fn as_u8(self) -> u8 {
        self.0.clamp(1, 100) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Encodings written for every derivative tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Avif,
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Avif, OutputFormat::Webp, OutputFormat::Jpeg];

    /// File extension used on disk (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Avif => "avif",
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// One encoded output of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub format: OutputFormat,
    pub quality: Quality,
    pub output: PathBuf,
}

/// Resize a source to fit inside `width`×`height` and encode it once per target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Run the tonal pass on the resized pixels before encoding.
    pub enhance: bool,
    pub targets: Vec<EncodeTarget>,
}

/// Parameters for a square cover-crop thumbnail encoded as JPEG in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams {
    pub source: PathBuf,
    /// Edge length of the square output.
    pub size: u32,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(70).value(), 70);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_as_u8_never_exceeds_100() {
        assert_eq!(Quality(250).as_u8(), 100);
        assert_eq!(Quality::new(80).as_u8(), 80);
    }

    #[test]
    fn output_extensions() {
        assert_eq!(OutputFormat::Avif.extension(), "avif");
        assert_eq!(OutputFormat::Webp.extension(), "webp");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }
}
