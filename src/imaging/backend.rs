//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline needs
//! from an imaging library: identify, render (resize + multi-format encode)
//! and thumbnail.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! `MockBackend` in this module, which records operations instead of
//! encoding pixels.

use super::params::{OutputFormat, RenderParams, ThumbnailParams};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("{format:?} encode failed for {path}: {message}")]
    Encode {
        format: OutputFormat,
        path: PathBuf,
        message: String,
    },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

impl ImagingError {
    pub(crate) fn decode(path: &Path, err: impl std::fmt::Display) -> Self {
        ImagingError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Result of an identify operation, after orientation correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Size on disk of one encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFile {
    pub format: OutputFormat,
    pub bytes: u64,
}

/// What a render actually produced.
///
/// `width`/`height` are measured from the written JPEG, not copied from the
/// requested size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub width: u32,
    pub height: u32,
    pub files: Vec<EncodedFile>,
}

impl RenderOutput {
    /// Smallest encoded size across all formats.
    pub fn min_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).min().unwrap_or(0)
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Get orientation-corrected image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, ImagingError>;

    /// Decode, orient, resize and encode to every target in `params`.
    fn render(&self, params: &RenderParams) -> Result<RenderOutput, ImagingError>;

    /// Render a square cover-cropped JPEG thumbnail in memory.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<Vec<u8>, ImagingError>;
}
