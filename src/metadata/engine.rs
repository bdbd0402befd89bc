//! The metadata engine seam.
//!
//! An engine is the long-lived resource that actually parses and rewrites
//! embedded metadata. It is created once, shared by every reader and writer
//! (behind an `Arc`), and shut down exactly once via [`MetadataEngine::close`].
//! After close every call fails with [`MetadataError::EngineClosed`].

use super::exiftool::ExiftoolEngine;
use super::native::NativeEngine;
use super::{MetadataUpdate, PhotoMetadata};
use crate::config::MetadataConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse metadata in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("metadata engine failed: {0}")]
    Engine(String),
    #[error("metadata engine is closed")]
    EngineClosed,
    #[error("cannot write metadata to {0}: only JPEG files are supported")]
    UnsupportedFormat(PathBuf),
    #[error("cannot write metadata to {path}: {message}")]
    ValueTooLarge { path: PathBuf, message: String },
}

impl MetadataError {
    pub(crate) fn parse(path: &Path, message: impl std::fmt::Display) -> Self {
        MetadataError::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Which engine implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Native,
    Exiftool,
}

pub trait MetadataEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn read(&self, path: &Path) -> Result<PhotoMetadata, MetadataError>;

    /// Overwrite only the fields present in `update`, in place.
    fn write(&self, path: &Path, update: &MetadataUpdate) -> Result<(), MetadataError>;

    /// Release the engine. Idempotent.
    fn close(&self) -> Result<(), MetadataError>;
}

/// Open the engine selected by configuration.
pub fn open_engine(config: &MetadataConfig) -> Result<Arc<dyn MetadataEngine>, MetadataError> {
    let engine: Arc<dyn MetadataEngine> = match config.engine {
        EngineKind::Native => Arc::new(NativeEngine::new()),
        EngineKind::Exiftool => Arc::new(ExiftoolEngine::spawn(&config.exiftool_path)?),
    };
    tracing::debug!(engine = engine.name(), "metadata engine opened");
    Ok(engine)
}
