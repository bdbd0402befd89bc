//! Project configuration.
//!
//! Handles loading, validating and merging `photo-sync.toml`. The file is
//! optional: stock defaults describe the standard portfolio layout, and a
//! config file only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! ```text
//! project/
//! ├── photo-sync.toml                 # optional, overrides stock defaults
//! ├── photos/original/                # source JPEGs
//! └── apps/public/src/assets/photos/  # manifest.json + generated/
//! ```
//!
//! A different file can be selected with `--config`. Relative paths in the
//! config resolve against the project root (`--root`, default `.`).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! source_dir = "photos/original"
//! output_dir = "apps/public/src/assets/photos"
//! public_root = "apps/public/src"
//! url_prefix = "assets/photos"
//! original_url_prefix = "photos/original"
//!
//! [derivatives]
//! avif_quality = 70
//! webp_quality = 80
//! jpeg_quality = 85
//! thumb_long_edge = 400
//! medium_long_edge = 1400
//! large_long_edge = 2560
//! enhance = true
//!
//! [metadata]
//! engine = "native"         # "native" or "exiftool"
//! exiftool_path = "exiftool"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! index_ttl_secs = 60
//! thumbnail_size = 300
//! thumbnail_quality = 70
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::metadata::EngineKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILENAME: &str = "photo-sync.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full configuration. Every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub derivatives: DerivativesConfig,
    pub metadata: MetadataConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.derivatives;
        for (name, q) in [
            ("derivatives.avif_quality", d.avif_quality),
            ("derivatives.webp_quality", d.webp_quality),
            ("derivatives.jpeg_quality", d.jpeg_quality),
            ("server.thumbnail_quality", self.server.thumbnail_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Validation(format!("{name} must be 1-100")));
            }
        }
        for (name, edge) in [
            ("derivatives.thumb_long_edge", d.thumb_long_edge),
            ("derivatives.medium_long_edge", d.medium_long_edge),
            ("derivatives.large_long_edge", d.large_long_edge),
        ] {
            if edge == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        if self.server.thumbnail_size == 0 {
            return Err(ConfigError::Validation(
                "server.thumbnail_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Join every relative directory onto `root`.
    pub fn resolve_paths(mut self, root: &Path) -> Self {
        let p = &mut self.paths;
        for dir in [&mut p.source_dir, &mut p.output_dir, &mut p.public_root] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        crate::manifest::Manifest::path_in(&self.paths.output_dir)
    }
}

/// Where photos come from and where generated files go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding the source JPEGs.
    pub source_dir: PathBuf,
    /// Directory receiving `manifest.json` and `generated/<tier>/`.
    pub output_dir: PathBuf,
    /// Root the public site serves from; manifest URLs are relative to it.
    pub public_root: PathBuf,
    /// URL prefix of `output_dir` as seen from `public_root`.
    pub url_prefix: String,
    /// URL prefix for links to the unmodified source files.
    pub original_url_prefix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("photos/original"),
            output_dir: PathBuf::from("apps/public/src/assets/photos"),
            public_root: PathBuf::from("apps/public/src"),
            url_prefix: "assets/photos".to_string(),
            original_url_prefix: "photos/original".to_string(),
        }
    }
}

/// Derivative tier sizes and per-format encoder quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    pub avif_quality: u32,
    pub webp_quality: u32,
    /// Progressive JPEG quality.
    pub jpeg_quality: u32,
    pub thumb_long_edge: u32,
    pub medium_long_edge: u32,
    pub large_long_edge: u32,
    /// Tonal pass before encoding: shadow boost for dark sources, levels
    /// stretch, light sharpen and a small saturation lift.
    pub enhance: bool,
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        Self {
            avif_quality: 70,
            webp_quality: 80,
            jpeg_quality: 85,
            thumb_long_edge: 400,
            medium_long_edge: 1400,
            large_long_edge: 2560,
            enhance: true,
        }
    }
}

/// Which metadata engine to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub engine: EngineKind,
    /// exiftool binary, only used by the `exiftool` engine.
    pub exiftool_path: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Native,
            exiftool_path: "exiftool".to_string(),
        }
    }
}

/// Admin server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long the ID → path index is trusted before a rescan.
    pub index_ttl_secs: u64,
    /// Edge length of the square admin thumbnails.
    pub thumbnail_size: u32,
    pub thumbnail_quality: u32,
}

impl ServerConfig {
    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            index_ttl_secs: 60,
            thumbnail_size: 300,
            thumbnail_quality: 70,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the project config.
///
/// With `explicit` set, that file must exist. Otherwise `photo-sync.toml`
/// in `root` is used when present and stock defaults when not. Paths in the
/// result are resolved against `root`.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(load_raw_config(path)?),
        None => {
            let path = root.join(CONFIG_FILENAME);
            if path.exists() {
                Some(load_raw_config(&path)?)
            } else {
                None
            }
        }
    };
    Ok(resolve_config(overlay)?.resolve_paths(root))
}

/// Returns a fully-commented stock `photo-sync.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Photo Sync Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Relative paths resolve against the project root (--root).
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Paths
# ---------------------------------------------------------------------------
[paths]
# Source JPEGs. Only *.jpg / *.jpeg files are picked up.
source_dir = "photos/original"

# Receives manifest.json and generated/<tier>/<id>.<ext>.
output_dir = "apps/public/src/assets/photos"

# Directory the public site is served from. Manifest URLs are relative to it.
public_root = "apps/public/src"

# URL prefix for generated derivatives.
url_prefix = "assets/photos"

# URL prefix for links to the unmodified source files.
original_url_prefix = "photos/original"

# ---------------------------------------------------------------------------
# Derivatives
# ---------------------------------------------------------------------------
[derivatives]
# Encoder quality per format (1 = worst, 100 = best).
avif_quality = 70
webp_quality = 80
jpeg_quality = 85

# Long-edge pixel size of each tier. Sources are never upscaled.
thumb_long_edge = 400
medium_long_edge = 1400
large_long_edge = 2560

# Tonal pass on every derivative. Sources whose mean brightness is under
# 35% get a shadow boost; every image gets a levels stretch, light
# sharpening and +10% saturation. Set false to encode pixels untouched.
enhance = true

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# "native" reads EXIF and reads/writes IPTC keywords and captions in-process.
# "exiftool" drives one long-lived exiftool process instead.
engine = "native"
exiftool_path = "exiftool"

# ---------------------------------------------------------------------------
# Admin server
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 3000

# Seconds the photo ID index is reused before the source folder is rescanned.
index_ttl_secs = 60

# Square admin thumbnails.
thumbnail_size = 300
thumbnail_quality = 70

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
