//! Derivative tiers: three sizes, three encodings each.
//!
//! ```text
//! <output_dir>/generated/
//! ├── thumb/<id>.{avif,webp,jpg}    # 400px long edge
//! ├── medium/<id>.{avif,webp,jpg}   # 1400px long edge
//! └── large/<id>.{avif,webp,jpg}    # 2560px long edge
//! ```
//!
//! File names are the photo's stable ID, so a renamed source keeps its
//! derivatives and a removed source leaves orphans that
//! [`cleanup_stale_files`] deletes.
//!
//! Sizing is fit-inside on the long edge and never upscales. The reported
//! width and height are measured from the written JPEG, and the reported
//! byte size is the smallest of the three encodings.

use crate::config::{DerivativesConfig, PathsConfig};
use crate::identity::StableId;
use crate::imaging::{
    Dimensions, EncodeTarget, ImageBackend, ImagingError, OutputFormat, Quality, RenderParams,
    fit_long_edge,
};
use crate::manifest::Variant;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Subdirectory of the output dir holding every tier.
pub const GENERATED_DIR: &str = "generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Thumb,
    Medium,
    Large,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Thumb, Tier::Medium, Tier::Large];

    pub fn name(self) -> &'static str {
        match self {
            Tier::Thumb => "thumb",
            Tier::Medium => "medium",
            Tier::Large => "large",
        }
    }

    pub fn long_edge(self, config: &DerivativesConfig) -> u32 {
        match self {
            Tier::Thumb => config.thumb_long_edge,
            Tier::Medium => config.medium_long_edge,
            Tier::Large => config.large_long_edge,
        }
    }
}

fn quality_for(format: OutputFormat, config: &DerivativesConfig) -> Quality {
    Quality::new(match format {
        OutputFormat::Avif => config.avif_quality,
        OutputFormat::Webp => config.webp_quality,
        OutputFormat::Jpeg => config.jpeg_quality,
    })
}

pub fn tier_dir(output_dir: &Path, tier: Tier) -> PathBuf {
    output_dir.join(GENERATED_DIR).join(tier.name())
}

/// `<output_dir>/generated/<tier>/<id>.<ext>`
pub fn derivative_path(output_dir: &Path, tier: Tier, id: &StableId, format: OutputFormat) -> PathBuf {
    tier_dir(output_dir, tier).join(format!("{id}.{}", format.extension()))
}

/// `<url_prefix>/generated/<tier>/<id>.<ext>`
pub fn derivative_url(url_prefix: &str, tier: Tier, id: &StableId, format: OutputFormat) -> String {
    let prefix = url_prefix.trim_end_matches('/');
    let rel = format!("{GENERATED_DIR}/{}/{id}.{}", tier.name(), format.extension());
    if prefix.is_empty() {
        rel
    } else {
        format!("{prefix}/{rel}")
    }
}

/// True when every tier has every format on disk for `id`.
pub fn derivatives_present(output_dir: &Path, id: &StableId) -> bool {
    Tier::ALL.iter().all(|&tier| {
        OutputFormat::ALL
            .iter()
            .all(|&format| derivative_path(output_dir, tier, id, format).is_file())
    })
}

/// The three rendered tiers of one photo plus its oriented source size.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivatives {
    pub source: Dimensions,
    pub thumb: Variant,
    pub medium: Variant,
    pub large: Variant,
}

/// Render every tier of `source` under `paths.output_dir`.
///
/// Tiers render in parallel; each render encodes its three formats in
/// parallel inside the backend.
pub fn generate_derivatives<B: ImageBackend + ?Sized>(
    backend: &B,
    source: &Path,
    id: &StableId,
    paths: &PathsConfig,
    config: &DerivativesConfig,
) -> Result<Derivatives, ImagingError> {
    let dims = backend.identify(source)?;

    let mut rendered = Tier::ALL
        .par_iter()
        .map(|&tier| render_tier(backend, source, id, tier, dims, paths, config))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();

    let (Some(thumb), Some(medium), Some(large)) = (rendered.next(), rendered.next(), rendered.next())
    else {
        return Err(ImagingError::ProcessingFailed(format!(
            "missing tier output for {}",
            source.display()
        )));
    };

    Ok(Derivatives {
        source: dims,
        thumb,
        medium,
        large,
    })
}

fn render_tier<B: ImageBackend + ?Sized>(
    backend: &B,
    source: &Path,
    id: &StableId,
    tier: Tier,
    dims: Dimensions,
    paths: &PathsConfig,
    config: &DerivativesConfig,
) -> Result<Variant, ImagingError> {
    std::fs::create_dir_all(tier_dir(&paths.output_dir, tier))?;
    let (width, height) = fit_long_edge((dims.width, dims.height), tier.long_edge(config));

    let params = RenderParams {
        source: source.to_path_buf(),
        width,
        height,
        enhance: config.enhance,
        targets: OutputFormat::ALL
            .iter()
            .map(|&format| EncodeTarget {
                format,
                quality: quality_for(format, config),
                output: derivative_path(&paths.output_dir, tier, id, format),
            })
            .collect(),
    };
    let output = backend.render(&params)?;

    let url = |format| derivative_url(&paths.url_prefix, tier, id, format);
    Ok(Variant {
        avif_url: Some(url(OutputFormat::Avif)),
        webp_url: Some(url(OutputFormat::Webp)),
        jpg_url: url(OutputFormat::Jpeg),
        width: output.width,
        height: output.height,
        bytes: output.min_bytes(),
    })
}

/// Result of a stale-file sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Delete every tier file whose stem is not a current photo ID.
///
/// A missing tier directory is skipped silently. Any other failure is
/// logged and counted, never returned.
pub fn cleanup_stale_files(valid_ids: &HashSet<StableId>, output_dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    for tier in Tier::ALL {
        let dir = tier_dir(output_dir, tier);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot scan tier directory");
                report.failed += 1;
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if valid_ids.contains(stem) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed stale derivative");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot remove stale derivative");
                    report.failed += 1;
                }
            }
        }
    }

    report
}
