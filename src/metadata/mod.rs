//! Embedded photo metadata: tags, description, capture time and camera data.
//!
//! The image file itself is the only source of truth. There is no metadata
//! database; every read goes back to the file and every write rewrites it in
//! place.
//!
//! ## Layers
//!
//! - [`engine`]: the [`MetadataEngine`] trait. One engine instance is a
//!   long-lived shared resource with an explicit `close()`.
//! - [`native`]: pure-Rust engine (IPTC-IIM in JPEG APP13 for keywords and
//!   caption with XMP and EXIF fallbacks, EXIF via `kamadak-exif` for
//!   camera fields).
//! - [`exiftool`]: engine backed by a single `exiftool -stay_open` process.
//! - [`lock`]: per-path exclusive locks. Same-path operations run one at a
//!   time; different paths proceed in parallel.
//! - [`MetadataStore`]: the adapter everything else talks to. Owns the
//!   engine plus the lock registry and provides the read-modify-write
//!   operations (tag add/remove, hero sweep).
//!
//! ## Field mapping
//!
//! | Field | Native source | exiftool (MWG) tag |
//! |---|---|---|
//! | `takenAt` | EXIF DateTimeOriginal (+ OffsetTimeOriginal) | `DateTimeOriginal` |
//! | `tags` | IPTC 2:25 Keywords, else XMP dc:subject | `Keywords` |
//! | `description` | IPTC 2:120 Caption-Abstract, else XMP dc:description, else EXIF ImageDescription | `Description` |
//! | `exif.*` | EXIF IFD | same-named EXIF tags |
//!
//! Tags starting with `_` are internal (see [`HERO_TAG`]) and are filtered
//! out of public tag listings.

pub mod engine;
pub mod exiftool;
mod iptc;
pub mod lock;
pub mod native;
mod store;
mod xmp;

pub use engine::{EngineKind, MetadataEngine, MetadataError, open_engine};
pub use lock::PathLocks;
pub use store::MetadataStore;

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

/// Reserved tag marking the single featured photo.
pub const HERO_TAG: &str = "_hero";

/// Internal/system tags are prefixed with `_`.
pub fn is_internal_tag(tag: &str) -> bool {
    tag.starts_with('_')
}

/// Camera and exposure attributes. Absent fields serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifData {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub f_stop: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<u32>,
    pub exposure_bias: Option<f64>,
    pub focal_length: Option<f64>,
    #[serde(rename = "focalLength35mm")]
    pub focal_length_35mm: Option<f64>,
    pub max_aperture: Option<f64>,
    pub metering_mode: Option<String>,
    pub flash: Option<String>,
}

impl ExifData {
    pub fn is_empty(&self) -> bool {
        self == &ExifData::default()
    }

    /// `None` when every field is absent.
    pub fn into_option(self) -> Option<ExifData> {
        if self.is_empty() { None } else { Some(self) }
    }
}

/// Everything read from one file's embedded metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    pub taken_at: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub exif: Option<ExifData>,
}

impl PhotoMetadata {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A partial write. Omitted fields are left untouched in the file.
///
/// `description: Some(None)` (JSON `null`) clears the description, as does
/// an empty string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataUpdate {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
}

impl MetadataUpdate {
    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            description: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.description.is_none()
    }

    /// The description to write, with `""` and `null` both meaning "clear".
    pub fn description_value(&self) -> Option<Option<&str>> {
        self.description
            .as_ref()
            .map(|d| d.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    }
}

/// Distinguishes a present `null` from an absent key.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Render an exposure time in seconds the way photographers read it.
///
/// ```
/// # use photo_sync::metadata::format_exposure_time;
/// assert_eq!(format_exposure_time(Some(2.5)).as_deref(), Some("2.5 sec."));
/// assert_eq!(format_exposure_time(Some(0.004)).as_deref(), Some("1/250 sec."));
/// assert_eq!(format_exposure_time(Some(0.0)), None);
/// ```
pub fn format_exposure_time(seconds: Option<f64>) -> Option<String> {
    let v = seconds.filter(|v| v.is_finite() && *v > 0.0)?;
    if v >= 1.0 {
        Some(format!("{v} sec."))
    } else {
        Some(format!("1/{} sec.", (1.0 / v).round() as u64))
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse an EXIF-style timestamp into `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// An inline `±HH:MM` suffix or trailing `Z` wins over `offset`; without
/// either the time is taken as UTC. Zeroed or malformed values give `None`.
pub fn parse_exif_datetime(raw: &str, offset: Option<&str>) -> Option<String> {
    let raw = raw.trim().trim_end_matches('\0');
    let (body, inline_offset) = split_offset(raw);
    let offset_secs = match inline_offset.or(offset) {
        Some(o) => parse_offset(o)?,
        None => 0,
    };

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())?;
    let local = FixedOffset::east_opt(offset_secs)?
        .from_local_datetime(&naive)
        .single()?;
    Some(
        local
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string(),
    )
}

fn split_offset(raw: &str) -> (&str, Option<&str>) {
    if let Some(body) = raw.strip_suffix('Z') {
        return (body, Some("+00:00"));
    }
    if raw.len() > 6 && raw.is_char_boundary(raw.len() - 6) {
        let (body, tail) = raw.split_at(raw.len() - 6);
        if tail.starts_with(['+', '-']) && tail.as_bytes()[3] == b':' {
            return (body, Some(tail));
        }
    }
    (raw, None)
}

fn parse_offset(offset: &str) -> Option<i32> {
    let offset = offset.trim();
    let sign = match offset.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let (h, m) = offset[1..].split_once(':')?;
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    Some(sign * (h * 3600 + m * 60))
}
