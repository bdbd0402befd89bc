//! Manifest validation for `photo-sync check`.
//!
//! Works on the raw JSON rather than the typed [`Manifest`](crate::manifest::Manifest)
//! so a damaged file yields a list of concrete problems instead of a single
//! deserialization error. Every problem is collected; the caller decides
//! the exit status from [`CheckReport::has_errors`].

use crate::identity::is_valid_id;
use crate::metadata::HERO_TAG;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Number of photo entries seen, zero if `photos` was unusable.
    pub photos: usize,
    pub problems: Vec<Problem>,
}

impl CheckReport {
    fn error(&mut self, message: impl Into<String>) {
        self.problems.push(Problem {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.problems.push(Problem {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn count(&self, severity: Severity) -> usize {
        self.problems
            .iter()
            .filter(|p| p.severity == severity)
            .count()
    }
}

const REQUIRED_FIELDS: [&str; 5] = ["originalFilename", "width", "height", "placeholder", "variants"];
const TIERS: [&str; 3] = ["thumb", "medium", "large"];
const URL_FIELDS: [&str; 3] = ["avifUrl", "webpUrl", "jpgUrl"];

/// Validate the manifest at `manifest_path`.
///
/// Returns `Ok(None)` when there is no manifest yet. Derivative URLs are
/// resolved against `public_root`.
pub fn check_manifest(
    manifest_path: &Path,
    public_root: &Path,
) -> Result<Option<CheckReport>, CheckError> {
    let content = match std::fs::read_to_string(manifest_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckError::Io {
                path: manifest_path.to_path_buf(),
                source,
            });
        }
    };

    let mut report = CheckReport::default();
    match serde_json::from_str::<Value>(&content) {
        Ok(json) => check_value(&json, public_root, &mut report),
        Err(e) => report.error(format!("Invalid manifest JSON: {e}")),
    }
    Ok(Some(report))
}

fn is_present(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn check_value(json: &Value, public_root: &Path, report: &mut CheckReport) {
    if !is_present(json.get("version")) {
        report.error("Manifest missing version field");
    }
    if !is_present(json.get("generatedAt")) {
        report.error("Manifest missing generatedAt field");
    }
    let Some(photos) = json.get("photos").and_then(Value::as_array) else {
        report.error("Manifest photos must be an array");
        return;
    };
    report.photos = photos.len();

    let mut ids: HashSet<&str> = HashSet::new();
    let mut tags_by_id: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut heroes: Vec<&str> = Vec::new();

    for photo in photos {
        let Some(id) = photo.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            report.error("Photo missing valid id");
            continue;
        };
        if !ids.insert(id) {
            report.error(format!("Duplicate photo ID: {id}"));
        }
        if !is_valid_id(id) {
            report.warning(format!("Photo ID {id} is not a 20-character hex id"));
        }

        let tags: Vec<&str> = photo
            .get("tags")
            .and_then(Value::as_array)
            .map(|t| t.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if tags.contains(&HERO_TAG) {
            heroes.push(id);
        }
        tags_by_id.push((id, tags));

        check_photo(id, photo, public_root, report);
    }

    if heroes.len() > 1 {
        report.error(format!(
            "Multiple photos have {HERO_TAG} tag: {}",
            heroes.join(", ")
        ));
    }

    let index = json.get("tagIndex").and_then(Value::as_object);
    if let Some(index) = index {
        for (tag, members) in index {
            for member in members.as_array().into_iter().flatten().filter_map(Value::as_str) {
                if !ids.contains(member) {
                    report.error(format!(
                        "Tag index references non-existent photo: {member} in tag \"{tag}\""
                    ));
                }
            }
        }
    } else {
        report.error("Manifest tagIndex must be an object");
    }

    for (id, tags) in &tags_by_id {
        for tag in tags {
            let indexed = index
                .and_then(|i| i.get(*tag))
                .and_then(Value::as_array)
                .is_some_and(|m| m.iter().any(|v| v.as_str() == Some(*id)));
            if !indexed {
                report.warning(format!("Photo {id} tag \"{tag}\" missing from tag index"));
            }
        }
    }
}

fn check_photo(id: &str, photo: &Value, public_root: &Path, report: &mut CheckReport) {
    for field in REQUIRED_FIELDS {
        if photo.get(field).is_none() {
            report.error(format!("Photo {id} missing field: {field}"));
        }
    }
    let Some(variants) = photo.get("variants") else {
        return;
    };

    for tier in TIERS {
        let Some(variant) = variants.get(tier).filter(|v| v.is_object()) else {
            report.error(format!("Photo {id} missing {tier} variant"));
            continue;
        };
        for field in URL_FIELDS {
            let Some(url) = variant.get(field).and_then(Value::as_str).filter(|u| !u.is_empty())
            else {
                continue;
            };
            if !public_root.join(url).is_file() {
                report.error(format!("Missing file: {url}"));
            }
        }
    }
}
