//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Sync
//!
//! ```text
//! Syncing 3 photos from photos/original
//!     dawn.jpg → 3f2a9c0d1e7b6a5f4c3d: cached
//!     lion.jpg → a01b2c3d4e5f60718293: generated
//!
//! Synced 3 photos (2 cached, 1 generated)
//!     Tags: 4
//!     Hero: a01b2c3d4e5f60718293
//!     Removed 3 stale files
//! ```
//!
//! ## Check
//!
//! ```text
//! error: Missing file: assets/photos/generated/thumb/a01b….avif
//! warning: Photo x tag "lion" missing from tag index
//!
//! Validation complete: 3 photos
//!   1 error(s), 1 warning(s)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::check::{CheckReport, Severity};
use crate::metadata::HERO_TAG;
use crate::sync::{PhotoStatus, SyncEvent, SyncReport};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Sync
// ============================================================================

/// Format one sync progress event.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::Started {
            source_dir,
            file_count,
        } => vec![format!(
            "Syncing {} from {}",
            plural(*file_count, "photo"),
            source_dir
        )],
        SyncEvent::PhotoSynced {
            filename,
            id,
            status,
        } => {
            let status = match status {
                PhotoStatus::Cached => "cached",
                PhotoStatus::Generated => "generated",
            };
            vec![format!("{}{} \u{2192} {}: {}", indent(1), filename, id, status)]
        }
    }
}

/// Format the end-of-run summary.
pub fn format_sync_summary(report: &SyncReport) -> Vec<String> {
    let manifest = &report.manifest;
    let mut lines = vec![
        String::new(),
        format!(
            "Synced {} ({} cached, {} generated)",
            plural(manifest.photos.len(), "photo"),
            report.cached,
            report.generated
        ),
    ];

    let public_tags = manifest
        .tag_index
        .keys()
        .filter(|t| !crate::metadata::is_internal_tag(t))
        .count();
    lines.push(format!("{}Tags: {}", indent(1), public_tags));

    if let Some(heroes) = manifest.tag_index.get(HERO_TAG) {
        let ids: Vec<&str> = heroes.iter().map(|id| id.as_str()).collect();
        lines.push(format!("{}Hero: {}", indent(1), ids.join(", ")));
    }
    if report.removed > 0 {
        lines.push(format!(
            "{}Removed {}",
            indent(1),
            plural(report.removed, "stale file")
        ));
    }
    lines
}

pub fn print_sync_event(event: &SyncEvent) {
    for line in format_sync_event(event) {
        println!("{}", line);
    }
}

pub fn print_sync_summary(report: &SyncReport) {
    for line in format_sync_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Shown when `check` runs before any sync.
pub fn format_no_manifest(program: &str) -> Vec<String> {
    vec![format!("No manifest found. Run \"{program} sync\" first.")]
}

/// Every problem, then the totals.
pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .problems
        .iter()
        .map(|p| match p.severity {
            Severity::Error => format!("error: {}", p.message),
            Severity::Warning => format!("warning: {}", p.message),
        })
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }

    lines.push(format!("Validation complete: {} photos", report.photos));
    let (errors, warnings) = (report.error_count(), report.warning_count());
    if errors > 0 {
        lines.push(format!("  {errors} error(s), {warnings} warning(s)"));
    } else if warnings > 0 {
        lines.push(format!("  {warnings} warning(s)"));
    } else {
        lines.push("  All checks passed!".to_string());
    }
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}
