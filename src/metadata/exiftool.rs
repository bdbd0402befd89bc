//! Metadata engine backed by one long-lived `exiftool` process.
//!
//! Starting exiftool costs far more than running it, so the engine keeps a
//! single `exiftool -stay_open True -@ -` child and feeds it argument files
//! over stdin. Each command ends with `-execute{n}` and its output ends
//! with a matching `{ready{n}}` line. Commands are serialized through one
//! mutex because the protocol is strictly request/response.
//!
//! Tags are read through the MWG composite tags (`-use MWG`), which
//! reconcile EXIF, IPTC and XMP copies of keywords, description and capture
//! time. Numeric tags are requested with the `#` suffix to get raw numbers
//! instead of printed strings.

use super::engine::{MetadataEngine, MetadataError};
use super::{ExifData, MetadataUpdate, PhotoMetadata, format_exposure_time, parse_exif_datetime};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const READ_TAGS: &[&str] = &[
    "-DateTimeOriginal",
    "-Keywords",
    "-Description",
    "-Make",
    "-Model",
    "-FNumber#",
    "-ExposureTime#",
    "-ISO#",
    "-ExposureCompensation#",
    "-FocalLength#",
    "-FocalLengthIn35mmFormat#",
    "-MaxApertureValue#",
    "-MeteringMode",
    "-Flash",
];

struct Process {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct ExiftoolEngine {
    process: Mutex<Option<Process>>,
    sequence: AtomicU64,
}

impl ExiftoolEngine {
    /// Start the shared exiftool process.
    pub fn spawn(exiftool: &str) -> Result<Self, MetadataError> {
        let mut child = Command::new(exiftool)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MetadataError::Engine(format!("cannot start {exiftool}: {e}")))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            return Err(MetadataError::Engine("exiftool pipes unavailable".into()));
        };

        tracing::info!(exiftool, pid = child.id(), "exiftool started");
        Ok(Self {
            process: Mutex::new(Some(Process {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
            sequence: AtomicU64::new(1),
        })
    }

    fn process(&self) -> MutexGuard<'_, Option<Process>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one command and return its stdout.
    fn execute(&self, args: &[String]) -> Result<String, MetadataError> {
        let mut guard = self.process();
        let process = guard.as_mut().ok_or(MetadataError::EngineClosed)?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut command = String::new();
        for arg in args {
            command.push_str(arg);
            command.push('\n');
        }
        command.push_str(&format!("-execute{seq}\n"));
        process.stdin.write_all(command.as_bytes())?;
        process.stdin.flush()?;

        let ready = format!("{{ready{seq}}}");
        let mut output = String::new();
        loop {
            let mut line = String::new();
            if process.stdout.read_line(&mut line)? == 0 {
                return Err(MetadataError::Engine("exiftool exited unexpectedly".into()));
            }
            if line.trim_end() == ready {
                return Ok(output);
            }
            output.push_str(&line);
        }
    }
}

/// The arg-file protocol is line based; values cannot span lines.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn path_arg(path: &Path) -> Result<String, MetadataError> {
    let s = path.to_string_lossy();
    if s.contains('\n') {
        return Err(MetadataError::Engine(format!(
            "path contains a newline: {}",
            path.display()
        )));
    }
    Ok(s.into_owned())
}

impl MetadataEngine for ExiftoolEngine {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn read(&self, path: &Path) -> Result<PhotoMetadata, MetadataError> {
        let mut args: Vec<String> = ["-json", "-use", "MWG"].iter().map(|s| s.to_string()).collect();
        args.extend(READ_TAGS.iter().map(|s| s.to_string()));
        args.push(path_arg(path)?);

        let output = self.execute(&args)?;
        let entries: Vec<Value> = serde_json::from_str(&output)
            .map_err(|e| MetadataError::parse(path, format!("exiftool output: {e}")))?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| MetadataError::parse(path, "exiftool returned no entry"))?;
        Ok(metadata_from_json(&entry))
    }

    fn write(&self, path: &Path, update: &MetadataUpdate) -> Result<(), MetadataError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = ["-overwrite_original", "-use", "MWG", "-codedcharacterset=utf8"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(tags) = &update.tags {
            if tags.is_empty() {
                args.push("-Keywords=".into());
            }
            args.extend(tags.iter().map(|t| format!("-Keywords={}", single_line(t))));
        }
        if let Some(description) = update.description_value() {
            args.push(format!("-Description={}", single_line(description.unwrap_or(""))));
        }
        args.push(path_arg(path)?);

        let output = self.execute(&args)?;
        if output.contains("1 image files updated") || output.contains("1 image files unchanged") {
            Ok(())
        } else {
            Err(MetadataError::Engine(format!(
                "exiftool did not update {}: {}",
                path.display(),
                output.trim()
            )))
        }
    }

    fn close(&self) -> Result<(), MetadataError> {
        let Some(mut process) = self.process().take() else {
            return Ok(());
        };
        let _ = process.stdin.write_all(b"-stay_open\nFalse\n");
        let _ = process.stdin.flush();
        drop(process.stdin);
        let status = process.child.wait()?;
        tracing::info!(%status, "exiftool stopped");
        Ok(())
    }
}

impl Drop for ExiftoolEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn get_string(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn get_f64(entry: &Value, key: &str) -> Option<f64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Keywords arrive as a string for one value and an array for several.
fn get_list(entry: &Value, key: &str) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match entry.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(other) => scalar(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn metadata_from_json(entry: &Value) -> PhotoMetadata {
    let nonzero = |v: Option<f64>| v.filter(|v| *v != 0.0);

    let exif = ExifData {
        camera_make: get_string(entry, "Make"),
        camera_model: get_string(entry, "Model"),
        f_stop: nonzero(get_f64(entry, "FNumber")),
        exposure_time: format_exposure_time(get_f64(entry, "ExposureTime")),
        iso: nonzero(get_f64(entry, "ISO")).map(|v| v.round() as u32),
        exposure_bias: get_f64(entry, "ExposureCompensation"),
        focal_length: nonzero(get_f64(entry, "FocalLength")),
        focal_length_35mm: nonzero(get_f64(entry, "FocalLengthIn35mmFormat")),
        max_aperture: nonzero(get_f64(entry, "MaxApertureValue")).map(|v| (v * 10.0).round() / 10.0),
        metering_mode: get_string(entry, "MeteringMode"),
        flash: get_string(entry, "Flash"),
    };

    PhotoMetadata {
        taken_at: get_string(entry, "DateTimeOriginal").and_then(|raw| parse_exif_datetime(&raw, None)),
        tags: get_list(entry, "Keywords")
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        description: get_string(entry, "Description"),
        exif: exif.into_option(),
    }
}
