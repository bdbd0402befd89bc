//! Pure-Rust metadata engine.
//!
//! Camera fields and the capture time come from EXIF via `kamadak-exif`.
//! Keywords and description come from the first store that has them:
//!
//! | Field | IIM block present | No IIM block |
//! |---|---|---|
//! | tags | IPTC 2:25 | XMP `dc:subject` |
//! | description | IPTC 2:120 | XMP `dc:description`, then EXIF `ImageDescription` |
//!
//! Writes touch IPTC only and replace the file atomically (temp file +
//! rename in the same directory), so a crash mid-write never leaves a
//! truncated original. Once a file has an IIM block, IPTC is authoritative;
//! the first write into a file without one carries the XMP/EXIF values over
//! so nothing disappears.
//!
//! Printed values for `MeteringMode` and `Flash` use exiftool's wording so
//! manifests look the same whichever engine produced them.

use super::engine::{MetadataEngine, MetadataError};
use super::iptc::{self, IptcData, IptcError, IptcUpdate};
use super::xmp;
use super::{ExifData, MetadataUpdate, PhotoMetadata, format_exposure_time, parse_exif_datetime};
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct NativeEngine {
    closed: AtomicBool,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), MetadataError> {
        if self.closed.load(Ordering::Acquire) {
            Err(MetadataError::EngineClosed)
        } else {
            Ok(())
        }
    }
}

fn iptc_error(path: &Path, err: IptcError) -> MetadataError {
    match err {
        IptcError::NotJpeg => MetadataError::UnsupportedFormat(path.to_path_buf()),
        err @ IptcError::TooLarge { .. } => MetadataError::ValueTooLarge {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
        other => MetadataError::parse(path, other),
    }
}

impl MetadataEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn read(&self, path: &Path) -> Result<PhotoMetadata, MetadataError> {
        self.ensure_open()?;
        let bytes = std::fs::read(path)?;
        let iptc = iptc::read_iptc(&bytes).map_err(|e| iptc_error(path, e))?;
        let exif = read_exif(path, &bytes);
        let text = if iptc.present {
            iptc
        } else {
            fallback_text(path, &bytes, exif.as_ref())
        };

        Ok(PhotoMetadata {
            taken_at: exif.as_ref().and_then(taken_at),
            tags: text.keywords,
            description: text.caption,
            exif: exif.map(|e| exif_data(&e)).and_then(ExifData::into_option),
        })
    }

    fn write(&self, path: &Path, update: &MetadataUpdate) -> Result<(), MetadataError> {
        self.ensure_open()?;
        if update.is_empty() {
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let current = iptc::read_iptc(&bytes).map_err(|e| iptc_error(path, e))?;
        let seed = if current.present {
            None
        } else {
            Some(fallback_text(path, &bytes, read_exif(path, &bytes).as_ref()))
        };
        let mut iptc_update = IptcUpdate {
            keywords: update.tags.as_deref(),
            caption: update.description_value(),
        };
        if let Some(seed) = &seed {
            iptc_update.keywords = iptc_update.keywords.or(Some(seed.keywords.as_slice()));
            iptc_update.caption = iptc_update.caption.or(Some(seed.caption.as_deref()));
        }
        let rewritten = iptc::apply_update(&bytes, &iptc_update).map_err(|e| iptc_error(path, e))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| MetadataError::UnsupportedFormat(path.to_path_buf()))?;
        let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
        std::fs::write(&tmp, &rewritten)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn close(&self) -> Result<(), MetadataError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Keywords and description for a file with no IIM block.
fn fallback_text(path: &Path, bytes: &[u8], exif: Option<&exif::Exif>) -> IptcData {
    let xmp = xmp::read_xmp(bytes).unwrap_or_else(|e| {
        tracing::debug!(path = %path.display(), error = %e, "unreadable XMP packet ignored");
        xmp::XmpData::default()
    });
    IptcData {
        keywords: xmp.keywords,
        caption: xmp
            .description
            .or_else(|| exif.and_then(|e| ascii(e, Tag::ImageDescription))),
        present: false,
    }
}

fn read_exif(path: &Path, bytes: &[u8]) -> Option<exif::Exif> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Some(exif),
        Err(exif::Error::NotFound(_)) => None,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "unreadable EXIF block ignored");
            None
        }
    }
}

fn field<'a>(exif: &'a exif::Exif, tag: Tag) -> Option<&'a Value> {
    exif.get_field(tag, In::PRIMARY).map(|f| &f.value)
}

fn ascii(exif: &exif::Exif, tag: Tag) -> Option<String> {
    match field(exif, tag)? {
        Value::Ascii(values) => values
            .first()
            .map(|raw| String::from_utf8_lossy(raw).trim_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn float(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    let value = match field(exif, tag)? {
        Value::Rational(v) => v.first().map(|r| r.to_f64()),
        Value::SRational(v) => v.first().map(|r| r.to_f64()),
        other => other.get_uint(0).map(f64::from),
    };
    value.filter(|v| v.is_finite())
}

fn uint(exif: &exif::Exif, tag: Tag) -> Option<u32> {
    field(exif, tag)?.get_uint(0)
}

/// Zero means "not recorded" for most EXIF numbers.
fn nonzero(v: Option<f64>) -> Option<f64> {
    v.filter(|v| *v != 0.0)
}

fn taken_at(exif: &exif::Exif) -> Option<String> {
    let mut raw = ascii(exif, Tag::DateTimeOriginal)?;
    if let Some(subsec) = ascii(exif, Tag::SubSecTimeOriginal)
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
    {
        raw = format!("{raw}.{subsec}");
    }
    let offset = ascii(exif, Tag::OffsetTimeOriginal);
    parse_exif_datetime(&raw, offset.as_deref())
}

fn exif_data(exif: &exif::Exif) -> ExifData {
    ExifData {
        camera_make: ascii(exif, Tag::Make),
        camera_model: ascii(exif, Tag::Model),
        f_stop: nonzero(float(exif, Tag::FNumber)),
        exposure_time: format_exposure_time(float(exif, Tag::ExposureTime)),
        iso: uint(exif, Tag::PhotographicSensitivity).filter(|v| *v != 0),
        exposure_bias: float(exif, Tag::ExposureBiasValue),
        focal_length: nonzero(float(exif, Tag::FocalLength)),
        focal_length_35mm: nonzero(uint(exif, Tag::FocalLengthIn35mmFilm).map(f64::from)),
        max_aperture: nonzero(float(exif, Tag::MaxApertureValue).map(apex_to_f_number)),
        metering_mode: uint(exif, Tag::MeteringMode).map(metering_mode_name),
        flash: uint(exif, Tag::Flash).map(flash_name),
    }
}

/// APEX aperture value → f-number, one decimal like exiftool prints it.
fn apex_to_f_number(apex: f64) -> f64 {
    (2f64.powf(apex / 2.0) * 10.0).round() / 10.0
}

fn metering_mode_name(code: u32) -> String {
    let name = match code {
        0 => "Unknown",
        1 => "Average",
        2 => "Center-weighted average",
        3 => "Spot",
        4 => "Multi-spot",
        5 => "Multi-segment",
        6 => "Partial",
        255 => "Other",
        other => return format!("Unknown ({other})"),
    };
    name.to_string()
}

fn flash_name(code: u32) -> String {
    let name = match code {
        0x00 => "No Flash",
        0x01 => "Fired",
        0x05 => "Fired, Return not detected",
        0x07 => "Fired, Return detected",
        0x08 => "On, Did not fire",
        0x09 => "On, Fired",
        0x0d => "On, Return not detected",
        0x0f => "On, Return detected",
        0x10 => "Off, Did not fire",
        0x14 => "Off, Did not fire, Return not detected",
        0x18 => "Auto, Did not fire",
        0x19 => "Auto, Fired",
        0x1d => "Auto, Fired, Return not detected",
        0x1f => "Auto, Fired, Return detected",
        0x20 => "No flash function",
        0x30 => "Off, No flash function",
        0x41 => "Fired, Red-eye reduction",
        0x45 => "Fired, Red-eye reduction, Return not detected",
        0x47 => "Fired, Red-eye reduction, Return detected",
        0x49 => "On, Red-eye reduction",
        0x4d => "On, Red-eye reduction, Return not detected",
        0x4f => "On, Red-eye reduction, Return detected",
        0x50 => "Off, Red-eye reduction",
        0x58 => "Auto, Did not fire, Red-eye reduction",
        0x59 => "Auto, Fired, Red-eye reduction",
        0x5d => "Auto, Fired, Red-eye reduction, Return not detected",
        0x5f => "Auto, Fired, Red-eye reduction, Return detected",
        other => return format!("Unknown (0x{other:x})"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::generate_stable_id;
    use crate::test_helpers::*;

    #[test]
    fn plain_jpeg_has_no_metadata() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 32, 32);

        let meta = NativeEngine::new().read(&path).unwrap();
        assert_eq!(meta, PhotoMetadata::default());
    }

    #[test]
    fn reads_camera_exif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_camera_jpeg(&path, 32, 24, "2024:03:15 14:30:00");

        let meta = NativeEngine::new().read(&path).unwrap();
        assert_eq!(meta.taken_at.as_deref(), Some("2024-03-15T14:30:00.000Z"));

        let exif = meta.exif.unwrap();
        assert_eq!(exif.camera_make.as_deref(), Some("Leica Camera AG"));
        assert_eq!(exif.camera_model.as_deref(), Some("LEICA Q3"));
        assert_eq!(exif.exposure_time.as_deref(), Some("1/250 sec."));
        assert_eq!(exif.f_stop, Some(2.8));
        assert_eq!(exif.iso, Some(400));
        assert_eq!(exif.exposure_bias, Some(0.0));
        assert_eq!(exif.focal_length, Some(28.0));
        assert_eq!(exif.focal_length_35mm, None);
        assert_eq!(exif.metering_mode.as_deref(), Some("Multi-segment"));
        assert_eq!(exif.flash.as_deref(), Some("Off, Did not fire"));
    }

    #[test]
    fn offset_time_shifts_to_utc() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_jpeg_with_exif(
            &path,
            16,
            16,
            &[],
            &[
                (TAG_DATETIME_ORIGINAL, ExifValue::ascii("2024:01:01 08:00:00")),
                (TAG_OFFSET_TIME_ORIGINAL, ExifValue::ascii("+03:00")),
            ],
        );

        let meta = NativeEngine::new().read(&path).unwrap();
        assert_eq!(meta.taken_at.as_deref(), Some("2024-01-01T05:00:00.000Z"));
        // Only a timestamp: the exif record itself is empty
        assert_eq!(meta.exif, None);
    }

    #[test]
    fn max_aperture_from_apex() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        // APEX 1.53 ≈ f/1.7
        write_jpeg_with_exif(
            &path,
            16,
            16,
            &[],
            &[(TAG_MAX_APERTURE, ExifValue::Rational(153, 100))],
        );

        let exif = NativeEngine::new().read(&path).unwrap().exif.unwrap();
        assert_eq!(exif.max_aperture, Some(1.7));
    }

    fn write_xmp_jpeg(path: &Path, subjects: &[&str], description: &str) {
        let items: String = subjects.iter().map(|s| format!("<rdf:li>{s}</rdf:li>")).collect();
        let packet = format!(
            "http://ns.adobe.com/xap/1.0/\0<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
             <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
             <rdf:Description xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
             <dc:subject><rdf:Bag>{items}</rdf:Bag></dc:subject>\
             <dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">{description}</rdf:li></rdf:Alt></dc:description>\
             </rdf:Description></rdf:RDF></x:xmpmeta>"
        );
        let jpeg = insert_app1(&encode_jpeg(&gradient(16, 16)), packet.as_bytes());
        std::fs::write(path, jpeg).unwrap();
    }

    #[test]
    fn exif_image_description_is_a_fallback() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_jpeg_with_exif(
            &path,
            16,
            16,
            &[
                (TAG_IMAGE_DESCRIPTION, ExifValue::ascii("Lioness at dusk")),
                (TAG_MAKE, ExifValue::ascii("Canon")),
            ],
            &[],
        );

        let meta = NativeEngine::new().read(&path).unwrap();
        assert_eq!(meta.description.as_deref(), Some("Lioness at dusk"));
        assert_eq!(meta.exif.unwrap().camera_make.as_deref(), Some("Canon"));
    }

    #[test]
    fn xmp_only_file_reads_tags_and_description() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_xmp_jpeg(&path, &["elephant", "herd"], "Crossing the river");

        let meta = NativeEngine::new().read(&path).unwrap();
        assert_eq!(meta.tags, vec!["elephant", "herd"]);
        assert_eq!(meta.description.as_deref(), Some("Crossing the river"));
    }

    #[test]
    fn first_write_carries_xmp_values_into_iptc() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_xmp_jpeg(&path, &["elephant", "herd"], "Crossing the river");
        let engine = NativeEngine::new();

        engine
            .write(&path, &MetadataUpdate::tags(vec!["elephant".into()]))
            .unwrap();
        let meta = engine.read(&path).unwrap();
        assert_eq!(meta.tags, vec!["elephant"]);
        assert_eq!(meta.description.as_deref(), Some("Crossing the river"));

        // IPTC is authoritative from now on: removed tags stay removed
        engine.write(&path, &MetadataUpdate::tags(vec![])).unwrap();
        assert!(engine.read(&path).unwrap().tags.is_empty());
    }

    #[test]
    fn overlong_keyword_write_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 8, 8);
        let before = std::fs::read(&path).unwrap();

        let err = NativeEngine::new()
            .write(&path, &MetadataUpdate::tags(vec!["x".repeat(65)]))
            .unwrap_err();
        assert!(matches!(err, MetadataError::ValueTooLarge { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn write_then_read_tags_and_description() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_camera_jpeg(&path, 32, 24, "2024:03:15 14:30:00");
        let engine = NativeEngine::new();

        engine
            .write(
                &path,
                &MetadataUpdate {
                    tags: Some(vec!["safari".into(), "lion".into()]),
                    description: Some(Some("Dawn".into())),
                },
            )
            .unwrap();

        let meta = engine.read(&path).unwrap();
        assert_eq!(meta.tags, vec!["safari", "lion"]);
        assert_eq!(meta.description.as_deref(), Some("Dawn"));
        // EXIF block untouched
        assert_eq!(meta.exif.unwrap().iso, Some(400));
        // No temp file left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_only_supplied_fields() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 32, 32);
        let engine = NativeEngine::new();

        engine
            .write(
                &path,
                &MetadataUpdate {
                    tags: Some(vec!["a".into()]),
                    description: Some(Some("kept".into())),
                },
            )
            .unwrap();
        engine
            .write(&path, &MetadataUpdate::tags(vec!["b".into()]))
            .unwrap();

        let meta = engine.read(&path).unwrap();
        assert_eq!(meta.tags, vec!["b"]);
        assert_eq!(meta.description.as_deref(), Some("kept"));
    }

    #[test]
    fn metadata_write_keeps_stable_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 96, 64);
        let before = generate_stable_id(&path).unwrap();

        NativeEngine::new()
            .write(
                &path,
                &MetadataUpdate {
                    tags: Some(vec!["edited".into()]),
                    description: Some(Some("new caption".into())),
                },
            )
            .unwrap();

        assert_eq!(generate_stable_id(&path).unwrap(), before);
    }

    #[test]
    fn non_jpeg_write_is_unsupported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        write_png(&path, &gradient(8, 8), image::codecs::png::CompressionType::Default);

        let err = NativeEngine::new()
            .write(&path, &MetadataUpdate::tags(vec!["x".into()]))
            .unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedFormat(_)));
    }

    #[test]
    fn closed_engine_refuses_work() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 8, 8);
        let engine = NativeEngine::new();
        engine.close().unwrap();
        engine.close().unwrap();

        assert!(matches!(engine.read(&path), Err(MetadataError::EngineClosed)));
        assert!(matches!(
            engine.write(&path, &MetadataUpdate::tags(vec![])),
            Err(MetadataError::EngineClosed)
        ));
    }

    #[test]
    fn printed_names_match_exiftool() {
        assert_eq!(metering_mode_name(2), "Center-weighted average");
        assert_eq!(metering_mode_name(42), "Unknown (42)");
        assert_eq!(flash_name(0x19), "Auto, Fired");
        assert_eq!(flash_name(0x02), "Unknown (0x2)");
    }
}
