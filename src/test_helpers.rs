//! Shared test utilities for the photo-sync test suite.
//!
//! Everything here builds synthetic images on disk so tests never depend on
//! checked-in binary fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("a.jpg");
//! write_jpeg_with_exif(&path, 64, 48, &[(TAG_MAKE, ExifValue::ascii("Leica"))], &[]);
//! ```

use image::{ImageEncoder, RgbImage};
use std::path::Path;

// =========================================================================
// Pixel sources
// =========================================================================

/// Deterministic gradient so different sizes produce different pixels.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn encode_jpeg(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    buf
}

/// Write a baseline JPEG with a gradient body and no metadata.
pub fn write_gradient_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, encode_jpeg(&gradient(width, height))).unwrap();
}

/// Write a single-color JPEG.
pub fn write_solid_jpeg(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    let img = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    std::fs::write(path, encode_jpeg(&img)).unwrap();
}

/// Write a PNG with an explicit compression level.
pub fn write_png(path: &Path, img: &RgbImage, compression: image::codecs::png::CompressionType) {
    let file = std::fs::File::create(path).unwrap();
    image::codecs::png::PngEncoder::new_with_quality(
        std::io::BufWriter::new(file),
        compression,
        image::codecs::png::FilterType::Adaptive,
    )
    .write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )
    .unwrap();
}

// =========================================================================
// EXIF fixtures: a tiny big-endian TIFF writer
// =========================================================================

pub const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub const TAG_MAKE: u16 = 0x010F;
pub const TAG_MODEL: u16 = 0x0110;
pub const TAG_ORIENTATION: u16 = 0x0112;
pub const TAG_EXPOSURE_TIME: u16 = 0x829A;
pub const TAG_FNUMBER: u16 = 0x829D;
pub const TAG_ISO: u16 = 0x8827;
pub const TAG_DATETIME_ORIGINAL: u16 = 0x9003;
pub const TAG_OFFSET_TIME_ORIGINAL: u16 = 0x9011;
pub const TAG_EXPOSURE_BIAS: u16 = 0x9204;
pub const TAG_MAX_APERTURE: u16 = 0x9205;
pub const TAG_METERING_MODE: u16 = 0x9207;
pub const TAG_FLASH: u16 = 0x9209;
pub const TAG_FOCAL_LENGTH: u16 = 0x920A;
pub const TAG_FOCAL_LENGTH_35MM: u16 = 0xA405;

const TAG_EXIF_IFD_POINTER: u16 = 0x8769;

#[derive(Debug, Clone)]
pub enum ExifValue {
    Ascii(String),
    Short(u16),
    Long(u32),
    Rational(u32, u32),
    SRational(i32, i32),
}

impl ExifValue {
    pub fn ascii(s: &str) -> Self {
        ExifValue::Ascii(s.to_string())
    }

    /// (type code, count, big-endian payload)
    fn encode(&self) -> (u16, u32, Vec<u8>) {
        match self {
            ExifValue::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                (2, bytes.len() as u32, bytes)
            }
            ExifValue::Short(v) => (3, 1, v.to_be_bytes().to_vec()),
            ExifValue::Long(v) => (4, 1, v.to_be_bytes().to_vec()),
            ExifValue::Rational(n, d) => {
                let mut bytes = n.to_be_bytes().to_vec();
                bytes.extend_from_slice(&d.to_be_bytes());
                (5, 1, bytes)
            }
            ExifValue::SRational(n, d) => {
                let mut bytes = n.to_be_bytes().to_vec();
                bytes.extend_from_slice(&d.to_be_bytes());
                (10, 1, bytes)
            }
        }
    }
}

/// Encode one IFD whose first byte sits at `start` (offset from TIFF header).
/// Out-of-line values follow the IFD directly.
fn encode_ifd(entries: &[(u16, ExifValue)], start: u32) -> Vec<u8> {
    let ifd_len = 2 + entries.len() * 12 + 4;
    let data_start = start + ifd_len as u32;
    let mut ifd = Vec::new();
    let mut data = Vec::new();

    ifd.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for (tag, value) in entries {
        let (typ, count, payload) = value.encode();
        ifd.extend_from_slice(&tag.to_be_bytes());
        ifd.extend_from_slice(&typ.to_be_bytes());
        ifd.extend_from_slice(&count.to_be_bytes());
        if payload.len() <= 4 {
            let mut inline = payload;
            inline.resize(4, 0);
            ifd.extend_from_slice(&inline);
        } else {
            ifd.extend_from_slice(&(data_start + data.len() as u32).to_be_bytes());
            data.extend_from_slice(&payload);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    ifd.extend_from_slice(&0u32.to_be_bytes());
    ifd.extend_from_slice(&data);
    ifd
}

/// Build a TIFF blob with IFD0 entries and an optional Exif sub-IFD.
pub fn build_tiff(ifd0: &[(u16, ExifValue)], exif: &[(u16, ExifValue)]) -> Vec<u8> {
    let mut ifd0 = ifd0.to_vec();
    if !exif.is_empty() {
        ifd0.push((TAG_EXIF_IFD_POINTER, ExifValue::Long(0)));
    }
    ifd0.sort_by_key(|(tag, _)| *tag);

    let ifd0_len = encode_ifd(&ifd0, 8).len() as u32;
    if !exif.is_empty() {
        for entry in ifd0.iter_mut() {
            if entry.0 == TAG_EXIF_IFD_POINTER {
                entry.1 = ExifValue::Long(8 + ifd0_len);
            }
        }
    }

    let mut tiff = b"MM\0\x2A".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&encode_ifd(&ifd0, 8));
    if !exif.is_empty() {
        let mut exif = exif.to_vec();
        exif.sort_by_key(|(tag, _)| *tag);
        tiff.extend_from_slice(&encode_ifd(&exif, 8 + ifd0_len));
    }
    tiff
}

/// Splice an APP1 Exif segment in directly after SOI.
pub fn insert_exif(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(tiff);
    insert_app1(jpeg, &payload)
}

/// Insert an APP1 segment with `payload` right after SOI.
pub fn insert_app1(jpeg: &[u8], payload: &[u8]) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let seg_len = u16::try_from(2 + payload.len()).unwrap();
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Gradient JPEG carrying the given EXIF entries.
pub fn write_jpeg_with_exif(
    path: &Path,
    width: u32,
    height: u32,
    ifd0: &[(u16, ExifValue)],
    exif: &[(u16, ExifValue)],
) {
    let jpeg = encode_jpeg(&gradient(width, height));
    std::fs::write(path, insert_exif(&jpeg, &build_tiff(ifd0, exif))).unwrap();
}

/// Gradient JPEG stored at `width`×`height` with an EXIF orientation tag.
pub fn write_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    write_jpeg_with_exif(
        path,
        width,
        height,
        &[(TAG_ORIENTATION, ExifValue::Short(orientation))],
        &[],
    );
}

/// A camera-like EXIF block: Leica Q3, 1/250 s, f/2.8, ISO 400, 28 mm.
pub fn write_camera_jpeg(path: &Path, width: u32, height: u32, taken: &str) {
    write_jpeg_with_exif(
        path,
        width,
        height,
        &[
            (TAG_MAKE, ExifValue::ascii("Leica Camera AG")),
            (TAG_MODEL, ExifValue::ascii("LEICA Q3")),
        ],
        &[
            (TAG_EXPOSURE_TIME, ExifValue::Rational(1, 250)),
            (TAG_FNUMBER, ExifValue::Rational(28, 10)),
            (TAG_ISO, ExifValue::Short(400)),
            (TAG_DATETIME_ORIGINAL, ExifValue::ascii(taken)),
            (TAG_EXPOSURE_BIAS, ExifValue::SRational(0, 1)),
            (TAG_METERING_MODE, ExifValue::Short(5)),
            (TAG_FLASH, ExifValue::Short(16)),
            (TAG_FOCAL_LENGTH, ExifValue::Rational(28, 1)),
        ],
    );
}
