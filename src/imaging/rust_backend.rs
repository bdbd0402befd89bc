//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) + EXIF orientation | `image` crate decoders, `apply_orientation` |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Enhance | [`super::enhance`]: LUTs + `image::imageops::unsharpen` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → WebP (lossy) | `webp` crate (libwebp) |
//! | Encode → progressive JPEG | `jpeg-encoder` |
//! | Thumbnail crop | `image::DynamicImage::resize_to_fill` |

use super::backend::{Dimensions, EncodedFile, ImageBackend, ImagingError, RenderOutput};
use super::calculations::swaps_axes;
use super::enhance::enhance;
use super::params::{EncodeTarget, OutputFormat, Quality, RenderParams, ThumbnailParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use rayon::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an image and apply its EXIF orientation.
///
/// Every pixel consumer (identity hashing, placeholders, derivatives,
/// thumbnails) goes through here so they all see the upright image.
pub fn load_oriented(path: &Path) -> Result<DynamicImage, ImagingError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| ImagingError::decode(path, e))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| ImagingError::decode(path, e))?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| ImagingError::decode(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode_avif(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 6, quality.as_u8());
    img.write_with_encoder(encoder).map_err(|e| e.to_string())?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, String> {
    let rgb = img.to_rgb8();
    let memory =
        webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height()).encode(quality.value() as f32);
    Ok(memory.to_vec())
}

fn encode_progressive_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, String> {
    let rgb = img.to_rgb8();
    let width = u16::try_from(rgb.width()).map_err(|_| "width exceeds JPEG limit".to_string())?;
    let height = u16::try_from(rgb.height()).map_err(|_| "height exceeds JPEG limit".to_string())?;

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality.as_u8());
    encoder.set_progressive(true);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

/// Read the pixel size back out of an encoded buffer.
fn measure(bytes: &[u8]) -> Result<Dimensions, ImagingError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| ImagingError::ProcessingFailed(format!("cannot measure output: {e}")))?;
    Ok(Dimensions { width, height })
}

/// Encode one target and write it to disk.
fn write_target(
    img: &DynamicImage,
    target: &EncodeTarget,
) -> Result<(EncodedFile, Option<Dimensions>), ImagingError> {
    let encoded = match target.format {
        OutputFormat::Avif => encode_avif(img, target.quality),
        OutputFormat::Webp => encode_webp(img, target.quality),
        OutputFormat::Jpeg => encode_progressive_jpeg(img, target.quality),
    }
    .map_err(|message| ImagingError::Encode {
        format: target.format,
        path: target.output.clone(),
        message,
    })?;

    let measured = match target.format {
        OutputFormat::Jpeg => Some(measure(&encoded)?),
        _ => None,
    };
    std::fs::write(&target.output, &encoded)?;

    Ok((
        EncodedFile {
            format: target.format,
            bytes: encoded.len() as u64,
        },
        measured,
    ))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, ImagingError> {
        let mut decoder = ImageReader::open(path)?
            .with_guessed_format()?
            .into_decoder()
            .map_err(|e| ImagingError::decode(path, e))?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder
            .orientation()
            .map_err(|e| ImagingError::decode(path, e))?;
        Ok(if swaps_axes(orientation) {
            Dimensions {
                width: height,
                height: width,
            }
        } else {
            Dimensions { width, height }
        })
    }

    fn render(&self, params: &RenderParams) -> Result<RenderOutput, ImagingError> {
        let img = load_oriented(&params.source)?;
        let resized = if img.width() == params.width && img.height() == params.height {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        // Derivatives never carry alpha
        let rgb = resized.to_rgb8();
        let resized = DynamicImage::ImageRgb8(if params.enhance { enhance(rgb) } else { rgb });

        let results = params
            .targets
            .par_iter()
            .map(|target| write_target(&resized, target))
            .collect::<Result<Vec<_>, _>>()?;

        let measured = results.iter().find_map(|(_, dims)| *dims).unwrap_or(Dimensions {
            width: resized.width(),
            height: resized.height(),
        });

        Ok(RenderOutput {
            width: measured.width,
            height: measured.height,
            files: results.into_iter().map(|(file, _)| file).collect(),
        })
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<Vec<u8>, ImagingError> {
        let img = load_oriented(&params.source)?;
        let filled = img.resize_to_fill(params.size, params.size, FilterType::Lanczos3);
        let rgb = DynamicImage::ImageRgb8(filled.to_rgb8());

        let mut buf = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, params.quality.as_u8());
        rgb.write_with_encoder(encoder)
            .map_err(|e| ImagingError::Encode {
                format: OutputFormat::Jpeg,
                path: params.source.clone(),
                message: e.to_string(),
            })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::enhance::mean_brightness;
    use crate::test_helpers::{encode_jpeg, write_gradient_jpeg, write_jpeg_with_orientation};
    use image::{Rgb, RgbImage};

    fn targets_in(dir: &Path, stem: &str) -> Vec<EncodeTarget> {
        OutputFormat::ALL
            .iter()
            .map(|&format| EncodeTarget {
                format,
                quality: Quality::new(70),
                output: dir.join(format!("{stem}.{}", format.extension())),
            })
            .collect()
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        write_gradient_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_swaps_axes_for_rotated_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        // Stored landscape, tagged "rotate 90 CW"
        write_jpeg_with_orientation(&path, 120, 80, 6);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 80, height: 120 });
    }

    #[test]
    fn load_oriented_applies_rotation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        write_jpeg_with_orientation(&path, 120, 80, 6);

        let img = load_oriented(&path).unwrap();
        assert_eq!((img.width(), img.height()), (80, 120));
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(ImagingError::Io(_))));
    }

    #[test]
    fn identify_garbage_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(RustBackend::new().identify(&path).is_err());
    }

    #[test]
    fn render_writes_all_three_formats() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        write_gradient_jpeg(&source, 400, 300);

        let out = RustBackend::new()
            .render(&RenderParams {
                source,
                width: 200,
                height: 150,
                enhance: true,
                targets: targets_in(tmp.path(), "out"),
            })
            .unwrap();

        assert_eq!((out.width, out.height), (200, 150));
        assert_eq!(out.files.len(), 3);
        for ext in ["avif", "webp", "jpg"] {
            let path = tmp.path().join(format!("out.{ext}"));
            let on_disk = std::fs::metadata(&path).unwrap().len();
            assert!(on_disk > 0, "{ext} should not be empty");
        }
        let jpeg = out
            .files
            .iter()
            .find(|f| f.format == OutputFormat::Jpeg)
            .unwrap();
        assert_eq!(
            jpeg.bytes,
            std::fs::metadata(tmp.path().join("out.jpg")).unwrap().len()
        );
    }

    #[test]
    fn render_jpeg_is_progressive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        write_gradient_jpeg(&source, 64, 64);

        RustBackend::new()
            .render(&RenderParams {
                source,
                width: 64,
                height: 64,
                enhance: false,
                targets: vec![EncodeTarget {
                    format: OutputFormat::Jpeg,
                    quality: Quality::new(85),
                    output: tmp.path().join("p.jpg"),
                }],
            })
            .unwrap();

        let bytes = std::fs::read(tmp.path().join("p.jpg")).unwrap();
        // SOF2 marker = progressive DCT
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0xC2]));
    }

    #[test]
    fn thumbnail_is_square_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        write_gradient_jpeg(&source, 800, 600);

        let bytes = RustBackend::new()
            .thumbnail(&ThumbnailParams {
                source,
                size: 300,
                quality: Quality::new(70),
            })
            .unwrap();

        let dims = measure(&bytes).unwrap();
        assert_eq!(dims, Dimensions { width: 300, height: 300 });
    }

    #[test]
    fn thumbnail_missing_source_errors() {
        let result = RustBackend::new().thumbnail(&ThumbnailParams {
            source: "/nonexistent.jpg".into(),
            size: 300,
            quality: Quality::new(70),
        });
        assert!(result.is_err());
    }

    #[test]
    fn enhance_brightens_dark_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("dark.jpg");
        let dark = RgbImage::from_fn(64, 48, |x, y| {
            let v = (10 + (x + y) / 2) as u8;
            Rgb([v, v / 2 + 5, v])
        });
        std::fs::write(&source, encode_jpeg(&dark)).unwrap();

        let render = |enhance: bool, stem: &str| {
            let output = tmp.path().join(format!("{stem}.jpg"));
            RustBackend::new()
                .render(&RenderParams {
                    source: source.clone(),
                    width: 64,
                    height: 48,
                    enhance,
                    targets: vec![EncodeTarget {
                        format: OutputFormat::Jpeg,
                        quality: Quality::new(90),
                        output: output.clone(),
                    }],
                })
                .unwrap();
            image::open(output).unwrap().to_rgb8()
        };

        let plain = mean_brightness(&render(false, "plain"));
        let enhanced = mean_brightness(&render(true, "enhanced"));
        assert!(plain < 0.35);
        assert!(enhanced > plain + 0.15, "{plain} -> {enhanced}");
    }
}
