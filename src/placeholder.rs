//! BlurHash placeholder tokens.
//!
//! The front end paints a blurred box from this token while the real image
//! loads. Sources are downsampled to fit inside 32×32 (aspect kept) before
//! encoding with the `blurhash` crate; a 4×3 component grid yields a
//! 28-character token.

use crate::imaging::{ImagingError, load_oriented};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::path::Path;

pub const COMPONENTS_X: u32 = 4;
pub const COMPONENTS_Y: u32 = 3;
const SAMPLE_EDGE: u32 = 32;

/// Encode the placeholder for the image at `path`.
pub fn generate_placeholder(path: &Path) -> Result<String, ImagingError> {
    let img = load_oriented(path)?;
    encode(&sample(&img)).map_err(|e| {
        ImagingError::ProcessingFailed(format!("blurhash for {}: {e}", path.display()))
    })
}

/// Fit-inside downsample; never upscales.
fn sample(img: &DynamicImage) -> RgbaImage {
    if img.width() <= SAMPLE_EDGE && img.height() <= SAMPLE_EDGE {
        img.to_rgba8()
    } else {
        img.resize(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Triangle).to_rgba8()
    }
}

fn encode(pixels: &RgbaImage) -> Result<String, blurhash::Error> {
    blurhash::encode(
        COMPONENTS_X,
        COMPONENTS_Y,
        pixels.width(),
        pixels.height(),
        pixels.as_raw(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{write_gradient_jpeg, write_jpeg_with_orientation};
    use image::Rgba;

    #[test]
    fn black_image_has_flat_ac() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        // size flag 21 → 'L', zero AC magnitude → '0', black DC → "0000"
        assert_eq!(encode(&img).unwrap(), "L00000fQfQfQfQfQfQfQfQfQfQfQ");
    }

    #[test]
    fn solid_color_decodes_back_to_itself() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 40, 10, 255]));
        let hash = encode(&img).unwrap();
        let decoded = blurhash::decode(&hash, 4, 4, 1.0).unwrap();
        for px in decoded.chunks_exact(4) {
            for (got, want) in px[..3].iter().zip([200u8, 40, 10]) {
                assert!(got.abs_diff(want) <= 2, "{px:?}");
            }
        }
    }

    #[test]
    fn sample_fits_inside_and_keeps_aspect() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::new(300, 200));
        assert_eq!(sample(&wide).dimensions(), (32, 21));

        let small = DynamicImage::ImageRgba8(RgbaImage::new(20, 10));
        assert_eq!(sample(&small).dimensions(), (20, 10));
    }

    #[test]
    fn placeholder_from_file_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_gradient_jpeg(&path, 300, 200);

        let a = generate_placeholder(&path).unwrap();
        let b = generate_placeholder(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 28);
    }

    #[test]
    fn rotated_source_still_encodes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("r.jpg");
        write_jpeg_with_orientation(&path, 120, 40, 8);
        assert_eq!(generate_placeholder(&path).unwrap().len(), 28);
    }

    #[test]
    fn missing_file_errors() {
        assert!(generate_placeholder(Path::new("/nonexistent.jpg")).is_err());
    }
}
