//! Tonal pass applied to derivatives before encoding.
//!
//! 1. **Shadow boost** (dark sources only): gamma lift `v^(2.2 / 3.0)`.
//! 2. **Levels**: the 1st and 99th luminance percentiles become black and white.
//! 3. **Sharpen**: unsharp mask, sigma 0.5.
//! 4. **Modulate**: saturation ×1.1 around Rec. 709 luminance; dark sources
//!    are also brightened ×1.2.
//!
//! A source is dark when its mean channel value is under 35% of full scale.

use image::RgbImage;

pub const UNDEREXPOSED_BELOW: f32 = 0.35;

const DISPLAY_GAMMA: f32 = 2.2;
const SHADOW_GAMMA: f32 = 3.0;
const SHADOW_BRIGHTNESS: f32 = 1.2;
const SATURATION: f32 = 1.1;
const LEVELS_CLIP: f32 = 0.01;
const SHARPEN_SIGMA: f32 = 0.5;
const REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Mean of every channel sample, 0.0 (black) to 1.0 (white).
pub fn mean_brightness(img: &RgbImage) -> f32 {
    let samples = img.as_raw();
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&v| u64::from(v)).sum();
    sum as f32 / samples.len() as f32 / 255.0
}

pub fn enhance(mut img: RgbImage) -> RgbImage {
    let brightness = mean_brightness(&img);
    let dark = brightness < UNDEREXPOSED_BELOW;
    if dark {
        tracing::debug!(brightness, "dark source, applying shadow boost");
        apply_lut(&mut img, &gamma_lut(DISPLAY_GAMMA / SHADOW_GAMMA));
    }
    if let Some(lut) = levels_lut(&img) {
        apply_lut(&mut img, &lut);
    }
    let mut img = image::imageops::unsharpen(&img, SHARPEN_SIGMA, 0);
    modulate(&mut img, SATURATION, if dark { SHADOW_BRIGHTNESS } else { 1.0 });
    img
}

fn apply_lut(img: &mut RgbImage, lut: &[u8; 256]) {
    for v in img.iter_mut() {
        *v = lut[usize::from(*v)];
    }
}

fn gamma_lut(exponent: f32) -> [u8; 256] {
    std::array::from_fn(|i| ((i as f32 / 255.0).powf(exponent) * 255.0).round() as u8)
}

fn luma(px: &[u8]) -> f32 {
    REC709[0] * f32::from(px[0]) + REC709[1] * f32::from(px[1]) + REC709[2] * f32::from(px[2])
}

/// Linear stretch from the clipped luminance range to 0..=255.
///
/// `None` for flat images, where there is no range to stretch.
fn levels_lut(img: &RgbImage) -> Option<[u8; 256]> {
    let mut histogram = [0u64; 256];
    for px in img.pixels() {
        histogram[luma(&px.0).round().min(255.0) as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let clip = (total as f32 * LEVELS_CLIP) as u64;

    let mut seen = 0;
    let low = histogram.iter().position(|&n| {
        seen += n;
        seen > clip
    })?;
    seen = 0;
    let high = 255 - histogram.iter().rev().position(|&n| {
        seen += n;
        seen > clip
    })?;
    if high <= low {
        return None;
    }

    let span = (high - low) as f32;
    Some(std::array::from_fn(|i| {
        ((i as f32 - low as f32) * 255.0 / span).round().clamp(0.0, 255.0) as u8
    }))
}

fn modulate(img: &mut RgbImage, saturation: f32, brightness: f32) {
    for px in img.pixels_mut() {
        let l = luma(&px.0);
        for c in px.0.iter_mut() {
            let v = (l + (f32::from(*c) - l) * saturation) * brightness;
            *c = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn ramp(width: u32, height: u32, low: u8, high: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let t = x as f32 / (width - 1) as f32;
            let v = (f32::from(low) + t * f32::from(high - low)).round() as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn dark_source_comes_out_brighter() {
        let dark = ramp(64, 16, 5, 70);
        let before = mean_brightness(&dark);
        assert!(before < UNDEREXPOSED_BELOW);

        let after = mean_brightness(&enhance(dark));
        assert!(after > before + 0.2, "{before} -> {after}");
    }

    #[test]
    fn flat_dark_image_gets_shadow_boost_only() {
        let flat = RgbImage::from_pixel(8, 8, Rgb([20, 20, 20]));
        let out = enhance(flat);
        // 20/255 lifted by gamma 2.2/3.0 is about 40, then ×1.2
        let v = out.get_pixel(4, 4)[0];
        assert!((45..=50).contains(&v), "{v}");
    }

    #[test]
    fn bright_image_skips_shadow_boost() {
        let bright = RgbImage::from_pixel(8, 8, Rgb([180, 180, 180]));
        let out = enhance(bright);
        // Grey has no saturation to lift and no range to stretch
        assert_eq!(out.get_pixel(4, 4).0, [180, 180, 180]);
    }

    #[test]
    fn levels_stretch_full_range() {
        let lut = levels_lut(&ramp(256, 4, 60, 190)).unwrap();
        assert_eq!(lut[60], 0);
        assert_eq!(lut[190], 255);
        assert!(lut[125] > 120 && lut[125] < 135);
        assert!(levels_lut(&RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))).is_none());
    }

    #[test]
    fn saturation_moves_away_from_grey() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([200, 100, 100]));
        modulate(&mut img, SATURATION, 1.0);
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert!(r > 200 && g < 100 && b < 100, "{r} {g} {b}");
    }
}
