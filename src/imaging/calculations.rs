//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the output size for a derivative tier bounded by `long_edge`.
///
/// Landscape sources scale by width; portrait and square sources scale by
/// height. The opposite dimension is the rounded proportional value. Sources
/// already within the bound keep their size: derivatives are never upscaled.
///
/// # Examples
/// ```
/// # use photo_sync::imaging::fit_long_edge;
/// // 4000x3000 landscape into the 400px tier → 400x300
/// assert_eq!(fit_long_edge((4000, 3000), 400), (400, 300));
///
/// // 3000x4000 portrait into the 400px tier → 300x400
/// assert_eq!(fit_long_edge((3000, 4000), 400), (300, 400));
/// ```
pub fn fit_long_edge(original: (u32, u32), long_edge: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    if orig_w == 0 || orig_h == 0 || orig_w.max(orig_h) <= long_edge {
        return original;
    }

    if orig_w > orig_h {
        let h = (long_edge as f64 * orig_h as f64 / orig_w as f64).round() as u32;
        (long_edge, h.max(1))
    } else {
        let w = (long_edge as f64 * orig_w as f64 / orig_h as f64).round() as u32;
        (w.max(1), long_edge)
    }
}

/// Width divided by height, or 0 for a degenerate image.
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        0.0
    } else {
        width as f64 / height as f64
    }
}

/// Whether a 90° orientation transform swaps the stored width and height.
pub fn swaps_axes(orientation: image::metadata::Orientation) -> bool {
    use image::metadata::Orientation;
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}
