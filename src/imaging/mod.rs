//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image` decoder header + EXIF orientation |
//! | **Render** | Lanczos3 resize, optional [`enhance`] pass, then AVIF (rav1e) + WebP (libwebp) + progressive JPEG |
//! | **Thumbnail** | `resize_to_fill` → in-memory JPEG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Enhance**: Tonal pass (shadow boost, levels, sharpen, saturation)
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod enhance;
mod params;
pub mod rust_backend;

pub use backend::{Dimensions, EncodedFile, ImageBackend, ImagingError, RenderOutput};
pub use calculations::{aspect_ratio, fit_long_edge, swaps_axes};
pub use params::{EncodeTarget, OutputFormat, Quality, RenderParams, ThumbnailParams};
pub use rust_backend::{RustBackend, load_oriented};
