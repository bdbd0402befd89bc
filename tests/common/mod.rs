//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use image::{ImageEncoder, RgbImage};
use photo_sync::config::{Config, load_config};
use photo_sync::metadata::MetadataStore;
use photo_sync::metadata::native::NativeEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A project directory with the default layout and the native engine.
pub struct Project {
    pub dir: TempDir,
    pub config: Config,
    pub store: MetadataStore,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path(), None).unwrap();
        std::fs::create_dir_all(&config.paths.source_dir).unwrap();
        Self {
            dir,
            config,
            store: MetadataStore::new(Arc::new(NativeEngine::new())),
        }
    }

    pub fn source(&self, name: &str) -> PathBuf {
        self.config.paths.source_dir.join(name)
    }

    /// Add a source JPEG whose pixels depend on `seed`.
    pub fn add_photo(&self, name: &str, seed: u8) -> PathBuf {
        let path = self.source(name);
        write_jpeg(&path, 48, 32, seed);
        path
    }

    pub fn public_file(&self, url: &str) -> PathBuf {
        self.config.paths.public_root.join(url)
    }
}

/// Write a small gradient JPEG. Different seeds give different pixels.
pub fn write_jpeg(path: &Path, width: u32, height: u32, seed: u8) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x as u8).wrapping_mul(5).wrapping_add(seed),
            (y as u8).wrapping_mul(7),
            seed.wrapping_mul(31),
        ])
    });
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}
