//! Pure Rust backend on the `image` crate.

use super::backend::{BackendError, ImageBackend, ResizeParams};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate.
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

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Scale `img` down to fit the bounds, preserving aspect ratio.
/// Images already inside the bounds are returned untouched.
fn bound(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if img.width() <= max_width && img.height() <= max_height {
        img
    } else {
        img.thumbnail(max_width, max_height)
    }
}

impl ImageBackend for RustBackend {
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let bounded = bound(img, params.max_width, params.max_height);
        if let Some(parent) = params.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        bounded
            .save_with_format(&params.output, ImageFormat::Png)
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to write {}: {}",
                    params.output.display(),
                    e
                ))
            })
    }
}
