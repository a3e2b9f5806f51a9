//! Image resizing for the cached image variants.
//!
//! The cache decides *which* images need work; this module only does the
//! pixel work, behind the [`ImageBackend`] trait so tests can swap in a
//! recording mock.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG) |
//! | **Bound** | `DynamicImage::thumbnail`, only when over the bounds |
//! | **Encode** | PNG via `DynamicImage::save_with_format` |

pub mod backend;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, ResizeParams};
pub use rust_backend::RustBackend;
