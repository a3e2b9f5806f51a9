//! Image backend trait and shared types.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use
//! [`tests::MockBackend`], which records every call and writes a placeholder
//! output so later cache checks see the file.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Bound `source` to `max_width` x `max_height` and write it to `output` as PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub max_width: u32,
    pub max_height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so a single backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Downsize only if the source exceeds the bounds; always write the
    /// output, creating parent directories as needed.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock backend that records operations instead of decoding images.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Resize {
            source: String,
            output: String,
            max_width: u32,
            max_height: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        /// Number of resize calls so far.
        pub fn resize_count(&self) -> usize {
            self.operations.lock().unwrap().len()
        }
    }

    impl ImageBackend for MockBackend {
        fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
            if !params.source.exists() {
                return Err(BackendError::ProcessingFailed(format!(
                    "missing source {}",
                    params.source.display()
                )));
            }
            if let Some(parent) = params.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&params.output, b"mock png")?;
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                max_width: params.max_width,
                max_height: params.max_height,
            });
            Ok(())
        }
    }

    #[test]
    fn mock_records_resize_and_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        std::fs::write(&source, b"jpeg").unwrap();
        let output = tmp.path().join("cache/deep/a_10_10.png");

        let backend = MockBackend::new();
        backend
            .resize(&ResizeParams {
                source,
                output: output.clone(),
                max_width: 10,
                max_height: 10,
            })
            .unwrap();

        assert!(output.exists());
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Resize {
                max_width: 10,
                max_height: 10,
                ..
            }
        ));
    }

    #[test]
    fn mock_fails_on_missing_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let result = backend.resize(&ResizeParams {
            source: tmp.path().join("gone.jpg"),
            output: tmp.path().join("out.png"),
            max_width: 1,
            max_height: 1,
        });
        assert!(result.is_err());
        assert_eq!(backend.resize_count(), 0);
    }
}
