//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline needs:
//! identify, resize (with auto-orientation) and composite.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Backends hold no per-file state: every call opens the file it is
//! given, so one backend value can serve many threads.

use super::params::{CompositeParams, ResizeParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Get image dimensions *as displayed*, i.e. after EXIF orientation.
    ///
    /// A 4000x3000 sensor image tagged "rotate 90" reports 3000x4000.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Apply EXIF orientation unconditionally, resize if requested, save.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;

    /// Paste an overlay onto a base image and save.
    fn composite(&self, params: &CompositeParams) -> Result<(), BackendError>;
}
