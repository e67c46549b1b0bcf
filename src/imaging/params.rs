//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between [`operations`](super::operations), which decides what
//! happens to a stored file, and the [`backend`](super::backend), which does
//! the pixel work. Keeping them plain data lets tests assert on the exact
//! requests a mock backend received.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG re-encode quality (1–100, default 90). Clamped on construction.
//! - [`ResizeParams`]: auto-orient, optionally resize to exact dimensions, save.
//! - [`CompositeParams`]: paste an overlay onto a base image at an offset, save.

use super::backend::Dimensions;
use std::path::PathBuf;

/// Quality setting for lossy re-encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Normalize an image: apply EXIF orientation, then optionally resize.
///
/// `resize_to` is expressed in post-rotation dimensions. `None` means the
/// image is only re-oriented and re-saved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub resize_to: Option<Dimensions>,
    pub quality: Quality,
}

/// Composite `overlay` onto `base` with its top-left corner at `(x, y)`.
///
/// Offsets may be negative or run past the edges; the overlay is clipped to
/// the base image.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeParams {
    pub base: PathBuf,
    pub overlay: PathBuf,
    pub output: PathBuf,
    pub x: i64,
    pub y: i64,
    pub quality: Quality,
}
