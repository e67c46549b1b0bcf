//! High-level image operations on stored files.
//!
//! These functions combine calculations with backend execution. They take a
//! stored filename, resolve it through [`Storage`], compute parameters and
//! call the backend. Every operation rewrites the stored file in place.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{
    MAX_SIZE, WATERMARK_MARGIN, calculate_bounded_dimensions, calculate_watermark_position,
};
use super::params::{CompositeParams, Quality, ResizeParams};
use crate::storage::Storage;
use crate::types::WatermarkKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions (as displayed) using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Settings shared by the transform operations.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Bound on the longer edge.
    pub max_size: u32,
    pub quality: Quality,
    /// The "cc" overlay asset.
    pub watermark_path: PathBuf,
    pub watermark_margin: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_SIZE,
            quality: Quality::default(),
            watermark_path: PathBuf::from("assets/watermark.png"),
            watermark_margin: WATERMARK_MARGIN,
        }
    }
}

/// What [`resize_image`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Orientation applied and the image scaled down.
    Resized { from: Dimensions, to: Dimensions },
    /// Orientation applied; the image already fit.
    Oriented(Dimensions),
}

impl ResizeOutcome {
    /// Dimensions of the stored file after the operation.
    pub fn dimensions(self) -> Dimensions {
        match self {
            Self::Resized { to, .. } => to,
            Self::Oriented(d) => d,
        }
    }
}

/// Plan the resize of a file with known (oriented) dimensions.
///
/// Useful for testing parameter generation.
pub fn plan_resize(path: &Path, oriented: Dimensions, config: &TransformConfig) -> ResizeParams {
    ResizeParams {
        source: path.to_path_buf(),
        output: path.to_path_buf(),
        resize_to: calculate_bounded_dimensions(oriented.as_tuple(), config.max_size)
            .map(Dimensions::from),
        quality: config.quality,
    }
}

/// Normalize a stored image in place.
///
/// Auto-rotation is always applied. The image is scaled down only when a side
/// exceeds `max_size`.
pub fn resize_image(
    backend: &impl ImageBackend,
    storage: &Storage,
    filename: &str,
    config: &TransformConfig,
) -> Result<ResizeOutcome> {
    let path = storage.file_path(filename);
    let oriented = backend.identify(&path)?;
    let params = plan_resize(&path, oriented, config);
    backend.resize(&params)?;

    Ok(match params.resize_to {
        Some(to) => ResizeOutcome::Resized { from: oriented, to },
        None => ResizeOutcome::Oriented(oriented),
    })
}

/// What [`watermark_image`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkOutcome {
    /// The image's kind carries no watermark; nothing was touched.
    Skipped,
    Applied {
        /// False when a backup from an earlier application was kept.
        backup_taken: bool,
        x: i64,
        y: i64,
    },
}

/// Composite the branded watermark onto a stored image, in place.
///
/// Before the first application the stored file is copied verbatim to its
/// backup path. An existing backup is never overwritten, so it always holds
/// the pre-watermark image even if this runs again.
pub fn watermark_image(
    backend: &impl ImageBackend,
    storage: &Storage,
    filename: &str,
    kind: WatermarkKind,
    config: &TransformConfig,
) -> Result<WatermarkOutcome> {
    if kind != WatermarkKind::Cc {
        return Ok(WatermarkOutcome::Skipped);
    }

    let path = storage.file_path(filename);
    let mark = backend.identify(&config.watermark_path)?;

    let backup = storage.backup_path(filename);
    let backup_taken = !backup.exists();
    if backup_taken {
        fs::create_dir_all(storage.resolve_backup(filename, false))?;
        fs::copy(&path, &backup)?;
    }

    // Fresh read: the resize stage may have changed the host size.
    let host = backend.identify(&path)?;
    let (x, y) = calculate_watermark_position(
        host.as_tuple(),
        mark.as_tuple(),
        config.watermark_margin,
    );

    backend.composite(&CompositeParams {
        base: path.clone(),
        overlay: config.watermark_path.clone(),
        output: path,
        x,
        y,
        quality: config.quality,
    })?;

    Ok(WatermarkOutcome::Applied { backup_taken, x, y })
}
