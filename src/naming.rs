//! Stored filename generation.
//!
//! Every accepted upload is renamed to `{uuid-v4}.{ext}`:
//!
//! ```text
//! 8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg
//! ```
//!
//! The 128-bit random identifier makes collisions negligible without a
//! uniqueness check against the store, and the first character of the UUID
//! drives directory sharding (see [`crate::storage`]).
//!
//! ## Extension detection
//!
//! The extension comes from the file's magic bytes, not from the client's
//! filename. Formats the `image` crate cannot decode in this build are
//! rejected up front: accepting them would only move the failure to the
//! resize stage. There is no fallback extension.

use image::ImageFormat;
use thiserror::Error;
use uuid::Uuid;

/// Bytes of header needed for format sniffing.
pub const SNIFF_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Could not infer an image format from the upload header")]
    UnknownFormat,
    #[error("Image format {0:?} is not supported by this build")]
    UnsupportedFormat(ImageFormat),
    #[error("Invalid extension: {0:?}")]
    InvalidExtension(String),
}

/// Detect the canonical extension for an upload from its first bytes.
///
/// Returns the first extension the `image` crate lists for the sniffed
/// format (`"jpg"` for JPEG, `"png"` for PNG, ...).
pub fn detect_extension(header: &[u8]) -> Result<&'static str, NamingError> {
    let format = image::guess_format(header).map_err(|_| NamingError::UnknownFormat)?;
    if !format.reading_enabled() {
        return Err(NamingError::UnsupportedFormat(format));
    }
    format
        .extensions_str()
        .first()
        .copied()
        .ok_or(NamingError::UnsupportedFormat(format))
}

/// Generate a fresh `{uuid}.{extension}` filename.
///
/// The extension is lowercased and may be passed with or without its leading
/// dot. Empty extensions and anything containing a path separator or another
/// dot are refused.
pub fn generate_filename(extension: &str) -> Result<String, NamingError> {
    let ext = extension.strip_prefix('.').unwrap_or(extension);
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(NamingError::InvalidExtension(extension.to_string()));
    }
    Ok(format!(
        "{}.{}",
        Uuid::new_v4().hyphenated(),
        ext.to_ascii_lowercase()
    ))
}
