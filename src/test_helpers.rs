//! Shared test utilities for the coaster-media test suite.
//!
//! Provides synthetic image fixtures and small shell-script stand-ins for
//! external tools.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("upright.jpg");
//! jpeg_with_orientation(&path, 300, 200, 6); // displays as 200x300
//! ```

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient so resampling and re-encoding have something to chew on.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Write a JPEG of the given size.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

/// Write a half-transparent PNG of the given size.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 128]))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

/// Write a JPEG whose EXIF block carries the given orientation tag (1-8).
///
/// The encoder never writes EXIF, so a minimal APP1 segment is spliced in
/// right after the SOI marker: a little-endian TIFF header with one IFD
/// entry (tag 0x0112, SHORT, count 1).
pub fn jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    let mut encoded = Vec::new();
    gradient(width, height)
        .write_to(&mut std::io::Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .unwrap();
    assert_eq!(&encoded[..2], &[0xFF, 0xD8], "encoder output must start with SOI");

    let [lo, hi] = orientation.to_le_bytes();
    let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
    app1.extend_from_slice(&[0x01, 0x00]);
    app1.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, lo, hi, 0x00, 0x00]);
    app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    assert_eq!(app1.len(), 2 + 0x22);

    let mut out = encoded[..2].to_vec();
    out.extend_from_slice(&app1);
    out.extend_from_slice(&encoded[2..]);
    fs::write(path, out).unwrap();
}

// =========================================================================
// External tool stand-ins
// =========================================================================

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
