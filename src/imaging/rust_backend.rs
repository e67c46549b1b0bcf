//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` + format sniffing |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Composite | `image::imageops::overlay` (alpha-blended, clipped) |
//! | Encode JPEG | `JpegEncoder::new_with_quality` |
//! | Encode other formats | `DynamicImage::write_to` with the output's own format |
//!
//! Outputs are written to a sibling temp file and renamed into place, so an
//! in-place operation never leaves a half-written image behind.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{CompositeParams, ResizeParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Pure Rust backend using the `image` crate.
///
/// Stateless: see the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(path: &Path, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
}

/// Open a decoder for `path`, sniffing the format from content.
fn open_decoder(path: &Path) -> Result<impl ImageDecoder, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| decode_error(path, e))
}

fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Load an image and apply its EXIF orientation.
///
/// Files without EXIF (or with an unreadable tag) are treated as upright.
fn load_oriented(path: &Path) -> Result<DynamicImage, BackendError> {
    let mut decoder = open_decoder(path)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Save in the format implied by the output extension, atomically.
fn save_image(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let format = ImageFormat::from_path(path).map_err(|e| {
        BackendError::ProcessingFailed(format!("Unsupported output format {}: {}", path.display(), e))
    })?;
    let tmp = temp_sibling(path);
    let mut writer = BufWriter::new(fs::File::create(&tmp)?);

    let encoded = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality as u8)),
        other => img.write_to(&mut writer, other),
    };
    let written = encoded
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Encode failed for {}: {}", path.display(), e))
        })
        .and_then(|()| writer.flush().map_err(BackendError::Io));
    drop(writer);

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let mut decoder = open_decoder(path)?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        Ok(if swaps_axes(orientation) {
            Dimensions::new(height, width)
        } else {
            Dimensions::new(width, height)
        })
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        let img = load_oriented(&params.source)?;
        let img = match params.resize_to {
            Some(Dimensions { width, height }) => {
                img.resize_exact(width, height, FilterType::Lanczos3)
            }
            None => img,
        };
        save_image(&img, &params.output, params.quality.value())
    }

    fn composite(&self, params: &CompositeParams) -> Result<(), BackendError> {
        let mut canvas = load_oriented(&params.base)?.to_rgba8();
        let mark = load_oriented(&params.overlay)?.to_rgba8();
        image::imageops::overlay(&mut canvas, &mark, params.x, params.y);
        save_image(
            &DynamicImage::ImageRgba8(canvas),
            &params.output,
            params.quality.value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use crate::test_helpers::{create_test_jpeg, create_test_png, jpeg_with_orientation};
    use image::{GenericImageView, Rgba, RgbaImage};

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions::new(200, 150));
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn identify_garbage_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let result = RustBackend::new().identify(&path);
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn identify_swaps_axes_for_rotated_exif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        // Stored 300x200, tagged "rotate 90 CW"
        jpeg_with_orientation(&path, 300, 200, 6);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions::new(200, 300));
    }

    #[test]
    fn resize_in_place_shrinks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("big.jpg");
        create_test_jpeg(&path, 600, 400);

        let backend = RustBackend::new();
        backend
            .resize(&ResizeParams {
                source: path.clone(),
                output: path.clone(),
                resize_to: Some(Dimensions::new(300, 200)),
                quality: Quality::new(85),
            })
            .unwrap();

        assert_eq!(backend.identify(&path).unwrap(), Dimensions::new(300, 200));
        // No temp file left behind
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn resize_applies_orientation_and_drops_tag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        jpeg_with_orientation(&path, 300, 200, 6);

        let backend = RustBackend::new();
        backend
            .resize(&ResizeParams {
                source: path.clone(),
                output: path.clone(),
                resize_to: None,
                quality: Quality::default(),
            })
            .unwrap();

        // Pixels are now upright, so raw and oriented sizes agree.
        assert_eq!(image::image_dimensions(&path).unwrap(), (200, 300));
        assert_eq!(backend.identify(&path).unwrap(), Dimensions::new(200, 300));
    }

    #[test]
    fn resize_keeps_png_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("shot.png");
        create_test_png(&path, 50, 40);

        RustBackend::new()
            .resize(&ResizeParams {
                source: path.clone(),
                output: path.clone(),
                resize_to: Some(Dimensions::new(25, 20)),
                quality: Quality::default(),
            })
            .unwrap();

        let reader = ImageReader::open(&path).unwrap().with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Png));
        assert_eq!(image::image_dimensions(&path).unwrap(), (25, 20));
    }

    #[test]
    fn resize_unknown_output_extension_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 10, 10);

        let result = RustBackend::new().resize(&ResizeParams {
            source,
            output: tmp.path().join("output.unknownext"),
            resize_to: None,
            quality: Quality::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn composite_pastes_at_offset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.png");
        let mark = tmp.path().join("mark.png");
        RgbaImage::from_pixel(100, 80, Rgba([0, 0, 0, 255]))
            .save(&base)
            .unwrap();
        RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]))
            .save(&mark)
            .unwrap();

        RustBackend::new()
            .composite(&CompositeParams {
                base: base.clone(),
                overlay: mark,
                output: base.clone(),
                x: 30,
                y: 40,
                quality: Quality::default(),
            })
            .unwrap();

        let out = image::open(&base).unwrap();
        assert_eq!(out.dimensions(), (100, 80));
        assert_eq!(out.get_pixel(30, 40), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(39, 49), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(29, 40), Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(30, 50), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn composite_clips_negative_offset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.png");
        let mark = tmp.path().join("mark.png");
        RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]))
            .save(&base)
            .unwrap();
        RgbaImage::from_pixel(10, 40, Rgba([0, 255, 0, 255]))
            .save(&mark)
            .unwrap();

        RustBackend::new()
            .composite(&CompositeParams {
                base: base.clone(),
                overlay: mark,
                output: base.clone(),
                x: 5,
                y: -30,
                quality: Quality::default(),
            })
            .unwrap();

        let out = image::open(&base).unwrap();
        assert_eq!(out.get_pixel(5, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(out.get_pixel(5, 9), Rgba([0, 255, 0, 255]));
        assert_eq!(out.get_pixel(5, 10), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn composite_onto_jpeg_writes_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = tmp.path().join("base.jpg");
        let mark = tmp.path().join("mark.png");
        create_test_jpeg(&base, 120, 90);
        create_test_png(&mark, 20, 10);

        RustBackend::new()
            .composite(&CompositeParams {
                base: base.clone(),
                overlay: mark,
                output: base.clone(),
                x: 30,
                y: 50,
                quality: Quality::new(80),
            })
            .unwrap();

        let reader = ImageReader::open(&base).unwrap().with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Jpeg));
        assert_eq!(image::image_dimensions(&base).unwrap(), (120, 90));
    }
}
