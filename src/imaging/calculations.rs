//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

/// Default bound on the longer edge of a stored image.
pub const MAX_SIZE: u32 = 1440;

/// Default watermark margin from the left and bottom edges, in pixels.
pub const WATERMARK_MARGIN: u32 = 30;

/// Calculate bounded dimensions for an image.
///
/// Returns `None` when both sides already fit within `max_size`: images are
/// never upscaled. Otherwise the longer side becomes exactly `max_size` and
/// the shorter side is scaled by the same ratio, rounded to the nearest pixel
/// (never below 1).
///
/// # Examples
/// ```
/// # use coaster_media::imaging::calculate_bounded_dimensions;
/// assert_eq!(calculate_bounded_dimensions((3000, 2000), 1440), Some((1440, 960)));
/// assert_eq!(calculate_bounded_dimensions((2000, 3000), 1440), Some((960, 1440)));
/// assert_eq!(calculate_bounded_dimensions((1440, 800), 1440), None);
/// ```
pub fn calculate_bounded_dimensions(original: (u32, u32), max_size: u32) -> Option<(u32, u32)> {
    let (w, h) = original;
    if w <= max_size && h <= max_size {
        return None;
    }

    let scale = |side: u32, longer: u32| -> u32 {
        ((side as f64 * max_size as f64 / longer as f64).round() as u32).max(1)
    };

    if w >= h {
        // Landscape or square
        Some((max_size, scale(h, w)))
    } else {
        // Portrait
        Some((scale(w, h), max_size))
    }
}

/// Top-left position of a watermark anchored to the bottom-left corner.
///
/// `x = margin`, `y = host_height - mark_height - margin`. The result can be
/// negative when the mark is taller than the host allows; compositing clips.
pub fn calculate_watermark_position(host: (u32, u32), mark: (u32, u32), margin: u32) -> (i64, i64) {
    let (_, host_h) = host;
    let (_, mark_h) = mark;
    let x = margin as i64;
    let y = host_h as i64 - mark_h as i64 - margin as i64;
    (x, y)
}
