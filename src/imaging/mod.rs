//! Image transforms: orientation, bounded resize, watermark compositing.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | decoder dimensions + EXIF orientation |
//! | **Resize** | auto-orient, then Lanczos3 down to the bound |
//! | **Watermark** | verbatim backup, then `imageops::overlay` bottom-left |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    MAX_SIZE, WATERMARK_MARGIN, calculate_bounded_dimensions, calculate_watermark_position,
};
pub use operations::{
    ResizeOutcome, TransformConfig, WatermarkOutcome, get_dimensions, resize_image,
    watermark_image,
};
pub use params::{CompositeParams, Quality, ResizeParams};
pub use rust_backend::RustBackend;
