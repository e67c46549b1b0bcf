//! # Coaster Media
//!
//! Image ingestion for a roller-coaster catalogue. Uploaded photos are stored
//! under generated names, normalized, optionally branded with a watermark,
//! losslessly shrunk, and exactly one enabled image per coaster is kept as
//! its main image.
//!
//! # Architecture: Per-Image Pipeline
//!
//! ```text
//! upload ─► storage  ({base}/{first char}/{uuid}.{ext})
//!              │
//!              ▼
//!          pipeline:  resize ─► watermark ─► optimize ─► commit
//!              │
//!              ▼
//!          selector:  one UPDATE picks every coaster's main image
//! ```
//!
//! Each stage works on the stored file in place. The pipeline never
//! propagates a stage error; it logs it on the `critical` target and reports
//! `false`, leaving the record untouched.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Generated `{uuid}.{ext}` filenames, extension sniffing |
//! | [`storage`] | Sharded path resolution, upload intake, removal |
//! | [`imaging`] | EXIF auto-rotate, bounded resize, watermark compositing |
//! | [`optimizer`] | External lossless optimizer (`jpegoptim`) with probe and timeout |
//! | [`pipeline`] | Stage orchestration, batch processing with progress events |
//! | [`selector`] | Main-image selection per coaster |
//! | [`store`] | SQLite persistence for coasters and image records |
//! | [`types`] | Shared record types (`ImageRecord`, `Coaster`, `WatermarkKind`) |
//! | [`config`] | `coaster-media.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Stateless Imaging Behind a Trait
//!
//! The pipeline talks to an [`imaging::ImageBackend`], never to the `image`
//! crate directly. Backends open the file they are given on every call and
//! keep nothing between calls, so one value is shared by all workers and
//! tests swap in a recording mock.
//!
//! ## Missing Optimizer Is Not a Failure
//!
//! Whether `jpegoptim` is installed is a property of the host, not of the
//! image. A failed `--help` probe skips the stage; a failed real run fails
//! the image. The two outcomes are distinct types.
//!
//! ## Backups Before Branding
//!
//! The first watermark application copies the stored file to
//! `{base}/backup/{first char}/`. Later applications keep that copy, so it
//! always holds the unbranded (but already resized) image.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod optimizer;
pub mod output;
pub mod pipeline;
pub mod selector;
pub mod storage;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
