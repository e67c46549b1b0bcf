//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Each entity leads with its identity (positional index or id, then the
//! filename or name). Stage details follow as indented context lines, so a
//! batch run reads as an inventory of what happened to each file.
//!
//! # Output Format
//!
//! ## Process
//!
//! ```text
//! Processing 2 images
//! 001 8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg (#12)
//!     resize: 3000x2000 → 1440x960
//!     watermark: cc at (30, 850), backup saved
//!     optimizer: done
//! 002 a0c1e2f3-9b8a-4c7d-8e6f-5a4b3c2d1e0f.png (#13) FAILED
//!     resize failed: Processing failed: ...
//!
//! Processed 1 of 2 images, 1 failed
//! ```
//!
//! ## Coaster
//!
//! ```text
//! Coaster #3 Taron
//!     Main image: #12 8f52b371-....jpg
//!     Images: 4 (3 enabled)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::imaging::{ResizeOutcome, WatermarkOutcome};
use crate::optimizer::OptimizeOutcome;
use crate::pipeline::{BatchSummary, ProcessEvent, StageReport};
use crate::selector::Recompute;
use crate::types::{Coaster, ImageRecord};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// Write lines to stdout.
pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Process output
// ============================================================================

fn stage_lines(report: &StageReport) -> Vec<String> {
    let mut lines = Vec::new();
    let resize = match report.resize {
        ResizeOutcome::Resized { from, to } => format!(
            "resize: {}x{} \u{2192} {}x{}",
            from.width, from.height, to.width, to.height
        ),
        ResizeOutcome::Oriented(d) => format!("resize: {}x{} (within bound)", d.width, d.height),
    };
    lines.push(format!("{}{}", indent(1), resize));

    let watermark = match report.watermark {
        WatermarkOutcome::Skipped => "watermark: none".to_string(),
        WatermarkOutcome::Applied { backup_taken, x, y } => format!(
            "watermark: cc at ({}, {}), {}",
            x,
            y,
            if backup_taken {
                "backup saved"
            } else {
                "backup kept"
            }
        ),
    };
    lines.push(format!("{}{}", indent(1), watermark));

    let optimizer = match report.optimize {
        OptimizeOutcome::Optimized => "optimizer: done",
        OptimizeOutcome::ToolUnavailable => "optimizer: not installed, skipped",
    };
    lines.push(format!("{}{}", indent(1), optimizer));
    lines
}

/// Format a single process progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { total } => {
            vec![format!("Processing {}", plural(*total, "image"))]
        }
        ProcessEvent::Processed {
            index,
            image_id,
            filename,
            report,
            ..
        } => {
            let mut lines = vec![format!(
                "{} {} (#{})",
                format_index(*index),
                filename,
                image_id
            )];
            lines.extend(stage_lines(report));
            lines
        }
        ProcessEvent::Failed {
            index,
            image_id,
            filename,
            error,
            ..
        } => vec![
            format!("{} {} (#{}) FAILED", format_index(*index), filename, image_id),
            format!("{}{}", indent(1), error),
        ],
    }
}

/// Closing line for a batch run.
pub fn format_batch_summary(summary: &BatchSummary) -> Vec<String> {
    let total = summary.succeeded.len() + summary.failed.len();
    let mut line = format!(
        "Processed {} of {}",
        summary.succeeded.len(),
        plural(total, "image")
    );
    if !summary.failed.is_empty() {
        line.push_str(&format!(", {} failed", summary.failed.len()));
    }
    if summary.duplicates > 0 {
        line.push_str(&format!(
            ", {} skipped",
            plural(summary.duplicates, "duplicate")
        ));
    }
    vec![String::new(), line]
}

// ============================================================================
// Records
// ============================================================================

/// Tabular listing of image records.
pub fn format_image_list(images: &[ImageRecord]) -> Vec<String> {
    if images.is_empty() {
        return vec!["No images".to_string()];
    }
    let mut lines = vec![format!(
        "{:>5}  {:>7}  {:<7}  {:<9}  {:<9}  {}",
        "ID", "COASTER", "ENABLED", "OPTIMIZED", "WATERMARK", "FILENAME"
    )];
    for image in images {
        lines.push(format!(
            "{:>5}  {:>7}  {:<7}  {:<9}  {:<9}  {}",
            image.id,
            image.coaster_id,
            yes_no(image.enabled),
            yes_no(image.optimized),
            image.watermark.to_string(),
            image.filename
        ));
    }
    lines
}

pub fn print_image_list(images: &[ImageRecord]) {
    print_lines(&format_image_list(images));
}

/// A coaster with its main image and image counts.
pub fn format_coaster(coaster: &Coaster, images: &[ImageRecord]) -> Vec<String> {
    let mut lines = vec![format!("Coaster #{} {}", coaster.id, coaster.name)];
    let main = coaster
        .main_image_id
        .and_then(|id| images.iter().find(|i| i.id == id));
    lines.push(match (coaster.main_image_id, main) {
        (Some(_), Some(image)) => {
            format!("{}Main image: #{} {}", indent(1), image.id, image.filename)
        }
        (Some(id), None) => format!("{}Main image: #{}", indent(1), id),
        (None, _) => format!("{}Main image: none", indent(1)),
    });
    let enabled = images.iter().filter(|i| i.enabled).count();
    lines.push(format!(
        "{}Images: {} ({} enabled)",
        indent(1),
        images.len(),
        enabled
    ));
    lines
}

pub fn print_coaster(coaster: &Coaster, images: &[ImageRecord]) {
    print_lines(&format_coaster(coaster, images));
}

/// One-line confirmation for a stored upload.
pub fn format_upload(image: &ImageRecord) -> Vec<String> {
    vec![
        format!("Stored #{} {}", image.id, image.filename),
        format!(
            "{}coaster #{}, watermark {}, {}",
            indent(1),
            image.coaster_id,
            image.watermark,
            if image.enabled { "enabled" } else { "disabled" }
        ),
    ]
}

pub fn format_recompute(outcome: &Recompute) -> Vec<String> {
    match outcome {
        Recompute::Recomputed { coasters } => {
            vec![format!("Main images recomputed for {}", plural(*coasters, "coaster"))]
        }
        Recompute::Failed(e) => vec![format!("Main image recompute failed: {}", e)],
    }
}
