//! Shared record types passed between the store, the pipeline and the CLI.
//!
//! These mirror the rows of the `image` and `coaster` tables. They are
//! serialized to JSON by `list --json`, so field names are part of the
//! command-line contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag stored for the branded "cc" watermark.
pub const WATERMARK_CC: &str = "cc";

/// Which overlay, if any, gets composited onto an image.
///
/// Only one branded variant exists. Any other stored tag (including NULL)
/// reads back as [`WatermarkKind::None`], so unknown legacy values never
/// trigger compositing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    #[default]
    None,
    Cc,
}

impl WatermarkKind {
    /// Map a stored column value to a kind. Lenient: unknown tags are `None`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(WATERMARK_CC) => Self::Cc,
            _ => Self::None,
        }
    }

    /// The value written to the `watermark` column.
    pub fn as_tag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Cc => Some(WATERMARK_CC),
        }
    }
}

impl fmt::Display for WatermarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag().unwrap_or("none"))
    }
}

/// Strict parse used for user input on the command line.
impl FromStr for WatermarkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            WATERMARK_CC => Ok(Self::Cc),
            other => Err(format!("unknown watermark kind '{other}' (expected: none, cc)")),
        }
    }
}

/// One stored raster asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    pub coaster_id: i64,
    /// `{uuid}.{ext}`; the on-disk location is derived from it.
    pub filename: String,
    pub watermark: WatermarkKind,
    pub enabled: bool,
    /// True only once resize, watermark and optimize all succeeded.
    pub optimized: bool,
    pub created_at: DateTime<Utc>,
    /// Ordering key for main-image selection (oldest wins).
    pub updated_at: DateTime<Utc>,
}

/// Values needed to insert a freshly uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub coaster_id: i64,
    pub filename: String,
    pub watermark: WatermarkKind,
    pub enabled: bool,
}

/// Parent entity owning many images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coaster {
    pub id: i64,
    pub name: String,
    /// Denormalized pointer maintained by [`crate::selector::recompute`].
    pub main_image_id: Option<i64>,
}
