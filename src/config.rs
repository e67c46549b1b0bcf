//! Media configuration module.
//!
//! Handles loading, validating and merging `coaster-media.toml`. Stock
//! defaults are the base layer; a user file only needs the keys it wants to
//! change. A missing file is not an error, it just means "all defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! base_path = "var/images"           # Root of the sharded image tree
//! database = "var/coaster-media.db"  # SQLite file
//!
//! [images]
//! max_size = 1440           # Bound on the longer edge, in pixels
//! quality = 90              # JPEG re-encode quality (1-100)
//!
//! [watermark]
//! path = "assets/watermark.png"  # The "cc" overlay
//! margin = 30                    # Distance from the left and bottom edges
//!
//! [optimizer]
//! path = "jpegoptim"        # Executable name or path
//! timeout_secs = 120        # 0 = wait forever
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{MAX_SIZE, Quality, TransformConfig, WATERMARK_MARGIN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "coaster-media.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `coaster-media.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Where files and records live.
    pub storage: StorageConfig,
    /// Resize bound and re-encode quality.
    pub images: ImagesConfig,
    /// Overlay asset and placement.
    pub watermark: WatermarkConfig,
    /// External size optimizer.
    pub optimizer: OptimizerConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl MediaConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.max_size == 0 {
            return Err(ConfigError::Validation(
                "images.max_size must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.base_path must not be empty".into(),
            ));
        }
        if self.optimizer.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "optimizer.path must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Settings for the resize and watermark stages.
    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            max_size: self.images.max_size,
            quality: Quality::new(self.images.quality),
            watermark_path: self.watermark.path.clone(),
            watermark_margin: self.watermark.margin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory; files land in `{base_path}/{first char}/`.
    pub base_path: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("var/images"),
            database: PathBuf::from("var/coaster-media.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Longer-edge bound in pixels.
    pub max_size: u32,
    /// JPEG re-encode quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_SIZE,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub path: PathBuf,
    pub margin: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/watermark.png"),
            margin: WATERMARK_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub path: PathBuf,
    /// Seconds before a hung optimizer is killed. Zero disables the limit.
    pub timeout_secs: u64,
}

impl OptimizerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("jpegoptim"),
            timeout_secs: 120,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MediaConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MediaConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MediaConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults if it is absent.
pub fn load_config(path: &Path) -> Result<MediaConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        log::debug!("no config at {}, using defaults", path.display());
    }
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Coaster Media Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Root of the image tree. Files are sharded by the first character of their
# generated name: var/images/8/8f52b371-....jpg
# Pre-watermark originals go under var/images/backup/8/.
base_path = "var/images"

# SQLite database holding coasters and image records.
database = "var/coaster-media.db"

# ---------------------------------------------------------------------------
# Image normalization
# ---------------------------------------------------------------------------
[images]
# Longer-edge bound in pixels. Smaller images are only auto-rotated.
max_size = 1440

# JPEG re-encode quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
# Overlay composited onto images uploaded with the "cc" watermark.
path = "assets/watermark.png"

# Distance in pixels from the left and bottom edges.
margin = 30

# ---------------------------------------------------------------------------
# Optimizer
# ---------------------------------------------------------------------------
[optimizer]
# Lossless optimizer, called as `<path> --help` then `<path> -s <file>`.
# If it is not installed the step is skipped.
path = "jpegoptim"

# Kill the optimizer after this many seconds (0 = no limit).
timeout_secs = 120

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
