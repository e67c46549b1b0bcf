//! On-disk layout for stored images.
//!
//! A file's location is a pure function of its generated filename, bucketed
//! by the filename's first character so no single directory grows unbounded:
//!
//! ```text
//! var/images/
//! ├── 8/
//! │   └── 8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg
//! ├── c/
//! │   └── c04e...e1.png
//! └── backup/
//!     └── 8/
//!         └── 8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg   ← pre-watermark copy
//! ```
//!
//! Nothing about the layout is stored in the database. Backups are written by
//! the watermark stage and never removed here.

use crate::naming::{self, NamingError, SNIFF_LEN};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the backup subtree under the base path.
pub const BACKUP_DIR: &str = "backup";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("Upload source not found: {0}")]
    SourceNotFound(PathBuf),
}

/// Resolves filenames to sharded paths under a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    base_path: PathBuf,
}

impl Storage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `{base}/{first char}` or `{base}/{first char}/{filename}`.
    pub fn resolve(&self, filename: &str, include_filename: bool) -> PathBuf {
        shard(&self.base_path, filename, include_filename)
    }

    /// `{base}/backup/{first char}` or `{base}/backup/{first char}/{filename}`.
    pub fn resolve_backup(&self, filename: &str, include_filename: bool) -> PathBuf {
        shard(&self.base_path.join(BACKUP_DIR), filename, include_filename)
    }

    /// Full path of the stored file.
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.resolve(filename, true)
    }

    /// Full path of the pre-watermark backup.
    pub fn backup_path(&self, filename: &str) -> PathBuf {
        self.resolve_backup(filename, true)
    }

    /// Accept an upload already on disk (e.g. a temp file from the HTTP layer).
    ///
    /// Sniffs the format from the header, assigns a generated filename and
    /// moves the file into its shard. Returns the generated filename.
    pub fn upload_file(&self, source: &Path) -> Result<String, StorageError> {
        if !source.is_file() {
            return Err(StorageError::SourceNotFound(source.to_path_buf()));
        }
        let header = read_header(source)?;
        let extension = naming::detect_extension(&header)?;
        let filename = naming::generate_filename(extension)?;

        let target = self.file_path(&filename);
        fs::create_dir_all(self.resolve(&filename, false))?;
        move_file(source, &target)?;
        log::debug!("stored {} as {}", source.display(), target.display());
        Ok(filename)
    }

    /// Accept an upload as a byte stream whose extension the caller inferred.
    pub fn upload_reader(
        &self,
        reader: &mut impl Read,
        extension: &str,
    ) -> Result<String, StorageError> {
        let filename = naming::generate_filename(extension)?;
        fs::create_dir_all(self.resolve(&filename, false))?;
        let target = self.file_path(&filename);
        let written = fs::File::create(&target).and_then(|mut out| io::copy(reader, &mut out));
        if let Err(e) = written {
            // No partial files left behind in the shard.
            let _ = fs::remove_file(&target);
            return Err(e.into());
        }
        Ok(filename)
    }

    /// Delete the stored file. Returns whether anything was deleted.
    ///
    /// Idempotent: a missing file is not an error. The backup copy, if any,
    /// is left in place.
    pub fn remove(&self, filename: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.file_path(filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn shard(root: &Path, filename: &str, include_filename: bool) -> PathBuf {
    let bucket: String = filename.chars().take(1).collect();
    let dir = root.join(bucket);
    if include_filename {
        dir.join(filename)
    } else {
        dir
    }
}

fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Rename, falling back to copy + delete when crossing filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
