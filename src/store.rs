//! SQLite-backed persistence for coasters and their images.
//!
//! Two tables, created on open:
//!
//! ```text
//! coaster(id, name, main_image_id -> image.id)
//! image(id, coaster_id -> coaster.id, filename UNIQUE, watermark,
//!       enabled, optimized, created_at, updated_at)
//! ```
//!
//! Timestamps are stored as Unix milliseconds. Every write runs in its own
//! implicit transaction, so a call that returns `Ok` is durable.
//!
//! The connection is not `Sync`; callers that fan work out across threads
//! bring results back to one thread before writing (see
//! [`crate::pipeline::Pipeline::process_batch`]).

use crate::types::{Coaster, ImageRecord, NewImage, WatermarkKind};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Coaster {0} not found")]
    CoasterNotFound(i64),
    #[error("Image {0} not found")]
    ImageNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS coaster (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        main_image_id INTEGER REFERENCES image(id) ON DELETE SET NULL
    );
    CREATE TABLE IF NOT EXISTS image (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        coaster_id INTEGER NOT NULL REFERENCES coaster(id) ON DELETE CASCADE,
        filename TEXT NOT NULL UNIQUE,
        watermark TEXT,
        enabled INTEGER NOT NULL DEFAULT 1 CHECK (enabled IN (0, 1)),
        optimized INTEGER NOT NULL DEFAULT 0 CHECK (optimized IN (0, 1)),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_image_main
        ON image(coaster_id, enabled, updated_at, id);
";

const IMAGE_COLUMNS: &str =
    "id, coaster_id, filename, watermark, enabled, optimized, created_at, updated_at";

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn image_from_row(row: &Row) -> rusqlite::Result<ImageRecord> {
    let watermark: Option<String> = row.get(3)?;
    Ok(ImageRecord {
        id: row.get(0)?,
        coaster_id: row.get(1)?,
        filename: row.get(2)?,
        watermark: WatermarkKind::from_tag(watermark.as_deref()),
        enabled: row.get(4)?,
        optimized: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn coaster_from_row(row: &Row) -> rusqlite::Result<Coaster> {
    Ok(Coaster {
        id: row.get(0)?,
        name: row.get(1)?,
        main_image_id: row.get(2)?,
    })
}

/// Boolean image columns that have a narrow single-column write.
#[derive(Debug, Clone, Copy)]
enum Flag {
    Enabled,
    Optimized,
}

impl Flag {
    fn column(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Optimized => "optimized",
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        log::debug!("opened store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Raw access for bulk statements.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Coasters
    // ------------------------------------------------------------------

    pub fn insert_coaster(&self, name: &str) -> Result<Coaster> {
        self.conn
            .execute("INSERT INTO coaster (name) VALUES (?1)", params![name])?;
        Ok(Coaster {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            main_image_id: None,
        })
    }

    pub fn find_coaster(&self, id: i64) -> Result<Option<Coaster>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, main_image_id FROM coaster WHERE id = ?1",
                params![id],
                coaster_from_row,
            )
            .optional()?)
    }

    /// Like [`find_coaster`](Self::find_coaster) but a missing row is an error.
    pub fn coaster(&self, id: i64) -> Result<Coaster> {
        self.find_coaster(id)?
            .ok_or(StoreError::CoasterNotFound(id))
    }

    pub fn list_coasters(&self) -> Result<Vec<Coaster>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, main_image_id FROM coaster ORDER BY id")?;
        let rows = stmt.query_map([], coaster_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Insert a new image row. `optimized` starts false.
    pub fn insert_image(&self, new: &NewImage) -> Result<ImageRecord> {
        // Surface a readable error instead of a bare FK violation.
        self.coaster(new.coaster_id)?;

        let now = now_millis();
        self.conn.execute(
            "INSERT INTO image (coaster_id, filename, watermark, enabled, optimized, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![
                new.coaster_id,
                new.filename,
                new.watermark.as_tag(),
                new.enabled,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.image(id)
    }

    pub fn find_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM image WHERE id = ?1"),
                params![id],
                image_from_row,
            )
            .optional()?)
    }

    pub fn image(&self, id: i64) -> Result<ImageRecord> {
        self.find_image(id)?.ok_or(StoreError::ImageNotFound(id))
    }

    pub fn find_by_filename(&self, filename: &str) -> Result<Option<ImageRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM image WHERE filename = ?1"),
                params![filename],
                image_from_row,
            )
            .optional()?)
    }

    fn query_images(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, image_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.query_images(
            &format!("SELECT {IMAGE_COLUMNS} FROM image ORDER BY id"),
            [],
        )
    }

    pub fn images_for_coaster(&self, coaster_id: i64) -> Result<Vec<ImageRecord>> {
        self.query_images(
            &format!("SELECT {IMAGE_COLUMNS} FROM image WHERE coaster_id = ?1 ORDER BY id"),
            params![coaster_id],
        )
    }

    /// Images whose pipeline has not completed yet.
    pub fn pending_images(&self) -> Result<Vec<ImageRecord>> {
        self.query_images(
            &format!("SELECT {IMAGE_COLUMNS} FROM image WHERE optimized = 0 ORDER BY id"),
            [],
        )
    }

    /// Write every mutable column of `record` and bump `updated_at`.
    ///
    /// Overwrites whatever another handle wrote since `record` was loaded;
    /// the pipeline and the enable/disable actions use
    /// [`mark_optimized`](Self::mark_optimized) and
    /// [`set_enabled`](Self::set_enabled) instead.
    ///
    /// The new timestamp is written back into `record`. It is strictly
    /// greater than the previous one even when two persists land in the
    /// same millisecond.
    pub fn persist(&self, record: &mut ImageRecord) -> Result<()> {
        let stamp = now_millis().max(record.updated_at.timestamp_millis() + 1);
        let changed = self.conn.execute(
            "UPDATE image
             SET coaster_id = ?2, filename = ?3, watermark = ?4, enabled = ?5,
                 optimized = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                record.id,
                record.coaster_id,
                record.filename,
                record.watermark.as_tag(),
                record.enabled,
                record.optimized,
                stamp
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::ImageNotFound(record.id));
        }
        if let Some(updated) = DateTime::from_timestamp_millis(stamp) {
            record.updated_at = updated;
        }
        Ok(())
    }

    /// Set `optimized = 1` and bump `updated_at`; other columns are untouched.
    ///
    /// `record` is refreshed from the row, so a toggle made through another
    /// handle since `record` was loaded is kept, not overwritten.
    pub fn mark_optimized(&self, record: &mut ImageRecord) -> Result<()> {
        self.write_flag(record, Flag::Optimized, true)
    }

    /// Write only `enabled` and bump `updated_at`.
    pub fn set_enabled(&self, record: &mut ImageRecord, enabled: bool) -> Result<()> {
        self.write_flag(record, Flag::Enabled, enabled)
    }

    fn write_flag(&self, record: &mut ImageRecord, flag: Flag, value: bool) -> Result<()> {
        // Stamp from the stored value, which may be newer than the record's.
        let sql = format!(
            "UPDATE image SET {} = ?2, updated_at = MAX(?3, updated_at + 1)
             WHERE id = ?1
             RETURNING enabled, optimized, updated_at",
            flag.column()
        );
        let row: Option<(bool, bool, DateTime<Utc>)> = self
            .conn
            .query_row(&sql, params![record.id, value, now_millis()], |row| {
                Ok((row.get(0)?, row.get(1)?, timestamp(row, 2)?))
            })
            .optional()?;
        let (enabled, optimized, updated_at) = row.ok_or(StoreError::ImageNotFound(record.id))?;
        record.enabled = enabled;
        record.optimized = optimized;
        record.updated_at = updated_at;
        Ok(())
    }

    /// Delete an image row. Returns false if it was already gone.
    pub fn delete_image(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM image WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
