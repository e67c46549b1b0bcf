//! Main-image selection.
//!
//! Every coaster points at one representative image: among its *enabled*
//! images, the one with the oldest `updated_at`, ties broken by the smaller
//! id. A coaster with no enabled image points at nothing.
//!
//! The pointer is recomputed for all coasters in one statement, so readers
//! never observe a half-updated state.

use crate::store::{Store, StoreError};
use crate::types::ImageRecord;

const RECOMPUTE_SQL: &str = "
    UPDATE coaster SET main_image_id = (
        SELECT i.id FROM image i
        WHERE i.coaster_id = coaster.id AND i.enabled = 1
        ORDER BY i.updated_at ASC, i.id ASC
        LIMIT 1
    )";

/// Result of a bulk recompute.
///
/// Failure is reported rather than raised: callers on the write path log it
/// and keep going, since the pointer can always be rebuilt later.
#[derive(Debug)]
pub enum Recompute {
    Recomputed { coasters: usize },
    Failed(StoreError),
}

impl Recompute {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Recomputed { .. })
    }

    /// Log a failure at `warn`; return whether the recompute succeeded.
    pub fn log_failure(&self) -> bool {
        if let Self::Failed(e) = self {
            log::warn!("main image recompute failed: {}", e);
        }
        self.is_ok()
    }
}

/// Point every coaster at its main image.
pub fn recompute(store: &Store) -> Recompute {
    match store.connection().execute(RECOMPUTE_SQL, []) {
        Ok(coasters) => {
            log::debug!("recomputed main image for {} coasters", coasters);
            Recompute::Recomputed { coasters }
        }
        Err(e) => Recompute::Failed(e.into()),
    }
}

fn set_enabled(
    store: &Store,
    image: &mut ImageRecord,
    enabled: bool,
) -> Result<Recompute, StoreError> {
    store.set_enabled(image, enabled)?;
    Ok(recompute(store))
}

/// Enable an image, write the flag, and recompute main images.
pub fn enable_image(store: &Store, image: &mut ImageRecord) -> Result<Recompute, StoreError> {
    set_enabled(store, image, true)
}

/// Disable an image, write the flag, and recompute main images.
///
/// A coaster whose last enabled image is disabled ends up with no main image.
pub fn disable_image(store: &Store, image: &mut ImageRecord) -> Result<Recompute, StoreError> {
    set_enabled(store, image, false)
}
