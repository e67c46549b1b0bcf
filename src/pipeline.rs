//! Per-image processing: resize, watermark, optimize, commit.
//!
//! ```text
//! start ─► resized ─► watermarked ─► optimized ─► committed
//!   │         │            │             │
//!   └─────────┴────────────┴─────────────┴──► failed
//! ```
//!
//! Any stage error aborts the remaining stages. [`Pipeline::process`] turns
//! it into `false` plus one log line on the `critical` target; the record's
//! `optimized` flag keeps its previous value and nothing is persisted.
//!
//! An optimizer that is not installed is *not* an error: the stage is
//! skipped and the image still commits.
//!
//! ## Batches
//!
//! [`Pipeline::process_batch`] runs the file stages on the rayon pool and
//! commits on the calling thread as results arrive. Filenames are
//! de-duplicated first, so no file is ever touched by two workers.

use crate::imaging::{
    BackendError, ImageBackend, ResizeOutcome, TransformConfig, WatermarkOutcome, resize_image,
    watermark_image,
};
use crate::optimizer::{OptimizeError, OptimizeOutcome, Optimizer};
use crate::storage::Storage;
use crate::store::{Store, StoreError};
use crate::types::ImageRecord;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc::{self, Sender};
use thiserror::Error;

/// Pipeline step, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resize,
    Watermark,
    Optimize,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resize => "resize",
            Self::Watermark => "watermark",
            Self::Optimize => "optimize",
            Self::Commit => "commit",
        })
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("resize failed: {0}")]
    Resize(#[source] BackendError),
    #[error("watermark failed: {0}")]
    Watermark(#[source] BackendError),
    #[error("optimize failed: {0}")]
    Optimize(#[from] OptimizeError),
    #[error("commit failed: {0}")]
    Commit(#[from] StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Resize(_) => Stage::Resize,
            Self::Watermark(_) => Stage::Watermark,
            Self::Optimize(_) => Stage::Optimize,
            Self::Commit(_) => Stage::Commit,
        }
    }
}

/// What each file stage did for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub resize: ResizeOutcome,
    pub watermark: WatermarkOutcome,
    pub optimize: OptimizeOutcome,
}

/// Progress events emitted by [`Pipeline::process_batch`].
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started {
        total: usize,
    },
    Processed {
        index: usize,
        total: usize,
        image_id: i64,
        filename: String,
        report: StageReport,
    },
    Failed {
        index: usize,
        total: usize,
        image_id: i64,
        filename: String,
        stage: Stage,
        error: String,
    },
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Ids committed as optimized, in completion order.
    pub succeeded: Vec<i64>,
    pub failed: Vec<i64>,
    /// Records dropped because another record in the batch had the same filename.
    pub duplicates: usize,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Wires the stage collaborators together. Holds no per-image state.
pub struct Pipeline<'a, B: ImageBackend, O: Optimizer> {
    backend: &'a B,
    optimizer: &'a O,
    storage: &'a Storage,
    config: &'a TransformConfig,
}

impl<'a, B: ImageBackend, O: Optimizer> Pipeline<'a, B, O> {
    pub fn new(
        backend: &'a B,
        optimizer: &'a O,
        storage: &'a Storage,
        config: &'a TransformConfig,
    ) -> Self {
        Self {
            backend,
            optimizer,
            storage,
            config,
        }
    }

    /// Run the three file stages in order. Touches the filesystem only.
    pub fn run_stages(&self, image: &ImageRecord) -> Result<StageReport, PipelineError> {
        let filename = image.filename.as_str();

        let resize = resize_image(self.backend, self.storage, filename, self.config)
            .map_err(PipelineError::Resize)?;
        log::debug!("{}: resized ({:?})", filename, resize);

        let watermark = watermark_image(
            self.backend,
            self.storage,
            filename,
            image.watermark,
            self.config,
        )
        .map_err(PipelineError::Watermark)?;
        log::debug!("{}: watermark {:?}", filename, watermark);

        let optimize = self.optimizer.optimize(&self.storage.file_path(filename))?;
        log::debug!("{}: optimizer {:?}", filename, optimize);

        Ok(StageReport {
            resize,
            watermark,
            optimize,
        })
    }

    /// Mark the record optimized.
    ///
    /// Only the `optimized` column is written, so an enable/disable that
    /// landed while the file stages ran survives the commit. On failure the
    /// record is left as it was.
    pub fn commit(&self, store: &Store, image: &mut ImageRecord) -> Result<(), PipelineError> {
        store.mark_optimized(image)?;
        Ok(())
    }

    /// Run every stage and commit. Returns the report, or the first error.
    pub fn process_image(
        &self,
        store: &Store,
        image: &mut ImageRecord,
    ) -> Result<StageReport, PipelineError> {
        let report = self.run_stages(image)?;
        self.commit(store, image)?;
        Ok(report)
    }

    /// Process one image. Never propagates: failures are logged as critical.
    pub fn process(&self, store: &Store, image: &mut ImageRecord) -> bool {
        match self.process_image(store, image) {
            Ok(_) => true,
            Err(e) => {
                log_failure(image, &e);
                false
            }
        }
    }

    /// Process many images, file stages in parallel, commits serially.
    pub fn process_batch(
        &self,
        store: &Store,
        images: Vec<ImageRecord>,
        events: Option<Sender<ProcessEvent>>,
    ) -> BatchSummary {
        let (images, duplicates) = dedupe_by_filename(images);
        let total = images.len();
        let emit = |event: ProcessEvent| {
            if let Some(tx) = &events {
                let _ = tx.send(event);
            }
        };
        emit(ProcessEvent::Started { total });

        let mut summary = BatchSummary {
            duplicates,
            ..BatchSummary::default()
        };
        let (done_tx, done_rx) = mpsc::channel();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                images
                    .into_par_iter()
                    .for_each_with(done_tx, |tx, image| {
                        let result = self.run_stages(&image);
                        let _ = tx.send((image, result));
                    });
            });

            for (index, (mut image, result)) in done_rx.into_iter().enumerate() {
                let index = index + 1;
                let outcome =
                    result.and_then(|report| self.commit(store, &mut image).map(|_| report));
                match outcome {
                    Ok(report) => {
                        summary.succeeded.push(image.id);
                        emit(ProcessEvent::Processed {
                            index,
                            total,
                            image_id: image.id,
                            filename: image.filename,
                            report,
                        });
                    }
                    Err(e) => {
                        log_failure(&image, &e);
                        summary.failed.push(image.id);
                        emit(ProcessEvent::Failed {
                            index,
                            total,
                            image_id: image.id,
                            filename: image.filename,
                            stage: e.stage(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        summary
    }
}

fn log_failure(image: &ImageRecord, error: &PipelineError) {
    log::error!(
        target: "critical",
        "image {} ({}) failed at {}: {}",
        image.id,
        image.filename,
        error.stage(),
        error
    );
}

/// Keep the first record for each filename.
fn dedupe_by_filename(images: Vec<ImageRecord>) -> (Vec<ImageRecord>, usize) {
    let before = images.len();
    let mut seen = HashSet::new();
    let unique: Vec<ImageRecord> = images
        .into_iter()
        .filter(|image| seen.insert(image.filename.clone()))
        .collect();
    let duplicates = before - unique.len();
    (unique, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::optimizer::tests::MockOptimizer;
    use crate::types::{NewImage, WatermarkKind};
    use crate::selector;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        db_path: PathBuf,
        storage: Storage,
        store: Store,
        config: TransformConfig,
        backend: MockBackend,
        coaster_id: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let storage = Storage::new(tmp.path().join("images"));
            let db_path = tmp.path().join("media.db");
            let store = Store::open(&db_path).unwrap();
            let config = TransformConfig {
                watermark_path: tmp.path().join("mark.png"),
                ..TransformConfig::default()
            };
            let backend = MockBackend::new();
            backend.set_dimensions(&config.watermark_path, Dimensions::new(200, 80));
            let coaster_id = store.insert_coaster("Taron").unwrap().id;
            Self {
                _tmp: tmp,
                db_path,
                storage,
                store,
                config,
                backend,
                coaster_id,
            }
        }

        /// Store a fake file and its record; the mock supplies dimensions.
        fn add(&self, filename: &str, watermark: WatermarkKind, dims: Dimensions) -> ImageRecord {
            let path = self.storage.file_path(filename);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"pixels").unwrap();
            self.backend.set_dimensions(&path, dims);
            self.store
                .insert_image(&NewImage {
                    coaster_id: self.coaster_id,
                    filename: filename.to_string(),
                    watermark,
                    enabled: true,
                })
                .unwrap()
        }

        /// A second connection to the same database, as another process would hold.
        fn other_handle(&self) -> Store {
            Store::open(&self.db_path).unwrap()
        }

        fn pipeline<'a>(&'a self, optimizer: &'a MockOptimizer) -> Pipeline<'a, MockBackend, MockOptimizer> {
            Pipeline::new(&self.backend, optimizer, &self.storage, &self.config)
        }
    }

    // =========================================================================
    // Single image
    // =========================================================================

    #[test]
    fn success_commits_optimized() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("a1.jpg", WatermarkKind::Cc, Dimensions::new(3000, 2000));
        let before = image.updated_at;

        assert!(fx.pipeline(&optimizer).process(&fx.store, &mut image));

        assert!(image.optimized);
        assert!(image.updated_at > before);
        assert!(fx.store.image(image.id).unwrap().optimized);
    }

    #[test]
    fn stages_run_in_order_on_the_stored_file() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("b2.jpg", WatermarkKind::Cc, Dimensions::new(3000, 2000));
        let path = fx.storage.file_path("b2.jpg");
        let path_str = path.to_string_lossy().to_string();
        let mark_str = fx.config.watermark_path.to_string_lossy().to_string();

        let report = fx
            .pipeline(&optimizer)
            .process_image(&fx.store, &mut image)
            .unwrap();

        let ops = fx.backend.get_operations();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[0], RecordedOp::Identify(path_str.clone()));
        assert!(matches!(&ops[1], RecordedOp::Resize { resize_to: Some((1440, 960)), .. }));
        assert_eq!(ops[2], RecordedOp::Identify(mark_str));
        // Host re-read after resize
        assert_eq!(ops[3], RecordedOp::Identify(path_str));
        assert!(matches!(&ops[4], RecordedOp::Composite { x: 30, y: 850, .. }));
        assert_eq!(optimizer.calls(), vec![path]);
        assert_eq!(report.optimize, OptimizeOutcome::Optimized);
        assert!(matches!(
            report.watermark,
            WatermarkOutcome::Applied { backup_taken: true, .. }
        ));
    }

    #[test]
    fn plain_image_skips_watermark() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("c3.png", WatermarkKind::None, Dimensions::new(800, 600));

        let report = fx
            .pipeline(&optimizer)
            .process_image(&fx.store, &mut image)
            .unwrap();

        assert_eq!(report.watermark, WatermarkOutcome::Skipped);
        assert!(
            !fx.backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Composite { .. }))
        );
        assert!(!fx.storage.backup_path("c3.png").exists());
        assert!(image.optimized);
    }

    #[test]
    fn missing_optimizer_still_commits() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::unavailable();
        let mut image = fx.add("d4.jpg", WatermarkKind::Cc, Dimensions::new(1000, 800));

        assert!(fx.pipeline(&optimizer).process(&fx.store, &mut image));
        assert!(fx.store.image(image.id).unwrap().optimized);
    }

    #[test]
    fn failing_optimizer_returns_false_and_keeps_flag() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::failing();
        let mut image = fx.add("e5.jpg", WatermarkKind::Cc, Dimensions::new(1000, 800));
        let stored_before = fx.store.image(image.id).unwrap();

        assert!(!fx.pipeline(&optimizer).process(&fx.store, &mut image));

        assert!(!image.optimized);
        assert_eq!(fx.store.image(image.id).unwrap(), stored_before);
    }

    #[test]
    fn resize_failure_aborts_remaining_stages() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("f6.jpg", WatermarkKind::Cc, Dimensions::new(3000, 2000));
        fx.backend.fail_on(&fx.storage.file_path("f6.jpg"));

        let err = fx
            .pipeline(&optimizer)
            .process_image(&fx.store, &mut image)
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Resize);
        assert!(optimizer.calls().is_empty());
        assert!(!fx.storage.backup_path("f6.jpg").exists());
        assert!(!fx.store.image(image.id).unwrap().optimized);
    }

    #[test]
    fn watermark_failure_skips_optimizer_and_keeps_record() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("w9.jpg", WatermarkKind::Cc, Dimensions::new(3000, 2000));
        fx.backend.fail_composite_on(&fx.storage.file_path("w9.jpg"));
        let stored_before = fx.store.image(image.id).unwrap();

        let err = fx
            .pipeline(&optimizer)
            .process_image(&fx.store, &mut image)
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Watermark);
        assert!(optimizer.calls().is_empty());
        assert!(!image.optimized);
        assert_eq!(fx.store.image(image.id).unwrap(), stored_before);
        assert!(!fx.pipeline(&optimizer).process(&fx.store, &mut image));
        assert_eq!(fx.store.image(image.id).unwrap(), stored_before);
    }

    #[test]
    fn failure_leaves_previously_optimized_flag_alone() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::failing();
        let mut image = fx.add("g7.jpg", WatermarkKind::None, Dimensions::new(500, 500));
        fx.store.mark_optimized(&mut image).unwrap();

        assert!(!fx.pipeline(&optimizer).process(&fx.store, &mut image));
        assert!(image.optimized);
        assert!(fx.store.image(image.id).unwrap().optimized);
    }

    #[test]
    fn commit_failure_restores_flag() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let mut image = fx.add("h8.jpg", WatermarkKind::None, Dimensions::new(500, 500));
        fx.store.delete_image(image.id).unwrap();

        let err = fx
            .pipeline(&optimizer)
            .process_image(&fx.store, &mut image)
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Commit);
        assert!(!image.optimized);
    }

    // =========================================================================
    // Batches
    // =========================================================================

    #[test]
    fn batch_reports_each_image_once() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let ok1 = fx.add("i1.jpg", WatermarkKind::Cc, Dimensions::new(2000, 1000));
        let ok2 = fx.add("j2.jpg", WatermarkKind::None, Dimensions::new(640, 480));
        let bad = fx.add("k3.jpg", WatermarkKind::None, Dimensions::new(640, 480));
        fx.backend.fail_on(&fx.storage.file_path("k3.jpg"));

        let (tx, rx) = mpsc::channel();
        let summary = fx.pipeline(&optimizer).process_batch(
            &fx.store,
            vec![ok1.clone(), ok2.clone(), bad.clone()],
            Some(tx),
        );

        let mut succeeded = summary.succeeded.clone();
        succeeded.sort();
        assert_eq!(succeeded, vec![ok1.id, ok2.id]);
        assert_eq!(summary.failed, vec![bad.id]);
        assert!(!summary.all_succeeded());

        let events: Vec<ProcessEvent> = rx.into_iter().collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ProcessEvent::Started { total: 3 }));
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Failed { image_id, stage, .. } => Some((*image_id, *stage)),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![(bad.id, Stage::Resize)]);

        assert!(fx.store.image(ok1.id).unwrap().optimized);
        assert!(fx.store.image(ok2.id).unwrap().optimized);
        assert!(!fx.store.image(bad.id).unwrap().optimized);
    }

    #[test]
    fn batch_commit_keeps_disable_made_meanwhile() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let loaded = fx.add("m5.jpg", WatermarkKind::None, Dimensions::new(800, 600));

        // Admin disables the image after the worker loaded its record.
        let admin = fx.other_handle();
        let mut current = admin.image(loaded.id).unwrap();
        assert!(selector::disable_image(&admin, &mut current).unwrap().is_ok());

        let summary = fx
            .pipeline(&optimizer)
            .process_batch(&fx.store, vec![loaded.clone()], None);
        assert_eq!(summary.succeeded, vec![loaded.id]);
        assert!(selector::recompute(&fx.store).is_ok());

        let stored = admin.image(loaded.id).unwrap();
        assert!(stored.optimized);
        assert!(!stored.enabled);
        assert_eq!(admin.coaster(fx.coaster_id).unwrap().main_image_id, None);
    }

    #[test]
    fn batch_processes_duplicate_filename_once() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let image = fx.add("l4.jpg", WatermarkKind::Cc, Dimensions::new(800, 600));

        let summary = fx.pipeline(&optimizer).process_batch(
            &fx.store,
            vec![image.clone(), image.clone()],
            None,
        );

        assert_eq!(summary.succeeded, vec![image.id]);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(optimizer.calls().len(), 1);
    }

    #[test]
    fn empty_batch_is_trivially_successful() {
        let fx = Fixture::new();
        let optimizer = MockOptimizer::succeeding();
        let summary = fx.pipeline(&optimizer).process_batch(&fx.store, Vec::new(), None);
        assert_eq!(summary, BatchSummary::default());
        assert!(summary.all_succeeded());
    }
}
