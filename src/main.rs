use clap::{Parser, Subcommand};
use coaster_media::config::{self, MediaConfig};
use coaster_media::imaging::RustBackend;
use coaster_media::optimizer::JpegOptim;
use coaster_media::output;
use coaster_media::pipeline::Pipeline;
use coaster_media::selector;
use coaster_media::storage::Storage;
use coaster_media::store::Store;
use coaster_media::types::{NewImage, WatermarkKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coaster-media")]
#[command(about = "Image ingestion for the coaster catalogue")]
#[command(long_about = "\
Image ingestion for the coaster catalogue

Uploaded photos get a generated name and land in a sharded tree:

  var/images/
  ├── 8/8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg
  └── backup/8/8f52b371-1c2d-4a08-95f7-48cff34a1fc6.jpg   # pre-watermark copy

Processing runs, per image:

  resize     apply EXIF orientation, bound the longer edge to 1440px
  watermark  images tagged 'cc' get a backup, then the overlay bottom-left
  optimize   jpegoptim -s (skipped when jpegoptim is not installed)

Each coaster's main image is its oldest enabled image.

Run 'coaster-media gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage coasters
    #[command(subcommand)]
    Coaster(CoasterCommand),
    /// Store a new image for a coaster and process it
    Upload {
        /// Image file to ingest (moved, not copied)
        file: PathBuf,
        /// Owning coaster id
        #[arg(long)]
        coaster: i64,
        /// Watermark to apply: none or cc
        #[arg(long, default_value = "none")]
        watermark: WatermarkKind,
        /// Store the image disabled
        #[arg(long)]
        disabled: bool,
        /// Store only; run `process` later
        #[arg(long)]
        no_process: bool,
    },
    /// Run the pipeline on the given files, or on every unoptimized image
    Process {
        /// Stored filenames (default: all images not yet optimized)
        filenames: Vec<String>,
    },
    /// Enable an image and recompute main images
    Enable { id: i64 },
    /// Disable an image and recompute main images
    Disable { id: i64 },
    /// Delete an image file and record
    Remove { id: i64 },
    /// Recompute every coaster's main image
    RecomputeMain,
    /// List image records
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum CoasterCommand {
    /// Create a coaster
    Add { name: String },
    /// Show a coaster and its main image
    Show { id: i64 },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let media_config = config::load_config(&cli.config)?;
    let store = Store::open(&media_config.storage.database)?;
    let storage = Storage::new(&media_config.storage.base_path);
    let backend = RustBackend::new();
    let optimizer = JpegOptim::new(&media_config.optimizer.path)
        .with_timeout(media_config.optimizer.timeout());
    let transform = media_config.transform_config();
    let pipeline = Pipeline::new(&backend, &optimizer, &storage, &transform);

    match cli.command {
        Command::Coaster(CoasterCommand::Add { name }) => {
            let coaster = store.insert_coaster(&name)?;
            println!("Created coaster #{} {}", coaster.id, coaster.name);
        }
        Command::Coaster(CoasterCommand::Show { id }) => {
            let coaster = store.coaster(id)?;
            let images = store.images_for_coaster(id)?;
            output::print_coaster(&coaster, &images);
        }
        Command::Upload {
            file,
            coaster,
            watermark,
            disabled,
            no_process,
        } => {
            store.coaster(coaster)?;
            let filename = storage.upload_file(&file)?;
            let new = NewImage {
                coaster_id: coaster,
                filename: filename.clone(),
                watermark,
                enabled: !disabled,
            };
            let mut image = match store.insert_image(&new) {
                Ok(image) => image,
                Err(e) => {
                    storage.remove(&filename)?;
                    return Err(e.into());
                }
            };
            output::print_lines(&output::format_upload(&image));

            let processed = no_process || pipeline.process(&store, &mut image);
            if image.enabled {
                selector::recompute(&store).log_failure();
            }
            if !processed {
                return Err(format!("processing failed for {}", image.filename).into());
            }
        }
        Command::Process { filenames } => {
            let images = if filenames.is_empty() {
                store.pending_images()?
            } else {
                filenames
                    .iter()
                    .map(|name| -> Result<_, Box<dyn std::error::Error>> {
                        store
                            .find_by_filename(name)?
                            .ok_or_else(|| format!("unknown image: {name}").into())
                    })
                    .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?
            };

            init_thread_pool(&media_config);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let summary = pipeline.process_batch(&store, images, Some(tx));
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            output::print_lines(&output::format_batch_summary(&summary));

            // Commits bump updated_at, which feeds main-image ordering.
            if !summary.succeeded.is_empty() {
                selector::recompute(&store).log_failure();
            }
            if !summary.all_succeeded() {
                return Err(format!("{} images failed", summary.failed.len()).into());
            }
        }
        Command::Enable { id } => {
            let mut image = store.image(id)?;
            let outcome = selector::enable_image(&store, &mut image)?;
            outcome.log_failure();
            println!("Enabled #{} {}", image.id, image.filename);
        }
        Command::Disable { id } => {
            let mut image = store.image(id)?;
            let outcome = selector::disable_image(&store, &mut image)?;
            outcome.log_failure();
            println!("Disabled #{} {}", image.id, image.filename);
        }
        Command::Remove { id } => {
            let image = store.image(id)?;
            let deleted_file = storage.remove(&image.filename)?;
            store.delete_image(id)?;
            selector::recompute(&store).log_failure();
            println!(
                "Removed #{} {} ({})",
                image.id,
                image.filename,
                if deleted_file {
                    "file deleted"
                } else {
                    "file already gone"
                }
            );
        }
        Command::RecomputeMain => {
            let outcome = selector::recompute(&store);
            output::print_lines(&output::format_recompute(&outcome));
            if let selector::Recompute::Failed(e) = outcome {
                return Err(e.into());
            }
        }
        Command::List { json } => {
            let images = store.list_images()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else {
                output::print_image_list(&images);
            }
        }
        // Handled before loading config
        Command::GenConfig => {}
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(config: &MediaConfig) {
    let threads = config::effective_threads(&config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
