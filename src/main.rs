use bucket_gal::config::{self, GalleryConfig, StorageBackend};
use bucket_gal::convert::{self, ConvertJob};
use bucket_gal::imaging::{ImageBackend, RustBackend};
use bucket_gal::index::IndexBuilder;
use bucket_gal::keys::ImageKey;
use bucket_gal::manifest::{ImageFilter, MANIFEST_FILENAME};
use bucket_gal::metadata::MetadataExtractor;
use bucket_gal::output;
use bucket_gal::server::{self, AppState};
use bucket_gal::store::{MemoryStore, S3Store, SharedStore};
use bucket_gal::thumbnail::{GenerationPolicy, ThumbnailCache};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bucket-gal")]
#[command(about = "Photo gallery for S3-compatible buckets")]
#[command(long_about = "\
Photo gallery for S3-compatible buckets

The bucket is the data source. Each folder under the prefix is a category,
each image inside it a photo. Previews are generated on first request and
stored next to the originals:

  gallery/
  ├── 0_preview/              # Generated previews (never listed as photos)
  │   └── cats/a.webp
  ├── cats/
  │   ├── a.jpg
  │   └── 010-sleepy_cat.jpg  # Shown as \"sleepy cat\"
  └── dogs/
      └── rex.png

Settings come from gallery.toml (see 'bucket-gal gen-config'), then from the
environment: S3_BUCKET, S3_ENDPOINT, S3_REGION, DIRECTORY_PREFIX,
IMAGE_BASE_URL, BIND_ADDR. A .env file is read first if present.")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the gallery over HTTP
    Serve,
    /// List the bucket and write the gallery manifest
    Index {
        /// Also store the manifest in the bucket under the prefix
        #[arg(long)]
        upload: bool,
        /// Generate every missing preview
        #[arg(long)]
        warm: bool,
    },
    /// Convert a local directory of images in one pass
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Overwrite outputs that already exist
        #[arg(long)]
        force: bool,
    },
    /// List objects under the prefix
    List {
        /// List the buckets visible to the credentials instead
        #[arg(long)]
        buckets: bool,
    },
    /// Resolve (and generate if needed) the preview of one key
    Thumbnail { key: String },
    /// Print a stock gallery.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Convert {
            input,
            output,
            force,
        } => {
            let config = load(&cli.config)?;
            return run_convert(&config, input, output, force);
        }
        command => {
            let config = load(&cli.config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_async(command, config))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "bucket_gal=debug,tower_http=debug"
    } else {
        "bucket_gal=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load(path: &Path) -> Result<GalleryConfig, config::ConfigError> {
    config::load_config(path, |name| std::env::var(name).ok())
}

async fn run_async(
    command: Command,
    config: GalleryConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config).await;
    let backend: Arc<dyn ImageBackend> = Arc::new(RustBackend::new());

    match command {
        Command::Serve => {
            let state = AppState::from_config(&config, store, backend);
            let app = server::router(state, config.server.static_dir.as_ref().map(PathBuf::from));
            server::serve(app, &config.server.bind).await?;
        }
        Command::Index { upload, warm } => {
            let mut builder = IndexBuilder::new(
                Arc::clone(&store),
                config.key_scheme(),
                config.url_builder(),
            );
            if config.index.with_exif {
                builder = builder.with_exif(
                    MetadataExtractor::new(Arc::clone(&store), config.exif_timeout()),
                    config.index.concurrency,
                );
            }
            let manifest = builder.build().await?;
            manifest.save(Path::new(&config.index.path))?;
            output::print_index_output(&manifest, &config.key_scheme().listing_prefix());
            println!("Manifest: {}", config.index.path);

            if upload {
                let key = builder.publish(&manifest, MANIFEST_FILENAME).await?;
                println!("Uploaded: {key}");
            }
            if warm {
                let cache = cli_cache(&config, store, backend);
                let keys = manifest
                    .images(&ImageFilter::All)
                    .into_iter()
                    .map(|image| image.key.clone())
                    .collect();
                let report = cache.warm(keys, config.index.concurrency).await;
                output::print_warm_report(&report);
            }
        }
        Command::List { buckets: true } => {
            if config.storage.backend != StorageBackend::S3 {
                return Err("--buckets needs the s3 storage backend".into());
            }
            let s3 = S3Store::connect(&config.s3_options()).await;
            output::print_buckets(&s3.list_buckets().await?);
        }
        Command::List { buckets: false } => {
            let objects = store
                .list_all(&config.key_scheme().listing_prefix())
                .await?;
            output::print_listing(&objects);
        }
        Command::Thumbnail { key } => {
            let cache = cli_cache(&config, store, backend);
            let resolution = cache.resolve(&ImageKey::new(key)).await?;
            println!("{} ({:?})", resolution.url, resolution.outcome);
        }
        Command::Convert { .. } | Command::GenConfig => {}
    }

    Ok(())
}

async fn open_store(config: &GalleryConfig) -> SharedStore {
    match config.storage.backend {
        StorageBackend::S3 => Arc::new(S3Store::connect(&config.s3_options()).await),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

/// The process exits right after, so generation must finish in-call.
fn cli_cache(
    config: &GalleryConfig,
    store: SharedStore,
    backend: Arc<dyn ImageBackend>,
) -> ThumbnailCache {
    let mut settings = config.thumbnail_settings();
    settings.policy = GenerationPolicy::Sync;
    ThumbnailCache::new(
        store,
        backend,
        config.key_scheme(),
        config.url_builder(),
        settings,
    )
}

fn run_convert(
    config: &GalleryConfig,
    input: PathBuf,
    output: PathBuf,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    init_thread_pool(&config.convert);
    let job = ConvertJob {
        input,
        output,
        options: config.convert_options(),
        force,
    };
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_convert_event(&event) {
                println!("{}", line);
            }
        }
    });
    let summary = convert::convert_dir(&job, Some(tx));
    printer.join().ok();
    println!("Done: {}", summary?);
    Ok(())
}

/// Size the rayon pool; never more threads than cores.
fn init_thread_pool(convert: &config::ConvertConfig) {
    let threads = config::effective_threads(convert);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
