use clap::{Parser, Subcommand};
use picker_compress::cache::CompressionCache;
use picker_compress::cache_dir::CacheDirectory;
use picker_compress::compressor::Compressor;
use picker_compress::config::{self, CompressConfig};
use picker_compress::executor::TaskExecutor;
use picker_compress::imaging::RustBackend;
use picker_compress::imaging::rust_backend::has_supported_extension;
use picker_compress::output;
use picker_compress::request::{CompressionOutcome, CompressionRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "picker-compress")]
#[command(about = "Compress picked photos into bounded-size cached JPEGs")]
#[command(long_about = "\
Compress picked photos into bounded-size cached JPEGs

Each source is resized for display, rotated upright from its EXIF
orientation, and re-encoded at decreasing JPEG quality until it fits the
size budget. Results are cached by source path:

  <cache>/boxing/.compress/compress-<key>.jpg

Sources already under budget are used as-is. Images with an aspect ratio
of 3:1 or more always get the larger panoramic budget.

Set RUST_LOG=debug to see every decision the compressor makes.
Run 'picker-compress gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Cache root directory (overrides the config file and the platform default)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress files, or every supported image under directories
    Compress {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Size budget in bytes for ordinary images [default: from config]
        #[arg(long)]
        budget: Option<u64>,

        /// Print one JSON object per source
        #[arg(long)]
        json: bool,
    },
    /// Print the cache key and output path for sources
    Key {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Key { ref paths } => {
            let config = load_config(&cli)?;
            let cache_dir = CacheDirectory::resolve(config.cache_root_provider().as_ref())?;
            let addresser = cache_dir.addresser();
            for path in paths {
                output::print_key(&absolute(path), &addresser);
            }
        }
        Command::Compress {
            ref paths,
            budget,
            json,
        } => {
            let config = load_config(&cli)?;
            run_compress(&config, paths, budget, json)?;
        }
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<CompressConfig, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_root = Some(dir.clone());
    }
    Ok(config)
}

fn run_compress(
    config: &CompressConfig,
    paths: &[PathBuf],
    budget: Option<u64>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache_dir = CacheDirectory::resolve(config.cache_root_provider().as_ref())?;
    let compressor = Compressor::new(RustBackend::new(), cache_dir.addresser())
        .with_budgets(config.budget.normal(), config.budget.panoramic());
    let cache = Arc::new(CompressionCache::new(compressor));
    let executor = Arc::new(TaskExecutor::new(config::effective_threads(
        &config.processing,
    ))?);
    let request = CompressionRequest::new(
        Arc::clone(&cache),
        Arc::clone(&executor),
        config.budget.request_max_bytes,
    );
    let budget = budget.unwrap_or(config.budget.request_max_bytes);

    let sources = collect_sources(paths);
    log::debug!(
        "compressing {} sources with {} workers, budget {}",
        sources.len(),
        executor.workers(),
        budget
    );

    let mut pending = 0usize;
    for source in sources {
        let shown = source.clone();
        let submitted = request.compress_in_background(source.clone(), budget, move |outcome| {
            output::print_outcome(&shown, &outcome, json);
        });
        match submitted {
            Ok(()) => pending += 1,
            Err(e) => {
                log::warn!("could not schedule {}: {}", source.display(), e);
                output::print_outcome(&source, &CompressionOutcome::Failure, json);
            }
        }
    }

    while pending > 0 {
        let delivered = request
            .main_context()
            .run_pending_timeout(Duration::from_millis(100));
        pending = pending.saturating_sub(delivered);
    }
    executor.shutdown();

    if !json {
        output::print_stats(&cache.stats());
    }
    Ok(())
}

/// Expand directories into the supported images beneath them, in name order.
///
/// Explicit file arguments are kept as given so unsupported files are
/// reported as failures rather than silently skipped.
fn collect_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            sources.extend(
                walkdir::WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file() && has_supported_extension(e.path()))
                    .map(|e| absolute(e.path())),
            );
        } else {
            sources.push(absolute(path));
        }
    }
    sources
}

/// Cache keys hash the path, so `./a.jpg` and `/abs/a.jpg` must agree.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
