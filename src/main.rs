//! # Portfolio Image Optimizer - Main Entry Point
//!
//! Punto di ingresso dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (file JSON + override da CLI)
//! - Avvio del batch oppure dell'elenco dei file troppo grandi
//!
//! ## Esempio di utilizzo:
//! ```bash
//! portfolio-image-optimizer --quality 80 --max-width 1600
//! portfolio-image-optimizer --list-large 500
//! portfolio-image-optimizer --dry-run --json
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portfolio_image_optimizer::{
    image_processor::ImageProcessor, json_output::JsonMessage, BatchOptimizer, OptimizationConfig,
    SiteLayout,
};

#[derive(Parser)]
#[command(name = "portfolio-image-optimizer")]
#[command(about = "Optimize portfolio images in place, with backups and WebP copies")]
struct Args {
    /// Site root containing the assets/ directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Show what would be done without modifying any file
    #[arg(long)]
    dry_run: bool,

    /// JPEG quality (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Maximum image width in pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// List images larger than this many KB and exit
    #[arg(long, value_name = "KB")]
    list_large: Option<u64>,

    /// WebP quality (1-100)
    #[arg(long)]
    webp_quality: Option<u8>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Also emit fixed-width responsive variants
    #[arg(long)]
    responsive: bool,

    /// Load settings from a JSON file (flags override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output newline-delimited JSON events for programmatic use
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    async fn build_config(&self) -> Result<OptimizationConfig> {
        let mut config = match self.config {
            Some(ref path) => OptimizationConfig::from_file(path).await?,
            None => OptimizationConfig::default(),
        };

        if let Some(quality) = self.quality {
            config.jpeg_quality = quality;
        }
        if let Some(max_width) = self.max_width {
            config.max_width = max_width;
        }
        if let Some(webp_quality) = self.webp_quality {
            config.webp_quality = webp_quality;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.responsive |= self.responsive;
        config.json_output |= self.json;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the verbose flag when set
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut json_output = args.json;
    if let Err(e) = run(&args, &mut json_output).await {
        if json_output {
            JsonMessage::error(format!("{:#}", e)).emit();
        }
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// `json_output` is updated as soon as the configuration is known, so the
/// caller reports errors in the format the run was using.
async fn run(args: &Args, json_output: &mut bool) -> Result<()> {
    ImageProcessor::check_dependencies()?;

    let config = args.build_config().await?;
    *json_output = config.json_output;
    let optimizer = BatchOptimizer::new(config, SiteLayout::for_site(&args.root))?;

    if let Some(threshold_kb) = args.list_large {
        let large = optimizer.list_oversized(threshold_kb)?;
        if *json_output {
            for (path, size) in large {
                JsonMessage::LargeFile { path, size }.emit();
            }
        } else {
            for line in optimizer.format_listing(threshold_kb, &large) {
                println!("{}", line);
            }
        }
        return Ok(());
    }

    let stats = optimizer.run_batch(args.dry_run).await?;
    if stats.errors > 0 {
        info!("{} file(s) failed, see the log above", stats.errors);
    }

    Ok(())
}
