//! getchirps - Build a bird recording corpus
//!
//! Usage:
//!   getchirps                                  # Uses chirps.toml if present, else defaults
//!   getchirps --config <path>                  # Uses custom config
//!   getchirps --num-birds 10 --convert false   # Download only, 10 per category

use anyhow::{Context, Result};
use chirps_cli::output::print_json_report;
use chirps_core::{CorpusConfig, CorpusOrchestrator};
use clap::Parser;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "chirps.toml";

#[derive(Parser, Debug)]
#[command(name = "getchirps")]
#[command(about = "Download recordings per category and cut their loudest window", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses chirps.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of recordings to fetch per category
    #[arg(short = 'n', long)]
    num_birds: Option<usize>,

    /// Download recordings (true/false)
    #[arg(long)]
    download: Option<bool>,

    /// Convert long recordings to short ones (true/false)
    #[arg(long)]
    convert: Option<bool>,

    /// Root of the corpus tree
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    chirps_cli::init_logging(args.verbose);

    let config = load_config(&args)?;
    log::info!(
        "Corpus at {}: {} categories, up to {} recordings each",
        config.corpus.data_dir.display(),
        config.categories.len(),
        config.corpus.max_recordings
    );

    let orchestrator = CorpusOrchestrator::new(config).context("Invalid configuration")?;
    let report = orchestrator.run().await.context("Corpus run failed")?;

    print_json_report(&report);
    Ok(())
}

fn load_config(args: &Args) -> Result<CorpusConfig> {
    let mut config = match &args.config {
        Some(path) => CorpusConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            log::info!("Using {}", DEFAULT_CONFIG);
            CorpusConfig::load(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG))?
        }
        None => CorpusConfig::default(),
    };

    if let Some(num_birds) = args.num_birds {
        config.corpus.max_recordings = num_birds;
    }
    if let Some(download) = args.download {
        config.corpus.download = download;
    }
    if let Some(convert) = args.convert {
        config.corpus.convert = convert;
    }
    if let Some(data_dir) = &args.data_dir {
        config.corpus.data_dir = data_dir.clone();
    }

    Ok(config)
}
