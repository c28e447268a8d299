//! SDKWork-VC CLI - Command-line interface for the voice conversion core
//!
//! Covers everything that does not need a concrete network:
//! - Fetching pretrained assets
//! - Listing and inspecting checkpoints
//! - Resolving per-speaker index files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sdkwork_vc::checkpoint::CheckpointRecord;
use sdkwork_vc::hub::{AssetCatalogue, AssetFetcher};
use sdkwork_vc::inference::{list_models, ArtifactResolver, PreparedCheckpoint};
use sdkwork_vc::{EngineConfig, Precision, VERSION};

/// SDKWork-VC - Retrieval-based voice conversion core
#[derive(Parser, Debug)]
#[command(name = "sdkwork-vc")]
#[command(author, version, about, long_about = None)]
#[command(long_about = "
SDKWork-VC manages voice-conversion checkpoints and their assets.

Examples:
  # Download pretrained weights and embedders
  sdkwork-vc download

  # List checkpoints under models/checkpoints
  sdkwork-vc models

  # Show the normalized configuration of a checkpoint
  sdkwork-vc inspect singer.pth

  # Show which index files speaker 2 would use
  sdkwork-vc resolve-index singer.pth 2
")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Models root (overrides the configuration)
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Output directory (overrides the configuration)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Use CUDA when available
    #[arg(long, global = true)]
    gpu: bool,

    /// Use FP16 precision
    #[arg(long, global = true)]
    half: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download missing pretrained weights and embedder files
    Download,

    /// List available checkpoints
    Models,

    /// Read a checkpoint and print its normalized configuration
    Inspect {
        /// Checkpoint file name under <models>/checkpoints
        model: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the index and vector-store paths used for a speaker
    ResolveIndex {
        /// Checkpoint file name
        model: String,

        /// Speaker id
        speaker_id: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("SDKWork-VC v{}", VERSION);
    let config = build_config(&cli)?;

    match &cli.command {
        Commands::Download => run_download(&config),
        Commands::Models => run_models(&config),
        Commands::Inspect { model, json } => run_inspect(&config, model, *json),
        Commands::ResolveIndex { model, speaker_id } => {
            run_resolve_index(&config, model, *speaker_id)
        }
    }
}

fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config = config.with_env_overrides()?;

    if let Some(dir) = &cli.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if cli.gpu {
        config.use_gpu = true;
    }
    if cli.half {
        config.precision = Precision::Half;
    }
    Ok(config)
}

fn run_download(config: &EngineConfig) -> Result<()> {
    let catalogue = AssetCatalogue::from_config(config);
    let missing = catalogue.missing().len();
    if missing == 0 {
        println!("All {} assets present in {}", catalogue.len(), config.models_dir.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let start = Instant::now();
    let pb = create_progress_bar(&format!("Downloading {} assets...", missing));
    let result = runtime.block_on(AssetFetcher::new().ensure_assets_present(&catalogue));
    match result {
        Ok(report) => {
            pb.finish_with_message(format!(
                "Fetched {} assets in {:.1}s ({} already present)",
                report.fetched.len(),
                start.elapsed().as_secs_f32(),
                report.skipped.len()
            ));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Download failed");
            Err(e.into())
        }
    }
}

fn run_models(config: &EngineConfig) -> Result<()> {
    let models = list_models(&config.models_dir)?;
    if models.is_empty() {
        warn!("No checkpoints in {}", config.checkpoints_dir().display());
        return Ok(());
    }
    for model in models {
        println!("{}", model);
    }
    Ok(())
}

fn run_inspect(config: &EngineConfig, model: &str, json: bool) -> Result<()> {
    let path = config.checkpoints_dir().join(model);
    let pb = create_progress_bar(&format!("Reading {}...", model));
    let record = CheckpointRecord::load(&path)?;
    let info = PreparedCheckpoint::prepare(model, record, false)?.info();
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Model:          {}", info.model_name);
    println!("Variant:        {}", info.variant);
    println!("Sample rate:    {} Hz", info.sample_rate);
    println!("Speakers:       {}", info.speaker_count);
    println!("Embedder:       {}", info.embedder_name);
    if let Some(version) = &info.version {
        println!("Version:        {}", version);
    }
    println!("Emb channels:   {}", info.config.emb_channels);
    println!("Hop length:     {}", info.config.hop_length());
    println!(
        "Dropped:        {} training tensors, {} unknown",
        info.dropped_training_tensors, info.discarded_unknown_tensors
    );
    Ok(())
}

fn run_resolve_index(config: &EngineConfig, model: &str, speaker_id: u32) -> Result<()> {
    let resolver = ArtifactResolver::new(config.checkpoints_dir());
    let paths = resolver.resolve_both(model, speaker_id);
    println!("index:   {}", paths.index.display());
    println!("vectors: {}", paths.vectors.display());
    if !paths.is_complete() {
        warn!("Index files missing; conversion would skip index refinement");
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already installed");
    }
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
