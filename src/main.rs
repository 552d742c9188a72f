use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deepcheck::analyzer::ModelAnalyzer;
use deepcheck::config;
use deepcheck::orchestrator::{self, Limits, Orchestrator};
use deepcheck::server::{self, types::DetectResponse, AppState};
use log::info;

#[derive(Parser)]
#[command(name = "deepcheck")]
#[command(version, about = "Compare the faces in two images or videos to flag likely deepfakes")]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen address, overrides the config file
        #[arg(long)]
        addr: Option<String>,
    },
    /// Compare two local files and print the result as JSON
    Compare {
        /// Reference image or video
        real: PathBuf,
        /// Suspected image or video
        fake: PathBuf,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { addr } => serve(cfg, addr),
        Commands::Compare { real, fake } => compare(&cfg, &real, &fake),
        Commands::Config => open_config(cli.config),
    }
}

fn serve(cfg: config::Config, addr: Option<String>) -> Result<()> {
    let addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
    let limits = Limits::from(&cfg);
    info!(
        "sampling {} frames per video, video faces {:?}, work dir {}",
        cfg.sampling.frames,
        cfg.sampling.video_faces,
        limits.work_dir.display()
    );

    let analyzer = Arc::new(ModelAnalyzer::new(&cfg)?);
    let state = AppState::new(Orchestrator::new(analyzer, limits));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(server::serve(&addr, state))
}

fn compare(cfg: &config::Config, real: &Path, fake: &Path) -> Result<()> {
    let analyzer = ModelAnalyzer::new(cfg)?;
    let result = orchestrator::compare_paths(&analyzer, real, fake, cfg.server.max_upload_bytes)
        .with_context(|| format!("comparing {} with {}", real.display(), fake.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&DetectResponse::from(result))?
    );
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(&config_path))
            .context("Failed to write default config")?;
    }
    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
