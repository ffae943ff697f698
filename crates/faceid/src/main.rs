use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceid_core::{Gallery, LayerRegistry, SiameseModel, Verifier};
use faceid_hw::Camera;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod session;

use config::{Config, PROBE_ROI};
use session::Session;

#[derive(Parser)]
#[command(
    name = "faceid",
    version,
    about = "Verify the face in front of the webcam against a reference gallery"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live preview; press Enter to verify, Ctrl+C to quit
    Run,
    /// Capture one probe and verify it
    Verify {
        /// Verify an existing image instead of capturing from the camera
        #[arg(short, long)]
        probe: Option<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List reference images in scoring order
    Gallery,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Run => run(&config).await,
        Commands::Verify { probe, json } => verify_once(&config, probe.as_deref(), json),
        Commands::Gallery => list_gallery(&config),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn load_verifier(config: &Config) -> Result<Verifier<SiameseModel>> {
    config.validate()?;
    let model = SiameseModel::load(&config.model_path, &LayerRegistry::default())
        .with_context(|| format!("failed to load model {}", config.model_path.display()))?;
    tracing::info!(
        path = %config.model_path.display(),
        layout = %model.describe(),
        "similarity model loaded"
    );
    Ok(Verifier::new(
        model,
        config.gallery_dir.clone(),
        config.probe_path.clone(),
    ))
}

fn open_session(config: &Config) -> Result<Session<Camera, SiameseModel>> {
    let verifier = load_verifier(config)?;
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    tracing::info!(
        device = %camera.device_path,
        format = ?camera.pixel_format(),
        width = camera.width,
        height = camera.height,
        "camera streaming"
    );
    let mut session = Session::new(camera, verifier, PROBE_ROI);
    session.warm_up(config.warmup_frames);
    Ok(session)
}

async fn run(config: &Config) -> Result<()> {
    let mut session = open_session(config)?;
    tracing::info!(
        refresh_hz = config.refresh_hz,
        gallery = %config.gallery_dir.display(),
        "faceid ready"
    );

    println!("{}", session.label());
    println!("Press Enter to verify, Ctrl+C to quit.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    session::run_loop(&mut session, config.refresh_interval(), stdin).await?;

    tracing::info!("faceid shutting down");
    Ok(())
}

fn verify_once(config: &Config, probe: Option<&Path>, json: bool) -> Result<()> {
    let report = match probe {
        Some(path) => load_verifier(config)?.verify_file(path)?,
        None => open_session(config)?.verify()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.verification.label());
    }
    Ok(())
}

fn list_gallery(config: &Config) -> Result<()> {
    let gallery = Gallery::scan(&config.gallery_dir)?;
    if gallery.is_empty() {
        println!("No reference images in {}", gallery.dir().display());
        return Ok(());
    }
    for entry in gallery.entries() {
        println!("{}", entry.display());
    }
    println!("{} reference image(s)", gallery.len());
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }
}
