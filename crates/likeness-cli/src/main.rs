use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::{
    evaluate, CascadeDetector, EigenModel, SampleStore, Trainer, CANONICAL_FACE_SIZE,
};
use likeness_hw::Camera;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod pipeline;
mod preview;

use capture::{CaptureSession, CaptureSummary};
use config::Config;
use pipeline::{LivePipeline, RunSummary, Tick};
use preview::Preview;

/// Samples saved by a headless capture when `--max-samples` is not given.
const HEADLESS_SAMPLES: u32 = 10;

#[derive(Parser)]
#[command(name = "likeness", about = "Webcam face enrollment and eigenface recognition")]
struct Cli {
    /// Config file (default: ./likeness.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save face samples from the camera into the training directory
    Capture {
        /// Numeric identity written into the sample file names
        #[arg(short, long)]
        label: Option<i32>,
        /// Stop after this many samples
        #[arg(short = 'n', long)]
        max_samples: Option<u32>,
    },
    /// Train the model from all samples and save it
    Train,
    /// Recognize faces in the live camera feed
    Recognize {
        /// Stop after this many frames (at least 1)
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
        max_frames: Option<u64>,
    },
    /// Measure accuracy over a directory of labelled test images
    Evaluate {
        /// Directory of `image_<label>.jpg` files
        dir: PathBuf,
    },
    /// List video capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration");

    match cli.command {
        Commands::Capture { label, max_samples } => {
            let summary = run_capture(&config, label, max_samples)?;
            println!(
                "Saved {} sample(s) to {}",
                summary.saved,
                config.training_dir.display()
            );
        }
        Commands::Train => {
            let store = SampleStore::open(&config.training_dir, CANONICAL_FACE_SIZE)?;
            let samples = store.list(config.label_policy)?;
            trainer(&config)
                .train_and_save(&samples, &config.model_path)
                .context("training failed")?;
            println!("Training complete and model saved.");
        }
        Commands::Recognize { max_frames } => {
            let summary = run_recognize(&config, max_frames)?;
            println!(
                "Processed {} frame(s), {} face(s)",
                summary.frames, summary.faces
            );
        }
        Commands::Evaluate { dir } => run_evaluate(&config, &dir)?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn trainer(config: &Config) -> Trainer {
    Trainer::new(CANONICAL_FACE_SIZE, config.num_components)
}

fn detector(config: &Config) -> Result<CascadeDetector> {
    CascadeDetector::load(&config.cascade_path, config.cascade_params())
        .with_context(|| format!("loading face detector {}", config.cascade_path.display()))
}

fn open_camera(config: &Config) -> Result<likeness_hw::CameraFrames> {
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("opening camera {}", config.camera_device))?;
    Ok(camera.into_frames()?)
}

fn run_capture(
    config: &Config,
    label: Option<i32>,
    max_samples: Option<u32>,
) -> Result<CaptureSummary> {
    let store = SampleStore::open(&config.training_dir, CANONICAL_FACE_SIZE)?;
    let mut preview = open_preview("Capture")?;

    let mut session = CaptureSession::new(detector(config)?, &store).with_label(label);
    let summary = if cfg!(feature = "highgui") {
        println!("Press any key to save a sample, ESC to quit.");
        session = session.with_max_samples(max_samples);
        session.run(
            open_camera(config)?,
            &mut preview,
            capture::trigger_on_key,
            pipeline::stop_on_escape,
        )?
    } else {
        session = session.with_max_samples(Some(max_samples.unwrap_or(HEADLESS_SAMPLES)));
        session.run(
            open_camera(config)?,
            &mut preview,
            capture::trigger_always,
            |_: &Tick| false,
        )?
    };
    Ok(summary)
}

fn run_recognize(config: &Config, max_frames: Option<u64>) -> Result<RunSummary> {
    let store = SampleStore::open(&config.training_dir, CANONICAL_FACE_SIZE)?;
    let mut live: LivePipeline<_, EigenModel> =
        LivePipeline::new(detector(config)?, CANONICAL_FACE_SIZE, config.threshold_distance);
    live.load_or_train(&config.model_path, &store, config.label_policy, &trainer(config))?;
    tracing::debug!(state = ?live.state(), "model ready");

    let mut preview = open_preview("Face Recognition")?;
    let stop = |tick: &Tick| {
        pipeline::stop_on_escape(tick) || max_frames.is_some_and(|max| tick.iteration + 1 >= max)
    };
    Ok(live.run(open_camera(config)?, &mut preview, stop)?)
}

fn run_evaluate(config: &Config, dir: &Path) -> Result<()> {
    let model = EigenModel::load(&config.model_path)
        .with_context(|| format!("loading model {}", config.model_path.display()))?;
    let mut detector = detector(config)?;

    let result = evaluate(dir, &mut detector, &model, model.face_size())?;
    println!(
        "Accuracy: {:.2}% ({}/{})",
        result.accuracy(),
        result.correct,
        result.total
    );
    Ok(())
}

#[cfg(feature = "highgui")]
fn open_preview(window: &str) -> Result<Box<dyn Preview>> {
    Ok(Box::new(preview::HighguiPreview::new(window)?))
}

#[cfg(not(feature = "highgui"))]
fn open_preview(window: &str) -> Result<Box<dyn Preview>> {
    tracing::info!(window, "no display support built in, running headless");
    Ok(Box::new(preview::HeadlessPreview::new()))
}
