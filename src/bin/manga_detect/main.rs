//! manga-detect
//!
//! Detects text regions on comic pages from the command line.
//!
//! # Usage
//!
//! ```bash
//! manga-detect detect --image page.png --model-dir models
//! manga-detect detect --image p1.png --image p2.png --hybrid --output json
//! manga-detect prepare --detector yolo_obb --model-dir models
//! ```

mod cli;
mod config;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "manga-detect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Text region detection for comic pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect text regions in one or more images
    Detect(DetectArgs),
    /// Download the weights a detector needs without running it
    Prepare {
        /// Detector to prepare (default, none, yolo_obb)
        #[arg(long, default_value = "yolo_obb")]
        detector: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Options shared by every subcommand.
#[derive(Args)]
pub struct CommonArgs {
    /// Directory holding model files
    #[arg(long = "model-dir", env = "MANGA_DETECT_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// TOML file with [params], [hybrid] and [registry] tables
    #[arg(long, env = "MANGA_DETECT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Image file to process; repeat for a batch
    #[arg(long, required = true)]
    pub image: Vec<PathBuf>,

    /// Detector to use (default, none, yolo_obb)
    #[arg(long, default_value = "default", env = "MANGA_DETECT_DETECTOR")]
    pub detector: String,

    /// Device to use (cpu, cuda, cuda:0, directml, coreml)
    #[arg(long, env = "MANGA_DETECT_DEVICE")]
    pub device: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Long side the heat-map detector resizes to
    #[arg(long = "detect-size")]
    pub detect_size: Option<u32>,

    #[arg(long = "text-threshold")]
    pub text_threshold: Option<f32>,

    #[arg(long = "box-threshold")]
    pub box_threshold: Option<f32>,

    #[arg(long = "unclip-ratio")]
    pub unclip_ratio: Option<f32>,

    /// Invert colors before detection
    #[arg(long)]
    pub invert: bool,

    /// Apply gamma correction before detection
    #[arg(long = "gamma-correct")]
    pub gamma_correct: bool,

    /// Rotate the image by 90 degrees before detection
    #[arg(long)]
    pub rotate: bool,

    /// Retry rotated when most boxes are horizontal
    #[arg(long = "auto-rotate")]
    pub auto_rotate: bool,

    /// Also run the OBB detector and merge its boxes
    #[arg(long)]
    pub hybrid: bool,

    #[arg(long = "hybrid-conf")]
    pub hybrid_conf: Option<f32>,

    #[arg(long = "hybrid-iou")]
    pub hybrid_iou: Option<f32>,

    /// Keep the binarized detection map
    #[arg(long)]
    pub verbose: bool,

    /// Directory to write probability masks into
    #[arg(long = "mask-dir")]
    pub mask_dir: Option<PathBuf>,

    /// Output format (json, pretty)
    #[arg(long, default_value = "pretty")]
    pub output: String,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    manga_text_detect::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect(args) => cli::run_detect(args)?,
        Commands::Prepare { detector, common } => cli::run_prepare(&detector, &common)?,
    }

    Ok(())
}
