//! Subcommand implementations.

use crate::config::FileConfig;
use crate::{CommonArgs, DetectArgs};
use image::{GrayImage, Luma};
use manga_text_detect::core::config::Device;
use manga_text_detect::core::errors::DetectorError;
use manga_text_detect::detector::{DetectorKind, DetectorRegistry};
use manga_text_detect::domain::{DetectionRequest, DetectionResult, OrientedBox, ProbabilityMask};
use manga_text_detect::pipeline::TextDetectionPipeline;
use manga_text_detect::utils::load_image;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Serialize)]
struct ImageResponse<'a> {
    image: &'a Path,
    width: u32,
    height: u32,
    boxes: &'a [OrientedBox],
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<PathBuf>,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    image: &'a Path,
    error: String,
}

fn load_config(common: &CommonArgs) -> CliResult<FileConfig> {
    let mut config = match &common.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    if let Some(dir) = &common.model_dir {
        config.registry.model_dir = dir.clone();
    }
    Ok(config)
}

/// Command-line flags take precedence over the configuration file.
fn apply_overrides(config: &mut FileConfig, args: &DetectArgs) -> CliResult<()> {
    let params = &mut config.params;
    if let Some(device) = &args.device {
        params.device = device.parse::<Device>()?;
    }
    if let Some(v) = args.detect_size {
        params.detect_size = v;
    }
    if let Some(v) = args.text_threshold {
        params.text_threshold = v;
    }
    if let Some(v) = args.box_threshold {
        params.box_threshold = v;
    }
    if let Some(v) = args.unclip_ratio {
        params.unclip_ratio = v;
    }
    params.invert |= args.invert;
    params.gamma_correct |= args.gamma_correct;
    params.rotate |= args.rotate;
    params.auto_rotate |= args.auto_rotate;
    params.verbose |= args.verbose;

    let hybrid = &mut config.hybrid;
    hybrid.enabled |= args.hybrid;
    if let Some(v) = args.hybrid_conf {
        hybrid.conf = v;
    }
    if let Some(v) = args.hybrid_iou {
        hybrid.iou = v;
    }
    Ok(())
}

/// Runs `manga-detect detect`. Fails only when every image failed.
pub fn run_detect(args: DetectArgs) -> CliResult<()> {
    let start = Instant::now();
    let kind: DetectorKind = args.detector.parse()?;
    let mut config = load_config(&args.common)?;
    apply_overrides(&mut config, &args)?;

    if config.registry.parallel.install_global_thread_pool()? {
        info!(
            "Using {} worker threads",
            config.registry.parallel.max_threads.unwrap_or_default()
        );
    }

    info!("Loading {} images...", args.image.len());
    let mut requests = Vec::with_capacity(args.image.len());
    for path in &args.image {
        let image = load_image(path)?;
        requests.push(
            DetectionRequest::new(image)
                .with_params(config.params.clone())
                .with_hybrid(config.hybrid.clone()),
        );
    }
    info!("Loaded in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    let pipeline = TextDetectionPipeline::new(DetectorRegistry::new(config.registry));
    let detect_start = Instant::now();
    let results = pipeline.detect_batch(kind, &requests);
    let processing_ms = detect_start.elapsed().as_secs_f64() * 1000.0;
    info!("Detection completed in {:.2}ms", processing_ms);

    if let Some(dir) = &args.mask_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut failures = 0usize;
    let mut json = Vec::with_capacity(results.len());
    for ((path, request), result) in args.image.iter().zip(&requests).zip(&results) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("Detection failed for {}: {}", path.display(), e);
                failures += 1;
                json.push(serde_json::to_value(ErrorResponse {
                    image: path,
                    error: e.to_string(),
                })?);
                if args.output != "json" {
                    println!("{}: error: {}", path.display(), e);
                }
                continue;
            }
        };

        let mask = match &args.mask_dir {
            Some(dir) => Some(write_masks(dir, path, result)?),
            None => None,
        };
        let (width, height) = request.dimensions();
        let response = ImageResponse {
            image: path,
            width,
            height,
            boxes: &result.boxes,
            mask,
        };
        if args.output == "json" {
            json.push(serde_json::to_value(&response)?);
        } else {
            print_pretty(&response);
        }
    }

    if args.output == "json" {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "processing_time_ms": processing_ms,
                "images": json,
            }))?
        );
    }

    if failures == requests.len() && failures > 0 {
        return Err(format!("detection failed for all {failures} images").into());
    }
    Ok(())
}

fn print_pretty(response: &ImageResponse<'_>) {
    println!("\n=== {} ===", response.image.display());
    println!("Image size: {}x{}", response.width, response.height);
    println!("Text regions: {}", response.boxes.len());
    for (idx, b) in response.boxes.iter().enumerate() {
        let a = b.aabb();
        println!(
            "[{}] {:.1}% {:?} [{:.1}, {:.1}] - [{:.1}, {:.1}]{}",
            idx + 1,
            b.score() * 100.0,
            b.orientation(),
            a.x_min,
            a.y_min,
            a.x_max,
            a.y_max,
            b.text().map(|t| format!(" ({t})")).unwrap_or_default()
        );
    }
    if let Some(mask) = &response.mask {
        println!("Mask: {}", mask.display());
    }
}

fn mask_to_gray(mask: &ProbabilityMask) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([(mask.get_pixel(x, y)[0].clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

fn write_masks(dir: &Path, image: &Path, result: &DetectionResult) -> CliResult<PathBuf> {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mask_path = dir.join(format!("{stem}_mask.png"));
    mask_to_gray(&result.raw_mask)
        .save(&mask_path)
        .map_err(DetectorError::from)?;
    if let Some(debug) = &result.debug_mask {
        debug
            .save(dir.join(format!("{stem}_debug.png")))
            .map_err(DetectorError::from)?;
    }
    Ok(mask_path)
}

/// Runs `manga-detect prepare`: downloads weights without opening a session.
pub fn run_prepare(detector: &str, common: &CommonArgs) -> CliResult<()> {
    let kind: DetectorKind = detector.parse()?;
    let config = load_config(common)?;
    info!(
        "Preparing '{}' in {}",
        kind,
        config.registry.model_dir.display()
    );
    let start = Instant::now();
    DetectorRegistry::new(config.registry).prepare(kind)?;
    info!(
        "'{}' ready in {:.2}ms",
        kind,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}
