use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use itertools::Itertools;
use onnx_detect::image_utils::annotate::draw_detections;
use onnx_detect::image_utils::image_io::{collect_image_paths, read_image_as_rgba8};
use onnx_detect::object_detection::accelerator;
use onnx_detect::{Detection, DetectionConfig, DetectionResult, ModelKind, RgbaImageView, Runtime};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Run YOLO detection over images or directories and print the detections as JSON lines.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct DetectArgs {
    /// Image files or directories (searched recursively).
    #[arg(required_unless_present = "list_providers")]
    inputs: Vec<PathBuf>,

    /// Path to the ONNX model. Overrides `model_path` from the config file.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Optional settings JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,

    /// Override the NMS IoU threshold.
    #[arg(long)]
    nms: Option<f32>,

    /// Treat the model as a pose model.
    #[arg(long)]
    pose: bool,

    /// Keypoints per detection for pose models.
    #[arg(long, default_value_t = 17)]
    keypoints: usize,

    /// Request the CUDA execution provider.
    #[arg(long)]
    gpu: bool,

    /// Images per inference call.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Directory to write annotated copies of the images to.
    #[arg(long)]
    annotate: Option<PathBuf>,

    /// Print the available execution providers and exit.
    #[arg(long)]
    list_providers: bool,
}

#[derive(Debug, Serialize)]
struct ImageDetections<'a> {
    path: String,
    width: u32,
    height: u32,
    detections: &'a [Detection],
    #[serde(skip_serializing_if = "Option::is_none")]
    annotated: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = DetectArgs::parse();

    if args.list_providers {
        let report = accelerator::gpu_report();
        println!(
            "{}",
            accelerator::providers_string(&accelerator::available_providers())
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let config = load_config(&args)?;
    let model_path = config
        .model_path
        .clone()
        .context("no model given (use --model or model_path in the config file)")?;
    if let Some(dir) = args.annotate.as_ref() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create annotation directory {}", dir.display()))?;
    }

    let runtime = Runtime::new();
    runtime.open()?;
    let mut model = runtime
        .load_model(&model_path, config.use_gpu)
        .with_context(|| format!("failed to load model {}", model_path.display()))?;
    let (input_width, input_height) = model.input_size();
    info!(
        model = %model_path.display(),
        input_width,
        input_height,
        "model ready"
    );

    let paths = collect_image_paths(&args.inputs);
    if paths.is_empty() {
        anyhow::bail!("no images found in the given inputs");
    }
    info!(images = paths.len(), batch_size = config.batch_size, "processing");

    for chunk in &paths.iter().chunks(config.batch_size.max(1)) {
        let loaded: Vec<(&PathBuf, RgbaImage)> = chunk
            .filter_map(|path| match read_image_as_rgba8(path) {
                Ok(image) if image.width() > 1 && image.height() > 1 => Some((path, image)),
                Ok(image) => {
                    warn!(path = %path.display(), width = image.width(), height = image.height(), "image too small, skipping");
                    None
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read image, skipping");
                    None
                }
            })
            .collect();
        if loaded.is_empty() {
            continue;
        }

        let views: Vec<RgbaImageView> = loaded
            .iter()
            .map(|(_, image)| RgbaImageView::new(image.as_raw(), image.width(), image.height()))
            .collect();
        let batch = model.detect_batch(&views, &config.params)?;
        if batch.keypoint_allocation_failures() > 0 {
            warn!(
                failures = batch.keypoint_allocation_failures(),
                "some detections lost their keypoints"
            );
        }

        for ((path, image), result) in loaded.into_iter().zip(batch.into_results()) {
            report_image(path, image, &result, args.annotate.as_deref())?;
        }
    }
    runtime.close();
    Ok(())
}

fn load_config(args: &DetectArgs) -> Result<DetectionConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => DetectionConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DetectionConfig::default(),
    };
    if let Some(model) = args.model.as_ref() {
        config.model_path = Some(model.clone());
    }
    if let Some(confidence) = args.confidence {
        config.params.confidence_threshold = confidence;
    }
    if let Some(nms) = args.nms {
        config.params.nms_threshold = nms;
    }
    if args.pose {
        config.params.model_kind = ModelKind::Pose;
        config.params.num_keypoints = args.keypoints;
    }
    if args.gpu {
        config.use_gpu = true;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config)
}

fn report_image(
    path: &Path,
    mut image: RgbaImage,
    result: &DetectionResult,
    annotate_dir: Option<&Path>,
) -> Result<()> {
    info!(path = %path.display(), detections = result.len(), "detected");
    let annotated = match annotate_dir {
        Some(dir) => {
            draw_detections(&mut image, &result.detections);
            let file_name = path
                .file_stem()
                .map(|stem| format!("{}.png", stem.to_string_lossy()))
                .unwrap_or_else(|| "annotated.png".to_string());
            let output_path = dir.join(file_name);
            image
                .save(&output_path)
                .with_context(|| format!("failed to save {}", output_path.display()))?;
            Some(output_path.display().to_string())
        }
        None => None,
    };
    let record = ImageDetections {
        path: path.display().to_string(),
        width: image.width(),
        height: image.height(),
        detections: &result.detections,
        annotated,
    };
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}
