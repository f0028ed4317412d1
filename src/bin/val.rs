//! Score an ONNX stain detector on the validation split of a dataset
//! Run with: cargo run --release --bin val -- --model best6.onnx --data data/data.yaml

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use stain_detection::core::DetectionConfig;
use stain_detection::services::evaluation::{evaluate, load_samples, val_images, DatasetConfig};
use stain_detection::YoloDetector;

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate a YOLOv8 ONNX model", long_about = None)]
struct Args {
    #[arg(long, default_value = "best6.onnx")]
    model: String,

    #[arg(long, default_value = "data/data.yaml")]
    data: PathBuf,

    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    /// Confidence floor; keep it low so the PR curve is complete
    #[arg(long, default_value_t = 0.001)]
    conf: f32,

    /// NMS IoU threshold
    #[arg(long, default_value_t = 0.7)]
    iou: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stain_detection=info,ort=off")
        .with_target(false)
        .init();

    let args = Args::parse();

    let dataset = DatasetConfig::load(&args.data)?;
    let images_dir = val_images(&dataset)?;
    info!(
        "Loading validation split from {} (dataset root {})",
        images_dir.display(),
        dataset.root.display()
    );
    let samples = load_samples(&images_dir)?;

    let detector = YoloDetector::new(DetectionConfig {
        model_path: args.model.clone(),
        confidence_threshold: args.conf,
        iou_threshold: args.iou,
        target_size: args.imgsz,
        ..DetectionConfig::default()
    })
    .with_context(|| format!("Failed to load model {}", args.model))?;

    let report = evaluate(&detector, &samples)?;
    print!("{}", report.render(&dataset.names));

    Ok(())
}
