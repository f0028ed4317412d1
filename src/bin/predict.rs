//! Detect stains in a single image and save an annotated copy
//! Run with: cargo run --release --bin predict -- --image shirt.jpg

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use stain_detection::core::DetectionConfig;
use stain_detection::utils::{draw_detections, to_yolo_labels};
use stain_detection::{ObjectDetector, YoloDetector};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the stain detector on one image", long_about = None)]
struct Args {
    #[arg(long, default_value = "best6.onnx")]
    model: String,

    #[arg(long, required = true)]
    image: PathBuf,

    /// Output root; results go to <save-dir>/result and <save-dir>/labels
    #[arg(long = "save-dir", default_value = "runs/predict")]
    save_dir: PathBuf,

    /// Do not open the result in an image viewer
    #[arg(long = "no-show")]
    no_show: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stain_detection=info,ort=off")
        .with_target(false)
        .init();

    let args = Args::parse();

    let img = image::open(&args.image)
        .with_context(|| format!("Failed to open image {}", args.image.display()))?;

    let detector = YoloDetector::new(DetectionConfig {
        model_path: args.model.clone(),
        ..DetectionConfig::default()
    })
    .with_context(|| format!("Failed to load model {}", args.model))?;

    let detections = detector.detect(&img)?;
    info!("Detected {} regions", detections.len());
    for d in &detections {
        info!(
            "  class={} conf={:.3} box=[{:.0}, {:.0}, {:.0}, {:.0}]",
            d.class_id, d.confidence, d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]
        );
    }

    let stem = args
        .image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("prediction");

    let result_dir = args.save_dir.join("result");
    let labels_dir = args.save_dir.join("labels");
    fs::create_dir_all(&result_dir)
        .with_context(|| format!("Failed to create {}", result_dir.display()))?;
    fs::create_dir_all(&labels_dir)
        .with_context(|| format!("Failed to create {}", labels_dir.display()))?;

    let result_path = result_dir.join(format!("{}.jpg", stem));
    draw_detections(&img, &detections, 3)
        .save(&result_path)
        .with_context(|| format!("Failed to write {}", result_path.display()))?;

    let label_path = labels_dir.join(format!("{}.txt", stem));
    fs::write(&label_path, to_yolo_labels(&detections, img.width(), img.height()))
        .with_context(|| format!("Failed to write {}", label_path.display()))?;

    println!("Result saved: {}", result_path.display());

    if !args.no_show {
        if let Err(e) = open_in_viewer(&result_path) {
            warn!("Could not open image viewer: {:#}", e);
        }
    }

    Ok(())
}

fn open_in_viewer(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    };

    let status = command.status().context("Failed to launch viewer")?;
    anyhow::ensure!(status.success(), "viewer exited with {}", status);
    Ok(())
}
