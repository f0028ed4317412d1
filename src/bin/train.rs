//! Train the stain detector with the Ultralytics CLI and keep the best weights
//! Run with: cargo run --bin train -- --epochs 50 --export-onnx

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use stain_detection::services::training::{promote_best_weights, WeightsOutcome};
use stain_detection::{TrainOptions, YoloCli};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a YOLOv8 stain detector", long_about = None)]
struct Args {
    /// Starting checkpoint
    #[arg(long, default_value = "yolov8m.pt")]
    model: String,

    /// Dataset config
    #[arg(long, default_value = "data/data.yaml")]
    data: String,

    #[arg(long, default_value_t = 50)]
    epochs: u32,

    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    #[arg(long, default_value_t = 8)]
    batch: u32,

    /// Run directory name under runs/detect
    #[arg(long = "run_name", alias = "run-name", default_value = "cloth_stain_detector")]
    run_name: String,

    /// Where to copy the best checkpoint
    #[arg(long, default_value = "./best6.pt")]
    output: PathBuf,

    /// Ultralytics executable
    #[arg(long = "yolo-bin", default_value = "yolo")]
    yolo_bin: String,

    /// Export the copied checkpoint to ONNX for the detection service
    #[arg(long)]
    export_onnx: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stain_detection=info")
        .with_target(false)
        .init();

    let args = Args::parse();
    let options = TrainOptions {
        model: args.model,
        data: args.data,
        epochs: args.epochs,
        imgsz: args.imgsz,
        batch: args.batch,
        run_name: args.run_name,
    };

    let cli = YoloCli::new(args.yolo_bin);
    cli.train(&options).context("Training failed")?;

    match promote_best_weights(&cli.runs_root(), &options.run_name, &args.output)? {
        WeightsOutcome::Copied { from, to } => {
            println!("Best model saved: {} -> {}", from.display(), to.display());

            if args.export_onnx {
                let onnx = cli
                    .export_onnx(&to, options.imgsz)
                    .context("ONNX export failed")?;
                info!("Exported {}", onnx.display());
                println!("ONNX model saved: {}", onnx.display());
            }
        }
        WeightsOutcome::Missing(path) => {
            println!("Best model not found at {}", path.display());
        }
    }

    Ok(())
}
