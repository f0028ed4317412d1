//! Merge two YOLO datasets into one tree
//! Run with: cargo run --bin merge_data -- --first a --second b --output merged

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use stain_detection::merge_datasets;

#[derive(Parser, Debug)]
#[command(author, version, about = "Merge YOLO dataset splits; later sources win on name collisions", long_about = None)]
struct Args {
    /// First source dataset root
    #[arg(long, default_value = "data3.yolov5pytorch")]
    first: PathBuf,

    /// Second source dataset root, copied after the first
    #[arg(long, default_value = "data4.yolov5pytorch")]
    second: PathBuf,

    /// Destination dataset root
    #[arg(long, default_value = "data6.yolov5pytorch")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stain_detection=info")
        .with_target(false)
        .init();

    let args = Args::parse();
    println!(
        "Merging {} and {} into {}",
        args.first.display(),
        args.second.display(),
        args.output.display()
    );
    let report = merge_datasets(&[&args.first, &args.second], &args.output)
        .with_context(|| format!("Failed to merge into {}", args.output.display()))?;

    for split in &report.splits {
        info!(
            "{}: {} files copied ({} overwritten)",
            split.split, split.copied, split.overwritten
        );
    }

    println!(
        "Merged {} files into {} ({} overwritten)",
        report.total_copied(),
        report.destination.display(),
        report.total_overwritten()
    );
    Ok(())
}
