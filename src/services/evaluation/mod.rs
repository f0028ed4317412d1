// Validation of a detector against a labelled YOLO split

pub mod ap;
pub mod dataset;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::core::errors::{DetectionError, EvaluationError, EvaluationResult};
use crate::services::detection::ObjectDetector;

pub use ap::{average_precision, match_image, ClassMetrics, MetricsAccumulator, IOU_STEPS};
pub use dataset::{label_path_for, load_samples, parse_labels, DatasetConfig, GroundTruth, Sample};

/// Aggregate and per-class results of one validation run
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub images: usize,
    pub instances: usize,
    pub precision: f32,
    pub recall: f32,
    pub map50: f32,
    pub map50_95: f32,
    pub per_class: Vec<ClassMetrics>,
    pub elapsed_ms: u128,
}

impl EvaluationReport {
    fn from_accumulator(acc: &MetricsAccumulator, images: usize, elapsed_ms: u128) -> Self {
        let per_class = acc.per_class();
        let mean = |f: fn(&ClassMetrics) -> f32| {
            if per_class.is_empty() {
                0.0
            } else {
                per_class.iter().map(f).sum::<f32>() / per_class.len() as f32
            }
        };

        Self {
            images,
            instances: acc.instances(),
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            map50: mean(|c| c.ap50),
            map50_95: mean(|c| c.ap50_95),
            per_class,
            elapsed_ms,
        }
    }

    /// Render the summary table, three decimals per metric
    pub fn render(&self, names: &BTreeMap<usize, String>) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>20} {:>8} {:>10} {:>8} {:>8} {:>8} {:>10}",
            "Class", "Images", "Instances", "P", "R", "mAP50", "mAP50-95"
        );
        let _ = writeln!(
            out,
            "{:>20} {:>8} {:>10} {:>8.3} {:>8.3} {:>8.3} {:>10.3}",
            "all", self.images, self.instances, self.precision, self.recall, self.map50, self.map50_95
        );
        for class in &self.per_class {
            let name = names
                .get(&(class.class_id as usize))
                .cloned()
                .unwrap_or_else(|| class.class_id.to_string());
            let _ = writeln!(
                out,
                "{:>20} {:>8} {:>10} {:>8.3} {:>8.3} {:>8.3} {:>10.3}",
                name, self.images, class.instances, class.precision, class.recall, class.ap50, class.ap50_95
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Precision (mean): {:.3}", self.precision);
        let _ = writeln!(out, "Recall (mean): {:.3}", self.recall);
        let _ = writeln!(out, "mAP@0.5: {:.3}", self.map50);
        let _ = writeln!(out, "mAP@0.5:0.95 (mean): {:.3}", self.map50_95);
        for class in &self.per_class {
            let _ = writeln!(
                out,
                "Class {}: AP@0.5 = {:.3}, AP@0.5:0.95 = {:.3}",
                class.class_id, class.ap50, class.ap50_95
            );
        }
        out
    }
}

/// Image directory of the `val` split named by a dataset config
pub fn val_images(config: &DatasetConfig) -> EvaluationResult<PathBuf> {
    config.val.clone().ok_or(EvaluationError::MissingSplit("val"))
}

/// Run `detector` over every sample and score it against the labels
pub fn evaluate(detector: &dyn ObjectDetector, samples: &[Sample]) -> EvaluationResult<EvaluationReport> {
    let start = Instant::now();
    let mut acc = MetricsAccumulator::new();

    for (i, sample) in samples.iter().enumerate() {
        let detection_failed = |source: DetectionError| EvaluationError::DetectionFailed {
            path: sample.image_path.clone(),
            source,
        };

        let img = image::open(&sample.image_path)
            .map_err(|e| detection_failed(DetectionError::ImageDecodeFailed(e)))?;
        let predictions = detector.detect(&img).map_err(detection_failed)?;
        acc.add_image(&predictions, &sample.ground_truth);

        if (i + 1) % 50 == 0 {
            debug!("Validated {}/{} images", i + 1, samples.len());
        }
    }

    let elapsed_ms = start.elapsed().as_millis();
    let report = EvaluationReport::from_accumulator(&acc, samples.len(), elapsed_ms);
    info!(
        "Validated {} images in {}ms: mAP50={:.3} mAP50-95={:.3}",
        report.images, elapsed_ms, report.map50, report.map50_95
    );
    Ok(report)
}
