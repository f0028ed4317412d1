//! Detection matching and average-precision metrics.

use std::collections::BTreeMap;

use crate::core::types::Detection;
use crate::services::detection::box_iou;

use super::dataset::GroundTruth;

/// Number of IoU thresholds in 0.50:0.05:0.95
pub const IOU_STEPS: usize = 10;

/// 0.50, 0.55, ..., 0.95
pub fn iou_thresholds() -> [f32; IOU_STEPS] {
    std::array::from_fn(|i| 0.5 + 0.05 * i as f32)
}

/// A prediction after matching against one image's ground truth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPrediction {
    pub class_id: u32,
    pub confidence: f32,
    /// True positive flag per IoU threshold
    pub correct: [bool; IOU_STEPS],
}

/// Match one image's predictions to its ground truth at every IoU threshold.
///
/// Predictions are visited by descending confidence; each takes the unmatched
/// ground-truth box of its class with the highest IoU at or above the threshold.
pub fn match_image(predictions: &[Detection], ground_truth: &[GroundTruth]) -> Vec<MatchedPrediction> {
    let thresholds = iou_thresholds();

    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| predictions[b].confidence.total_cmp(&predictions[a].confidence));

    let ious: Vec<Vec<f32>> = predictions
        .iter()
        .map(|pred| {
            ground_truth
                .iter()
                .map(|gt| {
                    if gt.class_id == pred.class_id {
                        box_iou(&pred.bbox, &gt.bbox)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    let mut correct = vec![[false; IOU_STEPS]; predictions.len()];
    for (step, &threshold) in thresholds.iter().enumerate() {
        let mut gt_used = vec![false; ground_truth.len()];

        for &pi in &order {
            let best = ious[pi]
                .iter()
                .enumerate()
                .filter(|&(gi, &iou)| !gt_used[gi] && iou >= threshold && iou > 0.0)
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(gi, _)| gi);

            if let Some(gi) = best {
                gt_used[gi] = true;
                correct[pi][step] = true;
            }
        }
    }

    predictions
        .iter()
        .zip(correct)
        .map(|(pred, correct)| MatchedPrediction {
            class_id: pred.class_id,
            confidence: pred.confidence,
            correct,
        })
        .collect()
}

/// Area under the precision/recall curve, COCO 101-point interpolation.
///
/// `recall` must be non-decreasing.
pub fn average_precision(recall: &[f32], precision: &[f32]) -> f32 {
    if recall.is_empty() {
        return 0.0;
    }

    // precision envelope: best precision at this recall or beyond
    let mut envelope = precision.to_vec();
    for i in (0..envelope.len().saturating_sub(1)).rev() {
        envelope[i] = envelope[i].max(envelope[i + 1]);
    }

    let mut sum = 0.0;
    let mut idx = 0;
    for step in 0..=100 {
        let r = step as f32 / 100.0;
        while idx < recall.len() && recall[idx] < r - 1e-6 {
            idx += 1;
        }
        if idx < recall.len() {
            sum += envelope[idx];
        }
    }
    sum / 101.0
}

/// Metrics of a single class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub class_id: u32,
    pub instances: usize,
    pub precision: f32,
    pub recall: f32,
    pub ap50: f32,
    /// Mean AP over the ten IoU thresholds
    pub ap50_95: f32,
}

/// Accumulates matched predictions and ground-truth counts over a split
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    predictions: Vec<MatchedPrediction>,
    instances: BTreeMap<u32, usize>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&mut self, predictions: &[Detection], ground_truth: &[GroundTruth]) {
        for gt in ground_truth {
            *self.instances.entry(gt.class_id).or_insert(0) += 1;
        }
        self.predictions.extend(match_image(predictions, ground_truth));
    }

    pub fn instances(&self) -> usize {
        self.instances.values().sum()
    }

    /// Per-class metrics for every class with at least one ground-truth box,
    /// ordered by class id
    pub fn per_class(&self) -> Vec<ClassMetrics> {
        let mut sorted = self.predictions.clone();
        sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        self.instances
            .iter()
            .map(|(&class_id, &instances)| {
                let class_preds: Vec<&MatchedPrediction> =
                    sorted.iter().filter(|p| p.class_id == class_id).collect();
                class_metrics(class_id, instances, &class_preds)
            })
            .collect()
    }
}

fn class_metrics(class_id: u32, instances: usize, preds: &[&MatchedPrediction]) -> ClassMetrics {
    let mut ap = [0.0f32; IOU_STEPS];
    let mut precision = 0.0;
    let mut recall = 0.0;

    if !preds.is_empty() && instances > 0 {
        for (step, ap_slot) in ap.iter_mut().enumerate() {
            let (r, p) = pr_curve(preds, step, instances);
            *ap_slot = average_precision(&r, &p);

            if step == 0 {
                // operating point with the best F1 at IoU 0.5
                let mut best_f1 = -1.0;
                for (&ri, &pi) in r.iter().zip(&p) {
                    let f1 = if pi + ri > 0.0 { 2.0 * pi * ri / (pi + ri) } else { 0.0 };
                    if f1 > best_f1 {
                        best_f1 = f1;
                        precision = pi;
                        recall = ri;
                    }
                }
            }
        }
    }

    ClassMetrics {
        class_id,
        instances,
        precision,
        recall,
        ap50: ap[0],
        ap50_95: ap.iter().sum::<f32>() / IOU_STEPS as f32,
    }
}

/// Cumulative recall and precision over confidence-sorted predictions
fn pr_curve(preds: &[&MatchedPrediction], step: usize, instances: usize) -> (Vec<f32>, Vec<f32>) {
    let mut tp = 0usize;
    let mut recall = Vec::with_capacity(preds.len());
    let mut precision = Vec::with_capacity(preds.len());

    for (i, pred) in preds.iter().enumerate() {
        if pred.correct[step] {
            tp += 1;
        }
        recall.push(tp as f32 / instances as f32);
        precision.push(tp as f32 / (i + 1) as f32);
    }
    (recall, precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox,
        }
    }

    fn gt(class_id: u32, bbox: [f32; 4]) -> GroundTruth {
        GroundTruth { class_id, bbox }
    }

    #[test]
    fn test_thresholds() {
        let t = iou_thresholds();
        assert!((t[0] - 0.5).abs() < 1e-6);
        assert!((t[9] - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_is_correct_everywhere() {
        let matched = match_image(
            &[det(0, 0.9, [0.0, 0.0, 10.0, 10.0])],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        assert_eq!(matched[0].correct, [true; IOU_STEPS]);
    }

    #[test]
    fn test_partial_overlap_passes_low_thresholds_only() {
        // IoU = 62 / 100
        let matched = match_image(
            &[det(0, 0.9, [0.0, 0.0, 10.0, 6.2])],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        let c = matched[0].correct;
        assert!(c[0] && c[1] && c[2]);
        assert!(!c[3] && !c[9]);
    }

    #[test]
    fn test_class_mismatch_never_matches() {
        let matched = match_image(
            &[det(1, 0.9, [0.0, 0.0, 10.0, 10.0])],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        assert_eq!(matched[0].correct, [false; IOU_STEPS]);
    }

    #[test]
    fn test_ground_truth_used_once() {
        let matched = match_image(
            &[
                det(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
                det(0, 0.8, [0.0, 0.0, 10.0, 9.5]),
            ],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        assert!(matched[0].correct[0]);
        assert!(!matched[1].correct[0]);
    }

    #[test]
    fn test_higher_confidence_claims_ground_truth_first() {
        let matched = match_image(
            &[
                det(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
                det(0, 0.9, [0.0, 0.0, 10.0, 8.0]),
            ],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        assert!(!matched[0].correct[0]);
        assert!(matched[1].correct[0]);
    }

    #[test]
    fn test_average_precision_extremes() {
        assert!((average_precision(&[0.5, 1.0], &[1.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(average_precision(&[], &[]), 0.0);
        assert_eq!(average_precision(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_half_recall_gives_half_ap() {
        let ap = average_precision(&[0.5], &[1.0]);
        assert!((ap - 51.0 / 101.0).abs() < 1e-6);
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let mut acc = MetricsAccumulator::new();
        acc.add_image(
            &[det(0, 0.9, [0.0, 0.0, 10.0, 10.0])],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );
        acc.add_image(
            &[det(1, 0.8, [5.0, 5.0, 20.0, 20.0])],
            &[gt(1, [5.0, 5.0, 20.0, 20.0])],
        );

        let classes = acc.per_class();
        assert_eq!(classes.len(), 2);
        for c in &classes {
            assert!((c.ap50 - 1.0).abs() < 1e-6);
            assert!((c.ap50_95 - 1.0).abs() < 1e-6);
            assert!((c.precision - 1.0).abs() < 1e-6);
            assert!((c.recall - 1.0).abs() < 1e-6);
        }
        assert_eq!(acc.instances(), 2);
    }

    #[test]
    fn test_no_predictions_score_zero() {
        let mut acc = MetricsAccumulator::new();
        acc.add_image(&[], &[gt(0, [0.0, 0.0, 10.0, 10.0])]);

        let classes = acc.per_class();
        assert_eq!(classes[0].ap50, 0.0);
        assert_eq!(classes[0].recall, 0.0);
        assert_eq!(classes[0].instances, 1);
    }

    #[test]
    fn test_false_positive_ranked_first_lowers_precision() {
        let mut acc = MetricsAccumulator::new();
        acc.add_image(
            &[
                det(0, 0.95, [50.0, 50.0, 60.0, 60.0]),
                det(0, 0.5, [0.0, 0.0, 10.0, 10.0]),
            ],
            &[gt(0, [0.0, 0.0, 10.0, 10.0])],
        );

        let c = &acc.per_class()[0];
        assert!((c.ap50 - 0.5).abs() < 1e-6);
        assert!((c.recall - 1.0).abs() < 1e-6);
        assert!((c.precision - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_only_classes_are_not_reported() {
        let mut acc = MetricsAccumulator::new();
        acc.add_image(&[det(3, 0.9, [0.0, 0.0, 1.0, 1.0])], &[]);
        assert!(acc.per_class().is_empty());
    }
}
