use tracing::{debug, trace};

use super::letterbox::Letterbox;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::Detection;

/// Thresholds applied while turning raw network output into detections
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes
pub fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Per-class non-maximum suppression.
///
/// Output is sorted by descending confidence and capped at `max_detections`.
pub fn nms(detections: Vec<Detection>, iou_threshold: f32, max_detections: usize) -> Vec<Detection> {
    if detections.is_empty() {
        return vec![];
    }

    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        if keep.len() == max_detections {
            break;
        }

        keep.push(sorted[i].clone());

        for j in (i + 1)..sorted.len() {
            if suppressed[j] || sorted[j].class_id != sorted[i].class_id {
                continue;
            }
            let iou = box_iou(&sorted[i].bbox, &sorted[j].bbox);
            if iou > iou_threshold {
                suppressed[j] = true;
                trace!("NMS: suppressed {} (IoU={:.3} with {})", j, iou, i);
            }
        }
    }

    debug!("NMS: kept {}/{} detections", keep.len(), sorted.len());
    keep
}

/// Decode a YOLOv8 head output into detections in original-image pixels.
///
/// `shape` is `[1, 4 + classes, anchors]`; a transposed `[1, anchors, 4 + classes]`
/// export is recognised by its wider second axis.
pub fn decode_output(
    data: &[f32],
    shape: &[i64],
    letterbox: &Letterbox,
    params: &DecodeParams,
) -> DetectionResult<Vec<Detection>> {
    let bad_shape = || DetectionError::UnexpectedOutputShape {
        shape: shape.to_vec(),
    };

    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 0 || shape[2] <= 0 {
        return Err(bad_shape());
    }

    let (dim1, dim2) = (shape[1] as usize, shape[2] as usize);
    let transposed = dim1 > dim2;
    let (channels, anchors) = if transposed { (dim2, dim1) } else { (dim1, dim2) };

    if channels <= 4 || data.len() != channels * anchors {
        return Err(bad_shape());
    }

    let value = |channel: usize, anchor: usize| -> f32 {
        if transposed {
            data[anchor * channels + channel]
        } else {
            data[channel * anchors + anchor]
        }
    };

    let num_classes = channels - 4;
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, value(4 + c, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, (c, s)| if s > best.1 { (c, s) } else { best });

        if score < params.confidence_threshold {
            continue;
        }

        let (cx, cy) = (value(0, anchor), value(1, anchor));
        let (w, h) = (value(2, anchor), value(3, anchor));
        let (x1, y1) = letterbox.to_original(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_original(cx + w / 2.0, cy + h / 2.0);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(Detection {
            class_id: class_id as u32,
            confidence: score.clamp(0.0, 1.0),
            bbox: [x1, y1, x2, y2],
        });
    }

    trace!(
        "Decoded {} candidates from {} anchors ({} classes)",
        candidates.len(),
        anchors,
        num_classes
    );

    Ok(nms(candidates, params.iou_threshold, params.max_detections))
}
