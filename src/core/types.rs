// Wire types shared by the detector, the HTTP layer and the CLI tools

use serde::{Deserialize, Serialize};

/// A single detected region in original-image pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

/// Body of a successful `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Detection>,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_serializes_box_field() {
        let detection = Detection {
            class_id: 2,
            confidence: 0.5,
            bbox: [1.0, 2.0, 3.0, 4.0],
        };

        let value = serde_json::to_value(&detection).unwrap();
        assert_eq!(value["class_id"], 2);
        assert_eq!(value["box"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(value.get("bbox").is_none());
    }

    #[test]
    fn test_inverted_box_has_zero_width() {
        let detection = Detection {
            class_id: 0,
            confidence: 0.9,
            bbox: [10.0, 10.0, 5.0, 20.0],
        };
        assert_eq!(detection.width(), 0.0);
        assert_eq!(detection.height(), 10.0);
    }
}
