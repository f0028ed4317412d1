// Stain detection on top of a YOLOv8 ONNX export

pub mod letterbox;
pub mod postprocess;

use image::DynamicImage;
use ort::value::Value;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::core::config::DetectionConfig;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::Detection;
use crate::services::onnx_builder::{self, OnnxSessionPool};

pub use letterbox::Letterbox;
pub use postprocess::{box_iou, decode_output, nms, DecodeParams};

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// Anything that turns an image into detected regions.
///
/// The HTTP layer and the CLI tools only see this trait.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, img: &DynamicImage) -> DetectionResult<Vec<Detection>>;

    /// Execution backend the detector runs on, for health reporting
    fn device_type(&self) -> &str;
}

/// YOLOv8 detector backed by ONNX Runtime
pub struct YoloDetector {
    session_pool: OnnxSessionPool,
    config: DetectionConfig,
    device_type: String,
}

impl YoloDetector {
    /// Load the model named by `config.model_path` and fill the session pool
    #[instrument(skip(config), fields(model = %config.model_path))]
    pub fn new(config: DetectionConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let model_bytes =
            std::fs::read(&config.model_path).map_err(|source| DetectionError::ModelLoadFailed {
                path: config.model_path.clone(),
                source,
            })?;
        info!(
            "Loading detector {} ({:.1} MB)",
            config.model_path,
            model_bytes.len() as f64 / 1_048_576.0
        );

        let model_name = Path::new(&config.model_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("detector")
            .to_string();

        let session_pool = OnnxSessionPool::new(config.onnx_pool_size);
        let mut device_type = String::new();

        for i in 0..config.onnx_pool_size {
            debug!("Creating session {} of {}", i + 1, config.onnx_pool_size);
            let (backend, session) = onnx_builder::build_session_with_acceleration(
                &model_bytes,
                &model_name,
                config.inference_backend.as_deref(),
            )?;
            device_type = backend;
            session_pool.add(session);
        }

        info!("✓ Detection: {} ({} sessions)", device_type, config.onnx_pool_size);

        Ok(Self {
            session_pool,
            config,
            device_type,
        })
    }

    fn decode_params(&self) -> DecodeParams {
        DecodeParams {
            confidence_threshold: self.config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
            max_detections: self.config.max_detections,
        }
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, img: &DynamicImage) -> DetectionResult<Vec<Detection>> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImageSize { width, height });
        }

        let start = std::time::Instant::now();
        let letterbox = Letterbox::new(width, height, self.config.target_size);
        let input = Value::from_array(letterbox.tensor(img))?;

        let (shape, data) = {
            let mut session = self.session_pool.acquire();
            let outputs = session.run(ort::inputs![INPUT_NAME => input])?;

            // Copy out while the session is still borrowed
            let (shape, data) = outputs[OUTPUT_NAME].try_extract_tensor::<f32>()?;
            (shape.to_vec(), data.to_vec())
        };
        let inference_time = start.elapsed();

        let detections = decode_output(&data, &shape, &letterbox, &self.decode_params())?;

        debug!(
            "✓ Detected {} regions on {}x{} in {:.2}ms ({})",
            detections.len(),
            width,
            height,
            inference_time.as_secs_f64() * 1000.0,
            self.device_type
        );

        Ok(detections)
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }
}
