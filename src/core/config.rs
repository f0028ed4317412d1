use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Maximum accepted request body, in bytes
    pub max_upload_bytes: usize,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square letterbox edge fed to the network
    pub target_size: u32,
    pub max_detections: usize,
    pub inference_backend: Option<String>,
    /// Number of ONNX sessions kept for the model
    pub onnx_pool_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/best.onnx".to_string(),
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            target_size: 640,
            max_detections: 300,
            inference_backend: None,
            onnx_pool_size: 1,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(self.iou_threshold));
        }

        // YOLOv8 strides require a multiple of 32
        if !(32..=4096).contains(&self.target_size) || self.target_size % 32 != 0 {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "target_size must be a multiple of 32 between 32 and 4096, got {}",
                self.target_size
            )));
        }

        if self.max_detections == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "max_detections must be > 0".to_string(),
            ));
        }

        if self.onnx_pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(self.onnx_pool_size));
        }

        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let defaults = DetectionConfig::default();

        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| parse_log_level(&s))
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8082),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(32 * 1024 * 1024),
            },
            detection: DetectionConfig {
                model_path: env::var("MODEL_PATH").unwrap_or(defaults.model_path),
                confidence_threshold: env::var("CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.confidence_threshold),
                iou_threshold: env::var("IOU_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.iou_threshold),
                target_size: env::var("TARGET_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.target_size),
                max_detections: env::var("MAX_DETECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_detections),
                inference_backend: env::var("INFERENCE_BACKEND")
                    .ok()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty()),
                onnx_pool_size: env::var("ONNX_POOL_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.onnx_pool_size),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "SERVER_HOST must not be empty".to_string(),
            ));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "MAX_UPLOAD_BYTES must be > 0".to_string(),
            ));
        }

        self.detection.validate()
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_bytes
    }

    pub fn model_path(&self) -> &str {
        &self.detection.model_path
    }
}

fn parse_log_level(value: &str) -> Option<Level> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Lower-case name of a level, as accepted by `EnvFilter` directives
pub fn level_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detection_config_is_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_thresholds() {
        let config = DetectionConfig {
            confidence_threshold: 1.5,
            ..DetectionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));

        let config = DetectionConfig {
            iou_threshold: -0.1,
            ..DetectionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIoUThreshold(_))
        ));
    }

    #[test]
    fn test_rejects_target_size_not_multiple_of_32() {
        let config = DetectionConfig {
            target_size: 650,
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_log_level(" debug "), Some(Level::DEBUG));
        assert_eq!(parse_log_level("loud"), None);
        assert_eq!(level_directive(Level::TRACE), "trace");
    }
}
