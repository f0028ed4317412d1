pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, DetectionConfig};
pub use errors::{
    ConfigError, DatasetError, DetectionError, EvaluationError, SentimentError, TrainingError,
};
pub use types::{Detection, ErrorBody, HealthReport, PredictionResponse};
