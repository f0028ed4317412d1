// Library exports for the cloth stain detection service and its tools

pub mod core;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{Config, DetectionConfig},
    errors::{
        ConfigError, DatasetError, DetectionError, EvaluationError, SentimentError, TrainingError,
    },
    types::{Detection, ErrorBody, HealthReport, PredictionResponse},
};

pub use server::{build_router, ApiError, AppState};

pub use services::{
    evaluate, merge_datasets, DatasetConfig, EvaluationReport, Lexicon, MergeReport, ObjectDetector,
    Sentiment, SentimentAnalyzer, SentimentScore, TrainOptions, YoloCli, YoloDetector,
};

pub use utils::{draw_detections, load_image_from_memory_async, Metrics};
