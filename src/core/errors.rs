// Custom error types for the detection service and the dataset tooling
//
// thiserror enums per concern; binaries wrap them with anyhow context.

use std::path::PathBuf;
use thiserror::Error;

/// Detection service errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("Failed to load model from {path}: {source}")]
    ModelLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    ImageDecodeFailed(#[from] image::ImageError),

    #[error("Image preprocessing failed: {0}")]
    PreprocessingFailed(String),

    #[error("Unexpected model output shape {shape:?} (expected [1, 4 + classes, anchors])")]
    UnexpectedOutputShape { shape: Vec<i64> },

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

/// Dataset merge errors
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to copy {from} -> {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Errors around the external training command line
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Failed to launch '{program}': {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program} {task}' exited with status {status}")]
    CommandFailed {
        program: String,
        task: String,
        status: std::process::ExitStatus,
    },

    #[error("Failed to copy weights {from} -> {to}: {source}")]
    CopyWeightsFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Validation run errors
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Failed to read dataset config {path}: {source}")]
    ConfigReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid dataset config {path}: {source}")]
    ConfigParseFailed {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Dataset config has no '{0}' split")]
    MissingSplit(&'static str),

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed label at {path}:{line}: {reason}")]
    MalformedLabel {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Failed to read image size of {path}: {source}")]
    ImageSizeFailed {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("No images found in {0}")]
    NoImages(PathBuf),

    #[error("Detection failed on {path}: {source}")]
    DetectionFailed {
        path: PathBuf,
        #[source]
        source: DetectionError,
    },
}

/// Sentiment lexicon errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SentimentError {
    #[error("The {0} lexicon is empty")]
    EmptyLexicon(&'static str),

    #[error("'{0}' appears in both the positive and the negative lexicon")]
    OverlappingLexicon(String),

    #[error("The {0} lexicon contains a blank word")]
    BlankWord(&'static str),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Pool size must be > 0, got {0}")]
    InvalidPoolSize(usize),
}

// Convenience type aliases for Results
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type DatasetResult<T> = Result<T, DatasetError>;
pub type TrainingResult<T> = Result<T, TrainingError>;
pub type EvaluationResult<T> = Result<T, EvaluationError>;
