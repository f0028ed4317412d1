pub mod dataset;
pub mod detection;
pub mod evaluation;
pub mod onnx_builder; // Shared ONNX session builder and pool
pub mod sentiment;
pub mod training;

// Re-export commonly used services
pub use dataset::{merge_datasets, MergeReport};
pub use detection::{ObjectDetector, YoloDetector};
pub use evaluation::{evaluate, DatasetConfig, EvaluationReport};
pub use sentiment::{Lexicon, Sentiment, SentimentAnalyzer, SentimentScore};
pub use training::{TrainOptions, YoloCli};
