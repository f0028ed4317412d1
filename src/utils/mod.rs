pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{class_color, draw_detections, load_image_from_memory_async, to_yolo_labels};
pub use metrics::{Metrics, MetricsSnapshot};
