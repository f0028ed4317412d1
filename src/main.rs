// Main entry point for the cloth stain detection service

use stain_detection::{
    build_router,
    core::{config::level_directive, Config},
    AppState, ObjectDetector, YoloDetector,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "stain_detection={},ort=off",
        level_directive(config.log_level())
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== CLOTH STAIN DETECTION ===");
    info!(
        "Config: model={} conf={} iou={} imgsz={} sessions={}",
        config.detection.model_path,
        config.detection.confidence_threshold,
        config.detection.iou_threshold,
        config.detection.target_size,
        config.detection.onnx_pool_size
    );

    // Load the detector; the service still starts without one
    info!("Loading detector...");
    let detection_config = config.detection.clone();
    let detector = match tokio::task::spawn_blocking(move || YoloDetector::new(detection_config)).await? {
        Ok(detector) => Some(Arc::new(detector) as Arc<dyn ObjectDetector>),
        Err(e) => {
            error!("Failed to load model from {}: {:#}", config.model_path(), e);
            error!("POST /predict will answer 503 until the service is restarted with a valid model");
            None
        }
    };

    let state = AppState::new(detector);
    let app = build_router(state, config.max_upload_bytes());

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /         - Root endpoint");
    info!("  GET  /health   - Health check");
    info!("  GET  /metrics  - Prometheus metrics");
    info!("  GET  /stats    - Detailed statistics");
    info!("  POST /predict  - Detect stains (multipart field \"image\")");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
