// HTTP surface of the stain detection service

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::core::types::{ErrorBody, HealthReport, PredictionResponse};
use crate::services::detection::ObjectDetector;
use crate::utils::{load_image_from_memory_async, Metrics};

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when the model failed to load at startup
    pub detector: Option<Arc<dyn ObjectDetector>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(detector: Option<Arc<dyn ObjectDetector>>) -> Self {
        Self {
            detector,
            metrics: Metrics::new(),
        }
    }
}

/// Failures of `POST /predict` and their HTTP mapping
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image uploaded")]
    NoImage,

    #[error("Image exceeds the upload limit")]
    PayloadTooLarge,

    #[error("Failed to read uploaded image: {0}")]
    UploadFailed(String),

    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("Processing failed: {0}")]
    Processing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoImage | ApiError::UploadFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Processing(message) = &self {
            error!("Prediction failed: {}", message);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Build the router with CORS open to any origin
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/predict", post(predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

async fn root() -> &'static str {
    "Cloth Stain Detection Service"
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    state.metrics.record_endpoint_request("/health");

    let device = state.detector.as_ref().map(|d| d.device_type().to_string());
    Json(HealthReport {
        status: if device.is_some() { "healthy" } else { "degraded" }.to_string(),
        model_loaded: device.is_some(),
        device,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Detect stains in one uploaded image
///
/// # Request Format:
/// - multipart/form-data
/// - Field "image": a single image file (PNG/JPEG/...)
///
/// # Response:
/// - `{"predictions": [{"class_id", "confidence", "box"}]}`
async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    state.metrics.record_endpoint_request("/predict");

    let bytes = match multipart {
        Ok(multipart) => read_image_field(multipart).await,
        Err(rejection) => {
            debug!("Rejected non-multipart body: {}", rejection);
            Err(ApiError::NoImage)
        }
    };
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(e) => {
            state.metrics.record_rejection();
            warn!("Rejected upload: {}", e);
            return Err(e);
        }
    };

    let Some(detector) = state.detector.clone() else {
        state.metrics.record_model_unavailable();
        warn!("Prediction requested but no model is loaded");
        return Err(ApiError::ModelUnavailable);
    };

    let start = Instant::now();
    let result = run_detection(detector, bytes).await;
    match result {
        Ok(predictions) => {
            state.metrics.record_prediction(predictions.len(), start.elapsed());
            info!(
                "Predicted {} regions in {:.0}ms",
                predictions.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            Ok(Json(PredictionResponse { predictions }))
        }
        Err(e) => {
            state.metrics.record_failure();
            Err(ApiError::Processing(format!("{:#}", e)))
        }
    }
}

/// Bytes of the first non-empty `image` field.
///
/// A body over the upload limit is `PayloadTooLarge` wherever the limit trips;
/// any other malformed body counts as no image.
async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::NoImage),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge)
            }
            Err(e) => {
                debug!("Malformed multipart body: {}", e);
                return Err(ApiError::NoImage);
            }
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        match field.bytes().await {
            Ok(data) if !data.is_empty() => return Ok(data.to_vec()),
            Ok(_) => continue,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge)
            }
            Err(e) => return Err(ApiError::UploadFailed(e.body_text())),
        }
    }
}

async fn run_detection(
    detector: Arc<dyn ObjectDetector>,
    bytes: Vec<u8>,
) -> anyhow::Result<Vec<crate::core::types::Detection>> {
    let img = load_image_from_memory_async(bytes).await?;
    let predictions = tokio::task::spawn_blocking(move || detector.detect(&img)).await??;
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{DetectionError, DetectionResult};
    use crate::core::types::Detection;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "stainboundary";

    struct StubDetector {
        detections: Vec<Detection>,
        fail: bool,
    }

    impl ObjectDetector for StubDetector {
        fn detect(&self, _img: &DynamicImage) -> DetectionResult<Vec<Detection>> {
            if self.fail {
                return Err(DetectionError::PreprocessingFailed("stub failure".to_string()));
            }
            Ok(self.detections.clone())
        }

        fn device_type(&self) -> &str {
            "CPU"
        }
    }

    fn app_with(detector: Option<StubDetector>) -> Router {
        let detector = detector.map(|d| Arc::new(d) as Arc<dyn ObjectDetector>);
        build_router(AppState::new(detector), 1024 * 1024)
    }

    fn two_boxes() -> StubDetector {
        StubDetector {
            detections: vec![
                Detection {
                    class_id: 0,
                    confidence: 0.91,
                    bbox: [1.0, 2.0, 30.0, 40.0],
                },
                Detection {
                    class_id: 1,
                    confidence: 0.42,
                    bbox: [5.0, 5.0, 9.0, 9.0],
                },
            ],
            fail: false,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
        multipart_parts(&[(field, data)])
    }

    fn multipart_parts(parts: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (field, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"shirt.png\"\r\n\
                     Content-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_returns_detections() {
        let response = app_with(Some(two_boxes()))
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 2);
        for p in predictions {
            let confidence = p["confidence"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&confidence));
            assert_eq!(p["box"].as_array().unwrap().len(), 4);
        }
        assert_eq!(predictions[0]["class_id"], 0);
    }

    #[tokio::test]
    async fn test_predict_with_empty_result() {
        let detector = StubDetector {
            detections: Vec::new(),
            fail: false,
        };
        let response = app_with(Some(detector))
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"predictions": []}));
    }

    #[tokio::test]
    async fn test_missing_image_field_is_bad_request() {
        let response = app_with(Some(two_boxes()))
            .oneshot(multipart_request("file", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "No image uploaded"})
        );
    }

    #[tokio::test]
    async fn test_oversized_upload_is_payload_too_large() {
        let state = AppState::new(Some(Arc::new(two_boxes()) as Arc<dyn ObjectDetector>));
        let app = build_router(state.clone(), 1024);

        let response = app
            .oneshot(multipart_request("image", &[7u8; 4096]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Image exceeds the upload limit"})
        );
        assert_eq!(state.metrics.snapshot().predictions_rejected, 1);
    }

    #[tokio::test]
    async fn test_empty_image_field_is_skipped() {
        let png = png_bytes();
        let request = multipart_parts(&[("image", &b""[..]), ("image", png.as_slice())]);

        let response = app_with(Some(two_boxes())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["predictions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_only_empty_image_field_is_bad_request() {
        let response = app_with(Some(two_boxes()))
            .oneshot(multipart_request("image", b""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No image uploaded");
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app_with(Some(two_boxes())).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No image uploaded");
    }

    #[tokio::test]
    async fn test_undecodable_image_is_processing_failure() {
        let response = app_with(Some(two_boxes()))
            .oneshot(multipart_request("image", b"definitely not a png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error = json_body(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Processing failed: "), "{error}");
    }

    #[tokio::test]
    async fn test_detector_failure_is_processing_failure() {
        let detector = StubDetector {
            detections: Vec::new(),
            fail: true,
        };
        let response = app_with(Some(detector))
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error = json_body(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("stub failure"), "{error}");
    }

    #[tokio::test]
    async fn test_predict_without_model_is_unavailable() {
        let response = app_with(None)
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Model not loaded"})
        );
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let request = || Request::builder().uri("/health").body(Body::empty()).unwrap();

        let loaded = json_body(app_with(Some(two_boxes())).oneshot(request()).await.unwrap()).await;
        assert_eq!(loaded["status"], "healthy");
        assert_eq!(loaded["model_loaded"], true);
        assert_eq!(loaded["device"], "CPU");

        let missing = json_body(app_with(None).oneshot(request()).await.unwrap()).await;
        assert_eq!(missing["status"], "degraded");
        assert_eq!(missing["model_loaded"], false);
        assert!(missing.get("device").is_none());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();

        let response = app_with(None).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_metrics_count_outcomes() {
        let state = AppState::new(Some(Arc::new(two_boxes()) as Arc<dyn ObjectDetector>));
        let app = build_router(state.clone(), 1024 * 1024);

        app.clone()
            .oneshot(multipart_request("image", &png_bytes()))
            .await
            .unwrap();
        app.oneshot(multipart_request("other", b"x")).await.unwrap();

        let snapshot = state.metrics.snapshot();
        assert_eq!(snapshot.predictions_success, 1);
        assert_eq!(snapshot.predictions_rejected, 1);
        assert_eq!(snapshot.detections_total, 2);
        assert_eq!(snapshot.requests_by_endpoint["/predict"], 2);
    }
}
