// HTTP server with the dashboard page and detection API routes

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::static_files::{dashboard, serve_static};
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Request, State,
    },
    http::{header, Response, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use signwatch_eye::analysis::DetectionRow;
use signwatch_eye::classes::{describe_classes, load_class_names, ClassInfo};
use signwatch_eye::{
    analyze, AnnotationOptions, Annotator, CachedPipeline, Detection, DetectionParams, DetectionPipeline, Figure,
    Recommendation, VisionError,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Figures shown in the dashboard footer, measured on the validation split
pub const MODEL_MAP50_PERCENT: f32 = 95.9;
pub const MODEL_LATENCY_MS: u32 = 3;

const DEMO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// API state
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<CachedPipeline>,
    pub annotator: Arc<Annotator>,
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<Metrics>,
}

impl ApiState {
    /// State whose model is loaded on the first detection request
    pub fn new(config: ServerConfig) -> Self {
        let annotator = Annotator::new(config.detection.font_path.as_deref());
        let pipeline = CachedPipeline::new(Arc::new(config.detection.clone()));
        Self {
            pipeline: Arc::new(pipeline),
            annotator: Arc::new(annotator),
            config: Arc::new(config),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// State around an already built pipeline
    pub fn with_pipeline(config: ServerConfig, pipeline: Arc<DetectionPipeline>, annotator: Annotator) -> Self {
        let cached = CachedPipeline::preloaded(Arc::new(config.detection.clone()), pipeline);
        Self {
            pipeline: Arc::new(cached),
            annotator: Arc::new(annotator),
            config: Arc::new(config),
            metrics: Arc::new(Metrics::with_model_loaded(true)),
        }
    }
}

// Response types
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct BenchmarkInfo {
    pub map50_percent: f32,
    pub latency_ms: u32,
    pub classes: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub model_path: String,
    pub loaded: bool,
    pub num_classes: usize,
    pub defaults: DetectionParams,
    pub max_detections: usize,
    pub benchmark: BenchmarkInfo,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub request_id: String,
    pub detections: Vec<Detection>,
    pub image_shape: (u32, u32, u8),
    pub model_info: DetectionParams,
    /// `data:image/png;base64,...`
    pub annotated_image: String,
    pub table: Vec<DetectionRow>,
    pub chart: Option<Figure>,
    pub recommendations: Vec<Recommendation>,
    pub message: Option<String>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Optional per-request settings; absent values fall back to the configured defaults
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DetectSettings {
    pub confidence: Option<f32>,
    pub iou: Option<f32>,
    pub input_size: Option<u32>,
    pub show_confidence: Option<bool>,
    pub show_class_names: Option<bool>,
}

impl DetectSettings {
    fn resolve(&self, defaults: DetectionParams) -> (DetectionParams, AnnotationOptions) {
        let params = DetectionParams {
            confidence_threshold: self.confidence.unwrap_or(defaults.confidence_threshold),
            iou_threshold: self.iou.unwrap_or(defaults.iou_threshold),
            input_size: self.input_size.unwrap_or(defaults.input_size),
        };
        let fallback = AnnotationOptions::default();
        let options = AnnotationOptions {
            show_confidence: self.show_confidence.unwrap_or(fallback.show_confidence),
            show_class_names: self.show_class_names.unwrap_or(fallback.show_class_names),
        };
        (params, options)
    }
}

/// Error carried out of a handler as `{ error, code }`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// Logs the internal detail, the client gets a generic message
    fn internal(code: &'static str, detail: impl std::fmt::Display) -> Self {
        error!("{}: {}", code, detail);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, sanitize_error_message(code))
    }
}

impl From<VisionError> for ApiError {
    fn from(e: VisionError) -> Self {
        if e.is_client_error() {
            Self::bad_request("INVALID_INPUT", e.to_string())
        } else {
            Self::internal("DETECTION_ERROR", e)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

/// SECURITY: Sanitize error messages to prevent information disclosure
fn sanitize_error_message(error_code: &str) -> String {
    match error_code {
        "MODEL_UNAVAILABLE" => "Detection model is not available".to_string(),
        "DETECTION_ERROR" => "Detection failed".to_string(),
        "CLASSES_ERROR" => "Class list is not available".to_string(),
        "DEMO_IMAGES_ERROR" => "Demo images are not available".to_string(),
        _ => "An error occurred".to_string(),
    }
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.config.http.max_upload_bytes;

    let public_routes = Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/health", get(health_handler));

    let api_routes = Router::new()
        .route("/api/v1/model", get(model_handler))
        .route("/api/v1/classes", get(classes_handler))
        .route("/api/v1/demo-images", get(list_demo_images_handler))
        .route("/api/v1/demo-images/:name", get(demo_image_handler))
        .route("/api/v1/demo-images/:name/detect", post(detect_demo_handler))
        .route("/api/v1/detect", post(detect_upload_handler))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests));

    public_routes
        .merge(api_routes)
        .fallback(serve_static)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn count_requests(State(state): State<ApiState>, request: Request, next: Next) -> axum::response::Response {
    state.metrics.record_request().await;
    let response = next.run(request).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        state.metrics.record_error(response.status().as_str()).await;
    }
    response
}

/// Health check endpoint
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.pipeline.is_loaded(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.metrics.get_prometheus_metrics().await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn class_names(state: &ApiState) -> Result<Vec<String>, ApiError> {
    if let Some(pipeline) = state.pipeline.loaded() {
        return Ok(pipeline.class_names().to_vec());
    }
    load_class_names(state.config.detection.dataset_yaml.as_deref())
        .map_err(|e| ApiError::internal("CLASSES_ERROR", e))
}

async fn model_handler(State(state): State<ApiState>) -> Result<Json<ModelResponse>, ApiError> {
    let names = class_names(&state).await?;
    let detection = &state.config.detection;

    Ok(Json(ModelResponse {
        model_path: detection.model_path.display().to_string(),
        loaded: state.pipeline.is_loaded(),
        num_classes: names.len(),
        defaults: detection.defaults,
        max_detections: detection.max_detections,
        benchmark: BenchmarkInfo {
            map50_percent: MODEL_MAP50_PERCENT,
            latency_ms: MODEL_LATENCY_MS,
            classes: names.len(),
        },
    }))
}

async fn classes_handler(State(state): State<ApiState>) -> Result<Json<Vec<ClassInfo>>, ApiError> {
    let names = class_names(&state).await?;
    Ok(Json(describe_classes(&names)))
}

fn has_demo_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DEMO_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

async fn list_demo_images_handler(State(state): State<ApiState>) -> Result<Json<Vec<String>>, ApiError> {
    let dir = &state.config.dashboard.demo_images_dir;
    if !dir.is_dir() {
        debug!("Demo image directory {:?} does not exist", dir);
        return Ok(Json(Vec::new()));
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ApiError::internal("DEMO_IMAGES_ERROR", e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ApiError::internal("DEMO_IMAGES_ERROR", e))?
    {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if let Some(name) = entry.file_name().to_str() {
            if is_file && !name.starts_with('.') && has_demo_extension(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    Ok(Json(names))
}

/// Resolve a demo image name inside the demo directory
fn demo_image_path(state: &ApiState, name: &str) -> Result<std::path::PathBuf, ApiError> {
    // SECURITY: Prevent path traversal attacks
    if name.is_empty()
        || name.len() > 255
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
        || name.chars().any(|c| c.is_control())
    {
        warn!("Rejected demo image name {:?}", name);
        return Err(ApiError::bad_request("INVALID_NAME", "Invalid demo image name"));
    }
    if !has_demo_extension(name) {
        return Err(ApiError::bad_request(
            "UNSUPPORTED_FORMAT",
            "Demo images must be PNG or JPEG files",
        ));
    }

    let path = state.config.dashboard.demo_images_dir.join(name);
    if !path.is_file() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "DEMO_NOT_FOUND",
            format!("Demo image {} not found", name),
        ));
    }
    Ok(path)
}

async fn read_demo_image(state: &ApiState, name: &str) -> Result<Vec<u8>, ApiError> {
    let path = demo_image_path(state, name)?;
    tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal("DEMO_IMAGES_ERROR", e))
}

async fn demo_image_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let bytes = read_demo_image(&state, &name).await?;
    let content_type = if name.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal("DEMO_IMAGES_ERROR", e))
}

async fn detect_demo_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    settings: Result<Json<DetectSettings>, JsonRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let Json(settings) = settings.map_err(|e| ApiError::bad_request("INVALID_BODY", e.body_text()))?;
    let bytes = read_demo_image(&state, &name).await?;
    info!("Running detection on demo image {}", name);
    run_detection(&state, bytes.into(), &settings).await.map(Json)
}

async fn detect_upload_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::bad_request("INVALID_UPLOAD", e.body_text()))?;
    let (image, settings) = read_upload(multipart).await?;
    run_detection(&state, image, &settings).await.map(Json)
}

/// Collect the image bytes and settings fields of a multipart upload
async fn read_upload(mut multipart: Multipart) -> Result<(Bytes, DetectSettings), ApiError> {
    let mut image = None;
    let mut settings = DetectSettings::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            image = Some(field.bytes().await.map_err(multipart_error)?);
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        let value = value.trim();
        match name.as_str() {
            "confidence" => settings.confidence = Some(parse_field(&name, value)?),
            "iou" => settings.iou = Some(parse_field(&name, value)?),
            "input_size" => settings.input_size = Some(parse_field(&name, value)?),
            "show_confidence" => settings.show_confidence = Some(parse_flag(&name, value)?),
            "show_class_names" => settings.show_class_names = Some(parse_flag(&name, value)?),
            _ => debug!("Ignoring multipart field {:?}", name),
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_IMAGE", "Multipart field 'image' is required"))?;
    Ok((image, settings))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(status, "PAYLOAD_TOO_LARGE", "Request payload too large");
    }
    ApiError::new(status, "INVALID_UPLOAD", e.body_text())
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::bad_request("INVALID_PARAMS", format!("{} must be a number, got {:?}", name, value)))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(ApiError::bad_request(
            "INVALID_PARAMS",
            format!("{} must be true or false, got {:?}", name, value),
        )),
    }
}

/// Only PNG and JPEG payloads are decoded
fn decode_image(bytes: &[u8]) -> Result<image::RgbImage, VisionError> {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) | Ok(image::ImageFormat::Jpeg) => {}
        _ => {
            return Err(VisionError::InvalidParams(
                "Unsupported image format, expected PNG or JPEG".to_string(),
            ))
        }
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

async fn run_detection(state: &ApiState, image: Bytes, settings: &DetectSettings) -> Result<DetectResponse, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();

    let (params, options) = settings.resolve(state.config.detection.defaults);
    params.validate()?;

    // Rejected uploads must never trigger a model load or download
    let decoded = tokio::task::spawn_blocking(move || decode_image(&image))
        .await
        .map_err(|e| ApiError::internal("DETECTION_ERROR", e))??;

    let pipeline = state
        .pipeline
        .get()
        .await
        .map_err(|e| ApiError::internal("MODEL_UNAVAILABLE", e))?;
    state.metrics.set_model_loaded(true).await;

    let annotator = state.annotator.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<_, VisionError> {
        let analysis = analyze(&pipeline, &annotator, &decoded, &params, &options)?;
        let annotated_image = analysis.annotated_png_data_url()?;
        Ok((analysis, annotated_image))
    })
    .await
    .map_err(|e| ApiError::internal("DETECTION_ERROR", e))?;
    let (analysis, annotated_image) = outcome?;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let signs = analysis.report.detections.len();
    state.metrics.record_detection(elapsed_ms, signs).await;
    info!(
        "Request {} found {} signs in {:.1} ms",
        request_id, signs, elapsed_ms
    );

    Ok(DetectResponse {
        request_id,
        detections: analysis.report.detections,
        image_shape: analysis.report.image_shape,
        model_info: analysis.report.model_info,
        annotated_image,
        table: analysis.rows,
        chart: analysis.chart,
        recommendations: analysis.recommendations,
        message: analysis.message,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let defaults = DetectionParams::new(0.5, 0.4, 640);
        let settings = DetectSettings {
            confidence: Some(0.7),
            show_class_names: Some(false),
            ..DetectSettings::default()
        };

        let (params, options) = settings.resolve(defaults);
        assert_eq!(params, DetectionParams::new(0.7, 0.4, 640));
        assert!(options.show_confidence);
        assert!(!options.show_class_names);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("show_confidence", "on").unwrap());
        assert!(!parse_flag("show_confidence", "FALSE").unwrap());
        assert!(parse_flag("show_confidence", "maybe").is_err());
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field::<u32>("input_size", "320").unwrap(), 320);
        let err = parse_field::<f32>("confidence", "high").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "INVALID_PARAMS");
    }

    #[test]
    fn test_demo_extension() {
        assert!(has_demo_extension("stop_sign.JPG"));
        assert!(has_demo_extension("scene.png"));
        assert!(!has_demo_extension("notes.txt"));
        assert!(!has_demo_extension("png"));
    }

    #[test]
    fn test_vision_errors_map_to_status() {
        let client: ApiError = VisionError::InvalidParams("bad".to_string()).into();
        assert_eq!(client.status, StatusCode::BAD_REQUEST);

        let server: ApiError = VisionError::Model("/secret/path/best.onnx missing".to_string()).into();
        assert_eq!(server.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!server.message.contains("/secret"));
    }

    #[test]
    fn test_decode_rejects_other_formats() {
        assert!(matches!(
            decode_image(b"GIF89a......"),
            Err(VisionError::InvalidParams(_))
        ));
    }
}
