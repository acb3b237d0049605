//! One dashboard run: detect, annotate, tabulate, chart and advise

use crate::advice::{generate_driver_recommendations, Recommendation};
use crate::annotate::{format_confidence, AnnotationOptions, Annotator};
use crate::charts::{create_statistics_chart, Figure};
use crate::error::VisionError;
use crate::processing::DetectionPipeline;
use crate::types::{Detection, DetectionParams, DetectionReport};
use base64::{engine::general_purpose, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbImage};
use serde::Serialize;
use tracing::info;

pub const NO_DETECTIONS_MESSAGE: &str = "No traffic signs detected in the image";

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRow {
    pub sign: String,
    pub confidence: String,
    pub coordinates: String,
}

impl From<&Detection> for DetectionRow {
    fn from(detection: &Detection) -> Self {
        Self {
            sign: detection.class_name.clone(),
            confidence: format_confidence(detection.confidence),
            coordinates: format!("({}, {})", detection.bbox.x1, detection.bbox.y1),
        }
    }
}

/// Everything the dashboard renders for one image
#[derive(Debug, Clone)]
pub struct DashboardAnalysis {
    pub report: DetectionReport,
    pub annotated_image: RgbImage,
    pub rows: Vec<DetectionRow>,
    pub chart: Option<Figure>,
    pub recommendations: Vec<Recommendation>,
    /// Set instead of table, chart and advice when nothing was found
    pub message: Option<String>,
}

impl DashboardAnalysis {
    pub fn has_detections(&self) -> bool {
        !self.report.is_empty()
    }

    /// Annotated image as a `data:image/png;base64,...` URL
    pub fn annotated_png_data_url(&self) -> Result<String, VisionError> {
        encode_png_data_url(&self.annotated_image)
    }
}

pub fn analyze(
    pipeline: &DetectionPipeline,
    annotator: &Annotator,
    image: &RgbImage,
    params: &DetectionParams,
    options: &AnnotationOptions,
) -> Result<DashboardAnalysis, VisionError> {
    let report = pipeline.detect(image, params)?;
    let annotated_image = annotator.create_result_image(image, &report, options);

    info!(
        "Analysed {}x{} image: {} signs",
        image.width(),
        image.height(),
        report.detections.len()
    );

    if report.is_empty() {
        return Ok(DashboardAnalysis {
            report,
            annotated_image,
            rows: Vec::new(),
            chart: None,
            recommendations: Vec::new(),
            message: Some(NO_DETECTIONS_MESSAGE.to_string()),
        });
    }

    let rows = report.detections.iter().map(DetectionRow::from).collect();
    let chart = create_statistics_chart(&report.detections);
    let recommendations = generate_driver_recommendations(&report.detections);

    Ok(DashboardAnalysis {
        report,
        annotated_image,
        rows,
        chart: Some(chart),
        recommendations,
        message: None,
    })
}

pub fn encode_png_data_url(image: &RgbImage) -> Result<String, VisionError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| VisionError::Processing(format!("PNG encoding failed: {}", e)))?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    ))
}
