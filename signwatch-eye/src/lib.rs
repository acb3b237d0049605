//! signwatch-eye: traffic-sign detection for the SignWatch dashboard
//!
//! Wraps a YOLO ONNX export behind the [`Detector`] trait and turns its
//! output into annotated images, per-class charts and driver advice.

pub mod advice;
pub mod analysis;
pub mod annotate;
pub mod charts;
pub mod classes;
pub mod config;
pub mod error;
pub mod models;
pub mod processing;
pub mod types;
pub mod utils;

pub use advice::{generate_driver_recommendations, Recommendation, RecommendationKind};
pub use analysis::{analyze, DashboardAnalysis, DetectionRow};
pub use annotate::{AnnotationOptions, Annotator};
pub use charts::{create_statistics_chart, Figure};
pub use config::DetectionConfig;
pub use error::VisionError;
pub use processing::{CachedPipeline, DetectionPipeline, Detector};
pub use types::{BoundingBox, Detection, DetectionParams, DetectionReport};
