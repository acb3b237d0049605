//! Vision processing pipelines

pub mod detection;

pub use detection::{CachedPipeline, DetectionPipeline, Detector};
