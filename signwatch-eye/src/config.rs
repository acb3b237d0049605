//! Configuration for signwatch-eye

use crate::types::DetectionParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Path to the ONNX export of the trained weights
    pub model_path: PathBuf,
    /// Training dataset YAML carrying the class names
    pub dataset_yaml: Option<PathBuf>,
    /// Download location used when `model_path` does not exist
    pub model_url: Option<String>,
    /// Expected SHA-256 of the downloaded weights (hex)
    pub model_checksum: Option<String>,
    /// Parameters used when a request does not override them
    pub defaults: DetectionParams,
    /// Upper bound on detections kept after suppression
    pub max_detections: usize,
    /// Intra-op threads for the inference session (0 lets the runtime decide)
    pub intra_threads: usize,
    /// TrueType font used for box labels
    pub font_path: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/best.onnx"),
            dataset_yaml: None,
            model_url: None,
            model_checksum: None,
            defaults: DetectionParams::default(),
            max_detections: 300,
            intra_threads: 0,
            font_path: None,
        }
    }
}

impl DetectionConfig {
    /// Directory the weights live in, created on download
    pub fn model_dir(&self) -> PathBuf {
        self.model_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model_path.as_os_str().is_empty() {
            return Err("model_path must not be empty".to_string());
        }

        if self.model_path.file_name().is_none() {
            return Err("model_path must name a file".to_string());
        }

        self.defaults.validate().map_err(|e| e.to_string())?;

        if self.max_detections == 0 || self.max_detections > 10_000 {
            return Err("max_detections must be between 1 and 10000".to_string());
        }

        if self.intra_threads > 256 {
            return Err("intra_threads too large (max 256)".to_string());
        }

        if let Some(url) = &self.model_url {
            if !url.starts_with("https://") {
                return Err("model_url must use https".to_string());
            }
        }

        if let Some(checksum) = &self.model_checksum {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("model_checksum must be a hex encoded SHA-256".to_string());
            }
        }

        Ok(())
    }
}
