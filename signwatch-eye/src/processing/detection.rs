//! Traffic-sign detection pipeline

use crate::classes::load_class_names;
use crate::config::DetectionConfig;
use crate::error::VisionError;
use crate::models::{ModelManager, YoloModel};
use crate::types::{Detection, DetectionParams, DetectionReport};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Anything that turns an image into detection records
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage, params: &DetectionParams) -> Result<Vec<Detection>, VisionError>;
}

/// Detection pipeline wrapping a detector with its class list
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    class_names: Vec<String>,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, class_names: Vec<String>) -> Self {
        Self {
            detector,
            class_names,
        }
    }

    /// Load the YOLO weights and class names described by `config`
    pub fn from_config(config: &DetectionConfig) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;

        let class_names = load_class_names(config.dataset_yaml.as_deref())?;
        let model = YoloModel::with_options(
            &config.model_path,
            class_names.clone(),
            config.max_detections,
            config.intra_threads,
        )?;

        Ok(Self::new(Arc::new(model), class_names))
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Run detection on an RGB image
    pub fn detect(&self, image: &RgbImage, params: &DetectionParams) -> Result<DetectionReport, VisionError> {
        params.validate()?;
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::InvalidParams("Image has no pixels".to_string()));
        }

        debug!("Running traffic-sign detection");
        let detections = self.detector.detect(image, params)?;
        debug!("Detected {} signs", detections.len());

        Ok(DetectionReport {
            detections,
            image_shape: (image.height(), image.width(), 3),
            model_info: *params,
        })
    }

    /// Decode an image file and run detection on it
    pub fn detect_from_file(&self, image_path: &Path, params: &DetectionParams) -> Result<DetectionReport, VisionError> {
        let image = image::open(image_path)?.to_rgb8();
        self.detect(&image, params)
    }
}

/// Pipeline loaded on first use and kept for the process lifetime
pub struct CachedPipeline {
    config: Arc<DetectionConfig>,
    cell: OnceCell<Arc<DetectionPipeline>>,
}

impl CachedPipeline {
    pub fn new(config: Arc<DetectionConfig>) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Wrap an already built pipeline; `get` never loads weights
    pub fn preloaded(config: Arc<DetectionConfig>, pipeline: Arc<DetectionPipeline>) -> Self {
        Self {
            config,
            cell: OnceCell::new_with(Some(pipeline)),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// The pipeline if it has already been loaded
    pub fn loaded(&self) -> Option<Arc<DetectionPipeline>> {
        self.cell.get().cloned()
    }

    /// Return the pipeline, loading it on the first call
    pub async fn get(&self) -> Result<Arc<DetectionPipeline>, VisionError> {
        let pipeline = self
            .cell
            .get_or_try_init(|| async {
                let manager = ModelManager::new(self.config.clone());
                manager.ensure_configured_model().await?;

                let config = self.config.clone();
                let pipeline = tokio::task::spawn_blocking(move || DetectionPipeline::from_config(&config))
                    .await
                    .map_err(|e| VisionError::Model(format!("Model loading task failed: {}", e)))??;

                info!("Detection model ready ({} classes)", pipeline.class_names().len());
                Ok::<_, VisionError>(Arc::new(pipeline))
            })
            .await?;

        Ok(pipeline.clone())
    }
}
