//! YOLO traffic-sign detection model

use crate::error::VisionError;
use crate::processing::Detector;
use crate::types::{BoundingBox, Detection, DetectionParams};
use crate::utils::{letterbox, rgb_to_chw_tensor, Letterbox};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Default cap on detections returned per image
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Raw candidate box in original image pixels, before truncation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// IoU (intersection over union) with another box
    pub fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        inter / union
    }
}

/// YOLO model for traffic-sign detection
pub struct YoloModel {
    session: Mutex<Session>,
    class_names: Vec<String>,
    max_detections: usize,
}

impl YoloModel {
    /// Load an ONNX export of the trained weights
    pub fn new(model_path: &Path, class_names: Vec<String>) -> Result<Self, VisionError> {
        Self::with_options(model_path, class_names, DEFAULT_MAX_DETECTIONS, 0)
    }

    pub fn with_options(
        model_path: &Path,
        class_names: Vec<String>,
        max_detections: usize,
        intra_threads: usize,
    ) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::Model(format!("Model not found: {:?}", model_path)));
        }
        if class_names.is_empty() {
            return Err(VisionError::Model("Model needs at least one class name".to_string()));
        }

        let mut builder = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?;

        if intra_threads > 0 {
            builder = builder
                .with_intra_threads(intra_threads)
                .map_err(|e| VisionError::Ort(format!("Failed to set intra threads: {}", e)))?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", model_path);
        info!("Classes: {}", class_names.len());

        Ok(Self {
            session: Mutex::new(session),
            class_names,
            max_detections,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Preprocess image for YOLO input
    fn preprocess(&self, image: &RgbImage, size: u32) -> Result<(Tensor<f32>, Letterbox), VisionError> {
        let (canvas, placement) = letterbox(image, size)?;
        let chw = rgb_to_chw_tensor(&canvas)?;

        let shape = [1usize, 3, size as usize, size as usize];
        let input = Tensor::from_array((shape, chw.into_boxed_slice()))
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        Ok((input, placement))
    }
}

impl Detector for YoloModel {
    fn detect(&self, image: &RgbImage, params: &DetectionParams) -> Result<Vec<Detection>, VisionError> {
        params.validate()?;
        debug!("Running YOLO detection on {}x{} image", image.width(), image.height());

        let (input, placement) = self.preprocess(image, params.input_size)?;

        let (dims, data) = {
            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            let data = data.to_vec();
            (dims, data)
        };
        debug!("YOLO output shape: {:?}", dims);

        let candidates = decode_output(
            &dims,
            &data,
            self.class_names.len(),
            &placement,
            image.dimensions(),
            params.confidence_threshold,
        )?;
        let kept = non_max_suppression(candidates, params.iou_threshold, self.max_detections);

        let detections: Vec<Detection> = kept
            .into_iter()
            .map(|c| Detection {
                bbox: BoundingBox::from_f32(c.x1, c.y1, c.x2, c.y2),
                confidence: c.score,
                class_id: c.class_id,
                class_name: self.class_names[c.class_id].clone(),
            })
            .collect();

        debug!("YOLO detected {} signs", detections.len());
        Ok(detections)
    }
}

/// Decode a `[1, 4 + nc, N]` or `[1, N, 4 + nc]` output into candidates
/// on the original image, keeping scores above `confidence_threshold`
pub fn decode_output(
    dims: &[i64],
    data: &[f32],
    num_classes: usize,
    placement: &Letterbox,
    image_size: (u32, u32),
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, VisionError> {
    if dims.len() != 3 || dims[0] != 1 {
        return Err(VisionError::Model(format!("Unexpected output shape: {:?}", dims)));
    }

    let rows = 4 + num_classes;
    let (a, b) = (dims[1] as usize, dims[2] as usize);
    // Channel-major exports are the norm; transposed ones put anchors first
    let (num_anchors, channel_major) = if a == rows {
        (b, true)
    } else if b == rows {
        (a, false)
    } else {
        return Err(VisionError::Model(format!(
            "Output shape {:?} does not match {} classes",
            dims, num_classes
        )));
    };

    if data.len() < rows * num_anchors {
        return Err(VisionError::Model(format!(
            "Output holds {} values, expected {}",
            data.len(),
            rows * num_anchors
        )));
    }

    let at = |row: usize, anchor: usize| -> f32 {
        if channel_major {
            data[row * num_anchors + anchor]
        } else {
            data[anchor * rows + row]
        }
    };

    let (width, height) = (image_size.0 as f32, image_size.1 as f32);
    let mut candidates = Vec::new();

    for anchor in 0..num_anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class_id in 0..num_classes {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        if !best_score.is_finite() || best_score <= confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        if !cx.is_finite() || !cy.is_finite() || !w.is_finite() || !h.is_finite() {
            continue;
        }

        let (x1, y1) = placement.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = placement.unmap(cx + w / 2.0, cy + h / 2.0);

        let candidate = Candidate {
            x1: x1.clamp(0.0, width),
            y1: y1.clamp(0.0, height),
            x2: x2.clamp(0.0, width),
            y2: y2.clamp(0.0, height),
            score: best_score,
            class_id: best_class,
        };

        if candidate.x2 <= candidate.x1 || candidate.y2 <= candidate.y1 {
            continue;
        }
        candidates.push(candidate);
    }

    Ok(candidates)
}

/// Class-aware greedy NMS, highest score first, capped at `max_detections`
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        if kept.len() == max_detections {
            break;
        }

        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[j].class_id != candidates[i].class_id {
                continue;
            }
            if candidates[i].iou(&candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept
}
