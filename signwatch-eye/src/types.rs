//! Detection records shared by the detector, annotator, charts and advice

use crate::error::VisionError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_IOU: f32 = 0.4;
pub const DEFAULT_IMAGE_SIZE: u32 = 640;

/// Axis-aligned box in pixel coordinates of the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates toward zero, the way the model's float boxes are reported
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1 as i32,
            y1: y1 as i32,
            x2: x2 as i32,
            y2: y2 as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// One detected traffic sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// Parameters forwarded to the model on every call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            input_size: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl DetectionParams {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, input_size: u32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            input_size,
        }
    }

    pub fn validate(&self) -> Result<(), VisionError> {
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_unit_interval("iou_threshold", self.iou_threshold)?;

        if self.input_size < 32 || self.input_size > 4096 {
            return Err(VisionError::InvalidParams(format!(
                "input_size must be between 32 and 4096, got {}",
                self.input_size
            )));
        }
        if self.input_size % 32 != 0 {
            return Err(VisionError::InvalidParams(format!(
                "input_size must be a multiple of 32, got {}",
                self.input_size
            )));
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<(), VisionError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(VisionError::InvalidParams(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Shape of the analysed image as (height, width, channels)
pub type ImageShape = (u32, u32, u8);

/// Output of one detector call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub detections: Vec<Detection>,
    pub image_shape: ImageShape,
    pub model_info: DetectionParams,
}

impl DetectionReport {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
