//! Drawing detection boxes and labels onto result images

use crate::classes::class_color;
use crate::types::{Detection, DetectionReport};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LABEL_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_SCALE: f32 = 18.0;
const BOX_THICKNESS: i32 = 2;
/// Pixels between the label baseline and the top of the box
const LABEL_BASELINE_GAP: i32 = 5;
/// Glyph metrics assumed when no font could be loaded
const FALLBACK_GLYPH: (i32, i32) = (9, 13);

/// Well-known font locations tried when none is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// What each label shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationOptions {
    pub show_confidence: bool,
    pub show_class_names: bool,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            show_confidence: true,
            show_class_names: true,
        }
    }
}

/// Confidence as a percentage with two decimals, e.g. `87.34%`
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", confidence as f64 * 100.0)
}

/// Label text for one detection
pub fn format_label(detection: &Detection, options: &AnnotationOptions) -> String {
    let mut parts = Vec::with_capacity(2);
    if options.show_class_names {
        parts.push(detection.class_name.clone());
    }
    if options.show_confidence {
        parts.push(format_confidence(detection.confidence));
    }
    parts.join(" | ")
}

/// Draws result images; holds the label font for the process lifetime
pub struct Annotator {
    font: Option<Font<'static>>,
}

impl Annotator {
    /// Load the label font from `font_path`, or from a system location
    pub fn new(font_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        let font = candidates.iter().find_map(|path| load_font(path));
        if font.is_none() {
            warn!("No TrueType font available, box labels will be drawn without text");
        }

        Self { font }
    }

    /// Annotator that never renders label text
    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Width and height of `label` when drawn
    pub fn measure(&self, label: &str) -> (i32, i32) {
        match &self.font {
            Some(font) => text_size(Scale::uniform(LABEL_SCALE), font, label),
            None => (
                FALLBACK_GLYPH.0 * label.chars().count() as i32,
                FALLBACK_GLYPH.1,
            ),
        }
    }

    /// Copy `image` and draw every detection of `report` onto it
    pub fn create_result_image(
        &self,
        image: &RgbImage,
        report: &DetectionReport,
        options: &AnnotationOptions,
    ) -> RgbImage {
        let mut result = image.clone();
        for detection in &report.detections {
            self.draw_detection(&mut result, detection, options);
        }
        debug!("Annotated {} detections", report.detections.len());
        result
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection, options: &AnnotationOptions) {
        let color = class_color(&detection.class_name);
        let bbox = detection.bbox;

        for inset in 0..BOX_THICKNESS {
            let width = bbox.width() - 2 * inset + 1;
            let height = bbox.height() - 2 * inset + 1;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let label = format_label(detection, options);
        if label.is_empty() {
            return;
        }

        let (text_w, text_h) = self.measure(&label);
        let background_h = text_h + 10;
        if text_w > 0 {
            let background = Rect::at(bbox.x1, bbox.y1 - background_h)
                .of_size(text_w as u32, background_h as u32);
            draw_filled_rect_mut(canvas, background, color);
        }

        if let Some(font) = &self.font {
            let scale = Scale::uniform(LABEL_SCALE);
            let y = text_top(bbox.y1 - LABEL_BASELINE_GAP, font.v_metrics(scale).ascent);
            draw_text_mut(canvas, LABEL_TEXT, bbox.x1, y, scale, font, &label);
            draw_text_mut(canvas, LABEL_TEXT, bbox.x1 + 1, y, scale, font, &label);
        }
    }
}

/// imageproc lays text out from its top edge with the baseline one ascent below
fn text_top(baseline: i32, ascent: f32) -> i32 {
    baseline - ascent.round() as i32
}

fn load_font(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path).ok()?;
    match Font::try_from_vec(bytes) {
        Some(font) => {
            info!("Loaded label font from {:?}", path);
            Some(font)
        }
        None => {
            warn!("{:?} is not a usable TrueType font", path);
            None
        }
    }
}
