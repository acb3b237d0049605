//! Rule-based driver advice

use crate::types::Detection;
use serde::{Deserialize, Serialize};

/// Rules only fire above this confidence (strictly greater)
pub const ADVICE_CONFIDENCE: f32 = 0.8;

pub const NO_ADVICE_MESSAGE: &str = "Traffic signs detected, but no recommendations required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn rule_for(detection: &Detection) -> Option<Recommendation> {
    let name = detection.class_name.as_str();

    if name.contains("Speed Limit") {
        let limit = name.split_whitespace().last().unwrap_or_default();
        Some(Recommendation::new(
            RecommendationKind::Warning,
            format!("Speed limit: {} km/h", limit),
        ))
    } else if name.contains("Stop") {
        Some(Recommendation::new(RecommendationKind::Warning, "Mandatory stop!"))
    } else if name.contains("Red Light") {
        Some(Recommendation::new(RecommendationKind::Warning, "Red light - stop!"))
    } else if name.contains("Green Light") {
        Some(Recommendation::new(RecommendationKind::Success, "Green light - you may proceed"))
    } else {
        None
    }
}

/// One message per confident detection matching a rule, or a single info
/// message when nothing matched
pub fn generate_driver_recommendations(detections: &[Detection]) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = detections
        .iter()
        .filter(|d| d.confidence > ADVICE_CONFIDENCE)
        .filter_map(rule_for)
        .collect();

    if recommendations.is_empty() {
        recommendations.push(Recommendation::new(RecommendationKind::Info, NO_ADVICE_MESSAGE));
    }
    recommendations
}
