//! Traffic-sign classes, their colors and display categories

use crate::error::VisionError;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Class names in training order
pub const CLASS_NAMES: &[&str] = &[
    "Green Light",
    "Red Light",
    "Speed Limit 10",
    "Speed Limit 100",
    "Speed Limit 110",
    "Speed Limit 120",
    "Speed Limit 20",
    "Speed Limit 30",
    "Speed Limit 40",
    "Speed Limit 50",
    "Speed Limit 60",
    "Speed Limit 70",
    "Speed Limit 80",
    "Speed Limit 90",
    "Stop",
];

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const CYAN: Rgb<u8> = Rgb([0, 255, 255]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Box and label color for a class; unknown classes are drawn white
pub fn class_color(class_name: &str) -> Rgb<u8> {
    match class_name {
        "Green Light" => GREEN,
        "Red Light" | "Stop" => RED,
        name if name.starts_with("Speed Limit ") && CLASS_NAMES.contains(&name) => CYAN,
        _ => WHITE,
    }
}

/// Grouping used by the sidebar list of supported signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignCategory {
    SpeedLimit,
    TrafficLight,
    Stop,
    Other,
}

impl SignCategory {
    pub fn of(class_name: &str) -> Self {
        if class_name.contains("Speed Limit") {
            SignCategory::SpeedLimit
        } else if class_name.contains("Light") {
            SignCategory::TrafficLight
        } else if class_name.contains("Stop") {
            SignCategory::Stop
        } else {
            SignCategory::Other
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SignCategory::SpeedLimit => "🔢",
            SignCategory::TrafficLight => "🚦",
            SignCategory::Stop => "🛑",
            SignCategory::Other => "❔",
        }
    }
}

/// Class entry as exposed to the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub id: usize,
    pub name: String,
    pub category: SignCategory,
    pub icon: &'static str,
    pub color: [u8; 3],
}

pub fn describe_classes(class_names: &[String]) -> Vec<ClassInfo> {
    class_names
        .iter()
        .enumerate()
        .map(|(id, name)| {
            let category = SignCategory::of(name);
            ClassInfo {
                id,
                name: name.clone(),
                category,
                icon: category.icon(),
                color: class_color(name).0,
            }
        })
        .collect()
}

pub fn default_class_names() -> Vec<String> {
    CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

/// `names` may be written as a list or as an index map in dataset files
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DatasetNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    names: DatasetNames,
}

/// Parse class names from the contents of a training dataset YAML
pub fn parse_class_names(yaml: &str) -> Result<Vec<String>, VisionError> {
    let dataset: DatasetFile = serde_yaml::from_str(yaml)
        .map_err(|e| VisionError::Config(format!("Invalid dataset YAML: {}", e)))?;

    let names = match dataset.names {
        DatasetNames::List(names) => names,
        DatasetNames::Map(map) => {
            // Indices must be dense so class ids stay aligned with the model output
            for (expected, id) in map.keys().enumerate() {
                if *id != expected {
                    return Err(VisionError::Config(format!(
                        "Dataset class ids must be contiguous from 0, missing {}",
                        expected
                    )));
                }
            }
            map.into_values().collect()
        }
    };

    if names.is_empty() {
        return Err(VisionError::Config("Dataset YAML lists no classes".to_string()));
    }

    Ok(names)
}

/// Load class names from a dataset YAML, or the built-in list when none is given
pub fn load_class_names(dataset_yaml: Option<&Path>) -> Result<Vec<String>, VisionError> {
    match dataset_yaml {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let names = parse_class_names(&content)?;
            info!("Loaded {} class names from {:?}", names.len(), path);
            Ok(names)
        }
        None => {
            debug!("No dataset YAML configured, using built-in class names");
            Ok(default_class_names())
        }
    }
}
