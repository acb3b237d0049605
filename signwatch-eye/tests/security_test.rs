//! Input validation at the library boundary

use signwatch_eye::classes::load_class_names;
use signwatch_eye::models::ModelManager;
use signwatch_eye::{DetectionConfig, DetectionParams, VisionError};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_params_reject_out_of_range_values() {
    for params in [
        DetectionParams::new(-0.1, 0.4, 640),
        DetectionParams::new(0.5, 1.5, 640),
        DetectionParams::new(f32::NAN, 0.4, 640),
        DetectionParams::new(0.5, 0.4, 0),
        DetectionParams::new(0.5, 0.4, 650),
        DetectionParams::new(0.5, 0.4, 8192),
    ] {
        let err = params.validate().unwrap_err();
        assert!(err.is_client_error(), "{:?} should be a client error", params);
    }

    assert!(DetectionParams::new(0.0, 1.0, 32).validate().is_ok());
}

#[test]
fn test_config_rejects_plain_http_download() {
    let config = DetectionConfig {
        model_url: Some("http://example.com/best.onnx".to_string()),
        ..DetectionConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_malformed_checksum() {
    let config = DetectionConfig {
        model_url: Some("https://example.com/best.onnx".to_string()),
        model_checksum: Some("abc".to_string()),
        ..DetectionConfig::default()
    };
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_model_name_traversal_rejected() {
    let dir = TempDir::new().unwrap();
    let config = DetectionConfig {
        model_path: dir.path().join("best.onnx"),
        ..DetectionConfig::default()
    };
    let manager = ModelManager::new(Arc::new(config));

    let result = manager
        .ensure_model("../../etc/passwd", "https://example.com/best.onnx", "")
        .await;
    assert!(matches!(result, Err(VisionError::Model(_))));
}

#[test]
fn test_class_names_from_dataset_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.yaml");
    std::fs::write(&path, "train: images/train\nnames:\n  0: Stop\n  1: Red Light\n").unwrap();

    let names = load_class_names(Some(&path)).unwrap();
    assert_eq!(names, vec!["Stop".to_string(), "Red Light".to_string()]);
}

#[test]
fn test_sparse_class_ids_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.yaml");
    std::fs::write(&path, "names:\n  0: Stop\n  2: Red Light\n").unwrap();

    assert!(matches!(load_class_names(Some(&path)), Err(VisionError::Config(_))));
}

#[test]
fn test_missing_dataset_file() {
    let result = load_class_names(Some(std::path::Path::new("/nonexistent/data.yaml")));
    assert!(matches!(result, Err(VisionError::Io(_))));
}
