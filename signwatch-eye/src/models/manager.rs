//! Weights download and integrity checks

use crate::config::DetectionConfig;
use crate::error::VisionError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_MODEL_SIZE: usize = 1_000_000_000; // 1GB
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

/// Fetches the ONNX weights into the configured model directory
pub struct ModelManager {
    config: Arc<DetectionConfig>,
}

impl ModelManager {
    pub fn new(config: Arc<DetectionConfig>) -> Self {
        Self { config }
    }

    /// Ensure model directory exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, VisionError> {
        let model_dir = self.config.model_dir();
        if !model_dir.exists() {
            fs::create_dir_all(&model_dir)?;
            info!("Created model directory: {:?}", model_dir);
        }
        Ok(model_dir)
    }

    /// Path of the configured weights, downloading them first when missing
    /// and a download URL is configured
    pub async fn ensure_configured_model(&self) -> Result<PathBuf, VisionError> {
        let model_path = self.config.model_path.clone();
        if model_path.exists() {
            return Ok(model_path);
        }

        let url = self.config.model_url.as_deref().ok_or_else(|| {
            VisionError::Model(format!(
                "Model not found at {:?} and no model_url is configured",
                model_path
            ))
        })?;

        let name = model_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VisionError::Config("model_path must name a file".to_string()))?
            .to_string();
        let checksum = self.config.model_checksum.clone().unwrap_or_default();

        self.ensure_model(&name, url, &checksum).await
    }

    /// Download model if not present
    pub async fn ensure_model(&self, model_name: &str, url: &str, checksum: &str) -> Result<PathBuf, VisionError> {
        validate_model_name(model_name)?;
        validate_url(url)?;

        let model_dir = self.ensure_model_dir()?;
        let model_path = model_dir.join(model_name);

        if model_path.exists() {
            info!("Model {} already exists at {:?}", model_name, model_path);
            return Ok(model_path);
        }

        info!("Downloading model {} from {}", model_name, url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(VisionError::Model(format!(
                "Failed to download model: HTTP {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE as u64 {
                return Err(VisionError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;
        verify_payload(model_name, &bytes, checksum)?;
        write_atomically(&model_path, &bytes)?;

        info!("Model {} saved to {:?}", model_name, model_path);
        Ok(model_path)
    }
}

fn validate_model_name(model_name: &str) -> Result<(), VisionError> {
    if model_name.is_empty() || model_name.len() > 255 {
        return Err(VisionError::Model("Invalid model name".to_string()));
    }
    if model_name.contains("..") || model_name.contains('/') || model_name.contains('\\') {
        return Err(VisionError::Model("Model name contains invalid characters".to_string()));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), VisionError> {
    if url.is_empty() || url.len() > 2048 {
        return Err(VisionError::Model("Invalid URL".to_string()));
    }
    if !url.starts_with("https://") {
        return Err(VisionError::Model("Only HTTPS URLs are allowed for model downloads".to_string()));
    }
    Ok(())
}

/// Size bounds and optional SHA-256 check of downloaded weights
pub fn verify_payload(model_name: &str, bytes: &[u8], checksum: &str) -> Result<(), VisionError> {
    if bytes.len() > MAX_MODEL_SIZE {
        return Err(VisionError::Model(format!(
            "Downloaded model too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_MODEL_SIZE
        )));
    }
    if bytes.len() < MIN_MODEL_SIZE {
        return Err(VisionError::Model("Downloaded file too small, likely corrupted".to_string()));
    }

    if checksum.is_empty() {
        warn!("Checksum verification skipped for model {}", model_name);
        return Ok(());
    }

    let computed = hex::encode(Sha256::digest(bytes));
    if !computed.eq_ignore_ascii_case(checksum) {
        return Err(VisionError::Model(format!(
            "Checksum mismatch for model {}: expected {}, got {}",
            model_name, checksum, computed
        )));
    }

    info!("Verified checksum for model {}", model_name);
    Ok(())
}

/// Write to a temp file first, then rename over the target
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), VisionError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(VisionError::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> ModelManager {
        let mut config = DetectionConfig::default();
        config.model_path = dir.path().join("weights").join("best.onnx");
        ModelManager::new(Arc::new(config))
    }

    #[test]
    fn test_ensure_model_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);

        let dir = manager.ensure_model_dir().unwrap();
        assert!(dir.exists());
        // Idempotent
        assert!(manager.ensure_model_dir().is_ok());
    }

    #[tokio::test]
    async fn test_ensure_model_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);

        for name in ["", "../evil", "model/name", "model\\name"] {
            let result = manager.ensure_model(name, "https://example.com/best.onnx", "").await;
            assert!(result.is_err(), "{} should be rejected", name);
        }
    }

    #[tokio::test]
    async fn test_ensure_model_invalid_url() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);

        for url in ["", "http://example.com/best.onnx", "ftp://example.com/best.onnx"] {
            assert!(manager.ensure_model("best.onnx", url, "").await.is_err());
        }
    }

    #[tokio::test]
    async fn test_existing_model_is_not_downloaded() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);
        let dir = manager.ensure_model_dir().unwrap();
        fs::write(dir.join("best.onnx"), b"weights").unwrap();

        let path = manager.ensure_configured_model().await.unwrap();
        assert_eq!(path, dir.join("best.onnx"));
    }

    #[tokio::test]
    async fn test_missing_model_without_url() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir);
        assert!(matches!(
            manager.ensure_configured_model().await,
            Err(VisionError::Model(_))
        ));
    }

    #[test]
    fn test_verify_payload_size_bounds() {
        assert!(verify_payload("best.onnx", &[0u8; 10], "").is_err());
        assert!(verify_payload("best.onnx", &[0u8; 2048], "").is_ok());
    }

    #[test]
    fn test_verify_payload_checksum() {
        let bytes = vec![7u8; 2048];
        let checksum = hex::encode(Sha256::digest(&bytes));
        assert!(verify_payload("best.onnx", &bytes, &checksum).is_ok());
        assert!(verify_payload("best.onnx", &bytes, &checksum.to_uppercase()).is_ok());
        assert!(verify_payload("best.onnx", &bytes, &"0".repeat(64)).is_err());
    }

    #[test]
    fn test_write_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("best.onnx");
        write_atomically(&path, b"weights").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"weights");
        assert!(!temp_dir.path().join("best.tmp").exists());
    }
}
