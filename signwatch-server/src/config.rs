// Server configuration: defaults, optional TOML file, SIGNWATCH__* environment

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use signwatch_eye::DetectionConfig;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "SIGNWATCH";

const MIN_UPLOAD_BYTES: usize = 1024;
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub detection: DetectionConfig,
    pub dashboard: DashboardConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, uploads included
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub demo_images_dir: PathBuf,
    /// Load the model at startup instead of on the first request
    pub preload_model: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            demo_images_dir: PathBuf::from("assets/demo_images"),
            preload_model: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, overridden by RUST_LOG
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServerConfig {
    /// Built-in defaults, then `path` when given, then `SIGNWATCH__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Config file {:?} does not exist", path);
            }
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration values")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.host.trim().is_empty() {
            bail!("http.host must not be empty");
        }
        if !(MIN_UPLOAD_BYTES..=MAX_UPLOAD_BYTES).contains(&self.http.max_upload_bytes) {
            bail!(
                "http.max_upload_bytes must be between {} and {}",
                MIN_UPLOAD_BYTES,
                MAX_UPLOAD_BYTES
            );
        }
        if self.log.level.trim().is_empty() {
            bail!("log.level must not be empty");
        }

        self.detection
            .validate()
            .map_err(|e| anyhow::anyhow!("detection: {}", e))?;

        Ok(())
    }
}
