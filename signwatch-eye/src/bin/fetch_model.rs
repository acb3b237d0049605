//! Download the detector weights ahead of the first request

use anyhow::{bail, Context, Result};
use clap::Parser;
use signwatch_eye::config::DetectionConfig;
use signwatch_eye::models::ModelManager;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fetch_model", about = "Fetch the traffic-sign ONNX weights")]
struct Args {
    /// Where the weights should end up
    #[arg(long, env = "SIGNWATCH_MODEL_PATH", default_value = "./models/best.onnx")]
    model_path: PathBuf,

    /// HTTPS location of the weights
    #[arg(long, env = "SIGNWATCH_MODEL_URL")]
    url: String,

    /// Expected SHA-256 (hex); verification is skipped when omitted
    #[arg(long, env = "SIGNWATCH_MODEL_CHECKSUM")]
    checksum: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = DetectionConfig {
        model_path: args.model_path,
        model_url: Some(args.url),
        model_checksum: args.checksum,
        ..DetectionConfig::default()
    };
    if let Err(e) = config.validate() {
        bail!("Invalid model settings: {}", e);
    }

    let manager = ModelManager::new(Arc::new(config));
    let path = manager
        .ensure_configured_model()
        .await
        .context("Failed to fetch model weights")?;

    println!("Model available at {}", path.display());
    Ok(())
}
