// SignWatch dashboard server

use anyhow::{Context, Result};
use clap::Parser;
use signwatch_server::config::ServerConfig;
use signwatch_server::http::{create_router, ApiState};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "signwatch-server", version, about = "Traffic-sign detection dashboard")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SIGNWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// ONNX weights of the detector
    #[arg(long)]
    model: Option<PathBuf>,

    /// Training dataset YAML with the class names
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long)]
    demo_images: Option<PathBuf>,

    /// Load the model before accepting requests
    #[arg(long)]
    preload: bool,

    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Command-line flags win over file and environment settings
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.http.host = host.clone();
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(model) = &self.model {
            config.detection.model_path = model.clone();
        }
        if let Some(dataset) = &self.dataset {
            config.detection.dataset_yaml = Some(dataset.clone());
        }
        if let Some(dir) = &self.demo_images {
            config.dashboard.demo_images_dir = dir.clone();
        }
        if self.preload {
            config.dashboard.preload_model = true;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config);
    info!("🚦 Starting SignWatch v{}", env!("CARGO_PKG_VERSION"));

    let state = ApiState::new(config.clone());

    if config.dashboard.preload_model {
        info!("Loading detection model from {:?}", config.detection.model_path);
        match state.pipeline.get().await {
            Ok(_) => state.metrics.set_model_loaded(true).await,
            Err(e) => warn!("Model preload failed, will retry on first request: {}", e),
        }
    }

    if !config.dashboard.demo_images_dir.is_dir() {
        warn!(
            "Demo image directory {:?} not found, the demo source will be empty",
            config.dashboard.demo_images_dir
        );
    }

    let app = create_router(state);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("✅ Dashboard listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
    {
        error!("HTTP server failed: {}", e);
        return Err(e.into());
    }

    info!("👋 SignWatch stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}
