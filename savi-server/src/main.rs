// SAVI stream server

use anyhow::Context;
use clap::Parser;
use savi_core::{SaviConfig, VideoCatalog};
use savi_inference::{InMemoryEngine, InferenceEngine};
use savi_server::{create_router, logging, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "savi-server")]
#[command(about = "Streams video segmentation masks as multipart responses", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, env = "SAVI_CONFIG")]
    config: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Root of the gallery, posters and uploads directories
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// text or json
    #[arg(long)]
    log_format: Option<String>,

    /// Replay sessions from this JSON fixture
    #[arg(long)]
    sessions: Option<PathBuf>,

    /// Simulated per-frame inference time in milliseconds
    #[arg(long, default_value = "0")]
    frame_delay_ms: u64,
}

impl Args {
    /// Defaults, then the config file, then `SAVI_*` variables, then flags.
    fn load_config(&self) -> anyhow::Result<SaviConfig> {
        let mut config = match &self.config {
            Some(path) => SaviConfig::from_file(path)?,
            None => SaviConfig::default(),
        };
        config.apply_env();

        if let Some(host) = &self.host {
            config.network.bind_address = host.clone();
        }
        if let Some(port) = self.port {
            config.network.bind_port = port;
        }
        if let Some(data_dir) = &self.data_dir {
            config.assets.data_dir = data_dir.clone();
        }
        if let Some(log_level) = &self.log_level {
            config.instance.log_level = log_level.clone();
        }
        if let Some(log_format) = &self.log_format {
            config.instance.log_format = log_format.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn build_engine(&self) -> anyhow::Result<InMemoryEngine> {
        let engine = match &self.sessions {
            Some(path) => InMemoryEngine::from_fixture(path)
                .with_context(|| format!("loading sessions from {}", path.display()))?,
            None => {
                warn!("No --sessions fixture given, every propagation will answer 404");
                InMemoryEngine::new()
            }
        };
        Ok(match self.frame_delay_ms {
            0 => engine,
            ms => engine.with_frame_delay(Duration::from_millis(ms)),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    logging::init(&config.instance)?;

    info!("Starting SAVI stream server...");

    let assets = &config.assets;
    let catalog = VideoCatalog::scan(
        &assets.gallery_dir(),
        &assets.gallery_prefix,
        &assets.posters_dir(),
        &assets.posters_prefix,
    )?;
    info!("Video catalog ready: {} videos", catalog.len());

    let engine: Arc<dyn InferenceEngine> = Arc::new(args.build_engine()?);
    info!("Inference engine ready: {}", engine.name());

    let addr = config.bind_addr();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(engine, Arc::new(catalog), config, shutdown_rx);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown().await;
            // live propagation streams end on this signal
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
