//! Churn inference service entry point

use anyhow::{Context, Result};
use churn_service::{metrics, start_server, AppState, InferenceService, ModelHandle, ServiceConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "churn-service")]
#[command(version = churn_service::VERSION)]
#[command(about = "Serve churn predictions from a trained model artifact", long_about = None)]
struct Args {
    /// Configuration file (default: config/churn-service.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the artifact path
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Override the schema path
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(artifact) = args.artifact {
        config.artifact_path = artifact;
    }
    if let Some(schema) = args.schema {
        config.schema_path = schema;
    }
    config.validate().context("Invalid configuration")?;

    init_logging(&config)?;
    info!("Starting churn service v{}", churn_service::VERSION);

    let prometheus = match metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!("Failed to install Prometheus metrics recorder: {}", err);
            None
        }
    };

    let handle = Arc::new(ModelHandle::new());
    if let Err(err) = handle.load(&config.artifact_path, &config.schema_path) {
        if config.exit_on_load_failure {
            error!("Refusing to start without a model: {}", err);
            return Err(err).context("Failed to load model");
        }
        warn!("Serving without a model; readiness will report failure");
    }

    let state = AppState::new(
        InferenceService::new(handle, config.max_batch_size),
        prometheus,
        config.request_timeout(),
        config.max_body_bytes,
    );

    start_server(state, &config.bind_address, shutdown_signal()).await?;
    info!("Churn service stopped");
    Ok(())
}

fn init_logging(config: &ServiceConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.log_format == "compact" {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
