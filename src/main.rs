// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use service_health::{
    config::{self, Settings},
    health::{CheckerBuilder, TracingNotifier},
    metrics::MetricsRegistry,
    server::{HealthHandler, ServerBuilder},
    ProbeClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "service-health", version, about = "Aggregated service health endpoint")]
struct Cli {
    /// Settings file (yaml, json or toml).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Request the health of the running service and exit with its status.
    #[arg(short = 'H', long = "health")]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("service_health=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = config::load_config(cli.config.as_ref())?;

    if cli.health {
        let client = ProbeClient::new(settings.probe_settings())?;
        client.probe().await.exit();
    }

    if let Some(path) = &cli.config {
        info!("Loaded configuration from: {}", path.display());
    }

    run(settings).await
}

async fn run(settings: Settings) -> Result<()> {
    let metrics_registry = if settings.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new()?))
    } else {
        None
    };

    let mut builder =
        CheckerBuilder::from_settings(&settings.checker).notifier(Arc::new(TracingNotifier));
    if let Some(registry) = &metrics_registry {
        builder = builder.metrics(registry.collector());
    }
    for check in &settings.checks {
        let client = ProbeClient::new(check.client())
            .with_context(|| format!("Failed to create health probe for {}", check.name))?;
        info!("Aggregating {} from {}", check.name, client.target_url());
        builder = builder.check(check.name.clone(), Arc::new(client));
    }
    let checker = Arc::new(builder.build()?);

    let mut handler = HealthHandler::from_settings(checker, &settings.server)?;
    if let Some(registry) = metrics_registry {
        info!("Serving metrics on {}", settings.metrics.path);
        handler = handler.with_metrics(&settings.metrics.path, registry);
    }

    let addr = settings.server.addr()?;
    info!("Serving health on http://{}{}", addr, settings.server.path);

    ServerBuilder::new(addr)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
