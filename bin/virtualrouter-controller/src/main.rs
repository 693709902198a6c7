use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kube::Client;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use virtualrouter_core::ControllerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Reconciles VirtualRouter resources into router Deployments
#[derive(Debug, Parser)]
#[command(name = "virtualrouter-controller", version)]
struct Args {
    /// Number of VirtualRouters synced concurrently
    #[arg(
        long,
        env = "VIRTUALROUTER_WORKERS",
        default_value_t = 2,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    workers: u16,

    /// First retry delay of a failing VirtualRouter, in milliseconds
    #[arg(long, env = "VIRTUALROUTER_BACKOFF_BASE_MS", default_value_t = 5)]
    backoff_base_ms: u64,

    /// Retry delay ceiling, in seconds
    #[arg(long, env = "VIRTUALROUTER_BACKOFF_MAX_SECS", default_value_t = 1000)]
    backoff_max_secs: u64,

    /// Overall requeue rate across all VirtualRouters
    #[arg(long, env = "VIRTUALROUTER_QPS", default_value_t = 10.0, value_parser = parse_qps)]
    qps: f64,

    /// Requeue burst allowed above the rate
    #[arg(long, env = "VIRTUALROUTER_BURST", default_value_t = 100)]
    burst: u32,

    /// Component name events are reported under
    #[arg(long, env = "VIRTUALROUTER_REPORTER", default_value = "virtual-router")]
    reporter: String,

    #[arg(long, env = "VIRTUALROUTER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn parse_qps(value: &str) -> std::result::Result<f64, String> {
    let qps: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if qps.is_finite() && qps > 0.0 {
        Ok(qps)
    } else {
        Err(format!("{} is not a positive rate", value))
    }
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: usize::from(self.workers),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            qps: self.qps,
            burst: self.burst,
            reporter: self.reporter.clone(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    // panics are logged before the default hook aborts the thread
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        error!(%panic, "Observed a panic");
        default_hook(panic);
    }));
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Failed to setup SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting virtualrouter-controller...");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let config = args.controller_config();
    info!(workers = config.workers, "Connected to Kubernetes cluster");

    virtualrouter_core::runtime::run(client, config, shutdown_signal())
        .await
        .context("VirtualRouter controller failed")?;

    info!("Shutdown complete");
    Ok(())
}
