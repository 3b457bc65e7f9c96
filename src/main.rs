use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bucketeer::config::{BucketeerConfig, StoreBackend};
use bucketeer::ratelimit::RateLimiter;
use bucketeer::service::DemoService;

/// Drive the guarded demo service from several instances sharing one store.
#[derive(Debug, Parser)]
#[command(name = "bucketeer", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PostgreSQL URL; selects the postgres store when given
    #[arg(long, env = "BUCKETEER_DATABASE_URL")]
    database_url: Option<String>,

    /// Number of limiter instances sharing the store
    #[arg(long, default_value_t = 2)]
    instances: usize,

    /// Calls per instance to each guarded operation
    #[arg(long, default_value_t = 5)]
    requests: usize,

    /// Pause between rounds of calls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Bucketeer");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => BucketeerConfig::from_file(path)?,
        None => BucketeerConfig::default(),
    };
    if let Some(url) = args.database_url.clone() {
        config.store.backend = StoreBackend::Postgres;
        config.store.database_url = Some(url);
    }
    info!(backend = ?config.store.backend, "Configuration loaded");

    let policy = config.bucket_policy()?;
    let store = config.store.open().await?;

    let services: Vec<DemoService> = (0..args.instances)
        .map(|i| {
            let limiter = RateLimiter::new(Arc::clone(&store), policy.clone())
                .with_instance_id(format!("instance-{}", i));
            DemoService::new(Arc::new(limiter))
        })
        .collect();
    info!(instances = services.len(), "Rate limiters initialized");

    let interval = Duration::from_millis(args.interval_ms);
    let workers = services
        .into_iter()
        .map(|service| drive(service, args.requests, interval));

    tokio::select! {
        _ = join_all(workers) => {
            info!("All requests issued");
        }
        _ = shutdown_signal() => {}
    }

    info!("Bucketeer stopped");
    Ok(())
}

/// Call both guarded operations `rounds` times, pausing between rounds.
async fn drive(service: DemoService, rounds: usize, interval: Duration) {
    for round in 0..rounds {
        for (name, result) in [("run1", service.run1().await), ("run2", service.run2().await)] {
            match result {
                Ok(body) => info!(
                    instance = %service.limiter().instance_id(),
                    round = round,
                    operation = name,
                    response = body,
                    "Call served"
                ),
                Err(e) if e.is_rate_limited() => info!(
                    instance = %service.limiter().instance_id(),
                    round = round,
                    operation = name,
                    "Call rejected: {}", e
                ),
                Err(e) => warn!(
                    instance = %service.limiter().instance_id(),
                    round = round,
                    operation = name,
                    error = %e,
                    "Call failed"
                ),
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
