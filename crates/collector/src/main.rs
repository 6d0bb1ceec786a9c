//! Rightsizer - workload rightsizing engine
//!
//! Periodically ingests running pods and their usage, keeps a usage history
//! in SQLite, and serves percentile-based resource recommendations over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use collector_lib::{
    api,
    health::{components, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    orchestrator::{Orchestrator, SchedulerBuilder},
    source::KubeSampleSource,
    store::{SqlitePool, SqliteStore, StoreConfig},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let settings = config::Settings::load(&cli)?;
    let engine_config = settings.engine();

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "rightsizer".to_string());
    let logger = StructuredLogger::new(instance);
    logger.log_startup(
        VERSION,
        &settings.database.path,
        if cli.once { "once" } else { "continuous" },
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLE_SOURCE).await;
    health_registry.register(components::HISTORY_STORE).await;
    health_registry.register(components::ORCHESTRATOR).await;

    let pool = SqlitePool::open(StoreConfig::new(&settings.database.path))
        .context("Failed to open history store")?;
    let store = Arc::new(SqliteStore::new(pool));
    health_registry.mark_store_initialized().await;

    let source = Arc::new(
        KubeSampleSource::connect(&settings.kube_options())
            .await
            .context("Failed to connect to Kubernetes")?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        source,
        store.clone(),
        health_registry.clone(),
        logger.clone(),
    ));
    let scheduler = SchedulerBuilder::new()
        .orchestrator(orchestrator)
        .config(engine_config)
        .namespace(settings.kubernetes.namespace.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    if cli.once {
        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = signal_tx.send(());
            }
        });

        let report = scheduler.run_once(shutdown_tx.subscribe()).await;
        logger.log_shutdown("single cycle finished");
        if let Some(report) = report {
            if report.has_failures() {
                info!(
                    reconcile_failed = report.reconcile.failed,
                    analyze_failed = report.analyze.failed,
                    "Cycle finished with entity failures"
                );
            }
        }
        return Ok(());
    }

    let api_handle = if cli.no_api {
        None
    } else {
        let state = Arc::new(api::AppState::new(
            store,
            health_registry.clone(),
            EngineMetrics::new(),
        ));
        Some(tokio::spawn(api::serve(
            settings.api.port,
            state,
            shutdown_tx.subscribe(),
        )))
    };

    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    let cycles = scheduler_handle.await?;
    info!(cycles, "Collection stopped");

    if let Some(handle) = api_handle {
        if let Err(e) = handle.await? {
            error!(error = %e, "API server failed");
        }
    }

    Ok(())
}
