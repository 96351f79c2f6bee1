//! CPU sentinel daemon
//!
//! Samples host CPU load, flags novel load with a rolling isolation forest
//! and terminates runaway processes (or runs a registered script) when
//! the verdict is confident enough. Every remediation is written to an
//! SQLite incident log.

use anyhow::Result;
use sentinel_agent::api;
use sentinel_lib::{
    health::HealthRegistry,
    observability::{SentinelMetrics, StructuredLogger},
    remediation::{create_backend, RemediationExecutor},
    AuditStore, ControlLoopBuilder, MetricSampler, SentinelConfig,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cpu-sentinel");

    // Load configuration; refuse to start on invalid values
    let config = Arc::new(SentinelConfig::load()?);
    info!(
        node_name = %config.node_name,
        interval_secs = config.scan.interval_secs,
        threshold = config.remediation.confidence_threshold_percent,
        "Sentinel configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = SentinelMetrics::new();
    let logger = StructuredLogger::new(config.node_name.clone());

    let audit = Arc::new(AuditStore::open(&config.audit.database_path)?);
    audit.init()?;
    info!(path = %config.audit.database_path.display(), "Incident log opened");

    let backend = create_backend(&config.remediation)?;
    let executor = Arc::new(RemediationExecutor::new(
        backend,
        audit,
        metrics.clone(),
        logger.clone(),
        health_registry.clone(),
    ));

    let sampler = MetricSampler::from_config(&config.telemetry)?;
    logger.log_startup(
        SENTINEL_VERSION,
        executor.backend_name(),
        sampler.source_name(),
    );

    let (control, snapshots) = ControlLoopBuilder::new()
        .sampler(sampler)
        .executor(executor.clone())
        .config(config.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_tx.subscribe()));

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        snapshots,
        executor,
    ));

    // Startup done; /readyz still waits for the first completed cycle
    health_registry.set_ready(true).await;

    // Start health, metrics and control API
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Control loop task failed");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
