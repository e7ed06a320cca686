mod metrics;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fulfillment_core::{
    create_audit_system, load_config, validate_config, AuditEvent, EngineStores,
    FulfillmentEngine, LogNotifier, SanitizedConfig, SystemClock, TracingAuditSink,
};

use metrics::DaemonMetrics;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often the status gauges are refreshed and logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("FULFILL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Effective configuration: {}",
        serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default()
    );

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let metrics = DaemonMetrics::new().context("Failed to register metrics")?;

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::new(TracingAuditSink), config.audit.buffer_size);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    // Open stores
    let stores =
        EngineStores::open(&config.database.path).context("Failed to open database")?;
    info!("Stores initialized");

    let engine = Arc::new(
        FulfillmentEngine::new(
            &config,
            stores,
            Arc::new(LogNotifier),
            Arc::new(SystemClock),
            Some(audit_handle.clone()),
        )
        .context("Failed to create fulfillment engine")?,
    );

    engine.start().await;

    match engine.status() {
        Ok(status) => {
            metrics.observe(&status);
            info!(
                "Engine ready: {} unassigned tasks, {} pending escalations",
                status.unassigned_tasks, status.pending_escalations
            );
        }
        Err(e) => warn!("Failed to read engine status: {}", e),
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(STATUS_INTERVAL) => match engine.status() {
                Ok(status) => {
                    metrics.observe(&status);
                    info!("Engine status: {:?}", status.orders_by_status);
                }
                // Keep the last good gauges rather than report an empty backlog.
                Err(e) => warn!("Failed to read engine status: {}", e),
            },
        }
    }

    // Stop background sweeps
    info!("Stopping fulfillment engine...");
    engine.stop().await;

    // Emit ServiceStopped event
    info!("Shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    match engine.status() {
        Ok(status) => metrics.observe(&status),
        Err(e) => warn!("Failed to read final engine status: {}", e),
    }
    info!("Final metrics:\n{}", metrics.encode());

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The engine and its hooks hold clones, so it goes first.
    drop(engine);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
}
