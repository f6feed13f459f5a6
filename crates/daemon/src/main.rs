//! VisitQ - Main Entry Point
//!
//! Composition root: settings, logging, database, startup audit, JSON-RPC
//! server and the maintenance scheduler, torn down on Ctrl+C.

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use visitq_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use visitq_core::application::{
    shutdown_channel, MaintenanceScheduler, RecoveryService, VisitQueueService,
};
use visitq_core::port::id_provider::UuidProvider;
use visitq_core::port::notifier::TracingNotifier;
use visitq_core::port::time_provider::SystemTimeProvider;
use visitq_infra_sqlite::{create_pool, run_migrations, SqliteMaintenance, SqliteVisitStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration + logging
    let settings = Settings::load()?;
    telemetry::init(settings.log_format)?;

    info!("VisitQ v{} starting...", VERSION);

    // 2. Initialize database
    let database_url = settings.database_url();
    info!(database_url = %database_url, "Initializing database...");

    if let Some(parent) = settings.db_file().as_deref().and_then(|p| p.parent()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let pool = create_pool(&database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteVisitStore::new(pool.clone()));

    // 4. Startup audit (reports only)
    info!("Auditing serving tickets...");
    let recovery = RecoveryService::new(store.clone(), store.clone());
    match recovery.audit_serving().await {
        Ok(report) if report.is_clean() => {
            info!(queues = report.queues_checked, "Startup audit clean")
        }
        Ok(report) => warn!(
            violations = report.violations.len(),
            "Startup audit found queues with more than one SERVING ticket; resolve manually"
        ),
        Err(e) => error!(error = ?e, "Startup audit failed"),
    }

    let service = VisitQueueService::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(TracingNotifier),
        Arc::new(UuidProvider),
        time_provider.clone(),
    )
    .with_retry_policy(settings.retry_policy())
    .with_eta_config(settings.eta_config());

    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider));
    let maintenance_config = settings.maintenance_config();

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let handler = Arc::new(RpcHandler::new(
        Arc::new(service),
        maintenance.clone(),
        maintenance_config.clone(),
    ));
    let rpc_config = RpcServerConfig {
        host: settings.rpc_host.clone(),
        port: settings.rpc_port,
    };
    let (rpc_handle, rpc_addr) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 6. Start Maintenance Scheduler
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let scheduler = MaintenanceScheduler::new(
        maintenance,
        maintenance_config,
        settings.maintenance_interval_hours,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    info!(addr = %rpc_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;
    if tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .is_err()
    {
        warn!("Maintenance scheduler did not stop in time");
    }
    pool.close().await;
    telemetry::shutdown();

    info!("Shutdown complete.");

    Ok(())
}
