// Maintenance Service
// Periodic ticket GC and VACUUM for the store

use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Maintenance scheduler
///
/// Runs full maintenance (GC + VACUUM when oversized) every interval until
/// shutdown is signalled.
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    config: MaintenanceConfig,
    period: Duration,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `maintenance` - Maintenance implementation
    /// * `config` - Retention and size limits
    /// * `interval_hours` - How often to run maintenance (hours, minimum 1)
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        config: MaintenanceConfig,
        interval_hours: u64,
    ) -> Self {
        Self::with_period(
            maintenance,
            config,
            Duration::from_secs(interval_hours.max(1) * 3600),
        )
    }

    pub fn with_period(
        maintenance: Arc<dyn Maintenance>,
        config: MaintenanceConfig,
        period: Duration,
    ) -> Self {
        Self {
            maintenance,
            config,
            period,
        }
    }

    /// Run maintenance loop (background task)
    ///
    /// The first run happens one period after start; the startup path
    /// already has enough to do.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            period_secs = self.period.as_secs(),
            retention_days = self.config.finished_ticket_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }
            if shutdown.is_shutdown() {
                break;
            }

            info!("Running scheduled maintenance...");
            match self.maintenance.run_full_maintenance(&self.config).await {
                Ok(stats) => {
                    info!(
                        db_size_mb = stats.db_size_mb,
                        queues = stats.queue_count,
                        tickets = stats.ticket_count,
                        finished_tickets = stats.finished_ticket_count,
                        "Scheduled maintenance completed successfully"
                    );
                }
                Err(e) => {
                    error!(error = ?e, "Scheduled maintenance failed");
                }
            }
        }

        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately (manual trigger)
    pub async fn run_now(&self) -> Result<MaintenanceStats> {
        info!("Running manual maintenance...");

        let stats = self.maintenance.run_full_maintenance(&self.config).await?;

        info!(
            db_size_mb = stats.db_size_mb,
            tickets = stats.ticket_count,
            "Manual maintenance completed"
        );

        Ok(stats)
    }
}
