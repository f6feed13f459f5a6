// Store Maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Store maintenance statistics
#[derive(Debug, Clone)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub queue_count: i64,
    pub ticket_count: i64,
    pub finished_ticket_count: i64,
    pub fragmentation_percent: f64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Retention period for terminal tickets of closed queues (days)
    pub finished_ticket_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            finished_ticket_retention_days: 90, // audit trail kept for a quarter
            max_db_size_mb: 1000.0,             // 1GB max
        }
    }
}

/// Store maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space and optimize DB
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Delete terminal tickets of closed queues finished before the
    /// retention period. Tickets of open/paused queues are never touched.
    ///
    /// # Returns
    /// Number of tickets deleted
    async fn gc_finished_tickets(&self, retention_days: i64) -> Result<i64>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<MaintenanceStats>;

    /// Run full maintenance (GC + VACUUM when oversized)
    async fn run_full_maintenance(&self, config: &MaintenanceConfig) -> Result<MaintenanceStats> {
        let stats_before = self.get_stats().await?;

        let deleted_tickets = self
            .gc_finished_tickets(config.finished_ticket_retention_days)
            .await?;

        let reclaimed_mb = if stats_before.db_size_mb > config.max_db_size_mb {
            self.vacuum().await?
        } else {
            0.0
        };

        let stats_after = self.get_stats().await?;

        tracing::info!(
            deleted_tickets = deleted_tickets,
            reclaimed_mb = reclaimed_mb,
            db_size_mb = stats_after.db_size_mb,
            "Maintenance completed"
        );

        Ok(stats_after)
    }
}
