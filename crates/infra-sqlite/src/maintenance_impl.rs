// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use visitq_core::domain::{QueueStatus, TicketStatus};
use visitq_core::error::Result;
use visitq_core::port::{Maintenance, MaintenanceStats, TimeProvider};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn pragma(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar(&format!("PRAGMA {}", name))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// Get DB file size in bytes
    async fn get_db_size(&self) -> Result<i64> {
        Ok(self.pragma("page_count").await? * self.pragma("page_size").await?)
    }
}

fn to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = to_mb(self.get_db_size().await?);

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let size_after = to_mb(self.get_db_size().await?);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_finished_tickets(&self, retention_days: i64) -> Result<i64> {
        let cutoff_time = self
            .time_provider
            .now_millis()
            .saturating_sub(retention_days.saturating_mul(DAY_MS));

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Running finished ticket GC"
        );

        // Only closed queues: open queues still need their history for ETA
        let result = sqlx::query(
            r#"
            DELETE FROM tickets
            WHERE status IN (?, ?)
            AND finished_at IS NOT NULL
            AND finished_at < ?
            AND queue_id IN (SELECT id FROM queues WHERE status = ?)
            "#,
        )
        .bind(TicketStatus::Completed.to_string())
        .bind(TicketStatus::Cancelled.to_string())
        .bind(cutoff_time)
        .bind(QueueStatus::Closed.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected() as i64;
        info!(deleted_tickets = deleted, "Finished ticket GC completed");

        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size().await?;

        let queue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queues")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let ticket_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let finished_ticket_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status IN (?, ?)")
                .bind(TicketStatus::Completed.to_string())
                .bind(TicketStatus::Cancelled.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let page_count = self.pragma("page_count").await?;
        let free_pages = self.pragma("freelist_count").await?;
        let fragmentation_percent = if page_count > 0 {
            (free_pages as f64 / page_count as f64) * 100.0
        } else {
            0.0
        };

        Ok(MaintenanceStats {
            db_size_mb: to_mb(db_size_bytes),
            db_size_bytes,
            queue_count,
            ticket_count,
            finished_ticket_count,
            fragmentation_percent,
        })
    }
}
