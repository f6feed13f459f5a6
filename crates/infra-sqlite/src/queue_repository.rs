// SQLite QueueRepository Implementation

use crate::error::map_sqlx_error;
use crate::row::{into_queues, QueueRow, QUEUE_COLUMNS};
use crate::SqliteVisitStore;
use async_trait::async_trait;
use visitq_core::domain::{Queue, QueueOwner};
use visitq_core::error::Result;
use visitq_core::port::QueueRepository;

#[async_trait]
impl QueueRepository for SqliteVisitStore {
    async fn insert(&self, queue: &Queue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queues (
                id, owner_kind, owner_id, name, status,
                max_number, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&queue.id)
        .bind(queue.owner.kind.to_string())
        .bind(&queue.owner.id)
        .bind(&queue.name)
        .bind(queue.status.to_string())
        .bind(i64::from(queue.max_number))
        .bind(queue.version)
        .bind(queue.created_at)
        .bind(queue.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Queue>> {
        let row: Option<QueueRow> =
            sqlx::query_as(&format!("SELECT {} FROM queues WHERE id = ?", QUEUE_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(Queue::try_from).transpose()
    }

    async fn list_by_owner(&self, owner: &QueueOwner) -> Result<Vec<Queue>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM queues
            WHERE owner_kind = ? AND owner_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
            QUEUE_COLUMNS
        ))
        .bind(owner.kind.to_string())
        .bind(&owner.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_queues(rows)
    }

    async fn list_all(&self) -> Result<Vec<Queue>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            "SELECT {} FROM queues ORDER BY created_at ASC, id ASC",
            QUEUE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_queues(rows)
    }
}
