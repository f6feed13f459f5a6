// SQLite queue-scoped transaction
//
// The first statement bumps `queues.version` for the target queue. That
// write takes SQLite's writer lock up front (no read-then-upgrade, so no
// SQLITE_BUSY_SNAPSHOT halfway through) and doubles as the row lock other
// processes serialize on. Every later write is a compare-and-swap: queue
// rows on `version`, ticket rows on their expected status.

use crate::error::map_sqlx_error;
use crate::row::{into_tickets, QueueRow, TicketRow, QUEUE_COLUMNS, TICKET_COLUMNS};
use crate::SqliteVisitStore;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use tracing::debug;
use visitq_core::domain::{NewTicket, Queue, QueueId, Ticket, TicketId, TicketStatus};
use visitq_core::error::{AppError, Result};
use visitq_core::port::{QueueTransaction, Transaction, TransactionalVisitStore};

pub struct SqliteQueueTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
    queue_id: QueueId,
    /// False when the queue row did not exist at begin
    locked: bool,
}

impl SqliteQueueTransaction {
    async fn begin(store: &SqliteVisitStore, queue_id: &str) -> Result<Self> {
        let mut tx = store.pool.begin().await.map_err(map_sqlx_error)?;

        // First write takes SQLite's database-wide write lock until commit

        let locked = sqlx::query("UPDATE queues SET version = version + 1 WHERE id = ?")
            .bind(queue_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected()
            > 0;

        debug!(queue_id = %queue_id, locked = locked, "Queue transaction started");
        Ok(Self {
            tx,
            queue_id: queue_id.to_string(),
            locked,
        })
    }

    fn require_queue(&self) -> Result<()> {
        if self.locked {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Queue {} not found",
                self.queue_id
            )))
        }
    }

    async fn fetch_one_by_status(&mut self, status: TicketStatus) -> Result<Option<Ticket>> {
        self.require_queue()?;
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE queue_id = ? AND status = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
            TICKET_COLUMNS
        ))
        .bind(&self.queue_id)
        .bind(status.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Ticket::try_from).transpose()
    }
}

#[async_trait]
impl TransactionalVisitStore for SqliteVisitStore {
    async fn begin_transaction(&self, queue_id: &str) -> Result<Box<dyn QueueTransaction>> {
        Ok(Box::new(SqliteQueueTransaction::begin(self, queue_id).await?))
    }
}

#[async_trait]
impl Transaction for SqliteQueueTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl QueueTransaction for SqliteQueueTransaction {
    async fn load_queue(&mut self) -> Result<Option<Queue>> {
        if !self.locked {
            return Ok(None);
        }
        let row: Option<QueueRow> =
            sqlx::query_as(&format!("SELECT {} FROM queues WHERE id = ?", QUEUE_COLUMNS))
                .bind(&self.queue_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        row.map(Queue::try_from).transpose()
    }

    async fn save_queue(&mut self, queue: &Queue) -> Result<()> {
        self.require_queue()?;
        let result = sqlx::query(
            r#"
            UPDATE queues
            SET name = ?, status = ?, max_number = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&queue.name)
        .bind(queue.status.to_string())
        .bind(i64::from(queue.max_number))
        .bind(queue.updated_at)
        .bind(&queue.id)
        .bind(queue.version)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Queue {} changed concurrently (version {})",
                queue.id, queue.version
            )));
        }
        Ok(())
    }

    async fn count_active(&mut self) -> Result<i64> {
        self.require_queue()?;
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE queue_id = ? AND status IN (?, ?)")
            .bind(&self.queue_id)
            .bind(TicketStatus::Waiting.to_string())
            .bind(TicketStatus::Serving.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_serving(&mut self) -> Result<Option<Ticket>> {
        self.fetch_one_by_status(TicketStatus::Serving).await
    }

    async fn next_waiting(&mut self) -> Result<Option<Ticket>> {
        self.fetch_one_by_status(TicketStatus::Waiting).await
    }

    async fn find_ticket(&mut self, id: TicketId) -> Result<Option<Ticket>> {
        self.require_queue()?;
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE id = ? AND queue_id = ?",
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(&self.queue_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn waiting_issued_before(&mut self, cutoff_millis: i64) -> Result<Vec<Ticket>> {
        self.require_queue()?;
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE queue_id = ? AND status = ? AND issued_at < ?
            ORDER BY id ASC
            "#,
            TICKET_COLUMNS
        ))
        .bind(&self.queue_id)
        .bind(TicketStatus::Waiting.to_string())
        .bind(cutoff_millis)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        into_tickets(rows)
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket> {
        self.require_queue()?;
        if ticket.queue_id != self.queue_id {
            return Err(AppError::Internal(format!(
                "Ticket for queue {} inserted through transaction of {}",
                ticket.queue_id, self.queue_id
            )));
        }

        let id = sqlx::query(
            r#"
            INSERT INTO tickets (queue_id, patient_id, status, notification_contact, issued_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ticket.queue_id)
        .bind(&ticket.patient_id)
        .bind(TicketStatus::Waiting.to_string())
        .bind(&ticket.notification_contact)
        .bind(ticket.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .last_insert_rowid();

        Ok(ticket.into_ticket(id))
    }

    async fn save_ticket(&mut self, ticket: &Ticket, expected: TicketStatus) -> Result<()> {
        self.require_queue()?;
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = ?, served_at = ?, finished_at = ?
            WHERE id = ? AND queue_id = ? AND status = ?
            "#,
        )
        .bind(ticket.status.to_string())
        .bind(ticket.served_at)
        .bind(ticket.finished_at)
        .bind(ticket.id)
        .bind(&self.queue_id)
        .bind(expected.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM tickets WHERE id = ? AND queue_id = ?")
                .bind(ticket.id)
                .bind(&self.queue_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        match current {
            None => Err(AppError::NotFound(format!("Ticket {} not found", ticket.id))),
            Some(now) => Err(AppError::Conflict(format!(
                "Ticket {} is no longer {} (now {})",
                ticket.id, expected, now
            ))),
        }
    }
}
