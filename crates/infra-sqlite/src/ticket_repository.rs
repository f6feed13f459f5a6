// SQLite TicketRepository Implementation (snapshot reads)

use crate::error::map_sqlx_error;
use crate::row::{into_tickets, TicketRow, TICKET_COLUMNS};
use crate::SqliteVisitStore;
use async_trait::async_trait;
use visitq_core::domain::{Ticket, TicketId, TicketStatus};
use visitq_core::error::Result;
use visitq_core::port::TicketRepository;

#[async_trait]
impl TicketRepository for SqliteVisitStore {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn list_active(&self, queue_id: &str) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE queue_id = ? AND status IN (?, ?)
            ORDER BY id ASC
            "#,
            TICKET_COLUMNS
        ))
        .bind(queue_id)
        .bind(TicketStatus::Waiting.to_string())
        .bind(TicketStatus::Serving.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_tickets(rows)
    }

    async fn list_by_queue(&self, queue_id: &str) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE queue_id = ? ORDER BY id ASC",
            TICKET_COLUMNS
        ))
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_tickets(rows)
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE patient_id = ? ORDER BY id DESC",
            TICKET_COLUMNS
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_tickets(rows)
    }

    async fn recent_completed(&self, queue_id: &str, limit: usize) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE queue_id = ? AND status = ? AND served_at IS NOT NULL
            ORDER BY served_at DESC, id DESC
            LIMIT ?
            "#,
            TICKET_COLUMNS
        ))
        .bind(queue_id)
        .bind(TicketStatus::Completed.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_tickets(rows)
    }

    async fn count_by_status(&self, queue_id: &str, status: TicketStatus) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE queue_id = ? AND status = ?")
                .bind(queue_id)
                .bind(status.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::store_with_queue;
    use visitq_core::domain::NewTicket;
    use visitq_core::port::{QueueTransaction, Transaction, TransactionalVisitStore};

    /// One WAITING ticket per patient, issued 100ms apart
    async fn seed(store: &SqliteVisitStore, patients: &[&str]) -> Vec<Ticket> {
        let mut tx = store.begin_transaction("q-1").await.unwrap();
        let mut tickets = Vec::new();
        for (n, patient) in patients.iter().enumerate() {
            let new = NewTicket::new("q-1", *patient, "contact", n as i64 * 100).unwrap();
            tickets.push(tx.insert_ticket(new).await.unwrap());
        }
        tx.commit().await.unwrap();
        tickets
    }

    async fn serve_and_complete(store: &SqliteVisitStore, ticket: &Ticket, served_at: i64) {
        let mut tx = store.begin_transaction("q-1").await.unwrap();
        let mut current = tx.find_ticket(ticket.id).await.unwrap().unwrap();
        current.promote(served_at).unwrap();
        tx.save_ticket(&current, TicketStatus::Waiting).await.unwrap();
        current.complete(served_at + 1).unwrap();
        tx.save_ticket(&current, TicketStatus::Serving).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_listings_and_counts() {
        let store = store_with_queue("q-1").await;
        let tickets = seed(&store, &["p-1", "p-2", "p-1"]).await;
        serve_and_complete(&store, &tickets[0], 500).await;

        let active: Vec<TicketId> = store
            .list_active("q-1")
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(active, vec![tickets[1].id, tickets[2].id]);
        assert_eq!(store.list_by_queue("q-1").await.unwrap().len(), 3);

        let mine: Vec<TicketId> = store
            .list_by_patient("p-1")
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(mine, vec![tickets[2].id, tickets[0].id]);

        assert_eq!(
            store.count_by_status("q-1", TicketStatus::Waiting).await.unwrap(),
            2
        );
        let found = TicketRepository::find_by_id(&store, tickets[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, TicketStatus::Completed);
        assert_eq!(found.served_at, Some(500));
        assert_eq!(found.finished_at, Some(501));
    }

    #[tokio::test]
    async fn test_recent_completed_newest_first_and_limited() {
        let store = store_with_queue("q-1").await;
        let tickets = seed(&store, &["p-1", "p-2", "p-3"]).await;
        serve_and_complete(&store, &tickets[0], 1_000).await;
        serve_and_complete(&store, &tickets[1], 3_000).await;
        serve_and_complete(&store, &tickets[2], 2_000).await;

        let recent: Vec<TicketId> = store
            .recent_completed("q-1", 2)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(recent, vec![tickets[1].id, tickets[2].id]);
    }
}
