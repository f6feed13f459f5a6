// Row <-> domain mapping

use std::str::FromStr;
use visitq_core::domain::{OwnerKind, Queue, QueueOwner, QueueStatus, Ticket, TicketStatus};
use visitq_core::error::{AppError, Result};

pub(crate) const QUEUE_COLUMNS: &str =
    "id, owner_kind, owner_id, name, status, max_number, version, created_at, updated_at";

pub(crate) const TICKET_COLUMNS: &str =
    "id, queue_id, patient_id, status, notification_contact, issued_at, served_at, finished_at";

fn corrupt(what: &str, id: impl std::fmt::Display, detail: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Corrupt {} row {}: {}", what, id, detail))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QueueRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    name: String,
    status: String,
    max_number: i64,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<QueueRow> for Queue {
    type Error = AppError;

    fn try_from(row: QueueRow) -> Result<Self> {
        let invalid = |e: &dyn std::fmt::Display| corrupt("queue", &row.id, e);
        let kind = OwnerKind::from_str(&row.owner_kind).map_err(|e| invalid(&e))?;
        let status = QueueStatus::from_str(&row.status).map_err(|e| invalid(&e))?;
        let max_number = u32::try_from(row.max_number).map_err(|e| invalid(&e))?;

        Ok(Queue {
            id: row.id,
            owner: QueueOwner {
                kind,
                id: row.owner_id,
            },
            name: row.name,
            status,
            max_number,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TicketRow {
    id: i64,
    queue_id: String,
    patient_id: String,
    status: String,
    notification_contact: String,
    issued_at: i64,
    served_at: Option<i64>,
    finished_at: Option<i64>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppError;

    fn try_from(row: TicketRow) -> Result<Self> {
        let status =
            TicketStatus::from_str(&row.status).map_err(|e| corrupt("ticket", row.id, e))?;

        Ok(Ticket {
            id: row.id,
            queue_id: row.queue_id,
            patient_id: row.patient_id,
            status,
            notification_contact: row.notification_contact,
            issued_at: row.issued_at,
            served_at: row.served_at,
            finished_at: row.finished_at,
        })
    }
}

pub(crate) fn into_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

pub(crate) fn into_queues(rows: Vec<QueueRow>) -> Result<Vec<Queue>> {
    rows.into_iter().map(Queue::try_from).collect()
}
