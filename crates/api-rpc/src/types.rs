//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results. Queue and ticket
//! snapshots are the domain types serialized as-is.

use serde::{Deserialize, Serialize};
use visitq_core::domain::{Actor, QueueOwner, Ticket, TicketId, TicketStatus};

/// queue.create.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueParams {
    pub actor: Actor,
    pub name: String,
    pub owner: QueueOwner,
    #[serde(default)]
    pub max_number: u32,
}

/// queue.pause.v1, queue.resume.v1, queue.close.v1, queue.get.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueParams {
    pub actor: Actor,
    pub queue_id: String,
}

/// queue.capacity.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityParams {
    pub actor: Actor,
    pub queue_id: String,
    /// 0 = unbounded
    pub max_number: u32,
}

/// queue.list.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListQueuesParams {
    pub actor: Actor,
    #[serde(default)]
    pub owner: Option<QueueOwner>,
}

/// queue.call_next.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNextParams {
    pub actor: Actor,
    pub queue_id: String,
    /// Complete the serving ticket first ("next patient" button)
    #[serde(default)]
    pub complete_current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNextResponse {
    pub completed: Option<Ticket>,
    pub called: Option<Ticket>,
}

/// queue.expire.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireParams {
    pub actor: Actor,
    pub queue_id: String,
    pub older_than_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireResponse {
    pub expired: Vec<Ticket>,
}

/// ticket.join.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinParams {
    pub actor: Actor,
    pub queue_id: String,
    pub notification_contact: String,
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// ticket.cancel.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    pub actor: Actor,
    pub ticket_id: TicketId,
    /// Fail with a conflict if the ticket is no longer in this status
    #[serde(default)]
    pub expected_status: Option<TicketStatus>,
}

/// ticket.complete.v1, ticket.get.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketParams {
    pub actor: Actor,
    pub ticket_id: TicketId,
}

/// ticket.mine.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientTicketsParams {
    pub actor: Actor,
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// admin.stats.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsParams {
    pub actor: Actor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queue_count: i64,
    pub ticket_count: i64,
    pub finished_ticket_count: i64,
    pub db_size_bytes: i64,
    pub fragmentation_percent: f64,
    pub uptime_seconds: i64,
}

/// admin.maintenance.v1 - Run manual maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceParams {
    pub actor: Actor,
    #[serde(default)]
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    pub vacuum_run: bool,
    pub tickets_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
