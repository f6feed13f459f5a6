// Domain events emitted after a transition commits

use crate::domain::queue::{QueueId, QueueStatus};
use crate::domain::ticket::TicketId;
use serde::{Deserialize, Serialize};

/// Outcome handed to the notification dispatcher (fire-and-forget)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitEvent {
    /// WAITING -> SERVING
    TicketCalled {
        queue_id: QueueId,
        ticket_id: TicketId,
        notification_contact: String,
        served_at: i64,
    },
    TicketCompleted {
        queue_id: QueueId,
        ticket_id: TicketId,
        notification_contact: String,
    },
    TicketCancelled {
        queue_id: QueueId,
        ticket_id: TicketId,
        notification_contact: String,
    },
    QueueStatusChanged {
        queue_id: QueueId,
        from: QueueStatus,
        to: QueueStatus,
    },
}

impl VisitEvent {
    pub fn queue_id(&self) -> &str {
        match self {
            VisitEvent::TicketCalled { queue_id, .. }
            | VisitEvent::TicketCompleted { queue_id, .. }
            | VisitEvent::TicketCancelled { queue_id, .. }
            | VisitEvent::QueueStatusChanged { queue_id, .. } => queue_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VisitEvent::TicketCalled { .. } => "TICKET_CALLED",
            VisitEvent::TicketCompleted { .. } => "TICKET_COMPLETED",
            VisitEvent::TicketCancelled { .. } => "TICKET_CANCELLED",
            VisitEvent::QueueStatusChanged { .. } => "QUEUE_STATUS_CHANGED",
        }
    }
}
