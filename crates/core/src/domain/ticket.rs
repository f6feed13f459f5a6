// Ticket Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::QueueId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ticket ID. Strictly increasing in insertion order; this is the FIFO key.
pub type TicketId = i64;

/// Ticket status
///
/// ```text
/// (none)  --join-->     WAITING
/// WAITING --promote-->  SERVING
/// WAITING --cancel-->   CANCELLED
/// SERVING --complete--> COMPLETED
/// SERVING --cancel-->   CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Waiting,
    Serving,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub fn can_transition_to(self, to: TicketStatus) -> bool {
        matches!(
            (self, to),
            (TicketStatus::Waiting, TicketStatus::Serving)
                | (TicketStatus::Waiting, TicketStatus::Cancelled)
                | (TicketStatus::Serving, TicketStatus::Completed)
                | (TicketStatus::Serving, TicketStatus::Cancelled)
        )
    }

    /// Waiting or serving; counts against capacity
    pub fn is_active(self) -> bool {
        matches!(self, TicketStatus::Waiting | TicketStatus::Serving)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Waiting => write!(f, "WAITING"),
            TicketStatus::Serving => write!(f, "SERVING"),
            TicketStatus::Completed => write!(f, "COMPLETED"),
            TicketStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(TicketStatus::Waiting),
            "SERVING" => Ok(TicketStatus::Serving),
            "COMPLETED" => Ok(TicketStatus::Completed),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown ticket status: {}",
                other
            ))),
        }
    }
}

/// Whether a transition request changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Ticket already sat in the requested terminal state
    Unchanged,
}

/// Ticket data supplied on join; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub queue_id: QueueId,
    pub patient_id: String,
    pub notification_contact: String,
    pub issued_at: i64,
}

impl NewTicket {
    pub fn new(
        queue_id: impl Into<String>,
        patient_id: impl Into<String>,
        notification_contact: impl Into<String>,
        issued_at: i64,
    ) -> Result<Self> {
        let patient_id = patient_id.into();
        let notification_contact = notification_contact.into();

        if patient_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Patient id cannot be empty".to_string(),
            ));
        }
        if notification_contact.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Notification contact cannot be empty".to_string(),
            ));
        }
        if notification_contact.len() > 256 {
            return Err(DomainError::ValidationError(
                "Notification contact too long (max 256 chars)".to_string(),
            ));
        }

        Ok(Self {
            queue_id: queue_id.into(),
            patient_id,
            notification_contact,
            issued_at,
        })
    }

    /// Materialize with the id assigned by the store
    pub fn into_ticket(self, id: TicketId) -> Ticket {
        Ticket {
            id,
            queue_id: self.queue_id,
            patient_id: self.patient_id,
            status: TicketStatus::Waiting,
            notification_contact: self.notification_contact,
            issued_at: self.issued_at,
            served_at: None,
            finished_at: None,
        }
    }
}

/// Ticket Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub queue_id: QueueId,
    pub patient_id: String,
    pub status: TicketStatus,
    pub notification_contact: String,

    pub issued_at: i64, // epoch ms, immutable
    pub served_at: Option<i64>,
    pub finished_at: Option<i64>, // completed or cancelled
}

impl Ticket {
    fn invalid(&self, to: TicketStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "ticket",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// WAITING -> SERVING, stamping `served_at` once
    pub fn promote(&mut self, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(TicketStatus::Serving) {
            return Err(self.invalid(TicketStatus::Serving));
        }
        self.status = TicketStatus::Serving;
        if self.served_at.is_none() {
            self.served_at = Some(now_millis);
        }
        Ok(())
    }

    /// SERVING -> COMPLETED; no-op on an already completed ticket
    pub fn complete(&mut self, now_millis: i64) -> Result<Transition> {
        self.finish(TicketStatus::Completed, now_millis)
    }

    /// WAITING | SERVING -> CANCELLED; no-op on an already cancelled ticket
    pub fn cancel(&mut self, now_millis: i64) -> Result<Transition> {
        self.finish(TicketStatus::Cancelled, now_millis)
    }

    fn finish(&mut self, to: TicketStatus, now_millis: i64) -> Result<Transition> {
        if self.status == to {
            return Ok(Transition::Unchanged);
        }
        if !self.status.can_transition_to(to) {
            return Err(self.invalid(to));
        }
        self.status = to;
        self.finished_at = Some(now_millis);
        Ok(Transition::Applied)
    }

    /// `served_at - issued_at`, the sample fed into the ETA average
    pub fn wait_duration_ms(&self) -> Option<i64> {
        self.served_at.map(|served| (served - self.issued_at).max(0))
    }
}
