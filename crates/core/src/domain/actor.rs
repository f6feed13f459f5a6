// Caller identity, as supplied by the identity provider (trusted as given)

use crate::domain::queue::{OwnerKind, Queue, QueueOwner};
use crate::domain::ticket::Ticket;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Clinic,
    Admin,
}

/// Authenticated caller: a role plus the id of the entity it acts for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub id: String,
}

impl Actor {
    pub fn patient(id: impl Into<String>) -> Self {
        Self {
            role: Role::Patient,
            id: id.into(),
        }
    }

    pub fn doctor(id: impl Into<String>) -> Self {
        Self {
            role: Role::Doctor,
            id: id.into(),
        }
    }

    pub fn clinic(id: impl Into<String>) -> Self {
        Self {
            role: Role::Clinic,
            id: id.into(),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            id: id.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True if this actor is `owner` (admins act for any owner)
    pub fn acts_for(&self, owner: &QueueOwner) -> bool {
        match (self.role, owner.kind) {
            (Role::Admin, _) => true,
            (Role::Doctor, OwnerKind::Doctor) | (Role::Clinic, OwnerKind::Clinic) => {
                self.id == owner.id
            }
            _ => false,
        }
    }

    pub fn owns_queue(&self, queue: &Queue) -> bool {
        self.acts_for(&queue.owner)
    }

    /// Ticket's own patient, or the owner of its queue
    pub fn may_cancel(&self, ticket: &Ticket, queue: &Queue) -> bool {
        (self.role == Role::Patient && self.id == ticket.patient_id) || self.owns_queue(queue)
    }

    /// Ticket details (position, contact) are visible to the same audience
    /// that may cancel it
    pub fn may_view(&self, ticket: &Ticket, queue: &Queue) -> bool {
        self.may_cancel(ticket, queue)
    }

    /// Patients join for themselves; admins may join on a patient's behalf
    pub fn may_join(&self) -> bool {
        matches!(self.role, Role::Patient | Role::Admin)
    }
}
