// Queue Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Queue identifier (UUID v4 by default)
pub type QueueId = String;

/// Queue status
///
/// ```text
/// open <-> paused
/// open | paused -> closed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Open,
    Paused,
    Closed,
}

impl QueueStatus {
    /// Explicit transition table. Same-state moves are not transitions.
    pub fn can_transition_to(self, to: QueueStatus) -> bool {
        matches!(
            (self, to),
            (QueueStatus::Open, QueueStatus::Paused)
                | (QueueStatus::Paused, QueueStatus::Open)
                | (QueueStatus::Open, QueueStatus::Closed)
                | (QueueStatus::Paused, QueueStatus::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == QueueStatus::Closed
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Open => write!(f, "OPEN"),
            QueueStatus::Paused => write!(f, "PAUSED"),
            QueueStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(QueueStatus::Open),
            "PAUSED" => Ok(QueueStatus::Paused),
            "CLOSED" => Ok(QueueStatus::Closed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown queue status: {}",
                other
            ))),
        }
    }
}

/// Kind of entity operating a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerKind {
    Doctor,
    Clinic,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::Doctor => write!(f, "DOCTOR"),
            OwnerKind::Clinic => write!(f, "CLINIC"),
        }
    }
}

impl FromStr for OwnerKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DOCTOR" => Ok(OwnerKind::Doctor),
            "CLINIC" => Ok(OwnerKind::Clinic),
            other => Err(DomainError::ValidationError(format!(
                "Unknown owner kind: {}",
                other
            ))),
        }
    }
}

/// Doctor or clinic operating a queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueOwner {
    pub kind: OwnerKind,
    pub id: String,
}

impl QueueOwner {
    pub fn doctor(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Doctor,
            id: id.into(),
        }
    }

    pub fn clinic(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Clinic,
            id: id.into(),
        }
    }
}

/// Queue Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub owner: QueueOwner,
    pub name: String,
    pub status: QueueStatus,

    /// Upper bound on active (waiting + serving) tickets; 0 = unbounded
    pub max_number: u32,

    /// Optimistic concurrency counter, bumped on every committed mutation
    pub version: i64,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl Queue {
    /// Create a new open queue
    ///
    /// # Arguments
    ///
    /// * `id` - Queue ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `owner` - Doctor or clinic operating the queue
    /// * `name` - Display name
    /// * `max_number` - Capacity (0 = unbounded)
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        owner: QueueOwner,
        name: impl Into<String>,
        max_number: u32,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Queue name cannot be empty".to_string(),
            ));
        }
        if owner.id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Queue owner id cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: id.into(),
            owner,
            name,
            status: QueueStatus::Open,
            max_number,
            version: 0,
            created_at,
            updated_at: created_at,
        })
    }

    /// Move to `to`, rejecting anything outside the transition table
    pub fn transition_to(&mut self, to: QueueStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                entity: "queue",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now_millis;
        Ok(())
    }

    pub fn pause(&mut self, now_millis: i64) -> Result<()> {
        self.transition_to(QueueStatus::Paused, now_millis)
    }

    pub fn resume(&mut self, now_millis: i64) -> Result<()> {
        self.transition_to(QueueStatus::Open, now_millis)
    }

    pub fn close(&mut self, now_millis: i64) -> Result<()> {
        self.transition_to(QueueStatus::Closed, now_millis)
    }

    /// Change capacity. Already-admitted tickets are never affected.
    pub fn set_capacity(&mut self, max_number: u32, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                entity: "queue",
                from: self.status.to_string(),
                to: format!("capacity={}", max_number),
            });
        }
        self.max_number = max_number;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Admission check performed on every join attempt
    ///
    /// A closed queue can never admit again and reports `CapacityExceeded`;
    /// a paused queue rejects the join as an invalid transition.
    pub fn check_admission(&self, active_count: i64) -> Result<()> {
        match self.status {
            QueueStatus::Open => {}
            QueueStatus::Closed => {
                return Err(DomainError::CapacityExceeded {
                    queue_id: self.id.clone(),
                    active: active_count,
                    max_number: self.max_number,
                });
            }
            QueueStatus::Paused => {
                return Err(DomainError::InvalidStateTransition {
                    entity: "queue",
                    from: self.status.to_string(),
                    to: "JOIN".to_string(),
                });
            }
        }

        if self.max_number > 0 && active_count >= i64::from(self.max_number) {
            return Err(DomainError::CapacityExceeded {
                queue_id: self.id.clone(),
                active: active_count,
                max_number: self.max_number,
            });
        }
        Ok(())
    }

    /// Only open queues are callable
    pub fn check_callable(&self) -> Result<()> {
        if self.status != QueueStatus::Open {
            return Err(DomainError::InvalidStateTransition {
                entity: "queue",
                from: self.status.to_string(),
                to: "CALL_NEXT".to_string(),
            });
        }
        Ok(())
    }
}
