// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid {entity} state transition: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Queue {queue_id} is full ({active}/{max_number} active tickets)")]
    CapacityExceeded {
        queue_id: String,
        active: i64,
        max_number: u32,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
