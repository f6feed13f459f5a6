// Central Error Type for the Application

use crate::domain::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Queue {0} already has a ticket being served")]
    AlreadyServing(String),

    #[error("Queue {0} has no waiting tickets")]
    QueueEmpty(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error kinds callers branch on (never collapsed into a generic failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    CapacityExceeded,
    AlreadyServing,
    QueueEmpty,
    Conflict,
    Forbidden,
    Validation,
    Unavailable,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            AppError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            AppError::AlreadyServing(_) => ErrorKind::AlreadyServing,
            AppError::QueueEmpty(_) => ErrorKind::QueueEmpty,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Validation(_) | AppError::Serialization(_) => ErrorKind::Validation,
            AppError::Unavailable(_) => ErrorKind::Unavailable,
            AppError::Config(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Lost an optimistic race; the whole operation may be re-run
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// `QueueEmpty` is a normal outcome, not a fault
    pub fn is_fault(&self) -> bool {
        !matches!(self.kind(), ErrorKind::QueueEmpty)
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidStateTransition { .. } => {
                AppError::InvalidTransition(err.to_string())
            }
            DomainError::CapacityExceeded { .. } => AppError::CapacityExceeded(err.to_string()),
            DomainError::ValidationError(msg) => AppError::Validation(msg),
        }
    }
}

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// (orphan rules), mapping driver failures onto Conflict/Unavailable
