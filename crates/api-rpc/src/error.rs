//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes, one code per kind so
//! clients can branch without parsing messages.

use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use visitq_core::error::{AppError, ErrorKind};

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const FORBIDDEN: i32 = 4003;
    pub const INVALID_TRANSITION: i32 = 4004;
    pub const CAPACITY_EXCEEDED: i32 = 4005;
    pub const ALREADY_SERVING: i32 = 4006;
    pub const QUEUE_EMPTY: i32 = 4007;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const UNAVAILABLE: i32 = 5003;
}

/// Attached as `error.data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub kind: ErrorKind,
}

pub fn code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => code::VALIDATION_ERROR,
        ErrorKind::NotFound => code::NOT_FOUND,
        ErrorKind::Conflict => code::CONFLICT,
        ErrorKind::Forbidden => code::FORBIDDEN,
        ErrorKind::InvalidTransition => code::INVALID_TRANSITION,
        ErrorKind::CapacityExceeded => code::CAPACITY_EXCEEDED,
        ErrorKind::AlreadyServing => code::ALREADY_SERVING,
        ErrorKind::QueueEmpty => code::QUEUE_EMPTY,
        ErrorKind::Internal => code::INTERNAL_ERROR,
        ErrorKind::Unavailable => code::UNAVAILABLE,
    }
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let kind = err.kind();
    ErrorObjectOwned::owned(code_for(kind), err.to_string(), Some(ErrorData { kind }))
}
