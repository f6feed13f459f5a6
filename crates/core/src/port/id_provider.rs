// ID Provider Port (for deterministic testing)

use std::sync::atomic::{AtomicU64, Ordering};

/// ID provider interface (allows deterministic queue IDs in tests)
///
/// Ticket ids are not drawn from here: the store assigns them so they stay
/// strictly increasing in commit order.
pub trait IdProvider: Send + Sync {
    /// Generate a new unique queue ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ids with a fixed prefix (queue-1, queue-2, ...)
pub struct SequentialIdProvider {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
