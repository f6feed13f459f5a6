// Per-queue mutual exclusion
//
// Serializes mutating operations on the same queue inside this process.
// Each queue gets its own async mutex; there is no lock spanning queues.
// Storage-level compare-and-swap still guards writers in other processes.

use crate::error::Result;
use crate::port::{QueueTransaction, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

/// Registry size above which dead entries are pruned on acquire
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-queue async mutexes
///
/// Entries are held weakly: a queue's mutex lives only while some caller
/// holds or waits on it.
#[derive(Default)]
pub struct QueueLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl QueueLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `queue_id`
    pub async fn acquire(&self, queue_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }

            match locks.get(queue_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(queue_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of queues with a live mutex (held or awaited)
    pub fn live_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Commit on success, roll back on failure
///
/// A failed rollback is logged; the original error is what the caller sees.
pub(crate) async fn finish_transaction<T>(
    tx: Box<dyn QueueTransaction>,
    result: Result<T>,
) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
