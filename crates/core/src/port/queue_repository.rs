// Queue Store Port (Interface)

use crate::domain::{Queue, QueueOwner};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Queue persistence (snapshot reads + creation)
///
/// Mutations of existing queues go through [`crate::port::QueueTransaction`].
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a new queue
    async fn insert(&self, queue: &Queue) -> Result<()>;

    /// Find queue by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Queue>>;

    /// Queues operated by `owner`, oldest first
    async fn list_by_owner(&self, owner: &QueueOwner) -> Result<Vec<Queue>>;

    /// Every queue, oldest first
    async fn list_all(&self) -> Result<Vec<Queue>>;
}
