// Ticket Store Port (Interface)

use crate::domain::{Ticket, TicketId, TicketStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Ticket snapshot reads
///
/// Reads here tolerate staleness; every write goes through a
/// queue-scoped [`crate::port::QueueTransaction`].
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Find ticket by ID
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Active (waiting + serving) tickets of a queue, ascending id
    async fn list_active(&self, queue_id: &str) -> Result<Vec<Ticket>>;

    /// All tickets of a queue, ascending id
    async fn list_by_queue(&self, queue_id: &str) -> Result<Vec<Ticket>>;

    /// Tickets requested by a patient, newest first
    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Ticket>>;

    /// Most recently served completed tickets (ETA history), newest first
    async fn recent_completed(&self, queue_id: &str, limit: usize) -> Result<Vec<Ticket>>;

    /// Count tickets of a queue by status
    async fn count_by_status(&self, queue_id: &str, status: TicketStatus) -> Result<i64>;
}
