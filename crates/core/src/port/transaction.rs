// Transaction port for atomic queue-scoped operations

use crate::domain::{NewTicket, Queue, Ticket, TicketId, TicketStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store able to open transactions scoped to one queue
#[async_trait]
pub trait TransactionalVisitStore: Send + Sync {
    /// Begin a transaction holding the queue's row lock
    ///
    /// Two open transactions on the same queue never interleave. Whether
    /// transactions on different queues wait on each other is up to the
    /// adapter (SQLite has a single writer, so they do).
    async fn begin_transaction(&self, queue_id: &str) -> Result<Box<dyn QueueTransaction>>;
}

/// Queue/Ticket Store operations within a queue-scoped transaction
#[async_trait]
pub trait QueueTransaction: Transaction {
    /// The locked queue (`None` if it does not exist)
    async fn load_queue(&mut self) -> Result<Option<Queue>>;

    /// Persist status/capacity; `Conflict` if `queue.version` is stale
    async fn save_queue(&mut self, queue: &Queue) -> Result<()>;

    /// Waiting + serving tickets in this queue
    async fn count_active(&mut self) -> Result<i64>;

    /// The ticket currently being served, if any
    async fn find_serving(&mut self) -> Result<Option<Ticket>>;

    /// Waiting ticket with the smallest id
    async fn next_waiting(&mut self) -> Result<Option<Ticket>>;

    /// Ticket by id, only if it belongs to this queue
    async fn find_ticket(&mut self, id: TicketId) -> Result<Option<Ticket>>;

    /// Waiting tickets issued strictly before `cutoff_millis`, ascending id
    async fn waiting_issued_before(&mut self, cutoff_millis: i64) -> Result<Vec<Ticket>>;

    /// Insert a waiting ticket; the store assigns the next id
    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket>;

    /// Persist `ticket` only if its stored status is still `expected`
    ///
    /// Fails with `Conflict` when another operation moved it first.
    async fn save_ticket(&mut self, ticket: &Ticket, expected: TicketStatus) -> Result<()>;
}
