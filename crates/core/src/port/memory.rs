//! In-memory Queue/Ticket Store
//!
//! Implements every storage port without a database. Each queue is its own
//! shard guarded by its own async mutex, so transactions on different queues
//! never contend; snapshot reads take a short read lock on committed state
//! and never wait for an open transaction.
//!
//! Used by the core test-suite and for embedding the engine without
//! persistence.

use crate::domain::{NewTicket, Queue, QueueId, QueueOwner, Ticket, TicketId, TicketStatus};
use crate::error::{AppError, Result};
use crate::port::{
    QueueRepository, QueueTransaction, TicketRepository, Transaction, TransactionalVisitStore,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
struct ShardState {
    queue: Queue,
    tickets: BTreeMap<TicketId, Ticket>,
}

struct QueueShard {
    lock: Arc<Mutex<()>>,
    state: RwLock<ShardState>,
}

impl QueueShard {
    fn snapshot(&self) -> ShardState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Inner {
    shards: RwLock<HashMap<QueueId, Arc<QueueShard>>>,
    ticket_index: RwLock<HashMap<TicketId, QueueId>>,
    next_ticket_id: AtomicI64,
}

/// Lock-per-queue in-memory store
#[derive(Clone)]
pub struct InMemoryVisitStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryVisitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVisitStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                shards: RwLock::new(HashMap::new()),
                ticket_index: RwLock::new(HashMap::new()),
                next_ticket_id: AtomicI64::new(1),
            }),
        }
    }

    fn shard(&self, queue_id: &str) -> Option<Arc<QueueShard>> {
        self.inner
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue_id)
            .cloned()
    }

    fn all_shards(&self) -> Vec<Arc<QueueShard>> {
        self.inner
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn queues_where(&self, keep: impl Fn(&Queue) -> bool) -> Vec<Queue> {
        let mut queues: Vec<Queue> = self
            .all_shards()
            .iter()
            .map(|shard| shard.snapshot().queue)
            .filter(|q| keep(q))
            .collect();
        queues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        queues
    }

    fn tickets_of(&self, queue_id: &str) -> Vec<Ticket> {
        self.shard(queue_id)
            .map(|shard| shard.snapshot().tickets.into_values().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueRepository for InMemoryVisitStore {
    async fn insert(&self, queue: &Queue) -> Result<()> {
        let mut shards = self
            .inner
            .shards
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if shards.contains_key(&queue.id) {
            return Err(AppError::Conflict(format!(
                "Queue {} already exists",
                queue.id
            )));
        }
        shards.insert(
            queue.id.clone(),
            Arc::new(QueueShard {
                lock: Arc::new(Mutex::new(())),
                state: RwLock::new(ShardState {
                    queue: queue.clone(),
                    tickets: BTreeMap::new(),
                }),
            }),
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Queue>> {
        Ok(self.shard(id).map(|shard| shard.snapshot().queue))
    }

    async fn list_by_owner(&self, owner: &QueueOwner) -> Result<Vec<Queue>> {
        Ok(self.queues_where(|q| &q.owner == owner))
    }

    async fn list_all(&self) -> Result<Vec<Queue>> {
        Ok(self.queues_where(|_| true))
    }
}

#[async_trait]
impl TicketRepository for InMemoryVisitStore {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>> {
        let queue_id = self
            .inner
            .ticket_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();

        Ok(queue_id
            .and_then(|q| self.shard(&q))
            .and_then(|shard| shard.snapshot().tickets.get(&id).cloned()))
    }

    async fn list_active(&self, queue_id: &str) -> Result<Vec<Ticket>> {
        Ok(self
            .tickets_of(queue_id)
            .into_iter()
            .filter(|t| t.status.is_active())
            .collect())
    }

    async fn list_by_queue(&self, queue_id: &str) -> Result<Vec<Ticket>> {
        Ok(self.tickets_of(queue_id))
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .all_shards()
            .iter()
            .flat_map(|shard| shard.snapshot().tickets.into_values())
            .filter(|t| t.patient_id == patient_id)
            .collect();
        tickets.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(tickets)
    }

    async fn recent_completed(&self, queue_id: &str, limit: usize) -> Result<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets_of(queue_id)
            .into_iter()
            .filter(|t| t.status == TicketStatus::Completed && t.served_at.is_some())
            .collect();
        tickets.sort_by(|a, b| b.served_at.cmp(&a.served_at).then(b.id.cmp(&a.id)));
        tickets.truncate(limit);
        Ok(tickets)
    }

    async fn count_by_status(&self, queue_id: &str, status: TicketStatus) -> Result<i64> {
        Ok(self
            .tickets_of(queue_id)
            .iter()
            .filter(|t| t.status == status)
            .count() as i64)
    }
}

#[async_trait]
impl TransactionalVisitStore for InMemoryVisitStore {
    async fn begin_transaction(&self, queue_id: &str) -> Result<Box<dyn QueueTransaction>> {
        let Some(shard) = self.shard(queue_id) else {
            return Ok(Box::new(InMemoryTransaction {
                queue_id: queue_id.to_string(),
                inner: Arc::clone(&self.inner),
                locked: None,
                staged: None,
                inserted: Vec::new(),
            }));
        };

        let guard = Arc::clone(&shard.lock).lock_owned().await;
        // Read committed state only after the lock is held
        let mut staged = shard.snapshot();
        staged.queue.version += 1;

        Ok(Box::new(InMemoryTransaction {
            queue_id: queue_id.to_string(),
            inner: Arc::clone(&self.inner),
            locked: Some((guard, shard)),
            staged: Some(staged),
            inserted: Vec::new(),
        }))
    }
}

/// Staged copy of one shard with its version already bumped; published on
/// commit, discarded on rollback/drop
pub struct InMemoryTransaction {
    queue_id: QueueId,
    inner: Arc<Inner>,
    locked: Option<(OwnedMutexGuard<()>, Arc<QueueShard>)>,
    staged: Option<ShardState>,
    inserted: Vec<TicketId>,
}

impl InMemoryTransaction {
    fn staged(&mut self) -> Result<&mut ShardState> {
        let queue_id = &self.queue_id;
        self.staged
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_id)))
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        let (Some((_guard, shard)), Some(staged)) = (self.locked.take(), self.staged.take())
        else {
            return Ok(());
        };

        *shard.state.write().unwrap_or_else(PoisonError::into_inner) = staged;

        let mut index = self
            .inner
            .ticket_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for id in self.inserted.drain(..) {
            index.insert(id, self.queue_id.clone());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl QueueTransaction for InMemoryTransaction {
    async fn load_queue(&mut self) -> Result<Option<Queue>> {
        Ok(self.staged.as_ref().map(|s| s.queue.clone()))
    }

    async fn save_queue(&mut self, queue: &Queue) -> Result<()> {
        let staged = self.staged()?;
        if staged.queue.version != queue.version {
            return Err(AppError::Conflict(format!(
                "Queue {} changed concurrently (version {} != {})",
                queue.id, staged.queue.version, queue.version
            )));
        }
        staged.queue = queue.clone();
        Ok(())
    }

    async fn count_active(&mut self) -> Result<i64> {
        Ok(self
            .staged()?
            .tickets
            .values()
            .filter(|t| t.status.is_active())
            .count() as i64)
    }

    async fn find_serving(&mut self) -> Result<Option<Ticket>> {
        Ok(self
            .staged()?
            .tickets
            .values()
            .find(|t| t.status == TicketStatus::Serving)
            .cloned())
    }

    async fn next_waiting(&mut self) -> Result<Option<Ticket>> {
        // BTreeMap iterates in ascending id order
        Ok(self
            .staged()?
            .tickets
            .values()
            .find(|t| t.status == TicketStatus::Waiting)
            .cloned())
    }

    async fn find_ticket(&mut self, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.staged()?.tickets.get(&id).cloned())
    }

    async fn waiting_issued_before(&mut self, cutoff_millis: i64) -> Result<Vec<Ticket>> {
        Ok(self
            .staged()?
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Waiting && t.issued_at < cutoff_millis)
            .cloned()
            .collect())
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket> {
        if ticket.queue_id != self.queue_id {
            return Err(AppError::Internal(format!(
                "Ticket for queue {} inserted through transaction of {}",
                ticket.queue_id, self.queue_id
            )));
        }
        let id = self.inner.next_ticket_id.fetch_add(1, Ordering::SeqCst);
        let ticket = ticket.into_ticket(id);
        self.staged()?.tickets.insert(id, ticket.clone());
        self.inserted.push(id);
        Ok(ticket)
    }

    async fn save_ticket(&mut self, ticket: &Ticket, expected: TicketStatus) -> Result<()> {
        let stored = self
            .staged()?
            .tickets
            .get_mut(&ticket.id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket.id)))?;

        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "Ticket {} is no longer {} (now {})",
                ticket.id, expected, stored.status
            )));
        }
        *stored = ticket.clone();
        Ok(())
    }
}
