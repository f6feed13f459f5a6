// Queue Lifecycle Use Cases
//
// OPEN <-> PAUSED, OPEN|PAUSED -> CLOSED. Closing never touches the
// queue's tickets; operators cancel or complete them explicitly.

use crate::application::locks::{finish_transaction, QueueLocks};
use crate::domain::{Actor, Queue, QueueOwner, QueueStatus, VisitEvent};
use crate::error::{AppError, Result};
use crate::port::{
    IdProvider, QueueRepository, QueueTransaction, TimeProvider, TransactionalVisitStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Create-queue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub owner: QueueOwner,

    /// 0 = unbounded
    #[serde(default)]
    pub max_number: u32,
}

/// Queue snapshot after a status change, plus the status it left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTransitioned {
    pub queue: Queue,
    pub from: QueueStatus,
}

impl QueueTransitioned {
    pub fn event(&self) -> VisitEvent {
        VisitEvent::QueueStatusChanged {
            queue_id: self.queue.id.clone(),
            from: self.from,
            to: self.queue.status,
        }
    }
}

/// Admission check run inside every join transaction
pub fn check_admission(queue: &Queue, active_count: i64) -> Result<()> {
    Ok(queue.check_admission(active_count)?)
}

/// Owner (or admin) only
pub(crate) fn require_owner(actor: &Actor, queue: &Queue) -> Result<()> {
    if actor.owns_queue(queue) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "{:?} {} does not operate queue {}",
        actor.role, actor.id, queue.id
    )))
}

/// Queue row as seen by the open transaction
pub(crate) async fn load_queue(tx: &mut dyn QueueTransaction, queue_id: &str) -> Result<Queue> {
    tx.load_queue()
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_id)))
}

pub struct QueueLifecycle {
    queues: Arc<dyn QueueRepository>,
    store: Arc<dyn TransactionalVisitStore>,
    locks: Arc<QueueLocks>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueLifecycle {
    pub fn new(
        queues: Arc<dyn QueueRepository>,
        store: Arc<dyn TransactionalVisitStore>,
        locks: Arc<QueueLocks>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queues,
            store,
            locks,
            id_provider,
            time_provider,
        }
    }

    /// Create a new OPEN queue owned by `req.owner`
    pub async fn create(&self, actor: &Actor, req: CreateQueueRequest) -> Result<Queue> {
        if !actor.acts_for(&req.owner) {
            return Err(AppError::Forbidden(format!(
                "{:?} {} cannot create queues for {} {}",
                actor.role, actor.id, req.owner.kind, req.owner.id
            )));
        }

        let queue = Queue::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            req.owner,
            req.name,
            req.max_number,
        )?;
        self.queues.insert(&queue).await?;

        info!(
            queue_id = %queue.id,
            owner = %queue.owner.id,
            max_number = queue.max_number,
            "Queue created"
        );
        Ok(queue)
    }

    pub async fn pause(&self, actor: &Actor, queue_id: &str) -> Result<QueueTransitioned> {
        self.transition(actor, queue_id, QueueStatus::Paused).await
    }

    pub async fn resume(&self, actor: &Actor, queue_id: &str) -> Result<QueueTransitioned> {
        self.transition(actor, queue_id, QueueStatus::Open).await
    }

    pub async fn close(&self, actor: &Actor, queue_id: &str) -> Result<QueueTransitioned> {
        self.transition(actor, queue_id, QueueStatus::Closed).await
    }

    /// Move the queue to `to`; same-state requests are rejected
    pub async fn transition(
        &self,
        actor: &Actor,
        queue_id: &str,
        to: QueueStatus,
    ) -> Result<QueueTransitioned> {
        let _guard = self.locks.acquire(queue_id).await;
        let mut tx = self.store.begin_transaction(queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let mut queue = load_queue(tx.as_mut(), queue_id).await?;
            require_owner(actor, &queue)?;

            let from = queue.status;
            queue.transition_to(to, now)?;
            tx.save_queue(&queue).await?;
            Ok::<_, AppError>(QueueTransitioned { queue, from })
        }
        .await;

        let changed = finish_transaction(tx, result).await?;
        info!(
            queue_id = %queue_id,
            from = %changed.from,
            to = %changed.queue.status,
            "Queue status changed"
        );
        Ok(changed)
    }

    /// Change capacity; admitted tickets are never evicted
    pub async fn set_capacity(
        &self,
        actor: &Actor,
        queue_id: &str,
        max_number: u32,
    ) -> Result<Queue> {
        let _guard = self.locks.acquire(queue_id).await;
        let mut tx = self.store.begin_transaction(queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let mut queue = load_queue(tx.as_mut(), queue_id).await?;
            require_owner(actor, &queue)?;

            queue.set_capacity(max_number, now)?;
            tx.save_queue(&queue).await?;
            Ok::<_, AppError>(queue)
        }
        .await;

        let queue = finish_transaction(tx, result).await?;
        info!(queue_id = %queue_id, max_number = max_number, "Queue capacity changed");
        Ok(queue)
    }
}
