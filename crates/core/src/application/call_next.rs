// Call-Next Orchestrator
//
// Promotes the oldest WAITING ticket of an OPEN queue to SERVING. At most
// one ticket per queue is ever SERVING: the check and the promotion run in
// one queue-scoped transaction under the queue's lock, and the store
// re-checks ticket status (and, for SQLite, the serving index) on write.

use crate::application::locks::{finish_transaction, QueueLocks};
use crate::application::queue_lifecycle::{load_queue, require_owner};
use crate::application::ticket_lifecycle::{complete_in, TicketChange};
use crate::domain::{Actor, Queue, Ticket, TicketStatus, VisitEvent};
use crate::error::{AppError, Result};
use crate::port::{QueueTransaction, TimeProvider, TransactionalVisitStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of the staff "next patient" button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPatient {
    /// Ticket that was serving and is now completed
    pub completed: Option<TicketChange>,
    /// Newly called ticket; `None` when nobody was waiting
    pub called: Option<Ticket>,
}

impl NextPatient {
    pub fn events(&self) -> Vec<VisitEvent> {
        let mut events = Vec::new();
        if let Some(event) = self.completed.as_ref().and_then(TicketChange::event) {
            events.push(event);
        }
        if let Some(ticket) = &self.called {
            events.push(called_event(ticket));
        }
        events
    }
}

pub fn called_event(ticket: &Ticket) -> VisitEvent {
    VisitEvent::TicketCalled {
        queue_id: ticket.queue_id.clone(),
        ticket_id: ticket.id,
        notification_contact: ticket.notification_contact.clone(),
        served_at: ticket.served_at.unwrap_or(ticket.issued_at),
    }
}

/// Steps 1-5 of a call, inside an open transaction
async fn promote_next(
    tx: &mut dyn QueueTransaction,
    queue: &Queue,
    now_millis: i64,
) -> Result<Ticket> {
    queue.check_callable()?;

    if let Some(serving) = tx.find_serving().await? {
        return Err(AppError::AlreadyServing(format!(
            "Queue {} is already serving ticket {}",
            queue.id, serving.id
        )));
    }

    let mut next = tx.next_waiting().await?.ok_or_else(|| {
        AppError::QueueEmpty(format!("Queue {} has no waiting tickets", queue.id))
    })?;

    next.promote(now_millis)?;
    tx.save_ticket(&next, TicketStatus::Waiting).await?;
    Ok(next)
}

pub struct CallNextOrchestrator {
    store: Arc<dyn TransactionalVisitStore>,
    locks: Arc<QueueLocks>,
    time_provider: Arc<dyn TimeProvider>,
}

impl CallNextOrchestrator {
    pub fn new(
        store: Arc<dyn TransactionalVisitStore>,
        locks: Arc<QueueLocks>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            locks,
            time_provider,
        }
    }

    /// Promote the oldest WAITING ticket
    ///
    /// # Errors
    /// * `InvalidTransition` - queue not OPEN
    /// * `AlreadyServing` - a ticket is still SERVING
    /// * `QueueEmpty` - nobody waiting (not a fault)
    /// * `Conflict` - lost a race against another writer
    pub async fn call_next(&self, actor: &Actor, queue_id: &str) -> Result<Ticket> {
        let _guard = self.locks.acquire(queue_id).await;
        let mut tx = self.store.begin_transaction(queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let queue = load_queue(tx.as_mut(), queue_id).await?;
            require_owner(actor, &queue)?;
            promote_next(tx.as_mut(), &queue, now).await
        }
        .await;

        let ticket = finish_transaction(tx, result).await?;
        info!(
            queue_id = %queue_id,
            ticket_id = ticket.id,
            wait_ms = ticket.wait_duration_ms().unwrap_or_default(),
            "Ticket called"
        );
        Ok(ticket)
    }

    /// Complete the SERVING ticket (if any), then call the next one
    ///
    /// Two atomic steps, not one: a concurrent caller may slip in between
    /// and call the next ticket itself, in which case `called` is `None`.
    pub async fn complete_and_call_next(
        &self,
        actor: &Actor,
        queue_id: &str,
    ) -> Result<NextPatient> {
        let completed = self.complete_serving(actor, queue_id).await?;
        let called = self.call_after_completion(actor, queue_id).await?;
        Ok(NextPatient { completed, called })
    }

    /// Second step of the "next patient" button
    ///
    /// An empty queue, or a ticket another caller already promoted, is not a
    /// failure here.
    pub async fn call_after_completion(
        &self,
        actor: &Actor,
        queue_id: &str,
    ) -> Result<Option<Ticket>> {
        match self.call_next(actor, queue_id).await {
            Ok(ticket) => Ok(Some(ticket)),
            Err(AppError::QueueEmpty(_)) | Err(AppError::AlreadyServing(_)) => {
                debug!(queue_id = %queue_id, "Nothing to call after completion");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// First step of the "next patient" button
    pub async fn complete_serving(
        &self,
        actor: &Actor,
        queue_id: &str,
    ) -> Result<Option<TicketChange>> {
        let _guard = self.locks.acquire(queue_id).await;
        let mut tx = self.store.begin_transaction(queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let queue = load_queue(tx.as_mut(), queue_id).await?;
            require_owner(actor, &queue)?;
            match tx.find_serving().await? {
                Some(serving) => complete_in(tx.as_mut(), serving, now).await.map(Some),
                None => Ok(None),
            }
        }
        .await;

        let completed = finish_transaction(tx, result).await?;
        if let Some(change) = &completed {
            info!(
                queue_id = %queue_id,
                ticket_id = change.ticket.id,
                "Ticket completed"
            );
        }
        Ok(completed)
    }
}
