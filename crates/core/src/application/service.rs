//! Visit Queue Service
//!
//! Single entry point used by transports. Wires the lifecycle controllers
//! and the call-next orchestrator over one store, re-runs operations that
//! lost an optimistic race, and hands events to the notifier once the
//! transition has committed.

use crate::application::call_next::{called_event, CallNextOrchestrator, NextPatient};
use crate::application::locks::QueueLocks;
use crate::application::queue_lifecycle::{CreateQueueRequest, QueueLifecycle};
use crate::application::retry::ConflictRetryPolicy;
use crate::application::ticket_lifecycle::{JoinRequest, TicketLifecycle};
use crate::domain::position::{average_service_duration, calculate, queue_positions};
use crate::domain::{
    Actor, EtaConfig, Position, Queue, QueueOwner, Role, Ticket, TicketId, TicketStatus,
    VisitEvent,
};
use crate::error::{AppError, Result};
use crate::port::{
    IdProvider, Notifier, QueueRepository, TicketRepository, TimeProvider,
    TransactionalVisitStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ticket with its derived position and ETA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub position: Position,
    pub eta_ms: Option<i64>,
}

/// Staff view of a queue: every active ticket in call order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBoard {
    pub queue: Queue,
    pub average_service_ms: i64,
    pub tickets: Vec<TicketView>,
}

impl QueueBoard {
    pub fn serving(&self) -> Option<&TicketView> {
        self.tickets
            .iter()
            .find(|view| view.position == Position::Serving)
    }

    pub fn waiting_count(&self) -> usize {
        self.tickets
            .iter()
            .filter(|view| matches!(view.position, Position::Waiting(_)))
            .count()
    }
}

pub struct VisitQueueService {
    queues: Arc<dyn QueueRepository>,
    tickets: Arc<dyn TicketRepository>,
    queue_lifecycle: QueueLifecycle,
    ticket_lifecycle: TicketLifecycle,
    calls: CallNextOrchestrator,
    notifier: Arc<dyn Notifier>,
    retry: ConflictRetryPolicy,
    eta: EtaConfig,
}

impl VisitQueueService {
    pub fn new(
        queues: Arc<dyn QueueRepository>,
        tickets: Arc<dyn TicketRepository>,
        store: Arc<dyn TransactionalVisitStore>,
        notifier: Arc<dyn Notifier>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let locks = Arc::new(QueueLocks::new());

        Self {
            queue_lifecycle: QueueLifecycle::new(
                Arc::clone(&queues),
                Arc::clone(&store),
                Arc::clone(&locks),
                id_provider,
                Arc::clone(&time_provider),
            ),
            ticket_lifecycle: TicketLifecycle::new(
                Arc::clone(&tickets),
                Arc::clone(&store),
                Arc::clone(&locks),
                Arc::clone(&time_provider),
            ),
            calls: CallNextOrchestrator::new(store, locks, time_provider),
            queues,
            tickets,
            notifier,
            retry: ConflictRetryPolicy::default(),
            eta: EtaConfig::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: ConflictRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_eta_config(mut self, eta: EtaConfig) -> Self {
        self.eta = eta;
        self
    }

    // === Queues ===

    pub async fn create_queue(&self, actor: &Actor, req: CreateQueueRequest) -> Result<Queue> {
        self.queue_lifecycle.create(actor, req).await
    }

    pub async fn pause_queue(&self, actor: &Actor, queue_id: &str) -> Result<Queue> {
        let changed = self
            .retry
            .run("queue.pause", move || self.queue_lifecycle.pause(actor, queue_id))
            .await?;
        self.dispatch(changed.event()).await;
        Ok(changed.queue)
    }

    pub async fn resume_queue(&self, actor: &Actor, queue_id: &str) -> Result<Queue> {
        let changed = self
            .retry
            .run("queue.resume", move || self.queue_lifecycle.resume(actor, queue_id))
            .await?;
        self.dispatch(changed.event()).await;
        Ok(changed.queue)
    }

    /// Close for good; outstanding tickets stay as they are
    pub async fn close_queue(&self, actor: &Actor, queue_id: &str) -> Result<Queue> {
        let changed = self
            .retry
            .run("queue.close", move || self.queue_lifecycle.close(actor, queue_id))
            .await?;
        self.dispatch(changed.event()).await;
        Ok(changed.queue)
    }

    pub async fn set_capacity(
        &self,
        actor: &Actor,
        queue_id: &str,
        max_number: u32,
    ) -> Result<Queue> {
        self.retry
            .run("queue.capacity", move || {
                self.queue_lifecycle.set_capacity(actor, queue_id, max_number)
            })
            .await
    }

    pub async fn get_queue(&self, queue_id: &str) -> Result<Queue> {
        self.queues
            .find_by_id(queue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_id)))
    }

    /// All queues, or only those operated by `owner`
    pub async fn list_queues(&self, owner: Option<&QueueOwner>) -> Result<Vec<Queue>> {
        match owner {
            Some(owner) => self.queues.list_by_owner(owner).await,
            None => self.queues.list_all().await,
        }
    }

    // === Tickets ===

    /// Join a queue; returns the new ticket with its position
    pub async fn join(&self, actor: &Actor, req: JoinRequest) -> Result<TicketView> {
        let ticket = self
            .retry
            .run("ticket.join", move || self.ticket_lifecycle.join(actor, req.clone()))
            .await?;
        self.view_of(ticket).await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        ticket_id: TicketId,
        expected: Option<TicketStatus>,
    ) -> Result<Ticket> {
        let change = self
            .retry
            .run("ticket.cancel", move || {
                self.ticket_lifecycle.cancel(actor, ticket_id, expected)
            })
            .await?;
        if let Some(event) = change.event() {
            self.dispatch(event).await;
        }
        Ok(change.ticket)
    }

    pub async fn complete(&self, actor: &Actor, ticket_id: TicketId) -> Result<Ticket> {
        let change = self
            .retry
            .run("ticket.complete", move || {
                self.ticket_lifecycle.complete(actor, ticket_id)
            })
            .await?;
        if let Some(event) = change.event() {
            self.dispatch(event).await;
        }
        Ok(change.ticket)
    }

    pub async fn call_next(&self, actor: &Actor, queue_id: &str) -> Result<Ticket> {
        let ticket = self
            .retry
            .run("queue.call_next", move || self.calls.call_next(actor, queue_id))
            .await?;
        self.dispatch(called_event(&ticket)).await;
        Ok(ticket)
    }

    pub async fn complete_and_call_next(
        &self,
        actor: &Actor,
        queue_id: &str,
    ) -> Result<NextPatient> {
        // Each step retries on its own: a committed completion is never re-run
        let completed = self
            .retry
            .run("queue.complete_serving", move || {
                self.calls.complete_serving(actor, queue_id)
            })
            .await?;
        let called = self
            .retry
            .run("queue.call_next", move || {
                self.calls.call_after_completion(actor, queue_id)
            })
            .await?;
        let next = NextPatient { completed, called };
        for event in next.events() {
            self.dispatch(event).await;
        }
        Ok(next)
    }

    pub async fn expire_waiting(
        &self,
        actor: &Actor,
        queue_id: &str,
        older_than_ms: i64,
    ) -> Result<Vec<Ticket>> {
        let expired = self
            .retry
            .run("queue.expire", move || {
                self.ticket_lifecycle
                    .expire_waiting(actor, queue_id, older_than_ms)
            })
            .await?;
        for ticket in &expired {
            self.dispatch(VisitEvent::TicketCancelled {
                queue_id: ticket.queue_id.clone(),
                ticket_id: ticket.id,
                notification_contact: ticket.notification_contact.clone(),
            })
            .await;
        }
        Ok(expired)
    }

    // === Reads (snapshot, outside transactions) ===

    /// Ticket detail with position/ETA (the ticket's patient or queue owner)
    pub async fn ticket_view(&self, actor: &Actor, ticket_id: TicketId) -> Result<TicketView> {
        let ticket = self
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;
        let queue = self.get_queue(&ticket.queue_id).await?;

        if !actor.may_view(&ticket, &queue) {
            return Err(AppError::Forbidden(format!(
                "{:?} {} cannot view ticket {}",
                actor.role, actor.id, ticket_id
            )));
        }
        self.view_of(ticket).await
    }

    /// Active tickets of a queue in call order (queue owner)
    pub async fn queue_board(&self, actor: &Actor, queue_id: &str) -> Result<QueueBoard> {
        let queue = self.get_queue(queue_id).await?;
        if !actor.owns_queue(&queue) {
            return Err(AppError::Forbidden(format!(
                "{:?} {} does not operate queue {}",
                actor.role, actor.id, queue_id
            )));
        }

        let active = self.tickets.list_active(queue_id).await?;
        let average_service_ms = self.average_service_ms(queue_id).await?;

        let mut by_id: HashMap<TicketId, Ticket> =
            active.iter().map(|t| (t.id, t.clone())).collect();
        let tickets = queue_positions(&active, average_service_ms)
            .into_iter()
            .filter_map(|pos| {
                by_id.remove(&pos.ticket_id).map(|ticket| TicketView {
                    ticket,
                    position: pos.position,
                    eta_ms: pos.eta_ms,
                })
            })
            .collect();

        Ok(QueueBoard {
            queue,
            average_service_ms,
            tickets,
        })
    }

    /// A patient's tickets, newest first
    ///
    /// Patients list their own; admins must name the patient.
    pub async fn patient_tickets(
        &self,
        actor: &Actor,
        patient_id: Option<&str>,
    ) -> Result<Vec<TicketView>> {
        let patient_id = match (actor.role, patient_id) {
            (Role::Admin, Some(id)) => id,
            (Role::Patient, None) => actor.id.as_str(),
            (Role::Patient, Some(id)) if id == actor.id => id,
            (Role::Admin, None) => {
                return Err(AppError::Validation(
                    "patient_id is required for admins".to_string(),
                ))
            }
            _ => {
                return Err(AppError::Forbidden(format!(
                    "{:?} {} cannot list these tickets",
                    actor.role, actor.id
                )))
            }
        };

        let tickets = self.tickets.list_by_patient(patient_id).await?;
        let mut views = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            views.push(self.view_of(ticket).await?);
        }
        Ok(views)
    }

    async fn view_of(&self, ticket: Ticket) -> Result<TicketView> {
        if ticket.status.is_terminal() {
            return Ok(TicketView {
                ticket,
                position: Position::Finished,
                eta_ms: None,
            });
        }

        let mut snapshot = self.tickets.list_active(&ticket.queue_id).await?;
        if !snapshot.iter().any(|t| t.id == ticket.id) {
            // Finished between the two reads; rank it from what we hold
            snapshot.push(ticket.clone());
        }
        let average_service_ms = self.average_service_ms(&ticket.queue_id).await?;
        let derived = calculate(&snapshot, ticket.id, average_service_ms);

        Ok(TicketView {
            ticket,
            position: derived.position,
            eta_ms: derived.eta_ms,
        })
    }

    async fn average_service_ms(&self, queue_id: &str) -> Result<i64> {
        let history = self
            .tickets
            .recent_completed(queue_id, self.eta.history_window)
            .await?;
        let average = average_service_duration(&history, &self.eta);
        debug!(
            queue_id = %queue_id,
            samples = history.len(),
            average_service_ms = average,
            "Service average"
        );
        Ok(average)
    }

    async fn dispatch(&self, event: VisitEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(
                event = event.name(),
                queue_id = %event.queue_id(),
                error = %e,
                "Notification dispatch failed"
            );
        }
    }
}
