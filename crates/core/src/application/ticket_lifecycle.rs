// Ticket Lifecycle Use Cases
//
// (none) -> WAITING -> SERVING -> COMPLETED
//              \          \
//               +----------+-> CANCELLED
//
// Promotion lives in call_next; everything else is here.

use crate::application::locks::{finish_transaction, QueueLocks};
use crate::application::queue_lifecycle::{check_admission, load_queue, require_owner};
use crate::domain::{
    Actor, NewTicket, Role, Ticket, TicketId, TicketStatus, Transition, VisitEvent,
};
use crate::error::{AppError, Result};
use crate::port::{QueueTransaction, TicketRepository, TimeProvider, TransactionalVisitStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Join request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub queue_id: String,
    pub notification_contact: String,

    /// Only for admins joining on a patient's behalf; patients join as themselves
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// Ticket snapshot after complete/cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketChange {
    pub ticket: Ticket,
    pub transition: Transition,
}

impl TicketChange {
    /// Event to dispatch; none when the request changed nothing
    pub fn event(&self) -> Option<VisitEvent> {
        if self.transition == Transition::Unchanged {
            return None;
        }
        let ticket = &self.ticket;
        match ticket.status {
            TicketStatus::Completed => Some(VisitEvent::TicketCompleted {
                queue_id: ticket.queue_id.clone(),
                ticket_id: ticket.id,
                notification_contact: ticket.notification_contact.clone(),
            }),
            TicketStatus::Cancelled => Some(VisitEvent::TicketCancelled {
                queue_id: ticket.queue_id.clone(),
                ticket_id: ticket.id,
                notification_contact: ticket.notification_contact.clone(),
            }),
            TicketStatus::Waiting | TicketStatus::Serving => None,
        }
    }
}

pub(crate) async fn find_ticket(
    tx: &mut dyn QueueTransaction,
    ticket_id: TicketId,
) -> Result<Ticket> {
    tx.find_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))
}

/// SERVING -> COMPLETED inside an open transaction
pub(crate) async fn complete_in(
    tx: &mut dyn QueueTransaction,
    mut ticket: Ticket,
    now_millis: i64,
) -> Result<TicketChange> {
    let expected = ticket.status;
    let transition = ticket.complete(now_millis)?;
    if transition == Transition::Applied {
        tx.save_ticket(&ticket, expected).await?;
    }
    Ok(TicketChange { ticket, transition })
}

/// WAITING|SERVING -> CANCELLED inside an open transaction
async fn cancel_in(
    tx: &mut dyn QueueTransaction,
    mut ticket: Ticket,
    now_millis: i64,
) -> Result<TicketChange> {
    let expected = ticket.status;
    let transition = ticket.cancel(now_millis)?;
    if transition == Transition::Applied {
        tx.save_ticket(&ticket, expected).await?;
    }
    Ok(TicketChange { ticket, transition })
}

pub struct TicketLifecycle {
    tickets: Arc<dyn TicketRepository>,
    store: Arc<dyn TransactionalVisitStore>,
    locks: Arc<QueueLocks>,
    time_provider: Arc<dyn TimeProvider>,
}

impl TicketLifecycle {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        store: Arc<dyn TransactionalVisitStore>,
        locks: Arc<QueueLocks>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            tickets,
            store,
            locks,
            time_provider,
        }
    }

    /// Issue a WAITING ticket (admission check + insert, one transaction)
    pub async fn join(&self, actor: &Actor, req: JoinRequest) -> Result<Ticket> {
        let patient_id = joining_patient(actor, req.patient_id)?;
        let new_ticket = NewTicket::new(
            req.queue_id.clone(),
            patient_id,
            req.notification_contact,
            self.time_provider.now_millis(),
        )?;

        let queue_id = req.queue_id;
        let _guard = self.locks.acquire(&queue_id).await;
        let mut tx = self.store.begin_transaction(&queue_id).await?;

        let result = async {
            let queue = load_queue(tx.as_mut(), &queue_id).await?;
            let active = tx.count_active().await?;
            check_admission(&queue, active)?;
            tx.insert_ticket(new_ticket).await
        }
        .await;

        let ticket = finish_transaction(tx, result).await?;
        info!(
            queue_id = %ticket.queue_id,
            ticket_id = ticket.id,
            patient_id = %ticket.patient_id,
            "Ticket issued"
        );
        Ok(ticket)
    }

    /// SERVING -> COMPLETED (queue owner); repeat calls are no-ops
    pub async fn complete(&self, actor: &Actor, ticket_id: TicketId) -> Result<TicketChange> {
        let queue_id = self.locate(ticket_id).await?;
        let _guard = self.locks.acquire(&queue_id).await;
        let mut tx = self.store.begin_transaction(&queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let queue = load_queue(tx.as_mut(), &queue_id).await?;
            require_owner(actor, &queue)?;
            let ticket = find_ticket(tx.as_mut(), ticket_id).await?;
            complete_in(tx.as_mut(), ticket, now).await
        }
        .await;

        let change = finish_transaction(tx, result).await?;
        log_change("Ticket completed", &change);
        Ok(change)
    }

    /// -> CANCELLED (the ticket's patient or the queue owner)
    ///
    /// `expected` pins the status the caller last saw: if the ticket moved
    /// on in the meantime (e.g. was called) the cancel fails with
    /// `Conflict` instead of cancelling a ticket already being served.
    pub async fn cancel(
        &self,
        actor: &Actor,
        ticket_id: TicketId,
        expected: Option<TicketStatus>,
    ) -> Result<TicketChange> {
        let queue_id = self.locate(ticket_id).await?;
        let _guard = self.locks.acquire(&queue_id).await;
        let mut tx = self.store.begin_transaction(&queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let queue = load_queue(tx.as_mut(), &queue_id).await?;
            let ticket = find_ticket(tx.as_mut(), ticket_id).await?;
            if !actor.may_cancel(&ticket, &queue) {
                return Err(AppError::Forbidden(format!(
                    "{:?} {} cannot cancel ticket {}",
                    actor.role, actor.id, ticket_id
                )));
            }

            if let Some(expected) = expected {
                let settled = ticket.status == TicketStatus::Cancelled;
                if ticket.status != expected && !settled {
                    return Err(AppError::Conflict(format!(
                        "Ticket {} is no longer {} (now {})",
                        ticket_id, expected, ticket.status
                    )));
                }
            }
            cancel_in(tx.as_mut(), ticket, now).await
        }
        .await;

        let change = finish_transaction(tx, result).await?;
        log_change("Ticket cancelled", &change);
        Ok(change)
    }

    /// Cancel every WAITING ticket issued more than `older_than_ms` ago
    ///
    /// Explicit operator action; nothing expires on its own.
    pub async fn expire_waiting(
        &self,
        actor: &Actor,
        queue_id: &str,
        older_than_ms: i64,
    ) -> Result<Vec<Ticket>> {
        if older_than_ms < 0 {
            return Err(AppError::Validation(format!(
                "older_than_ms must be >= 0 (got {})",
                older_than_ms
            )));
        }

        let _guard = self.locks.acquire(queue_id).await;
        let mut tx = self.store.begin_transaction(queue_id).await?;

        let now = self.time_provider.now_millis();
        let result = async {
            let queue = load_queue(tx.as_mut(), queue_id).await?;
            require_owner(actor, &queue)?;

            let stale = tx.waiting_issued_before(now - older_than_ms).await?;
            let mut expired = Vec::with_capacity(stale.len());
            for ticket in stale {
                expired.push(cancel_in(tx.as_mut(), ticket, now).await?.ticket);
            }
            Ok::<_, AppError>(expired)
        }
        .await;

        let expired = finish_transaction(tx, result).await?;
        info!(
            queue_id = %queue_id,
            expired = expired.len(),
            older_than_ms = older_than_ms,
            "Expired waiting tickets"
        );
        Ok(expired)
    }

    /// Queue of a ticket (queue membership never changes)
    async fn locate(&self, ticket_id: TicketId) -> Result<String> {
        self.tickets
            .find_by_id(ticket_id)
            .await?
            .map(|t| t.queue_id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))
    }
}

fn joining_patient(actor: &Actor, requested: Option<String>) -> Result<String> {
    if !actor.may_join() {
        return Err(AppError::Forbidden(format!(
            "{:?} {} cannot join queues",
            actor.role, actor.id
        )));
    }
    match (actor.role, requested) {
        (Role::Admin, Some(patient_id)) => Ok(patient_id),
        (Role::Admin, None) => Err(AppError::Validation(
            "patient_id is required when joining on a patient's behalf".to_string(),
        )),
        (_, Some(patient_id)) if patient_id != actor.id => Err(AppError::Forbidden(format!(
            "Patient {} cannot join as {}",
            actor.id, patient_id
        ))),
        _ => Ok(actor.id.clone()),
    }
}

fn log_change(message: &'static str, change: &TicketChange) {
    match change.transition {
        Transition::Applied => info!(
            queue_id = %change.ticket.queue_id,
            ticket_id = change.ticket.id,
            "{}", message
        ),
        Transition::Unchanged => debug!(
            ticket_id = change.ticket.id,
            status = %change.ticket.status,
            "Ticket already settled"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Queue, QueueOwner};
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::{InMemoryVisitStore, QueueRepository, Transaction};

    struct Fixture {
        store: InMemoryVisitStore,
        clock: Arc<ManualTimeProvider>,
        lifecycle: TicketLifecycle,
    }

    async fn fixture(max_number: u32) -> Fixture {
        let store = InMemoryVisitStore::new();
        let queue = Queue::new("q-1", 0, QueueOwner::doctor("doc-1"), "GP", max_number).unwrap();
        QueueRepository::insert(&store, &queue).await.unwrap();

        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let lifecycle = TicketLifecycle::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(QueueLocks::new()),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            lifecycle,
        }
    }

    fn join_request(contact: &str) -> JoinRequest {
        JoinRequest {
            queue_id: "q-1".to_string(),
            notification_contact: contact.to_string(),
            patient_id: None,
        }
    }

    async fn set_queue_status(store: &InMemoryVisitStore, to: crate::domain::QueueStatus) {
        let mut tx = store.begin_transaction("q-1").await.unwrap();
        let mut queue = tx.load_queue().await.unwrap().unwrap();
        queue.transition_to(to, 0).unwrap();
        tx.save_queue(&queue).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn serve(store: &InMemoryVisitStore, ticket_id: TicketId) {
        let mut tx = store.begin_transaction("q-1").await.unwrap();
        let mut ticket = tx.find_ticket(ticket_id).await.unwrap().unwrap();
        ticket.promote(2_000).unwrap();
        tx.save_ticket(&ticket, TicketStatus::Waiting).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_join_issues_increasing_ids() {
        let f = fixture(0).await;
        let patient = Actor::patient("p-1");

        let first = f.lifecycle.join(&patient, join_request("a@x")).await.unwrap();
        let second = f.lifecycle.join(&patient, join_request("b@x")).await.unwrap();

        assert_eq!(first.status, TicketStatus::Waiting);
        assert_eq!(first.patient_id, "p-1");
        assert_eq!(first.issued_at, 1_000);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_capacity_boundary() {
        let f = fixture(2).await;
        let patient = Actor::patient("p-1");

        f.lifecycle.join(&patient, join_request("a")).await.unwrap();
        f.lifecycle.join(&patient, join_request("b")).await.unwrap();
        let third = f.lifecycle.join(&patient, join_request("c")).await;

        assert!(matches!(third, Err(AppError::CapacityExceeded(_))));
        assert_eq!(f.store.list_active("q-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_frees_capacity() {
        let f = fixture(1).await;
        let patient = Actor::patient("p-1");

        let ticket = f.lifecycle.join(&patient, join_request("a")).await.unwrap();
        f.lifecycle.cancel(&patient, ticket.id, None).await.unwrap();

        assert!(f.lifecycle.join(&patient, join_request("b")).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_closed_and_paused_queue() {
        let f = fixture(0).await;
        let patient = Actor::patient("p-1");

        set_queue_status(&f.store, crate::domain::QueueStatus::Paused).await;
        let paused = f.lifecycle.join(&patient, join_request("a")).await;
        assert!(matches!(paused, Err(AppError::InvalidTransition(_))));

        set_queue_status(&f.store, crate::domain::QueueStatus::Closed).await;
        let closed = f.lifecycle.join(&patient, join_request("a")).await;
        assert!(matches!(closed, Err(AppError::CapacityExceeded(_))));
    }

    #[tokio::test]
    async fn test_join_role_rules() {
        let f = fixture(0).await;

        let doctor = f.lifecycle.join(&Actor::doctor("doc-1"), join_request("a")).await;
        assert!(matches!(doctor, Err(AppError::Forbidden(_))));

        let mut spoofed = join_request("a");
        spoofed.patient_id = Some("p-2".to_string());
        let result = f.lifecycle.join(&Actor::patient("p-1"), spoofed.clone()).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let on_behalf = f.lifecycle.join(&Actor::admin("ops"), spoofed).await.unwrap();
        assert_eq!(on_behalf.patient_id, "p-2");

        let missing = f.lifecycle.join(&Actor::admin("ops"), join_request("a")).await;
        assert!(matches!(missing, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_join_rejects_blank_contact() {
        let f = fixture(0).await;
        let result = f.lifecycle.join(&Actor::patient("p-1"), join_request("  ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let f = fixture(0).await;
        let doctor = Actor::doctor("doc-1");
        let ticket = f
            .lifecycle
            .join(&Actor::patient("p-1"), join_request("a"))
            .await
            .unwrap();
        serve(&f.store, ticket.id).await;
        f.clock.set(5_000);

        let first = f.lifecycle.complete(&doctor, ticket.id).await.unwrap();
        assert_eq!(first.transition, Transition::Applied);
        assert_eq!(first.ticket.finished_at, Some(5_000));
        assert!(first.event().is_some());

        f.clock.set(9_000);
        let again = f.lifecycle.complete(&doctor, ticket.id).await.unwrap();
        assert_eq!(again.transition, Transition::Unchanged);
        assert_eq!(again.ticket, first.ticket);
        assert!(again.event().is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_serving() {
        let f = fixture(0).await;
        let doctor = Actor::doctor("doc-1");
        let ticket = f
            .lifecycle
            .join(&Actor::patient("p-1"), join_request("a"))
            .await
            .unwrap();

        let waiting = f.lifecycle.complete(&doctor, ticket.id).await;
        assert!(matches!(waiting, Err(AppError::InvalidTransition(_))));

        f.lifecycle.cancel(&doctor, ticket.id, None).await.unwrap();
        let cancelled = f.lifecycle.complete(&doctor, ticket.id).await;
        assert!(matches!(cancelled, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let f = fixture(0).await;
        let owner = Actor::patient("p-1");
        let ticket = f.lifecycle.join(&owner, join_request("a")).await.unwrap();

        let stranger = f.lifecycle.cancel(&Actor::patient("p-2"), ticket.id, None).await;
        assert!(matches!(stranger, Err(AppError::Forbidden(_))));

        let first = f.lifecycle.cancel(&owner, ticket.id, None).await.unwrap();
        assert_eq!(first.ticket.status, TicketStatus::Cancelled);
        let again = f.lifecycle.cancel(&owner, ticket.id, None).await.unwrap();
        assert_eq!(again.transition, Transition::Unchanged);
    }

    #[tokio::test]
    async fn test_cancel_completed_ticket_rejected() {
        let f = fixture(0).await;
        let doctor = Actor::doctor("doc-1");
        let ticket = f
            .lifecycle
            .join(&Actor::patient("p-1"), join_request("a"))
            .await
            .unwrap();
        serve(&f.store, ticket.id).await;
        f.lifecycle.complete(&doctor, ticket.id).await.unwrap();

        let result = f.lifecycle.cancel(&doctor, ticket.id, None).await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_cancel_with_stale_expectation_conflicts() {
        let f = fixture(0).await;
        let patient = Actor::patient("p-1");
        let ticket = f.lifecycle.join(&patient, join_request("a")).await.unwrap();
        serve(&f.store, ticket.id).await;

        let result = f
            .lifecycle
            .cancel(&patient, ticket.id, Some(TicketStatus::Waiting))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let still = TicketRepository::find_by_id(&f.store, ticket.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(still.status, TicketStatus::Serving);
    }

    #[tokio::test]
    async fn test_cancel_allowed_on_closed_queue() {
        let f = fixture(0).await;
        let ticket = f
            .lifecycle
            .join(&Actor::patient("p-1"), join_request("a"))
            .await
            .unwrap();
        set_queue_status(&f.store, crate::domain::QueueStatus::Closed).await;

        let change = f
            .lifecycle
            .cancel(&Actor::doctor("doc-1"), ticket.id, None)
            .await
            .unwrap();
        assert_eq!(change.ticket.status, TicketStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_expire_waiting_cancels_only_stale_tickets() {
        let f = fixture(0).await;
        let patient = Actor::patient("p-1");

        let old = f.lifecycle.join(&patient, join_request("a")).await.unwrap();
        let served = f.lifecycle.join(&patient, join_request("b")).await.unwrap();
        serve(&f.store, served.id).await;
        f.clock.set(60_000);
        let fresh = f.lifecycle.join(&patient, join_request("c")).await.unwrap();

        let expired = f
            .lifecycle
            .expire_waiting(&Actor::doctor("doc-1"), "q-1", 30_000)
            .await
            .unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
        let active: Vec<TicketId> = f
            .store
            .list_active("q-1")
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(active, vec![served.id, fresh.id]);
    }

    #[tokio::test]
    async fn test_expire_waiting_validates_input() {
        let f = fixture(0).await;
        let doctor = Actor::doctor("doc-1");

        let negative = f.lifecycle.expire_waiting(&doctor, "q-1", -1).await;
        assert!(matches!(negative, Err(AppError::Validation(_))));

        let patient = f.lifecycle.expire_waiting(&Actor::patient("p-1"), "q-1", 0).await;
        assert!(matches!(patient, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_unknown_ticket() {
        let f = fixture(0).await;
        let result = f.lifecycle.complete(&Actor::admin("ops"), 999).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
