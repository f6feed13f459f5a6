// Startup audit
//
// The engine never lets two tickets of one queue be SERVING, but rows can
// be edited out-of-band (manual SQL, restored backups). The audit only
// reports such queues; picking which ticket keeps serving is an operator
// decision, so nothing is mutated here.

use crate::domain::{QueueId, TicketId, TicketStatus};
use crate::error::Result;
use crate::port::{QueueRepository, TicketRepository};
use std::sync::Arc;
use tracing::{error, info};

/// Queue with more than one SERVING ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingViolation {
    pub queue_id: QueueId,
    pub serving: Vec<TicketId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub queues_checked: usize,
    pub violations: Vec<ServingViolation>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct RecoveryService {
    queues: Arc<dyn QueueRepository>,
    tickets: Arc<dyn TicketRepository>,
}

impl RecoveryService {
    pub fn new(queues: Arc<dyn QueueRepository>, tickets: Arc<dyn TicketRepository>) -> Self {
        Self { queues, tickets }
    }

    /// Scan every queue for more than one SERVING ticket
    pub async fn audit_serving(&self) -> Result<RecoveryReport> {
        let queues = self.queues.list_all().await?;
        let mut report = RecoveryReport {
            queues_checked: queues.len(),
            violations: Vec::new(),
        };

        for queue in queues {
            let serving: Vec<TicketId> = self
                .tickets
                .list_active(&queue.id)
                .await?
                .into_iter()
                .filter(|t| t.status == TicketStatus::Serving)
                .map(|t| t.id)
                .collect();

            if serving.len() > 1 {
                error!(
                    queue_id = %queue.id,
                    serving = ?serving,
                    "Queue has more than one SERVING ticket"
                );
                report.violations.push(ServingViolation {
                    queue_id: queue.id,
                    serving,
                });
            }
        }

        info!(
            queues_checked = report.queues_checked,
            violations = report.violations.len(),
            "Serving audit complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTicket, Queue, QueueOwner};
    use crate::port::{InMemoryVisitStore, QueueTransaction, Transaction, TransactionalVisitStore};

    async fn seed(store: &InMemoryVisitStore, queue_id: &str, serving: usize) -> Vec<TicketId> {
        let queue = Queue::new(queue_id, 0, QueueOwner::clinic("c-1"), "Walk-in", 0).unwrap();
        QueueRepository::insert(store, &queue).await.unwrap();

        let mut tx = store.begin_transaction(queue_id).await.unwrap();
        let mut ids = Vec::new();
        for n in 0..serving {
            let new = NewTicket::new(queue_id, format!("p-{}", n), "contact", 0).unwrap();
            let mut ticket = tx.insert_ticket(new).await.unwrap();
            // Bypasses the orchestrator, as an out-of-band edit would
            ticket.promote(10).unwrap();
            tx.save_ticket(&ticket, TicketStatus::Waiting).await.unwrap();
            ids.push(ticket.id);
        }
        tx.commit().await.unwrap();
        ids
    }

    fn service(store: &InMemoryVisitStore) -> RecoveryService {
        RecoveryService::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_clean_store() {
        let store = InMemoryVisitStore::new();
        seed(&store, "q-1", 1).await;
        seed(&store, "q-2", 0).await;

        let report = service(&store).audit_serving().await.unwrap();
        assert_eq!(report.queues_checked, 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_reports_double_serving_without_fixing_it() {
        let store = InMemoryVisitStore::new();
        let ids = seed(&store, "q-1", 2).await;

        let report = service(&store).audit_serving().await.unwrap();
        assert_eq!(
            report.violations,
            vec![ServingViolation {
                queue_id: "q-1".to_string(),
                serving: ids,
            }]
        );
        assert_eq!(
            store.count_by_status("q-1", TicketStatus::Serving).await.unwrap(),
            2
        );
    }
}
