// Notification Dispatcher Port
//
// Delivery (SMS/email/push) lives outside the engine. Events are handed over
// after the transition committed; a failed hand-over is logged, never
// rolled back.

use crate::domain::VisitEvent;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand an event to the dispatcher
    async fn notify(&self, event: &VisitEvent) -> Result<()>;
}

/// Drops every event
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &VisitEvent) -> Result<()> {
        Ok(())
    }
}

/// Emits each event as a structured log line
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &VisitEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(
            event = event.name(),
            queue_id = %event.queue_id(),
            payload = %payload,
            "Visit event"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers (e.g. a delivery worker)
pub struct BroadcastNotifier {
    tx: broadcast::Sender<VisitEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisitEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &VisitEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| AppError::Internal("No notification subscribers".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn called() -> VisitEvent {
        VisitEvent::TicketCalled {
            queue_id: "q-1".to_string(),
            ticket_id: 7,
            notification_contact: "+15550100".to_string(),
            served_at: 1000,
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.notify(&called()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), called());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_reports_error() {
        let notifier = BroadcastNotifier::new(8);
        assert!(notifier.notify(&called()).await.is_err());
    }

    #[tokio::test]
    async fn test_tracing_notifier_serializes_event() {
        assert!(TracingNotifier.notify(&called()).await.is_ok());
    }
}
