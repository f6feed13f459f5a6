//! RPC Method Handlers
//!
//! Thin adapters from RPC parameters onto `VisitQueueService`; all rules
//! live in the core.

use crate::error::to_rpc_error;
use crate::types::{
    CallNextParams, CallNextResponse, CancelParams, CapacityParams, CreateQueueParams,
    ExpireParams, ExpireResponse, JoinParams, ListQueuesParams, MaintenanceParams,
    MaintenanceResponse, PatientTicketsParams, QueueParams, StatsParams, StatsResponse,
    TicketParams,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use visitq_core::application::{
    CreateQueueRequest, JoinRequest, QueueBoard, TicketView, VisitQueueService,
};
use visitq_core::domain::{Actor, Queue, Ticket};
use visitq_core::error::AppError;
use visitq_core::port::{Maintenance, MaintenanceConfig};

type RpcResult<T> = Result<T, ErrorObjectOwned>;

fn require_admin(actor: &Actor) -> RpcResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(to_rpc_error(AppError::Forbidden(format!(
            "{} is not an admin",
            actor.id
        ))))
    }
}

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<VisitQueueService>,
    maintenance: Arc<dyn Maintenance>,
    maintenance_config: MaintenanceConfig,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        service: Arc<VisitQueueService>,
        maintenance: Arc<dyn Maintenance>,
        maintenance_config: MaintenanceConfig,
    ) -> Self {
        Self {
            service,
            maintenance,
            maintenance_config,
            start_time: Instant::now(),
        }
    }

    // === queue.* ===

    /// queue.create.v1
    pub async fn create_queue(&self, params: CreateQueueParams) -> RpcResult<Queue> {
        let req = CreateQueueRequest {
            name: params.name,
            owner: params.owner,
            max_number: params.max_number,
        };
        self.service
            .create_queue(&params.actor, req)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.pause.v1
    pub async fn pause_queue(&self, params: QueueParams) -> RpcResult<Queue> {
        self.service
            .pause_queue(&params.actor, &params.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.resume.v1
    pub async fn resume_queue(&self, params: QueueParams) -> RpcResult<Queue> {
        self.service
            .resume_queue(&params.actor, &params.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.close.v1
    pub async fn close_queue(&self, params: QueueParams) -> RpcResult<Queue> {
        self.service
            .close_queue(&params.actor, &params.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.capacity.v1
    pub async fn set_capacity(&self, params: CapacityParams) -> RpcResult<Queue> {
        self.service
            .set_capacity(&params.actor, &params.queue_id, params.max_number)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.get.v1
    pub async fn get_queue(&self, params: QueueParams) -> RpcResult<Queue> {
        self.service
            .get_queue(&params.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.list.v1
    pub async fn list_queues(&self, params: ListQueuesParams) -> RpcResult<Vec<Queue>> {
        self.service
            .list_queues(params.owner.as_ref())
            .await
            .map_err(to_rpc_error)
    }

    /// queue.call_next.v1
    pub async fn call_next(&self, params: CallNextParams) -> RpcResult<CallNextResponse> {
        if !params.complete_current {
            let called = self
                .service
                .call_next(&params.actor, &params.queue_id)
                .await
                .map_err(to_rpc_error)?;
            return Ok(CallNextResponse {
                completed: None,
                called: Some(called),
            });
        }

        let next = self
            .service
            .complete_and_call_next(&params.actor, &params.queue_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(CallNextResponse {
            completed: next.completed.map(|change| change.ticket),
            called: next.called,
        })
    }

    /// queue.expire.v1
    pub async fn expire(&self, params: ExpireParams) -> RpcResult<ExpireResponse> {
        let expired = self
            .service
            .expire_waiting(&params.actor, &params.queue_id, params.older_than_ms)
            .await
            .map_err(to_rpc_error)?;
        Ok(ExpireResponse { expired })
    }

    // === ticket.* ===

    /// ticket.join.v1
    pub async fn join(&self, params: JoinParams) -> RpcResult<TicketView> {
        let req = JoinRequest {
            queue_id: params.queue_id,
            notification_contact: params.notification_contact,
            patient_id: params.patient_id,
        };
        self.service
            .join(&params.actor, req)
            .await
            .map_err(to_rpc_error)
    }

    /// ticket.cancel.v1
    pub async fn cancel(&self, params: CancelParams) -> RpcResult<Ticket> {
        self.service
            .cancel(&params.actor, params.ticket_id, params.expected_status)
            .await
            .map_err(to_rpc_error)
    }

    /// ticket.complete.v1
    pub async fn complete(&self, params: TicketParams) -> RpcResult<Ticket> {
        self.service
            .complete(&params.actor, params.ticket_id)
            .await
            .map_err(to_rpc_error)
    }

    /// ticket.get.v1
    pub async fn ticket(&self, params: TicketParams) -> RpcResult<TicketView> {
        self.service
            .ticket_view(&params.actor, params.ticket_id)
            .await
            .map_err(to_rpc_error)
    }

    /// ticket.list.v1
    pub async fn queue_board(&self, params: QueueParams) -> RpcResult<QueueBoard> {
        self.service
            .queue_board(&params.actor, &params.queue_id)
            .await
            .map_err(to_rpc_error)
    }

    /// ticket.mine.v1
    pub async fn patient_tickets(
        &self,
        params: PatientTicketsParams,
    ) -> RpcResult<Vec<TicketView>> {
        self.service
            .patient_tickets(&params.actor, params.patient_id.as_deref())
            .await
            .map_err(to_rpc_error)
    }

    // === admin.* ===

    /// admin.stats.v1
    pub async fn stats(&self, params: StatsParams) -> RpcResult<StatsResponse> {
        require_admin(&params.actor)?;
        let stats = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            queue_count: stats.queue_count,
            ticket_count: stats.ticket_count,
            finished_ticket_count: stats.finished_ticket_count,
            db_size_bytes: stats.db_size_bytes,
            fragmentation_percent: stats.fragmentation_percent,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(&self, params: MaintenanceParams) -> RpcResult<MaintenanceResponse> {
        require_admin(&params.actor)?;
        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        let tickets_deleted = self
            .maintenance
            .gc_finished_tickets(self.maintenance_config.finished_ticket_retention_days)
            .await
            .map_err(to_rpc_error)?;

        // Run VACUUM if forced or needed
        let vacuum_run = params.force_vacuum
            || stats_before.fragmentation_percent > 10.0
            || stats_before.db_size_mb > self.maintenance_config.max_db_size_mb;
        if vacuum_run {
            self.maintenance.vacuum().await.map_err(to_rpc_error)?;
        }

        let stats_after = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        info!(
            admin = %params.actor.id,
            tickets_deleted = tickets_deleted,
            vacuum_run = vacuum_run,
            "Manual maintenance completed"
        );

        Ok(MaintenanceResponse {
            vacuum_run,
            tickets_deleted,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: stats_after.db_size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use async_trait::async_trait;
    use visitq_core::domain::{Position, QueueOwner, TicketStatus};
    use visitq_core::error::Result;
    use visitq_core::port::id_provider::SequentialIdProvider;
    use visitq_core::port::notifier::NoopNotifier;
    use visitq_core::port::time_provider::ManualTimeProvider;
    use visitq_core::port::{InMemoryVisitStore, MaintenanceStats};

    struct FixedMaintenance;

    #[async_trait]
    impl Maintenance for FixedMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            Ok(0.0)
        }

        async fn gc_finished_tickets(&self, _retention_days: i64) -> Result<i64> {
            Ok(3)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats {
                db_size_mb: 1.0,
                db_size_bytes: 1024 * 1024,
                queue_count: 2,
                ticket_count: 5,
                finished_ticket_count: 3,
                fragmentation_percent: 0.0,
            })
        }
    }

    fn handler() -> RpcHandler {
        let store = InMemoryVisitStore::new();
        let service = VisitQueueService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(NoopNotifier),
            Arc::new(SequentialIdProvider::new("q")),
            Arc::new(ManualTimeProvider::new(1_000)),
        );
        RpcHandler::new(
            Arc::new(service),
            Arc::new(FixedMaintenance),
            MaintenanceConfig::default(),
        )
    }

    async fn open_queue(handler: &RpcHandler) -> Queue {
        handler
            .create_queue(CreateQueueParams {
                actor: Actor::doctor("doc-1"),
                name: "GP".to_string(),
                owner: QueueOwner::doctor("doc-1"),
                max_number: 0,
            })
            .await
            .unwrap()
    }

    async fn join(handler: &RpcHandler, queue_id: &str, patient: &str) -> TicketView {
        handler
            .join(JoinParams {
                actor: Actor::patient(patient),
                queue_id: queue_id.to_string(),
                notification_contact: format!("{}@example.com", patient),
                patient_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_visit_flow() {
        let handler = handler();
        let queue = open_queue(&handler).await;
        let first = join(&handler, &queue.id, "p-1").await;
        let second = join(&handler, &queue.id, "p-2").await;
        assert_eq!(second.position, Position::Waiting(2));

        let doctor = Actor::doctor("doc-1");
        let called = handler
            .call_next(CallNextParams {
                actor: doctor.clone(),
                queue_id: queue.id.clone(),
                complete_current: false,
            })
            .await
            .unwrap();
        assert!(called.completed.is_none());
        assert_eq!(called.called.unwrap().id, first.ticket.id);

        let next = handler
            .call_next(CallNextParams {
                actor: doctor,
                queue_id: queue.id.clone(),
                complete_current: true,
            })
            .await
            .unwrap();
        assert_eq!(next.completed.unwrap().status, TicketStatus::Completed);
        assert_eq!(next.called.unwrap().id, second.ticket.id);

        let view = handler
            .ticket(TicketParams {
                actor: Actor::patient("p-2"),
                ticket_id: second.ticket.id,
            })
            .await
            .unwrap();
        assert_eq!(view.position, Position::Serving);
    }

    #[tokio::test]
    async fn test_errors_carry_kind_codes() {
        let handler = handler();
        let queue = open_queue(&handler).await;

        let empty = handler
            .call_next(CallNextParams {
                actor: Actor::doctor("doc-1"),
                queue_id: queue.id.clone(),
                complete_current: false,
            })
            .await
            .unwrap_err();
        assert_eq!(empty.code(), code::QUEUE_EMPTY);

        let stranger = handler
            .pause_queue(QueueParams {
                actor: Actor::doctor("doc-2"),
                queue_id: queue.id.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(stranger.code(), code::FORBIDDEN);

        let missing = handler
            .get_queue(QueueParams {
                actor: Actor::patient("p-1"),
                queue_id: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_with_expected_status() {
        let handler = handler();
        let queue = open_queue(&handler).await;
        let view = join(&handler, &queue.id, "p-1").await;

        let stale = handler
            .cancel(CancelParams {
                actor: Actor::patient("p-1"),
                ticket_id: view.ticket.id,
                expected_status: Some(TicketStatus::Serving),
            })
            .await
            .unwrap_err();
        assert_eq!(stale.code(), code::CONFLICT);

        let cancelled = handler
            .cancel(CancelParams {
                actor: Actor::patient("p-1"),
                ticket_id: view.ticket.id,
                expected_status: Some(TicketStatus::Waiting),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_admin_methods_require_admin() {
        let handler = handler();

        let denied = handler
            .stats(StatsParams {
                actor: Actor::clinic("c-1"),
            })
            .await
            .unwrap_err();
        assert_eq!(denied.code(), code::FORBIDDEN);

        let stats = handler
            .stats(StatsParams {
                actor: Actor::admin("root"),
            })
            .await
            .unwrap();
        assert_eq!(stats.ticket_count, 5);

        let report = handler
            .maintenance(MaintenanceParams {
                actor: Actor::admin("root"),
                force_vacuum: true,
            })
            .await
            .unwrap();
        assert!(report.vacuum_run);
        assert_eq!(report.tickets_deleted, 3);
    }
}
