//! Shared wiring for the SQLite-backed tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use visitq_core::application::{CreateQueueRequest, JoinRequest, VisitQueueService};
use visitq_core::domain::{Actor, Queue, QueueOwner};
use visitq_core::port::id_provider::UuidProvider;
use visitq_core::port::notifier::NoopNotifier;
use visitq_core::port::time_provider::ManualTimeProvider;
use visitq_infra_sqlite::{create_pool, database_url, run_migrations, SqliteVisitStore};

pub const START: i64 = 1_700_000_000_000;
pub const MINUTE: i64 = 60_000;

pub struct Env {
    pub service: Arc<VisitQueueService>,
    pub store: SqliteVisitStore,
    pub clock: Arc<ManualTimeProvider>,
}

pub fn doctor() -> Actor {
    Actor::doctor("doc-1")
}

fn wire(store: SqliteVisitStore, clock: Arc<ManualTimeProvider>) -> Env {
    let service = VisitQueueService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(NoopNotifier),
        Arc::new(UuidProvider),
        clock.clone(),
    );
    Env {
        service: Arc::new(service),
        store,
        clock,
    }
}

/// Single-connection in-memory database
pub async fn memory_env() -> Env {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    wire(
        SqliteVisitStore::new(pool),
        Arc::new(ManualTimeProvider::new(START)),
    )
}

/// File database with a multi-connection pool; each call is an independent
/// service (own locks), as separate daemon processes would be
pub async fn file_env(dir: &Path) -> Env {
    let pool = create_pool(&database_url(&dir.join("visitq.db")))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    wire(
        SqliteVisitStore::new(pool),
        Arc::new(ManualTimeProvider::new(START)),
    )
}

pub async fn open_queue(env: &Env, max_number: u32) -> Queue {
    env.service
        .create_queue(
            &doctor(),
            CreateQueueRequest {
                name: "General practice".to_string(),
                owner: QueueOwner::doctor("doc-1"),
                max_number,
            },
        )
        .await
        .unwrap()
}

pub fn join_request(queue_id: &str, patient: &str) -> JoinRequest {
    JoinRequest {
        queue_id: queue_id.to_string(),
        notification_contact: format!("{}@example.com", patient),
        patient_id: None,
    }
}
