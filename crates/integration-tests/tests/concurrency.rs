//! Concurrency against a file-backed SQLite database
//!
//! Several independent services (own locks, own pools) share one database
//! file, so only the store's transaction and the serving index keep them
//! apart.

mod common;

use common::{doctor, file_env, join_request, open_queue, Env};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use visitq_core::application::VisitQueueService;
use visitq_core::domain::{Actor, TicketStatus};
use visitq_core::error::AppError;
use visitq_core::port::TicketRepository;

const SERVICES: usize = 4;

async fn services(dir: &std::path::Path) -> (Env, Vec<Arc<VisitQueueService>>) {
    let first = file_env(dir).await;
    let mut all = vec![first.service.clone()];
    for _ in 1..SERVICES {
        all.push(file_env(dir).await.service);
    }
    (first, all)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_call_next_serves_one() {
    let dir = tempfile::tempdir().unwrap();
    let (env, services) = services(dir.path()).await;
    let queue = open_queue(&env, 0).await;

    let mut waiting = Vec::new();
    for n in 0..5 {
        let patient = format!("p-{}", n);
        let view = env
            .service
            .join(&Actor::patient(&patient), join_request(&queue.id, &patient))
            .await
            .unwrap();
        waiting.push(view.ticket.id);
    }

    let mut set = JoinSet::new();
    for caller in 0..16 {
        let service = services[caller % SERVICES].clone();
        let queue_id = queue.id.clone();
        set.spawn(async move { service.call_next(&doctor(), &queue_id).await });
    }

    let mut promoted = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(ticket) => promoted.push(ticket.id),
            Err(e) => assert!(matches!(e, AppError::AlreadyServing(_)), "{e}"),
        }
    }

    assert_eq!(promoted, vec![waiting[0]]);
    assert_eq!(
        env.store
            .count_by_status(&queue.id, TicketStatus::Serving)
            .await
            .unwrap(),
        1
    );
}

/// One waiting ticket, two callers: exactly one promotion
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_callers_one_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let (env, services) = services(dir.path()).await;
    let queue = open_queue(&env, 0).await;
    let only = env
        .service
        .join(&Actor::patient("p-1"), join_request(&queue.id, "p-1"))
        .await
        .unwrap();

    let staff = doctor();
    let (a, b) = tokio::join!(
        services[0].call_next(&staff, &queue.id),
        services[1].call_next(&staff, &queue.id),
    );

    let outcomes = [a, b];
    let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, only.ticket.id);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(
        matches!(
            loser,
            AppError::AlreadyServing(_) | AppError::QueueEmpty(_) | AppError::Conflict(_)
        ),
        "{loser}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_joins_respect_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let (env, services) = services(dir.path()).await;
    let queue = open_queue(&env, 5).await;

    let mut set = JoinSet::new();
    for n in 0..12 {
        let service = services[n % SERVICES].clone();
        let queue_id = queue.id.clone();
        set.spawn(async move {
            let patient = format!("p-{}", n);
            service
                .join(&Actor::patient(&patient), join_request(&queue_id, &patient))
                .await
        });
    }

    let mut admitted = HashSet::new();
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(view) => assert!(admitted.insert(view.ticket.id)),
            Err(e) => assert!(matches!(e, AppError::CapacityExceeded(_)), "{e}"),
        }
    }

    assert_eq!(admitted.len(), 5);
    assert_eq!(env.store.list_active(&queue.id).await.unwrap().len(), 5);
}

/// SQLite serializes writers across queues; every join still commits
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_to_different_queues_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (env, services) = services(dir.path()).await;
    let queues = [open_queue(&env, 0).await, open_queue(&env, 0).await];

    let mut set = JoinSet::new();
    for n in 0..16 {
        let service = services[n % SERVICES].clone();
        let queue_id = queues[n % 2].id.clone();
        set.spawn(async move {
            let patient = format!("p-{}", n);
            service
                .join(&Actor::patient(&patient), join_request(&queue_id, &patient))
                .await
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.unwrap().unwrap();
    }

    for queue in &queues {
        assert_eq!(env.store.list_active(&queue.id).await.unwrap().len(), 8);
    }
}

/// Patients cancelling while staff keep calling never leave two SERVING
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_races_call_next() {
    let dir = tempfile::tempdir().unwrap();
    let (env, services) = services(dir.path()).await;
    let queue = open_queue(&env, 0).await;

    let mut tickets = Vec::new();
    for n in 0..8 {
        let patient = format!("p-{}", n);
        let view = env
            .service
            .join(&Actor::patient(&patient), join_request(&queue.id, &patient))
            .await
            .unwrap();
        tickets.push((patient, view.ticket.id));
    }

    let mut set = JoinSet::new();
    for (n, (patient, ticket_id)) in tickets.iter().cloned().enumerate() {
        let service = services[n % SERVICES].clone();
        set.spawn(async move {
            service
                .cancel(&Actor::patient(&patient), ticket_id, None)
                .await
                .map(|_| ())
        });
    }
    for caller in 0..8 {
        let service = services[caller % SERVICES].clone();
        let queue_id = queue.id.clone();
        set.spawn(async move {
            service
                .complete_and_call_next(&doctor(), &queue_id)
                .await
                .map(|_| ())
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined.unwrap() {
            // Losing a race is fine; breaking an invariant is not
            assert!(
                matches!(
                    e,
                    AppError::Conflict(_)
                        | AppError::AlreadyServing(_)
                        | AppError::InvalidTransition(_)
                ),
                "{e}"
            );
        }
    }

    let serving = env
        .store
        .count_by_status(&queue.id, TicketStatus::Serving)
        .await
        .unwrap();
    assert!(serving <= 1);
}
