//! Visit lifecycle against the SQLite store
//!
//! The scenarios patients and staff walk through, end to end through
//! `VisitQueueService`.

mod common;

use common::{doctor, join_request, memory_env, open_queue, MINUTE};
use visitq_core::application::JoinRequest;
use visitq_core::domain::{Actor, Position, QueueStatus, TicketStatus};
use visitq_core::error::AppError;
use visitq_core::port::TicketRepository;

/// T1, T2, T3 join; T1 served and completed; T2 called; T3 cancels
#[tokio::test]
async fn test_three_patient_visit() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let t1 = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    let t2 = svc.join(&Actor::patient("p-2"), join_request(&queue.id, "p-2")).await.unwrap();
    let t3 = svc.join(&Actor::patient("p-3"), join_request(&queue.id, "p-3")).await.unwrap();
    assert!(t1.ticket.id < t2.ticket.id && t2.ticket.id < t3.ticket.id);
    assert_eq!(t3.position, Position::Waiting(3));

    let called = svc.call_next(&doctor(), &queue.id).await.unwrap();
    assert_eq!(called.id, t1.ticket.id);

    let board = svc.queue_board(&doctor(), &queue.id).await.unwrap();
    assert_eq!(board.serving().unwrap().ticket.id, t1.ticket.id);
    let p2 = svc.ticket_view(&Actor::patient("p-2"), t2.ticket.id).await.unwrap();
    let p3 = svc.ticket_view(&Actor::patient("p-3"), t3.ticket.id).await.unwrap();
    assert_eq!(p2.position, Position::Waiting(1));
    assert_eq!(p3.position, Position::Waiting(2));

    env.clock.advance(5 * MINUTE);
    svc.complete(&doctor(), t1.ticket.id).await.unwrap();
    let called = svc.call_next(&doctor(), &queue.id).await.unwrap();
    assert_eq!(called.id, t2.ticket.id);

    let cancelled = svc
        .cancel(&Actor::patient("p-3"), t3.ticket.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TicketStatus::Cancelled);

    let active = env.store.list_active(&queue.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, t2.ticket.id);
    assert_eq!(active[0].status, TicketStatus::Serving);
}

#[tokio::test]
async fn test_positions_strictly_increase_with_id() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;

    for n in 0..6 {
        let patient = format!("p-{}", n);
        env.service
            .join(&Actor::patient(&patient), join_request(&queue.id, &patient))
            .await
            .unwrap();
    }
    env.service.call_next(&doctor(), &queue.id).await.unwrap();

    let board = env.service.queue_board(&doctor(), &queue.id).await.unwrap();
    let ranks: Vec<(i64, u32)> = board
        .tickets
        .iter()
        .filter_map(|v| v.position.rank().map(|r| (v.ticket.id, r)))
        .collect();
    assert_eq!(ranks.len(), 6);
    for pair in ranks.windows(2) {
        assert!(pair[0].0 < pair[1].0);
        assert!(pair[0].1 < pair[1].1);
    }
}

#[tokio::test]
async fn test_complete_and_cancel_are_idempotent() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let a = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    let b = svc.join(&Actor::patient("p-2"), join_request(&queue.id, "p-2")).await.unwrap();

    svc.call_next(&doctor(), &queue.id).await.unwrap();
    env.clock.advance(MINUTE);
    let first = svc.complete(&doctor(), a.ticket.id).await.unwrap();
    env.clock.advance(MINUTE);
    let second = svc.complete(&doctor(), a.ticket.id).await.unwrap();
    assert_eq!(first, second);

    let first = svc.cancel(&Actor::patient("p-2"), b.ticket.id, None).await.unwrap();
    let second = svc.cancel(&Actor::patient("p-2"), b.ticket.id, None).await.unwrap();
    assert_eq!(first, second);

    // The other terminal state is out of reach
    let err = svc
        .cancel(&doctor(), a.ticket.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_cancelled_ticket_is_never_called() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let gone = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    svc.cancel(&Actor::patient("p-1"), gone.ticket.id, None).await.unwrap();
    let stays = svc.join(&Actor::patient("p-2"), join_request(&queue.id, "p-2")).await.unwrap();

    let called = svc.call_next(&doctor(), &queue.id).await.unwrap();
    assert_eq!(called.id, stays.ticket.id);

    svc.complete(&doctor(), called.id).await.unwrap();
    let err = svc.call_next(&doctor(), &queue.id).await.unwrap_err();
    assert!(matches!(err, AppError::QueueEmpty(_)));
}

#[tokio::test]
async fn test_capacity_boundary() {
    let env = memory_env().await;
    let queue = open_queue(&env, 2).await;
    let svc = &env.service;

    let first = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    svc.join(&Actor::patient("p-2"), join_request(&queue.id, "p-2")).await.unwrap();
    svc.call_next(&doctor(), &queue.id).await.unwrap();

    let err = svc
        .join(&Actor::patient("p-3"), join_request(&queue.id, "p-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(_)));

    svc.complete(&doctor(), first.ticket.id).await.unwrap();
    let third = svc
        .join(&Actor::patient("p-3"), join_request(&queue.id, "p-3"))
        .await
        .unwrap();
    assert_eq!(third.position, Position::Waiting(2));
}

#[tokio::test]
async fn test_closed_queue_boundary() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    let closed = svc.close_queue(&doctor(), &queue.id).await.unwrap();
    assert_eq!(closed.status, QueueStatus::Closed);

    let err = svc.call_next(&doctor(), &queue.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let err = svc
        .join(&Actor::patient("p-2"), join_request(&queue.id, "p-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(_)));
}

#[tokio::test]
async fn test_paused_queue_keeps_its_line() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let waiting = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    svc.pause_queue(&doctor(), &queue.id).await.unwrap();

    let err = svc.call_next(&doctor(), &queue.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let err = svc
        .join(&Actor::patient("p-2"), join_request(&queue.id, "p-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let resumed = svc.resume_queue(&doctor(), &queue.id).await.unwrap();
    assert_eq!(resumed.status, QueueStatus::Open);
    assert!(resumed.version > queue.version);
    let called = svc.call_next(&doctor(), &queue.id).await.unwrap();
    assert_eq!(called.id, waiting.ticket.id);
}

#[tokio::test]
async fn test_eta_follows_recent_waits() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    // Each patient waits 10 minutes before being called
    for n in 0..3 {
        let patient = format!("p-{}", n);
        svc.join(&Actor::patient(&patient), join_request(&queue.id, &patient))
            .await
            .unwrap();
        env.clock.advance(10 * MINUTE);
        let next = svc.complete_and_call_next(&doctor(), &queue.id).await.unwrap();
        assert!(next.called.is_some());
    }

    let late = svc
        .join(&Actor::patient("p-late"), join_request(&queue.id, "p-late"))
        .await
        .unwrap();
    // Two completed samples of 10 minutes each; one serving ahead
    assert_eq!(late.position, Position::Waiting(1));
    assert_eq!(late.eta_ms, Some(10 * MINUTE));
}

#[tokio::test]
async fn test_expire_cancels_only_old_waiting_tickets() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let old = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();
    env.clock.advance(90 * MINUTE);
    let fresh = svc.join(&Actor::patient("p-2"), join_request(&queue.id, "p-2")).await.unwrap();

    let expired = svc
        .expire_waiting(&doctor(), &queue.id, 60 * MINUTE)
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, old.ticket.id);
    assert_eq!(expired[0].status, TicketStatus::Cancelled);

    let view = svc.ticket_view(&Actor::patient("p-2"), fresh.ticket.id).await.unwrap();
    assert_eq!(view.position, Position::Waiting(1));
}

#[tokio::test]
async fn test_patient_history_and_permissions() {
    let env = memory_env().await;
    let queue = open_queue(&env, 0).await;
    let svc = &env.service;

    let mine = svc.join(&Actor::patient("p-1"), join_request(&queue.id, "p-1")).await.unwrap();

    let err = svc
        .ticket_view(&Actor::patient("p-2"), mine.ticket.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = svc
        .cancel(&Actor::doctor("doc-2"), mine.ticket.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Admins join on a patient's behalf
    let on_behalf = JoinRequest {
        patient_id: Some("p-1".to_string()),
        ..join_request(&queue.id, "p-1")
    };
    svc.join(&Actor::admin("root"), on_behalf).await.unwrap();

    let history = svc.patient_tickets(&Actor::patient("p-1"), None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].ticket.id > history[1].ticket.id);
}
