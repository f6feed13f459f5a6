//! Position/ETA Calculator
//!
//! Pure derivation of a ticket's rank and estimated wait from a snapshot of
//! its queue's tickets. Never persisted: every consumer (patient detail,
//! staff board, listings) re-derives it from stored rows, so the numbers
//! cannot drift between views.
//!
//! Ranking rule: the serving ticket holds rank 0 and every waiting ticket
//! ranks `1 + (waiting tickets with a smaller id)`. Ticket ids are the FIFO
//! key; timestamps are never consulted for ordering.

use crate::domain::ticket::{Ticket, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};

/// Derived rank of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rank", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    /// Currently being served (sentinel rank 0)
    Serving,
    /// 1-based rank among active tickets
    Waiting(u32),
    /// Completed or cancelled; no rank
    Finished,
    /// Ticket absent from the supplied snapshot
    Unknown,
}

impl Position {
    /// Numeric rank; `Some(0)` while serving, `None` without a rank
    pub fn rank(&self) -> Option<u32> {
        match self {
            Position::Serving => Some(0),
            Position::Waiting(rank) => Some(*rank),
            Position::Finished | Position::Unknown => None,
        }
    }
}

/// Display values for one ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPosition {
    pub ticket_id: TicketId,
    pub status: Option<TicketStatus>,
    pub position: Position,
    /// Estimated wait in milliseconds (`None` for terminal/unknown tickets)
    pub eta_ms: Option<i64>,
}

/// Parameters of the service-duration average
#[derive(Debug, Clone, PartialEq)]
pub struct EtaConfig {
    /// Used when a queue has no served history yet
    pub fallback_service_ms: i64,
    /// Number of most recent completed tickets considered
    pub history_window: usize,
    /// Weight multiplier per step back in history (0 < decay <= 1)
    pub decay: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            fallback_service_ms: 5 * 60 * 1000,
            history_window: 20,
            decay: 0.8,
        }
    }
}

/// Compute position and ETA of `target` within `snapshot`
///
/// `snapshot` must hold the tickets of a single queue; order does not matter.
pub fn calculate(snapshot: &[Ticket], target: TicketId, average_service_ms: i64) -> TicketPosition {
    let Some(ticket) = snapshot.iter().find(|t| t.id == target) else {
        return TicketPosition {
            ticket_id: target,
            status: None,
            position: Position::Unknown,
            eta_ms: None,
        };
    };

    let position = match ticket.status {
        TicketStatus::Serving => Position::Serving,
        TicketStatus::Waiting => {
            let ahead = snapshot
                .iter()
                .filter(|t| t.status == TicketStatus::Waiting && t.id < ticket.id)
                .count();
            Position::Waiting(u32::try_from(ahead).unwrap_or(u32::MAX).saturating_add(1))
        }
        TicketStatus::Completed | TicketStatus::Cancelled => Position::Finished,
    };

    TicketPosition {
        ticket_id: target,
        status: Some(ticket.status),
        position,
        eta_ms: eta_for(position, average_service_ms),
    }
}

/// Positions of every active ticket in FIFO order (staff board)
pub fn queue_positions(snapshot: &[Ticket], average_service_ms: i64) -> Vec<TicketPosition> {
    let mut active: Vec<&Ticket> = snapshot.iter().filter(|t| t.status.is_active()).collect();
    active.sort_by_key(|t| t.id);

    let mut next_rank = 1u32;
    active
        .into_iter()
        .map(|ticket| {
            let position = if ticket.status == TicketStatus::Serving {
                Position::Serving
            } else {
                let rank = next_rank;
                next_rank = next_rank.saturating_add(1);
                Position::Waiting(rank)
            };
            TicketPosition {
                ticket_id: ticket.id,
                status: Some(ticket.status),
                position,
                eta_ms: eta_for(position, average_service_ms),
            }
        })
        .collect()
}

/// Recency-weighted average of `served_at - issued_at` over recently
/// completed tickets, falling back to `config.fallback_service_ms`
pub fn average_service_duration(history: &[Ticket], config: &EtaConfig) -> i64 {
    let mut samples: Vec<(i64, TicketId, i64)> = history
        .iter()
        .filter(|t| t.status == TicketStatus::Completed)
        .filter_map(|t| {
            let served = t.served_at?;
            Some((served, t.id, t.wait_duration_ms()?))
        })
        .collect();

    if samples.is_empty() || config.history_window == 0 {
        return config.fallback_service_ms;
    }

    // Most recent first; ids break ties between equal timestamps
    samples.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    samples.truncate(config.history_window);

    let decay = if config.decay > 0.0 && config.decay <= 1.0 {
        config.decay
    } else {
        1.0
    };

    let mut weight = 1.0;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (_, _, duration) in samples {
        weighted_sum += duration as f64 * weight;
        weight_total += weight;
        weight *= decay;
    }

    (weighted_sum / weight_total).round() as i64
}

fn eta_for(position: Position, average_service_ms: i64) -> Option<i64> {
    match position {
        Position::Serving => Some(0),
        Position::Waiting(rank) => Some(i64::from(rank).saturating_mul(average_service_ms.max(0))),
        Position::Finished | Position::Unknown => None,
    }
}
