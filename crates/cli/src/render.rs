//! Response shapes and table rendering

use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use serde::Deserialize;
use tabled::{Table, Tabled};

#[derive(Debug, Deserialize)]
pub struct Owner {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Queue {
    pub id: String,
    pub owner: Owner,
    pub name: String,
    pub status: String,
    pub max_number: u32,
}

#[derive(Debug, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub queue_id: String,
    pub patient_id: String,
    pub status: String,
    pub issued_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct Position {
    pub kind: String,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub position: Position,
    pub eta_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueBoard {
    pub queue: Queue,
    pub average_service_ms: i64,
    pub tickets: Vec<TicketView>,
}

#[derive(Tabled)]
struct QueueRow {
    id: String,
    name: String,
    owner: String,
    status: String,
    capacity: String,
}

#[derive(Tabled)]
struct TicketRow {
    ticket: i64,
    queue: String,
    patient: String,
    status: String,
    position: String,
    eta: String,
    issued: String,
}

pub fn status_colored(status: &str) -> ColoredString {
    match status {
        "OPEN" | "SERVING" => status.green(),
        "PAUSED" | "WAITING" => status.yellow(),
        "CLOSED" | "CANCELLED" => status.red(),
        _ => status.normal(),
    }
}

pub fn format_position(position: &Position) -> String {
    match (position.kind.as_str(), position.rank) {
        ("SERVING", _) => "now serving".to_string(),
        ("WAITING", Some(rank)) => format!("#{}", rank),
        _ => "-".to_string(),
    }
}

pub fn format_eta(eta_ms: Option<i64>) -> String {
    match eta_ms {
        None => "-".to_string(),
        Some(0) => "now".to_string(),
        Some(ms) => {
            let mins = (ms + 59_999) / 60_000;
            if mins >= 60 {
                format!("~{}h{:02}m", mins / 60, mins % 60)
            } else {
                format!("~{}m", mins)
            }
        }
    }
}

fn format_time(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

pub fn queue_table(queues: &[Queue]) -> String {
    let rows = queues.iter().map(|q| QueueRow {
        id: q.id.clone(),
        name: q.name.clone(),
        owner: format!("{}:{}", q.owner.kind.to_lowercase(), q.owner.id),
        status: q.status.clone(),
        capacity: if q.max_number == 0 {
            "unbounded".to_string()
        } else {
            q.max_number.to_string()
        },
    });
    Table::new(rows).to_string()
}

pub fn ticket_table(views: &[TicketView]) -> String {
    let rows = views.iter().map(|v| TicketRow {
        ticket: v.ticket.id,
        queue: v.ticket.queue_id.clone(),
        patient: v.ticket.patient_id.clone(),
        status: v.ticket.status.clone(),
        position: format_position(&v.position),
        eta: format_eta(v.eta_ms),
        issued: format_time(v.ticket.issued_at),
    });
    Table::new(rows).to_string()
}
