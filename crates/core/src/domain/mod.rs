// Domain Layer - Pure business logic and entities

pub mod actor;
pub mod error;
pub mod event;
pub mod position;
pub mod queue;
pub mod ticket;

// Re-exports
pub use actor::{Actor, Role};
pub use error::DomainError;
pub use event::VisitEvent;
pub use position::{EtaConfig, Position, TicketPosition};
pub use queue::{OwnerKind, Queue, QueueId, QueueOwner, QueueStatus};
pub use ticket::{NewTicket, Ticket, TicketId, TicketStatus, Transition};
