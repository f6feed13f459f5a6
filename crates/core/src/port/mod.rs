// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod maintenance;
pub mod memory;
pub mod notifier;
pub mod queue_repository;
pub mod ticket_repository;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use id_provider::IdProvider;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use memory::InMemoryVisitStore;
pub use notifier::Notifier;
pub use queue_repository::QueueRepository;
pub use ticket_repository::TicketRepository;
pub use time_provider::TimeProvider;
pub use transaction::{QueueTransaction, Transaction, TransactionalVisitStore};
