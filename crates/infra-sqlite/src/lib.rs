// VisitQ Infrastructure - SQLite Adapter
// Implements: QueueRepository, TicketRepository, TransactionalVisitStore, Maintenance

mod connection;
mod error;
mod maintenance_impl;
mod migration;
mod queue_repository;
mod row;
mod store;
mod ticket_repository;
mod transaction;

pub use connection::{create_pool, database_url};
pub use maintenance_impl::SqliteMaintenance;
pub use migration::{current_version, run_migrations};
pub use store::SqliteVisitStore;
pub use transaction::SqliteQueueTransaction;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
