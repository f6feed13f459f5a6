// Application Layer - Use Cases and Business Logic

pub mod call_next;
pub mod locks;
pub mod maintenance;
pub mod queue_lifecycle;
pub mod recovery;
pub mod retry;
pub mod service;
pub mod shutdown;
pub mod ticket_lifecycle;

// Re-exports
pub use call_next::{CallNextOrchestrator, NextPatient};
pub use locks::QueueLocks;
pub use maintenance::MaintenanceScheduler;
pub use queue_lifecycle::{CreateQueueRequest, QueueLifecycle, QueueTransitioned};
pub use recovery::{RecoveryReport, RecoveryService};
pub use retry::ConflictRetryPolicy;
pub use service::{QueueBoard, TicketView, VisitQueueService};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use ticket_lifecycle::{JoinRequest, TicketChange, TicketLifecycle};
