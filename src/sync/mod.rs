//! Reconciliation between the local store and the router.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod push;
pub mod queue;
pub mod scheduler;

pub use dispatcher::ChangeDispatcher;
pub use engine::{Pass, PassSummary, ReconciliationEngine, RunReport};
pub use error::SyncError;
pub use push::{PushExecutor, PushOutcome, SyncSummary, TaskStatus};
pub use queue::{PushQueue, PushWorkerPool};
pub use scheduler::Scheduler;
