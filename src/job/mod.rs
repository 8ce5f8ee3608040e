//! The expiration job: discovery, per-item execution and the local host
//! scheduler that drives them.

pub mod discovery;
pub mod executor;
pub mod item;
pub mod orchestrator;
pub mod phase;
pub mod scheduler;
pub mod task;

pub use item::{CancelItem, JobItem, StartItem, WorkItem};
pub use orchestrator::ExpirationJob;
pub use scheduler::JobScheduler;
pub use task::{JobOutcome, Task, TaskResult, TaskState};
