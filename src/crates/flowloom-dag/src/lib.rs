//! DAG task scheduler with deadlock detection and bounded retry (C6),
//! plus the task-loop combinator (C7) that drives it to completion.
//!
//! Consumes [`flowloom_core::Subagent`] for actual task execution; this
//! crate only owns scheduling, dependency resolution, and retry/deadlock
//! bookkeeping.

pub mod deadlock;
pub mod scheduler;
pub mod task;
pub mod task_loop;

pub use deadlock::{Deadlock, Validated};
pub use scheduler::{DagScheduler, DagSchedulerConfig, DispatchReport};
pub use task::{FeatureListItem, Task, TaskStatus};
pub use task_loop::{StopReason, TaskLoop, TaskLoopConfig, TaskLoopOutcome};
