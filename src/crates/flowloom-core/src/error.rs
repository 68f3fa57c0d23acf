//! Error types for graph construction and execution.
//!
//! Mirrors the taxonomy in the design notes: build-time failures
//! (`InvalidGraph`) are distinct from run-time ones (`NodeExecution`,
//! `Checkpoint`, `Cancelled`, `Timeout`), and scheduler-level failures never
//! unwind past `Scheduler::run` — they become a failed [`ExecutionSnapshot`]
//! instead (see [`crate::scheduler`]).

use crate::state::StateError;
use flowloom_checkpoint::CheckpointError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// All errors surfaced by this crate.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph as built violates a builder invariant (unreachable `then`
    /// target, unclosed `if`, duplicate node id). Raised only from
    /// `GraphBuilder::compile`, never from `Scheduler::run`.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A node's `execute` returned an error and the retry budget (if any)
    /// was exhausted.
    #[error("node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A `goto` or edge referenced a node id absent from the compiled graph.
    #[error("unknown node id: {0}")]
    UnknownNode(String),

    /// State merge failed under the active reducer for some field.
    #[error(transparent)]
    State(#[from] StateError),

    /// Checkpoint save/load failure. Save failures are recorded as a
    /// warning signal by the scheduler and do not abort the run; load
    /// failures on `resume` surface as this variant.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The run's cancellation token was observed at a node boundary.
    #[error("execution cancelled")]
    Cancelled,

    /// The run's overall timeout elapsed.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(std::time::Duration),
}

impl GraphError {
    /// Whether this error represents a cooperative stop rather than a
    /// failure — used by the scheduler to pick the terminal status
    /// (`cancelled` vs `failed`).
    pub fn is_cooperative_stop(&self) -> bool {
        matches!(self, GraphError::Cancelled | GraphError::ExecutionTimeout(_))
    }
}
