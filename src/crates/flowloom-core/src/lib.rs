//! Workflow execution engine: typed state container, graph
//! compiler/runner, retry policy, and the `Subagent` boundary consumed by
//! orchestrator-kind nodes.
//!
//! See `flowloom-dag` for the DAG task scheduler and task-loop
//! combinator, and `flowloom-telemetry` for the progress-event pipeline.

pub mod builder;
pub mod error;
pub mod graph;
pub mod ids;
pub mod node;
pub mod retry;
pub mod scheduler;
pub mod signal;
pub mod snapshot;
pub mod state;
pub mod subagent;

pub use builder::GraphBuilder;
pub use error::{GraphError, Result};
pub use graph::CompiledGraph;
pub use ids::{generate_execution_id, generate_session_id};
pub use node::{FnNode, Goto, Node, NodeContext, NodeKind, NodeOutcome};
pub use retry::RetryConfig;
pub use scheduler::{CancellationToken, ProgressEvent, ProgressSink, RunOptions, RunOutcome, Scheduler};
pub use signal::{DebugReport, Signal, SignalKind};
pub use snapshot::{ExecutionSnapshot, ExecutionStatus};
pub use state::{AppendReducer, MergeReducer, OverwriteReducer, Reducer, State, StateSchema, StateUpdate};
pub use subagent::{AgentResult, AgentTask, Subagent};
