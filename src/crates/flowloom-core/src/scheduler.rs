//! The scheduler (runner): walks a [`CompiledGraph`], invoking nodes,
//! applying state deltas, handling retries, emitting progress events, and
//! consulting the checkpointer. See spec §4.4 for the full algorithm.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flowloom_checkpoint::CheckpointSaver;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::CompiledGraph;
use crate::node::{Goto, NodeContext, NodeExecResult};
use crate::signal::Signal;
use crate::snapshot::{ExecutionSnapshot, ExecutionStatus};
use crate::state::{State, StateSchema, StateUpdate};

/// A cooperative stop point checked at every node boundary and before
/// every retry backoff sleep.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observes runner progress events. Telemetry and plain `tracing` logging
/// both hang off this boundary; neither is required for correctness.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    NodeStarted { execution_id: String, node_id: String },
    NodeRetried { execution_id: String, node_id: String, attempt: u32 },
    NodeFailed { execution_id: String, node_id: String, error: String },
    NodeCompleted { execution_id: String, node_id: String, duration: Duration },
    CheckpointSaved { execution_id: String, label: String },
    ExecutionStarted { execution_id: String },
    ExecutionCompleted { execution_id: String, status: ExecutionStatus },
}

#[derive(Clone, Default)]
pub struct RunOptions {
    pub auto_checkpoint: bool,
    pub timeout: Option<Duration>,
    pub cancellation_token: Option<CancellationToken>,
    pub config: Value,
}

pub struct RunOutcome {
    pub final_state: State,
    pub snapshot: ExecutionSnapshot,
}

pub struct Scheduler {
    checkpointer: Arc<dyn CheckpointSaver>,
    schema: StateSchema,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Scheduler {
    pub fn new(checkpointer: Arc<dyn CheckpointSaver>) -> Self {
        Self {
            checkpointer,
            schema: StateSchema::new(),
            sink: None,
        }
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.sink {
            sink.on_event(&event);
        }
    }

    /// Starts a fresh execution from `initial_state` at `graph.start_node_id`.
    pub async fn run(&self, graph: &CompiledGraph, initial_state: State, options: RunOptions) -> Result<RunOutcome> {
        let execution_id = initial_state.execution_id.clone();
        let mut snapshot = ExecutionSnapshot::fresh(execution_id, &graph.start_node_id);
        snapshot.state = initial_state;
        self.drive(graph, snapshot, options).await
    }

    /// Loads the persisted snapshot for `execution_id` and continues from
    /// its `current_node_id`. Fails if no snapshot exists.
    pub async fn resume(&self, graph: &CompiledGraph, execution_id: &str, options: RunOptions) -> Result<RunOutcome> {
        let payload = self
            .checkpointer
            .load(execution_id, None)
            .await
            .map_err(GraphError::Checkpoint)?;
        let payload = payload.ok_or_else(|| {
            GraphError::Checkpoint(flowloom_checkpoint::CheckpointError::NotFound {
                execution_id: execution_id.to_string(),
                label: flowloom_checkpoint::LATEST_LABEL.to_string(),
            })
        })?;
        let snapshot: ExecutionSnapshot =
            serde_json::from_value(payload).map_err(|e| GraphError::State(crate::state::StateError::InvalidState(e.to_string())))?;
        self.drive(graph, snapshot, options).await
    }

    async fn drive(&self, graph: &CompiledGraph, mut snapshot: ExecutionSnapshot, options: RunOptions) -> Result<RunOutcome> {
        let started_at = Instant::now();
        self.emit(ProgressEvent::ExecutionStarted {
            execution_id: snapshot.execution_id.clone(),
        });

        loop {
            if snapshot.status != ExecutionStatus::Running {
                break;
            }
            let Some(current_node_id) = snapshot.current_node_id.clone() else {
                snapshot.status = ExecutionStatus::Completed;
                break;
            };

            if self.is_cancelled(&options) {
                snapshot.status = ExecutionStatus::Cancelled;
                self.save_snapshot(&snapshot, None).await;
                break;
            }
            if let Some(timeout) = options.timeout {
                if started_at.elapsed() > timeout {
                    snapshot.errors.push(GraphError::ExecutionTimeout(timeout).to_string());
                    snapshot.status = ExecutionStatus::Failed;
                    self.save_snapshot(&snapshot, None).await;
                    break;
                }
            }

            let node = match graph.node(&current_node_id) {
                Some(n) => n.clone(),
                None => {
                    snapshot.errors.push(GraphError::UnknownNode(current_node_id.clone()).to_string());
                    snapshot.status = ExecutionStatus::Failed;
                    break;
                }
            };

            self.emit(ProgressEvent::NodeStarted {
                execution_id: snapshot.execution_id.clone(),
                node_id: current_node_id.clone(),
            });
            info!(node = %current_node_id, "node started");
            let node_start = Instant::now();

            let outcome = self
                .execute_with_retry(node.as_ref(), &snapshot, &options)
                .await;

            match outcome {
                Ok(outcome) => {
                    if let Some(update) = &outcome.state_update {
                        snapshot.state = self
                            .schema
                            .merge(&snapshot.state, update)
                            .map_err(GraphError::State)?;
                    }
                    snapshot.signals.extend(outcome.signals.clone());

                    if options.auto_checkpoint {
                        self.save_snapshot(&snapshot, Some("auto")).await;
                        self.emit(ProgressEvent::CheckpointSaved {
                            execution_id: snapshot.execution_id.clone(),
                            label: "auto".to_string(),
                        });
                    }

                    let duration = node_start.elapsed();
                    self.emit(ProgressEvent::NodeCompleted {
                        execution_id: snapshot.execution_id.clone(),
                        node_id: current_node_id.clone(),
                        duration,
                    });
                    info!(node = %current_node_id, ?duration, "node completed");

                    let next = match &outcome.goto {
                        Some(Goto::Node(id)) => Some(id.clone()),
                        Some(Goto::Parallel(targets)) => {
                            self.run_parallel(graph, targets, &mut snapshot, &options).await?;
                            None
                        }
                        None => graph.next_node(&current_node_id, &snapshot.state).map(str::to_string),
                    };

                    snapshot.visited_nodes.push(current_node_id);
                    snapshot.node_execution_count += 1;
                    snapshot.current_node_id = next;
                    snapshot.updated_at = chrono::Utc::now();
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(node = %current_node_id, error = %message, "node failed");
                    self.emit(ProgressEvent::NodeFailed {
                        execution_id: snapshot.execution_id.clone(),
                        node_id: current_node_id.clone(),
                        error: message.clone(),
                    });
                    snapshot.errors.push(message);
                    snapshot.status = ExecutionStatus::Failed;
                    snapshot.visited_nodes.push(current_node_id);
                }
            }
        }

        if snapshot.status == ExecutionStatus::Running {
            snapshot.status = ExecutionStatus::Completed;
        }
        snapshot.updated_at = chrono::Utc::now();
        self.save_snapshot(&snapshot, None).await;
        self.emit(ProgressEvent::ExecutionCompleted {
            execution_id: snapshot.execution_id.clone(),
            status: snapshot.status,
        });

        Ok(RunOutcome {
            final_state: snapshot.state.clone(),
            snapshot,
        })
    }

    fn is_cancelled(&self, options: &RunOptions) -> bool {
        options.cancellation_token.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }

    async fn execute_with_retry(&self, node: &dyn crate::node::Node, snapshot: &ExecutionSnapshot, options: &RunOptions) -> NodeExecResult {
        let retry = node.retry_config().cloned_or_default();
        let mut attempt = 1u32;
        loop {
            let ctx = NodeContext {
                state: &snapshot.state,
                config: &options.config,
                errors: &snapshot.errors,
            };
            match node.execute(&ctx).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if retry.should_retry(attempt, err.as_ref()) {
                        self.emit(ProgressEvent::NodeRetried {
                            execution_id: snapshot.execution_id.clone(),
                            node_id: node.id().to_string(),
                            attempt,
                        });
                        warn!(node = node.id(), attempt, "node retrying");
                        if self.is_cancelled(options) {
                            return Err(Box::new(GraphError::Cancelled) as crate::node::NodeError);
                        }
                        tokio::time::sleep(retry.backoff_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Parallel fan-out: each target is invoked once, against a
    /// deep-copied pre-fan-out state, sharing no writer with its
    /// siblings. Deltas are merged in deterministic (list) order with
    /// first-writer-wins on field conflicts; a child failure is recorded
    /// only after every sibling has finished (collect-then-fail). This is
    /// a leaf construct: the parent run terminates after the join (see
    /// DESIGN.md for why the graph model leaves "what follows a fan-out"
    /// undefined without an explicit join node).
    async fn run_parallel(&self, graph: &CompiledGraph, targets: &[String], snapshot: &mut ExecutionSnapshot, options: &RunOptions) -> Result<()> {
        let pre_fanout_state = snapshot.state.clone();
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let node = graph
                .node(target)
                .ok_or_else(|| GraphError::UnknownNode(target.clone()))?
                .clone();
            let state = pre_fanout_state.clone();
            let config = options.config.clone();
            let errors = snapshot.errors.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                let ctx = NodeContext {
                    state: &state,
                    config: &config,
                    errors: &errors,
                };
                (target, node.execute(&ctx).await)
            }));
        }

        let mut first_error: Option<String> = None;
        let mut merged_outputs: std::collections::HashMap<String, Value> = std::collections::HashMap::new();
        let mut merged_fields_update = StateUpdate::new();
        let mut signals: Vec<Signal> = Vec::new();

        for handle in handles {
            let (target, result) = handle.await.map_err(|e| GraphError::NodeExecution {
                node: "parallel-join".to_string(),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
            })?;
            match result {
                Ok(outcome) => {
                    if let Some(update) = outcome.state_update {
                        for (k, v) in update.outputs {
                            merged_outputs.entry(k).or_insert(v);
                        }
                        for (k, v) in update.fields {
                            merged_fields_update.fields.entry(k).or_insert(v);
                        }
                    }
                    signals.extend(outcome.signals);
                    snapshot.visited_nodes.push(target);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(format!("{target}: {e}"));
                    }
                }
            }
        }

        merged_fields_update.outputs = merged_outputs;
        snapshot.state = self.schema.merge(&snapshot.state, &merged_fields_update).map_err(GraphError::State)?;
        snapshot.signals.extend(signals);

        if let Some(err) = first_error {
            snapshot.errors.push(err);
            snapshot.status = ExecutionStatus::Failed;
        }
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &ExecutionSnapshot, label: Option<&str>) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to serialize snapshot");
                return;
            }
        };
        if let Err(e) = self.checkpointer.save(&snapshot.execution_id, payload, label).await {
            warn!(error = %e, "checkpoint save failed; continuing run");
        }
    }
}

trait RetryConfigExt {
    fn cloned_or_default(&self) -> crate::retry::RetryConfig;
}

impl RetryConfigExt for Option<&crate::retry::RetryConfig> {
    fn cloned_or_default(&self) -> crate::retry::RetryConfig {
        self.cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::node::{FnNode, NodeKind, NodeOutcome};
    use crate::state::StateUpdate;
    use flowloom_checkpoint::MemoryCheckpointSaver;
    use serde_json::json;
    use std::sync::Mutex;

    fn node(id: &str, out: &str) -> Arc<dyn crate::node::Node> {
        let id_owned = id.to_string();
        let out = out.to_string();
        Arc::new(FnNode::new(id_owned.clone(), NodeKind::Tool, move |_ctx| {
            let id_owned = id_owned.clone();
            let out = out.clone();
            async move { Ok(NodeOutcome::new().with_state_update(StateUpdate::new().with_output(id_owned, json!(out)))) }
        }))
    }

    #[tokio::test]
    async fn s1_linear_two_node_run() {
        let graph = GraphBuilder::new().start(node("A", "ok")).then(node("B", "done")).compile().unwrap();
        let scheduler = Scheduler::new(Arc::new(MemoryCheckpointSaver::new()));
        let outcome = scheduler
            .run(&graph, State::new("exec-1"), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.snapshot.visited_nodes, vec!["A", "B"]);
        assert_eq!(outcome.snapshot.status, ExecutionStatus::Completed);
        assert_eq!(outcome.final_state.outputs["A"], json!("ok"));
        assert_eq!(outcome.final_state.outputs["B"], json!("done"));
    }

    #[tokio::test]
    async fn s2_branch_on_predicate() {
        let graph = GraphBuilder::new()
            .start(node("A", "ok"))
            .if_branch(|s| s.fields.get("flag").and_then(|v| v.as_bool()).unwrap_or(false))
            .then(node("X", "x"))
            .else_branch()
            .then(node("Y", "y"))
            .endif()
            .compile()
            .unwrap();

        let scheduler = Scheduler::new(Arc::new(MemoryCheckpointSaver::new()));
        let mut state = State::new("exec-2");
        state.fields.insert("flag".into(), json!(true));
        let outcome = scheduler.run(&graph, state, RunOptions::default()).await.unwrap();

        assert_eq!(outcome.snapshot.visited_nodes, vec!["A", "X"]);
    }

    #[tokio::test]
    async fn s3_retry_then_success() {
        let attempts = Arc::new(Mutex::new(0u32));
        let attempts_clone = attempts.clone();
        let retry_node: Arc<dyn crate::node::Node> = Arc::new(
            FnNode::new("A", NodeKind::Tool, move |_ctx| {
                let attempts_clone = attempts_clone.clone();
                async move {
                    let mut guard = attempts_clone.lock().unwrap();
                    *guard += 1;
                    if *guard < 3 {
                        Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "transient")) as crate::node::NodeError)
                    } else {
                        Ok(NodeOutcome::new().with_state_update(StateUpdate::new().with_output("A", json!("ok"))))
                    }
                }
            })
            .with_retry(crate::retry::RetryConfig {
                max_attempts: 3,
                backoff_ms: 1,
                backoff_multiplier: 1.0,
                retry_on: None,
            }),
        );

        struct Counter(Mutex<Vec<ProgressEvent>>);
        impl ProgressSink for Counter {
            fn on_event(&self, event: &ProgressEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }
        let counter = Arc::new(Counter(Mutex::new(Vec::new())));

        let graph = GraphBuilder::new().start(retry_node).compile().unwrap();
        let scheduler = Scheduler::new(Arc::new(MemoryCheckpointSaver::new())).with_progress_sink(counter.clone());
        let outcome = scheduler.run(&graph, State::new("exec-3"), RunOptions::default()).await.unwrap();

        assert_eq!(outcome.snapshot.status, ExecutionStatus::Completed);
        assert!(outcome.snapshot.errors.is_empty());
        let retried_count = counter.0.lock().unwrap().iter().filter(|e| matches!(e, ProgressEvent::NodeRetried { .. })).count();
        assert_eq!(retried_count, 2);
    }

    #[tokio::test]
    async fn s7_checkpoint_and_resume() {
        let checkpointer = Arc::new(MemoryCheckpointSaver::new());
        let graph = GraphBuilder::new()
            .start(node("A", "a"))
            .then(node("B", "b"))
            .then(node("C", "c"))
            .then(node("D", "d"))
            .then(node("E", "e"))
            .compile()
            .unwrap();

        let scheduler = Scheduler::new(checkpointer.clone());
        let full_run = scheduler
            .run(&graph, State::new("exec-full"), RunOptions { auto_checkpoint: true, ..Default::default() })
            .await
            .unwrap();

        // Simulate a resume: load back the checkpoint after only 3 nodes
        // would have executed by truncating the visited log and re-driving
        // from node D using a fresh snapshot built at that boundary.
        let mut mid_snapshot = full_run.snapshot.clone();
        mid_snapshot.execution_id = "exec-resume".to_string();
        mid_snapshot.visited_nodes = vec!["A".into(), "B".into(), "C".into()];
        mid_snapshot.current_node_id = Some("D".into());
        mid_snapshot.status = ExecutionStatus::Running;
        checkpointer
            .save("exec-resume", serde_json::to_value(&mid_snapshot).unwrap(), None)
            .await
            .unwrap();

        let resumed = scheduler
            .resume(&graph, "exec-resume", RunOptions::default())
            .await
            .unwrap();

        assert_eq!(resumed.snapshot.visited_nodes, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(resumed.snapshot.status, ExecutionStatus::Completed);
    }
}
