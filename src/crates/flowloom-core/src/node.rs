//! Node definition: the scheduler's unit of work.

use crate::retry::RetryConfig;
use crate::signal::Signal;
use crate::state::{State, StateUpdate};
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error as StdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Agent,
    Tool,
    Decision,
    Wait,
    Subgraph,
    Parallel,
}

/// Where execution goes after this node. A single id is a normal
/// transition; a sequence triggers a parallel fan-out where each target
/// runs against a deep copy of state and the deltas are merged on join in
/// list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goto {
    Node(String),
    Parallel(Vec<String>),
}

/// Everything a node's `execute` needs: the state as of entry, static
/// config, and any errors already recorded against this run.
pub struct NodeContext<'a> {
    pub state: &'a State,
    pub config: &'a Value,
    pub errors: &'a [String],
}

#[derive(Debug, Default)]
pub struct NodeOutcome {
    pub state_update: Option<StateUpdate>,
    pub goto: Option<Goto>,
    pub signals: Vec<Signal>,
}

impl NodeOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_update(mut self, update: StateUpdate) -> Self {
        self.state_update = Some(update);
        self
    }

    pub fn with_goto(mut self, goto: Goto) -> Self {
        self.goto = Some(goto);
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }
}

pub type NodeError = Box<dyn StdError + Send + Sync>;
pub type NodeExecResult = std::result::Result<NodeOutcome, NodeError>;

/// A self-contained unit of work. Constructed statically and immutable at
/// runtime — nodes own no mutable state; everything they need flows
/// through [`NodeContext`] and everything they produce flows out through
/// [`NodeOutcome`].
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> NodeKind;
    async fn execute(&self, ctx: &NodeContext<'_>) -> NodeExecResult;
    fn retry_config(&self) -> Option<&RetryConfig> {
        None
    }
}

/// A `Node` built from a plain async closure, for the common case where a
/// node has no extra fields beyond its id/kind/retry policy. Mirrors the
/// closure-based node constructors the builder's fluent API hands out.
pub struct FnNode<F> {
    id: String,
    kind: NodeKind,
    retry: Option<RetryConfig>,
    func: F,
}

impl<F> FnNode<F> {
    pub fn new(id: impl Into<String>, kind: NodeKind, func: F) -> Self {
        Self {
            id: id.into(),
            kind,
            retry: None,
            func,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(NodeContext<'_>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = NodeExecResult> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(&self, ctx: &NodeContext<'_>) -> NodeExecResult {
        let ctx = NodeContext {
            state: ctx.state,
            config: ctx.config,
            errors: ctx.errors,
        };
        (self.func)(ctx).await
    }

    fn retry_config(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }
}
