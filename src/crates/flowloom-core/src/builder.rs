//! Fluent graph builder.
//!
//! ```
//! use flowloom_core::builder::GraphBuilder;
//! use flowloom_core::node::{FnNode, NodeKind, NodeOutcome};
//! use std::sync::Arc;
//!
//! let a = Arc::new(FnNode::new("A", NodeKind::Tool, |_ctx| async { Ok(NodeOutcome::new()) }));
//! let b = Arc::new(FnNode::new("B", NodeKind::Tool, |_ctx| async { Ok(NodeOutcome::new()) }));
//!
//! let graph = GraphBuilder::new()
//!     .start(a)
//!     .then(b)
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(graph.start_node_id, "A");
//! ```

use crate::error::{GraphError, Result};
use crate::graph::{CompiledGraph, Edge, PredicateFn};
use crate::node::Node;
use std::collections::HashMap;
use std::sync::Arc;

struct CondFrame {
    from: Vec<String>,
    predicate: PredicateFn,
    then_end: Option<Vec<String>>,
    in_else: bool,
    pending_branch_entry: bool,
}

pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Vec<Edge>>,
    start_node_id: Option<String>,
    cursor: Vec<String>,
    cond_stack: Vec<CondFrame>,
    error: Option<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            start_node_id: None,
            cursor: Vec::new(),
            cond_stack: Vec::new(),
            error: None,
        }
    }

    fn register(&mut self, node: Arc<dyn Node>) -> Result<String> {
        let id = node.id().to_string();
        if self.nodes.insert(id.clone(), node).is_some() {
            return Err(GraphError::InvalidGraph(format!("duplicate node id: {id}")));
        }
        Ok(id)
    }

    fn add_edge(&mut self, from: &str, to: &str, predicate: Option<PredicateFn>) {
        self.edges.entry(from.to_string()).or_default().push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            predicate,
            label: None,
        });
    }

    pub fn start(mut self, node: Arc<dyn Node>) -> Self {
        match self.register(node) {
            Ok(id) => {
                self.start_node_id = Some(id.clone());
                self.cursor = vec![id];
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        self
    }

    pub fn then(mut self, node: Arc<dyn Node>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let id = match self.register(node) {
            Ok(id) => id,
            Err(e) => {
                self.error = Some(e.to_string());
                return self;
            }
        };

        if let Some(frame) = self.cond_stack.last_mut() {
            if frame.pending_branch_entry {
                let froms = frame.from.clone();
                let predicate = if frame.in_else { None } else { Some(frame.predicate.clone()) };
                for from in &froms {
                    self.add_edge(from, &id, predicate.clone());
                }
                self.cond_stack.last_mut().unwrap().pending_branch_entry = false;
                self.cursor = vec![id];
                return self;
            }
        }

        for from in self.cursor.clone() {
            self.add_edge(&from, &id, None);
        }
        self.cursor = vec![id];
        self
    }

    /// Opens a conditional block: the next `.then` hangs off the current
    /// cursor guarded by `predicate`.
    pub fn if_branch<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&crate::state::State) -> bool + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if self.cursor.is_empty() {
            self.error = Some("if_branch with no preceding node".to_string());
            return self;
        }
        self.cond_stack.push(CondFrame {
            from: self.cursor.clone(),
            predicate: Arc::new(predicate),
            then_end: None,
            in_else: false,
            pending_branch_entry: true,
        });
        self
    }

    pub fn else_branch(mut self) -> Self {
        let frame = match self.cond_stack.last_mut() {
            Some(f) => f,
            None => {
                self.error = Some("else_branch without matching if_branch".to_string());
                return self;
            }
        };
        frame.then_end = Some(self.cursor.clone());
        frame.in_else = true;
        frame.pending_branch_entry = true;
        self.cursor = frame.from.clone();
        self
    }

    pub fn endif(mut self) -> Self {
        let frame = match self.cond_stack.pop() {
            Some(f) => f,
            None => {
                self.error = Some("endif without matching if_branch".to_string());
                return self;
            }
        };
        let mut joined = frame.then_end.unwrap_or_else(|| self.cursor.clone());
        if frame.in_else {
            for c in &self.cursor {
                if !joined.contains(c) {
                    joined.push(c.clone());
                }
            }
        }
        self.cursor = joined;
        self
    }

    /// No-op terminator kept for readability at call sites — mirrors the
    /// teacher builder's `.end()` before `.compile()`.
    pub fn end(self) -> Self {
        self
    }

    pub fn compile(self) -> Result<CompiledGraph> {
        if let Some(err) = self.error {
            return Err(GraphError::InvalidGraph(err));
        }
        if !self.cond_stack.is_empty() {
            return Err(GraphError::InvalidGraph("unclosed if_branch (missing endif)".to_string()));
        }
        let start_node_id = self
            .start_node_id
            .ok_or_else(|| GraphError::InvalidGraph("graph has no start node".to_string()))?;

        for edges in self.edges.values() {
            for edge in edges {
                if !self.nodes.contains_key(&edge.to) {
                    return Err(GraphError::InvalidGraph(format!(
                        "edge target '{}' is not a registered node",
                        edge.to
                    )));
                }
            }
        }

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.values().map(|v| v.len()).sum::<usize>(),
            "compiled graph"
        );

        Ok(CompiledGraph {
            start_node_id,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}
