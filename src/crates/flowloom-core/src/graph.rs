//! The immutable, compiled graph the scheduler walks.

use crate::node::Node;
use crate::state::State;
use std::collections::HashMap;
use std::sync::Arc;

pub type PredicateFn = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// An edge from one node to another. A `predicate` of `None` makes this
/// edge an unconditional default — the first edge (in insertion order)
/// whose predicate is `None` or evaluates `true` wins.
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub predicate: Option<PredicateFn>,
    pub label: Option<String>,
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("conditional", &self.predicate.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// Immutable compiled graph: a node table plus an adjacency list of
/// edges. Produced only by [`crate::builder::GraphBuilder::compile`];
/// shared (via `Arc`) across every run against it.
pub struct CompiledGraph {
    pub start_node_id: String,
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    pub(crate) edges: HashMap<String, Vec<Edge>>,
}

impl CompiledGraph {
    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    pub fn edges_from(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// First edge out of `from` whose predicate matches (or is absent).
    /// Returns `None` when no edge matches — the run then terminates
    /// successfully at `from`.
    pub fn next_node(&self, from: &str, state: &State) -> Option<&str> {
        for edge in self.edges_from(from) {
            match &edge.predicate {
                Some(pred) if pred(state) => return Some(&edge.to),
                None => return Some(&edge.to),
                _ => continue,
            }
        }
        None
    }
}
