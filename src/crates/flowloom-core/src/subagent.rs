//! The `Subagent` boundary: external workers (LLM-backed or otherwise)
//! consumed by orchestrator-kind nodes. Implementations are out of scope
//! for this crate (spec.md §1) — the engine only depends on this trait.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct AgentTask {
    pub agent_id: String,
    pub agent_name: String,
    pub task: String,
}

#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait Subagent: Send + Sync {
    async fn spawn(&self, task: AgentTask) -> AgentResult;

    /// One result per input, order preserved. May be called with an empty
    /// list (returns an empty vec). The default implementation dispatches
    /// sequentially via `spawn`; real implementations parallelize.
    async fn spawn_parallel(&self, tasks: Vec<AgentTask>) -> Vec<AgentResult> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.spawn(task).await);
        }
        results
    }
}
