//! The serializable, complete observable state of one execution.
//!
//! Snapshots are what the checkpointer persists and what `resume` loads
//! back. Unknown fields encountered on load must be preserved on the next
//! save — handled by keeping `workload_state` as an opaque `State` value
//! rather than flattening it into the snapshot struct.

use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub state: State,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub visited_nodes: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub signals: Vec<crate::signal::Signal>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub node_execution_count: u64,
}

impl ExecutionSnapshot {
    pub fn fresh(execution_id: impl Into<String>, start_node_id: impl Into<String>) -> Self {
        let execution_id = execution_id.into();
        let now = Utc::now();
        Self {
            state: State::new(execution_id.clone()),
            execution_id,
            status: ExecutionStatus::Running,
            current_node_id: Some(start_node_id.into()),
            visited_nodes: Vec::new(),
            errors: Vec::new(),
            signals: Vec::new(),
            started_at: now,
            updated_at: now,
            node_execution_count: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}
