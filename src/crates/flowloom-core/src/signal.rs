//! Out-of-band messages from nodes to observers.
//!
//! Signals are not a control-flow substitute: the scheduler's loop is a
//! pure state transition per node, and signals are appended to the
//! snapshot and, separately, handed to whoever is subscribed — never
//! branched on internally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ContextWindowWarning,
    Checkpoint,
    HumanInputRequired,
    DebugReportGenerated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Signal {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            data: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Structured post-mortem for a node or run failure, accumulated into
/// state under the workload's "debug reports" field via [`crate::state::AppendReducer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugReport {
    pub error_summary: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

impl DebugReport {
    pub fn new(error_summary: impl Into<String>) -> Self {
        Self {
            error_summary: error_summary.into(),
            stack_trace: None,
            relevant_files: Vec::new(),
            suggested_fixes: Vec::new(),
            generated_at: Utc::now(),
            node_id: None,
            execution_id: None,
        }
    }
}
