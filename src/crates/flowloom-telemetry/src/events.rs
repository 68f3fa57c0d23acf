//! Typed telemetry events and the mapping from a runner's
//! [`flowloom_core::ProgressEvent`] onto them (spec §4.8's "progress
//! handler").

use chrono::{DateTime, Utc};
use flowloom_core::{ExecutionStatus, ProgressEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub properties: Value,
}

impl TelemetryEvent {
    fn new(name: impl Into<String>, execution_id: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            properties,
        }
    }
}

/// Skips node- or checkpoint-scoped events per caller configuration
/// (spec §4.8: "configurable to skip node or checkpoint events").
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub skip_node_events: bool,
    pub skip_checkpoint_events: bool,
}

/// Maps a single runner progress event to zero or one telemetry events,
/// honoring `filter`. Returns `None` when the event is filtered out.
pub fn map_progress_event(event: &ProgressEvent, filter: EventFilter) -> Option<TelemetryEvent> {
    match event {
        ProgressEvent::ExecutionStarted { execution_id } => Some(TelemetryEvent::new("graph.execution.started", execution_id, Value::Null)),
        ProgressEvent::ExecutionCompleted { execution_id, status } => {
            let name = match status {
                ExecutionStatus::Completed => "graph.execution.completed",
                ExecutionStatus::Failed | ExecutionStatus::Cancelled => "graph.execution.failed",
                ExecutionStatus::Running | ExecutionStatus::Pending | ExecutionStatus::Paused => "graph.execution.completed",
            };
            Some(TelemetryEvent::new(name, execution_id, serde_json::json!({ "status": format!("{status:?}") })))
        }
        ProgressEvent::NodeStarted { execution_id, node_id } => {
            if filter.skip_node_events {
                return None;
            }
            Some(TelemetryEvent::new("graph.node.started", execution_id, serde_json::json!({ "nodeId": node_id })))
        }
        ProgressEvent::NodeRetried { execution_id, node_id, attempt } => {
            if filter.skip_node_events {
                return None;
            }
            Some(TelemetryEvent::new(
                "graph.node.retried",
                execution_id,
                serde_json::json!({ "nodeId": node_id, "attempt": attempt }),
            ))
        }
        ProgressEvent::NodeFailed { execution_id, node_id, error } => {
            if filter.skip_node_events {
                return None;
            }
            Some(TelemetryEvent::new(
                "graph.node.failed",
                execution_id,
                serde_json::json!({ "nodeId": node_id, "error": error }),
            ))
        }
        ProgressEvent::NodeCompleted { execution_id, node_id, duration } => {
            if filter.skip_node_events {
                return None;
            }
            Some(TelemetryEvent::new(
                "graph.node.completed",
                execution_id,
                serde_json::json!({ "nodeId": node_id, "durationMs": duration.as_millis() as u64 }),
            ))
        }
        ProgressEvent::CheckpointSaved { execution_id, label } => {
            if filter.skip_checkpoint_events {
                return None;
            }
            Some(TelemetryEvent::new("graph.checkpoint.saved", execution_id, serde_json::json!({ "label": label })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn node_events_respect_filter() {
        let event = ProgressEvent::NodeStarted { execution_id: "e".into(), node_id: "n".into() };
        assert!(map_progress_event(&event, EventFilter::default()).is_some());
        assert!(map_progress_event(&event, EventFilter { skip_node_events: true, ..Default::default() }).is_none());
    }

    #[test]
    fn checkpoint_events_respect_filter() {
        let event = ProgressEvent::CheckpointSaved { execution_id: "e".into(), label: "auto".into() };
        assert!(map_progress_event(&event, EventFilter::default()).is_some());
        assert!(map_progress_event(&event, EventFilter { skip_checkpoint_events: true, ..Default::default() }).is_none());
    }

    #[test]
    fn node_completed_reports_duration_ms() {
        let event = ProgressEvent::NodeCompleted { execution_id: "e".into(), node_id: "n".into(), duration: Duration::from_millis(42) };
        let mapped = map_progress_event(&event, EventFilter::default()).unwrap();
        assert_eq!(mapped.properties["durationMs"], 42);
    }
}
