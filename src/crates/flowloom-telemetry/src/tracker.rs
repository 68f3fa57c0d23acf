//! Imperative bracket APIs for phases not tied to graph internals (spec
//! §4.8's "execution tracker & workflow tracker").

use std::future::Future;

use crate::collector::TelemetryCollector;
use crate::events::TelemetryEvent;

/// Brackets `body` with `graph.execution.started`/`completed`/`failed`
/// events for `execution_id`. The underlying error is rethrown
/// unchanged; only a `failed` event is recorded alongside it.
pub async fn with_execution_tracking<F, Fut, T, E>(collector: &TelemetryCollector, execution_id: &str, body: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let _ = collector.track(started_event("graph.execution.started", execution_id)).await;
    match body().await {
        Ok(value) => {
            let _ = collector.track(completed_event("graph.execution.completed", execution_id)).await;
            Ok(value)
        }
        Err(err) => {
            let _ = collector.track(failed_event("graph.execution.failed", execution_id, &err.to_string())).await;
            Err(err)
        }
    }
}

/// As [`with_execution_tracking`], scoped to a named workflow instead of
/// a raw execution id — emits `graph.workflow.*` events carrying both
/// `workflowName` and `executionId`.
pub async fn with_workflow_telemetry<F, Fut, T, E>(collector: &TelemetryCollector, execution_id: &str, workflow_name: &str, body: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let _ = collector.track(workflow_event("graph.workflow.started", execution_id, workflow_name, None)).await;
    match body().await {
        Ok(value) => {
            let _ = collector.track(workflow_event("graph.workflow.completed", execution_id, workflow_name, None)).await;
            Ok(value)
        }
        Err(err) => {
            let message = err.to_string();
            let _ = collector.track(workflow_event("graph.workflow.failed", execution_id, workflow_name, Some(&message))).await;
            Err(err)
        }
    }
}

fn started_event(name: &str, execution_id: &str) -> TelemetryEvent {
    TelemetryEvent { name: name.to_string(), execution_id: execution_id.to_string(), timestamp: chrono::Utc::now(), properties: serde_json::Value::Null }
}

fn completed_event(name: &str, execution_id: &str) -> TelemetryEvent {
    started_event(name, execution_id)
}

fn failed_event(name: &str, execution_id: &str, error: &str) -> TelemetryEvent {
    TelemetryEvent {
        name: name.to_string(),
        execution_id: execution_id.to_string(),
        timestamp: chrono::Utc::now(),
        properties: serde_json::json!({ "error": error }),
    }
}

fn workflow_event(name: &str, execution_id: &str, workflow_name: &str, error: Option<&str>) -> TelemetryEvent {
    let mut properties = serde_json::json!({ "workflowName": workflow_name });
    if let Some(error) = error {
        properties["error"] = serde_json::json!(error);
    }
    TelemetryEvent { name: name.to_string(), execution_id: execution_id.to_string(), timestamp: chrono::Utc::now(), properties }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn execution_tracking_rethrows_error() {
        std::env::remove_var("DO_NOT_TRACK");
        std::env::remove_var("FLOWLOOM_TELEMETRY_DISABLED");
        std::env::remove_var("CI");
        let dir = TempDir::new().unwrap();
        let collector = TelemetryCollector::new(CollectorConfig { batch_size: 100, flush_interval_ms: 1000, local_log_path: dir.path().to_path_buf() });

        let result: Result<(), String> = with_execution_tracking(&collector, "exec-1", || async { Err("boom".to_string()) }).await;
        assert_eq!(result, Err("boom".to_string()));
        collector.flush().await.unwrap();
    }

    #[tokio::test]
    async fn workflow_telemetry_passes_through_success() {
        std::env::remove_var("DO_NOT_TRACK");
        std::env::remove_var("FLOWLOOM_TELEMETRY_DISABLED");
        std::env::remove_var("CI");
        let dir = TempDir::new().unwrap();
        let collector = TelemetryCollector::new(CollectorConfig { batch_size: 100, flush_interval_ms: 1000, local_log_path: dir.path().to_path_buf() });

        let result: Result<u32, String> = with_workflow_telemetry(&collector, "exec-1", "ingest", || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
