//! Buffered, opt-out-able JSONL telemetry sink (spec §4.8's "Collector").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::events::TelemetryEvent;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub local_log_path: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            flush_interval_ms: 10_000,
            local_log_path: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("flowloom").join("telemetry")
}

/// `DO_NOT_TRACK`, then `FLOWLOOM_TELEMETRY_DISABLED`, then `CI`; first
/// match wins. Values `"0"`/`"false"` (case-insensitive) count as unset.
pub fn is_tracking_enabled() -> bool {
    let truthy = |var: &str| std::env::var(var).map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "")).unwrap_or(false);
    if truthy("DO_NOT_TRACK") {
        return false;
    }
    if truthy("FLOWLOOM_TELEMETRY_DISABLED") {
        return false;
    }
    if std::env::var("CI").is_ok() {
        return false;
    }
    true
}

/// Machine-stable, hex-with-dashes identifier persisted at
/// `<config_dir>/flowloom/anonymous_id`, created on first use. Falls back
/// to an in-memory-only id if the config directory is unwritable.
pub fn anonymous_id() -> String {
    let Some(base) = dirs::config_dir() else {
        return generate_anonymous_id();
    };
    let path = base.join("flowloom").join("anonymous_id");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let generated = generate_anonymous_id();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&path, &generated) {
        warn!(error = %e, "failed to persist anonymous id; will regenerate next run");
    }
    generated
}

fn generate_anonymous_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = hex::encode(bytes);
    format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32])
}

struct Inner {
    buffer: Vec<TelemetryEvent>,
    shut_down: bool,
}

/// Enriches and buffers events, flushing to `<local_log_path>/<date>.jsonl`
/// either explicitly, automatically at `batch_size`, or on shutdown. Safe
/// under concurrent `track()` calls (spec §5: "telemetry buffer is an
/// executionId-agnostic shared resource").
pub struct TelemetryCollector {
    config: CollectorConfig,
    anonymous_id: String,
    enabled: bool,
    inner: Arc<Mutex<Inner>>,
}

impl TelemetryCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            anonymous_id: anonymous_id(),
            enabled: is_tracking_enabled(),
            inner: Arc::new(Mutex::new(Inner { buffer: Vec::new(), shut_down: false })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Buffers `event`, flushing automatically once `batch_size` is
    /// reached. A no-op when tracking is disabled or after shutdown.
    pub async fn track(&self, event: TelemetryEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut guard = self.inner.lock().await;
        if guard.shut_down {
            return Err(crate::error::TelemetryError::ShutDown);
        }
        guard.buffer.push(event);
        if guard.buffer.len() >= self.config.batch_size {
            let batch = std::mem::take(&mut guard.buffer);
            drop(guard);
            self.write_batch(&batch).await?;
        }
        Ok(())
    }

    /// Flushes whatever is currently buffered, even below `batch_size`.
    pub async fn flush(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut guard.buffer);
        drop(guard);
        self.write_batch(&batch).await
    }

    /// Drains the buffer and marks the collector closed; further
    /// `track()` calls return `ShutDown`.
    pub async fn shutdown(&self) -> Result<()> {
        self.flush().await?;
        let mut guard = self.inner.lock().await;
        guard.shut_down = true;
        Ok(())
    }

    async fn write_batch(&self, batch: &[TelemetryEvent]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let path = self.daily_log_path();
        let anonymous_id = self.anonymous_id.clone();
        let lines: Vec<String> = batch
            .iter()
            .map(|event| {
                let enriched = serde_json::json!({
                    "name": event.name,
                    "executionId": event.execution_id,
                    "timestamp": event.timestamp,
                    "anonymousId": anonymous_id,
                    "platform": std::env::consts::OS,
                    "runtimeVersion": env!("CARGO_PKG_VERSION"),
                    "properties": event.properties,
                });
                serde_json::to_string(&enriched)
            })
            .collect::<std::result::Result<_, _>>()?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            for line in lines {
                writeln!(file, "{line}")?;
            }
            Ok(())
        })
        .await
        .map_err(|e| crate::error::TelemetryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))??;
        Ok(())
    }

    fn daily_log_path(&self) -> PathBuf {
        self.config.local_log_path.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")))
    }
}

pub(crate) fn read_jsonl(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().map(|l| l.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TelemetryEvent;
    use serde_json::Value;
    use tempfile::TempDir;

    fn test_event(name: &str) -> TelemetryEvent {
        TelemetryEvent {
            name: name.to_string(),
            execution_id: "exec-1".to_string(),
            timestamp: Utc::now(),
            properties: Value::Null,
        }
    }

    #[tokio::test]
    async fn flush_writes_buffered_events() {
        std::env::remove_var("DO_NOT_TRACK");
        std::env::remove_var("FLOWLOOM_TELEMETRY_DISABLED");
        std::env::remove_var("CI");
        let dir = TempDir::new().unwrap();
        let collector = TelemetryCollector::new(CollectorConfig { batch_size: 100, flush_interval_ms: 1000, local_log_path: dir.path().to_path_buf() });
        collector.track(test_event("graph.execution.started")).await.unwrap();
        collector.flush().await.unwrap();

        let path = collector.daily_log_path();
        let lines = read_jsonl(&path).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("anonymousId"));
    }

    #[tokio::test]
    async fn auto_flushes_at_batch_size() {
        std::env::remove_var("DO_NOT_TRACK");
        std::env::remove_var("FLOWLOOM_TELEMETRY_DISABLED");
        std::env::remove_var("CI");
        let dir = TempDir::new().unwrap();
        let collector = TelemetryCollector::new(CollectorConfig { batch_size: 2, flush_interval_ms: 1000, local_log_path: dir.path().to_path_buf() });
        collector.track(test_event("a")).await.unwrap();
        collector.track(test_event("b")).await.unwrap();
        let path = collector.daily_log_path();
        let lines = read_jsonl(&path).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_further_tracking() {
        let dir = TempDir::new().unwrap();
        let collector = TelemetryCollector::new(CollectorConfig { batch_size: 100, flush_interval_ms: 1000, local_log_path: dir.path().to_path_buf() });
        collector.shutdown().await.unwrap();
        let result = collector.track(test_event("late")).await;
        assert!(result.is_err());
    }

    #[test]
    fn do_not_track_disables() {
        std::env::set_var("DO_NOT_TRACK", "1");
        assert!(!is_tracking_enabled());
        std::env::remove_var("DO_NOT_TRACK");
    }

    #[test]
    fn do_not_track_zero_is_treated_as_unset() {
        std::env::remove_var("FLOWLOOM_TELEMETRY_DISABLED");
        std::env::remove_var("CI");
        std::env::set_var("DO_NOT_TRACK", "0");
        assert!(is_tracking_enabled());
        std::env::remove_var("DO_NOT_TRACK");
    }
}
