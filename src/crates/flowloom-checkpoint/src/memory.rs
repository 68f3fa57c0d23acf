//! In-memory checkpoint backend: library-embedding and unit-test use.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::{CheckpointSaver, LATEST_LABEL};

#[derive(Default)]
pub struct MemoryCheckpointSaver {
    // execution_id -> label -> payload
    store: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointSaver for MemoryCheckpointSaver {
    async fn save(&self, execution_id: &str, payload: Value, label: Option<&str>) -> Result<()> {
        let mut store = self.store.write().await;
        let labels = store.entry(execution_id.to_string()).or_default();
        if let Some(label) = label {
            labels.insert(label.to_string(), payload.clone());
        }
        labels.insert(LATEST_LABEL.to_string(), payload);
        Ok(())
    }

    async fn load(&self, execution_id: &str, label: Option<&str>) -> Result<Option<Value>> {
        let store = self.store.read().await;
        let label = label.unwrap_or(LATEST_LABEL);
        Ok(store.get(execution_id).and_then(|labels| labels.get(label)).cloned())
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(store
            .get(execution_id)
            .map(|labels| labels.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()> {
        let mut store = self.store.write().await;
        match label {
            Some(label) => {
                if let Some(labels) = store.get_mut(execution_id) {
                    labels.remove(label);
                }
            }
            None => {
                store.remove(execution_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_latest() {
        let saver = MemoryCheckpointSaver::new();
        saver.save("exec-1", json!({"n": 1}), Some("auto")).await.unwrap();
        let latest = saver.load("exec-1", None).await.unwrap();
        assert_eq!(latest, Some(json!({"n": 1})));
        let labeled = saver.load("exec-1", Some("auto")).await.unwrap();
        assert_eq!(labeled, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn second_save_updates_latest_regardless_of_label() {
        let saver = MemoryCheckpointSaver::new();
        saver.save("exec-1", json!({"n": 1}), Some("step-1")).await.unwrap();
        saver.save("exec-1", json!({"n": 2}), Some("step-2")).await.unwrap();
        assert_eq!(saver.load("exec-1", None).await.unwrap(), Some(json!({"n": 2})));
        assert_eq!(saver.load("exec-1", Some("step-1")).await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn delete_removes_execution() {
        let saver = MemoryCheckpointSaver::new();
        saver.save("exec-1", json!({"n": 1}), None).await.unwrap();
        saver.delete("exec-1", None).await.unwrap();
        assert_eq!(saver.load("exec-1", None).await.unwrap(), None);
    }
}
