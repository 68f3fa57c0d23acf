//! Filesystem-backed checkpoint storage.
//!
//! Directory layout per spec §6:
//!
//! ```text
//! <sessionsRoot>/<executionId>/
//!   session.json            # authoritative snapshot (the "latest" label)
//!   checkpoints/<label>.json
//!   logs/*.jsonl
//!   progress.txt
//! ```
//!
//! Writes go through a temp file in the same directory followed by a
//! rename, so a crash mid-write never leaves a corrupt `session.json` or
//! labeled checkpoint behind.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{CheckpointError, Result};
use crate::traits::{CheckpointSaver, LATEST_LABEL};

pub struct FilesystemCheckpointSaver {
    sessions_root: PathBuf,
}

impl FilesystemCheckpointSaver {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
        }
    }

    fn session_dir(&self, execution_id: &str) -> PathBuf {
        self.sessions_root.join(execution_id)
    }

    fn checkpoints_dir(&self, execution_id: &str) -> PathBuf {
        self.session_dir(execution_id).join("checkpoints")
    }

    fn labeled_path(&self, execution_id: &str, label: &str) -> PathBuf {
        if label == LATEST_LABEL {
            self.session_dir(execution_id).join("session.json")
        } else {
            self.checkpoints_dir(execution_id).join(format!("{label}.json"))
        }
    }

    fn write_atomic(path: &Path, payload: &Value) -> Result<()> {
        let dir = path.parent().ok_or_else(|| CheckpointError::Corrupt("path has no parent".into()))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, payload)?;
        tmp.persist(path).map_err(|e| CheckpointError::Io(e.error))?;
        Ok(())
    }

    fn append_progress_line(&self, execution_id: &str, line: &str) -> Result<()> {
        use std::io::Write;
        let dir = self.session_dir(execution_id);
        std::fs::create_dir_all(&dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("progress.txt"))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointSaver for FilesystemCheckpointSaver {
    async fn save(&self, execution_id: &str, payload: Value, label: Option<&str>) -> Result<()> {
        let labeled_path = label
            .filter(|l| *l != LATEST_LABEL)
            .map(|l| self.labeled_path(execution_id, l));
        let latest_path = self.labeled_path(execution_id, LATEST_LABEL);
        let payload_clone = payload.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(path) = &labeled_path {
                Self::write_atomic(path, &payload_clone)?;
            }
            Self::write_atomic(&latest_path, &payload_clone)?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Corrupt(e.to_string()))??;

        if let Err(e) = self.append_progress_line(execution_id, "checkpoint saved") {
            tracing::warn!(error = %e, "failed to append progress line");
        }
        Ok(())
    }

    async fn load(&self, execution_id: &str, label: Option<&str>) -> Result<Option<Value>> {
        let path = self.labeled_path(execution_id, label.unwrap_or(LATEST_LABEL));
        let path_for_blocking = path.clone();
        let contents = tokio::task::spawn_blocking(move || std::fs::read(path_for_blocking))
            .await
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        match contents {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Io(e)),
        }
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        let dir = self.checkpoints_dir(execution_id);
        let mut labels = Vec::new();
        if self.session_dir(execution_id).join("session.json").exists() {
            labels.push(LATEST_LABEL.to_string());
        }
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    labels.push(name.to_string());
                }
            }
        }
        Ok(labels)
    }

    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()> {
        match label {
            Some(label) => {
                let path = self.labeled_path(execution_id, label);
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(CheckpointError::Io(e)),
                }
            }
            None => {
                let dir = self.session_dir(execution_id);
                match std::fs::remove_dir_all(&dir) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(CheckpointError::Io(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_and_load_latest() {
        let dir = TempDir::new().unwrap();
        let saver = FilesystemCheckpointSaver::new(dir.path());
        saver
            .save("exec-1", json!({"execution_id": "exec-1", "n": 1}), None)
            .await
            .unwrap();
        let loaded = saver.load("exec-1", None).await.unwrap();
        assert_eq!(loaded, Some(json!({"execution_id": "exec-1", "n": 1})));
    }

    #[tokio::test]
    async fn labeled_checkpoint_survives_later_latest_save() {
        let dir = TempDir::new().unwrap();
        let saver = FilesystemCheckpointSaver::new(dir.path());
        saver
            .save("exec-1", json!({"execution_id": "exec-1", "n": 1}), Some("node-3"))
            .await
            .unwrap();
        saver
            .save("exec-1", json!({"execution_id": "exec-1", "n": 2}), None)
            .await
            .unwrap();
        let labeled = saver.load("exec-1", Some("node-3")).await.unwrap();
        assert_eq!(labeled, Some(json!({"execution_id": "exec-1", "n": 1})));
        let latest = saver.load("exec-1", None).await.unwrap();
        assert_eq!(latest, Some(json!({"execution_id": "exec-1", "n": 2})));
    }

    #[tokio::test]
    async fn missing_checkpoint_returns_none() {
        let dir = TempDir::new().unwrap();
        let saver = FilesystemCheckpointSaver::new(dir.path());
        assert_eq!(saver.load("nope", None).await.unwrap(), None);
    }
}
