//! The storage-backend abstraction.
//!
//! `save`/`load`/`list`/`delete`, keyed by `execution_id` plus an optional
//! label. Required semantics (spec §4.5):
//! - `save` is atomic: a partial failure never leaves a corrupt snapshot.
//! - The label `"latest"` always names the most recently saved payload,
//!   regardless of what label that save used.
//! - `load` with no label returns `"latest"`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub const LATEST_LABEL: &str = "latest";

#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persists `payload` under `label` (default: `"latest"`); regardless
    /// of `label`, the `"latest"` pointer is updated to this payload too.
    async fn save(&self, execution_id: &str, payload: Value, label: Option<&str>) -> Result<()>;

    /// Loads the payload saved under `label`, or `"latest"` if `label` is
    /// `None`. Returns `Ok(None)` if nothing has been saved.
    async fn load(&self, execution_id: &str, label: Option<&str>) -> Result<Option<Value>>;

    /// All labels saved for `execution_id`, in no particular order.
    async fn list(&self, execution_id: &str) -> Result<Vec<String>>;

    /// Deletes the payload for `label` (default: every label for this
    /// execution, including `"latest"`).
    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()>;
}
