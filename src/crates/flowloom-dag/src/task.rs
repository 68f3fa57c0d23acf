//! Task records and id normalization.
//!
//! A task id on the wire may be a bare number (`"17"`) or already
//! prefixed (`"#17"`); [`normalize_id`] makes the two equivalent
//! everywhere readiness and blocker lookups happen (spec §8,
//! "task-id normalization").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub active_form: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, content: impl Into<String>, active_form: impl Into<String>) -> Self {
        Self {
            id: normalize_id(&id.into()),
            content: content.into(),
            active_form: active_form.into(),
            status: TaskStatus::Pending,
            blocked_by: Vec::new(),
        }
    }

    pub fn blocked_by(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_by = ids.into_iter().map(|id| normalize_id(&id.into())).collect();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// Normalizes a raw task id to the canonical `#<digits>` form. Ids that
/// already start with `#` pass through unchanged; a bare numeric id gets
/// `#` prepended. Non-numeric, non-prefixed ids pass through unchanged
/// (they are simply unusual, not necessarily invalid — validation is the
/// job of [`crate::deadlock::validate`]).
pub fn normalize_id(raw: &str) -> String {
    if raw.starts_with('#') {
        raw.to_string()
    } else {
        format!("#{raw}")
    }
}

/// The "feature-list" shaped task representation
/// (`{category, description, steps, passes}`) used by simpler
/// feature-list-driven workloads. Lowered one-way into the canonical
/// [`Task`] schema — see spec §9's Open Question on the two co-existing
/// schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureListItem {
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub passes: bool,
}

/// Lowers a feature list into canonical tasks: one task per item, ids
/// assigned `#1..#n` in list order, no cross-item `blocked_by` (the
/// feature-list schema carries no dependency information), status
/// `Completed` when `passes` is true, else `Pending`.
pub fn from_feature_list(items: &[FeatureListItem]) -> Vec<Task> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let id = format!("#{}", i + 1);
            let status = if item.passes { TaskStatus::Completed } else { TaskStatus::Pending };
            Task {
                id,
                content: format!("[{}] {}", item.category, item.description),
                active_form: item.steps.first().cloned().unwrap_or_else(|| "working".to_string()),
                status,
                blocked_by: Vec::new(),
            }
        })
        .collect()
}
