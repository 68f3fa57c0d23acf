//! State container and reducer system.
//!
//! State is a value-typed JSON object with three mandatory fields —
//! `execution_id`, `last_updated`, `outputs` — plus workload-specific
//! fields. Node executions never mutate state in place: they return a
//! delta, and the scheduler merges it under per-field [`Reducer`]s.
//!
//! ```
//! use flowloom_core::state::{StateSchema, AppendReducer, State};
//! use serde_json::json;
//!
//! let mut schema = StateSchema::new();
//! schema.add_field("debug_reports", Box::new(AppendReducer));
//!
//! let mut state = State::new("exec-1");
//! schema.apply(&mut state, &json!({"debug_reports": ["oops"]})).unwrap();
//! assert_eq!(state.outputs.len(), 0);
//! assert_eq!(state.fields["debug_reports"], json!(["oops"]));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("reducer '{reducer}' failed on field '{field}': {reason}")]
    ReducerError {
        reducer: String,
        field: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// The mandatory envelope every workflow state carries, plus an open bag
/// of workload-specific fields.
///
/// `outputs` and `fields` are kept separate so the reducer for `outputs`
/// (always key-wise merge) can never be overridden by a workload schema —
/// it is a structural invariant of the engine, not a configurable one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub execution_id: String,
    pub last_updated: DateTime<Utc>,
    /// node id -> last result value written by that node
    pub outputs: HashMap<String, Value>,
    /// workload-specific fields, merged per the active `StateSchema`
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl State {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            last_updated: Utc::now(),
            outputs: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A state delta returned by a node's `execute`. Only fields present here
/// are merged; absent fields are left untouched (merge well-formedness,
/// spec §8: `r(a, delta) = a` when `delta` does not mention `f`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_output(mut self, node_id: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(node_id.into(), value);
        self
    }
}

/// Strategy for merging a field's current value with an incoming update.
pub trait Reducer: Send + Sync {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;
    fn name(&self) -> &str;
}

/// Default reducer: last write wins.
#[derive(Debug, Clone, Default)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Concatenates arrays; a scalar update is treated as a single-element
/// append. Used for "accumulating" fields such as `debug_reports`.
#[derive(Debug, Clone, Default)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        let mut items = match current {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        match update {
            Value::Array(new_items) => items.extend(new_items.clone()),
            Value::Null => {}
            other => items.push(other.clone()),
        }
        Ok(Value::Array(items))
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Shallow object merge: keys in `update` overwrite matching keys in
/// `current`, other keys are preserved.
#[derive(Debug, Clone, Default)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        let mut base = match current {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(StateError::ReducerError {
                    reducer: self.name().to_string(),
                    field: String::new(),
                    reason: format!("expected object, got {other}"),
                })
            }
        };
        match update {
            Value::Object(new_map) => {
                for (k, v) in new_map {
                    base.insert(k.clone(), v.clone());
                }
            }
            Value::Null => {}
            other => {
                return Err(StateError::ReducerError {
                    reducer: self.name().to_string(),
                    field: String::new(),
                    reason: format!("expected object update, got {other}"),
                })
            }
        }
        Ok(Value::Object(base))
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Declares, per workload field, how concurrent writes combine. Unknown
/// fields fall back to the schema's default reducer (overwrite unless
/// configured otherwise).
pub struct StateSchema {
    reducers: HashMap<String, Box<dyn Reducer>>,
    default_reducer: Box<dyn Reducer>,
}

impl Default for StateSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self {
            reducers: HashMap::new(),
            default_reducer: Box::new(OverwriteReducer),
        }
    }

    pub fn with_default_reducer(mut self, reducer: Box<dyn Reducer>) -> Self {
        self.default_reducer = reducer;
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, reducer: Box<dyn Reducer>) -> &mut Self {
        self.reducers.insert(name.into(), reducer);
        self
    }

    fn reducer_for(&self, field: &str) -> &dyn Reducer {
        self.reducers
            .get(field)
            .map(|r| r.as_ref())
            .unwrap_or(self.default_reducer.as_ref())
    }

    /// Merges `update` into `state`, producing a fresh `State` value.
    /// `outputs` always uses key-wise overwrite (last writer per node id);
    /// `fields` uses the schema's per-field reducers.
    pub fn merge(&self, state: &State, update: &StateUpdate) -> Result<State> {
        let mut next = state.clone();
        for (k, v) in &update.outputs {
            next.outputs.insert(k.clone(), v.clone());
        }
        for (field, value) in &update.fields {
            let current = next.fields.get(field).cloned().unwrap_or(Value::Null);
            let reducer = self.reducer_for(field);
            let merged = reducer
                .reduce(&current, value)
                .map_err(|e| match e {
                    StateError::ReducerError { reducer, reason, .. } => StateError::ReducerError {
                        reducer,
                        field: field.clone(),
                        reason,
                    },
                    other => other,
                })?;
            next.fields.insert(field.clone(), merged);
        }
        next.last_updated = Utc::now();
        Ok(next)
    }

    /// In-place convenience wrapper over [`StateSchema::merge`], used by
    /// doctests and simple callers that don't need the functional style.
    pub fn apply(&self, state: &mut State, update_json: &Value) -> Result<()> {
        let update: StateUpdate = serde_json::from_value(update_json.clone())
            .map_err(|e| StateError::InvalidState(e.to_string()))?;
        *state = self.merge(state, &update)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overwrite_is_default() {
        let schema = StateSchema::new();
        let state = State::new("exec-1");
        let update = StateUpdate::new().with_field("status", json!("running"));
        let next = schema.merge(&state, &update).unwrap();
        assert_eq!(next.fields["status"], json!("running"));
    }

    #[test]
    fn append_concatenates() {
        let mut schema = StateSchema::new();
        schema.add_field("debug_reports", Box::new(AppendReducer));
        let mut state = State::new("exec-1");
        state.fields.insert("debug_reports".into(), json!(["a"]));
        let update = StateUpdate::new().with_field("debug_reports", json!(["b"]));
        let next = schema.merge(&state, &update).unwrap();
        assert_eq!(next.fields["debug_reports"], json!(["a", "b"]));
    }

    #[test]
    fn merge_well_formedness() {
        // r(a, delta) = a when delta doesn't mention the field.
        let mut schema = StateSchema::new();
        schema.add_field("debug_reports", Box::new(AppendReducer));
        let mut state = State::new("exec-1");
        state.fields.insert("untouched".into(), json!(42));
        let update = StateUpdate::new().with_field("other", json!(1));
        let next = schema.merge(&state, &update).unwrap();
        assert_eq!(next.fields["untouched"], json!(42));
    }

    #[test]
    fn outputs_merge_key_wise() {
        let schema = StateSchema::new();
        let mut state = State::new("exec-1");
        state.outputs.insert("A".into(), json!("ok"));
        let update = StateUpdate::new().with_output("B", json!("done"));
        let next = schema.merge(&state, &update).unwrap();
        assert_eq!(next.outputs["A"], json!("ok"));
        assert_eq!(next.outputs["B"], json!("done"));
    }
}
