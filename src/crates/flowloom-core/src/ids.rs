//! Execution/session id generation (spec §6: "sessionId is an opaque
//! string; the reference generator uses `sess_<millis>_<random>` or a
//! UUID-v4 — either is acceptable as long as it is unique and
//! URL-safe").

use rand::Rng;

/// UUID-v4, matching the teacher's id-generation convention
/// (`Uuid::new_v4().to_string()`) used for workflow/entity ids.
pub fn generate_execution_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The alternate `sess_<millis>_<random>` form, for callers that want a
/// sortable-by-creation-time id instead of a UUID.
pub fn generate_session_id(now_millis: u64) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("sess_{now_millis}_{suffix:08x}")
}
