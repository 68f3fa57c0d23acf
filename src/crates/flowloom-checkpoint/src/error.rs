//! Checkpoint storage errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no checkpoint found for execution '{execution_id}' label '{label}'")]
    NotFound { execution_id: String, label: String },

    #[error("checkpoint payload is corrupt: {0}")]
    Corrupt(String),
}
