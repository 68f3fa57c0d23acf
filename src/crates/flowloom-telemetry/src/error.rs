use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("collector already shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
