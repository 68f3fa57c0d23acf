//! Checkpoint trait and backends for the workflow execution engine.
//!
//! [`CheckpointSaver`] is the storage abstraction (save/load/list/delete
//! keyed by execution id and an optional label). [`MemoryCheckpointSaver`]
//! is a process-local backend for tests and library embedding;
//! [`FilesystemCheckpointSaver`] persists under a session directory per
//! the layout in spec §6.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use fs::FilesystemCheckpointSaver;
pub use memory::MemoryCheckpointSaver;
pub use traits::{CheckpointSaver, LATEST_LABEL};
