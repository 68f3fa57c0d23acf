//! Telemetry surface (C8): maps runner progress events onto structured
//! telemetry events, buffers and flushes them through an opt-out-able
//! JSONL collector, and offers imperative tracking brackets for
//! user-level phases.
//!
//! Additive to `tracing`, never a replacement for it — node-level
//! `tracing` events fire unconditionally regardless of whether a
//! [`TelemetryCollector`] is wired up.

pub mod collector;
pub mod error;
pub mod events;
pub mod tracker;

pub use collector::{anonymous_id, is_tracking_enabled, CollectorConfig, TelemetryCollector};
pub use error::{Result, TelemetryError};
pub use events::{map_progress_event, EventFilter, TelemetryEvent};
pub use tracker::{with_execution_tracking, with_workflow_telemetry};
