//! Core types for the edge dataflow runtime
//!
//! This crate provides the shared vocabulary every other crate depends on:
//! the error taxonomy, job states and actions, time units, job events and
//! runtime configuration. It has no runtime behaviour of its own.

mod config;
mod control;
mod error;
pub mod events;
mod job;
mod time;

pub use config::{configs, RuntimeConfig, DEFAULT_APPLICATION_ALIAS};
pub use control::ControlEnum;
pub use error::{Cause, RuntimeError, StageError};
pub use events::*;
pub use job::{Action, JobId, JobSnapshot, JobState};
pub use time::TimeUnit;

/// Tuples flowing between stages are JSON values.
pub type Tuple = serde_json::Value;

/// JSON object used for submission configuration.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
