use crate::Action;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, cloneable cause carried by [`RuntimeError::ExecutionFailure`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Control already registered: {0}")]
    DuplicateControl(String),

    #[error("Invalid control interface '{interface}': {reason}")]
    InvalidControlInterface { interface: String, reason: String },

    #[error("Illegal state transition requested by action {0}")]
    IllegalTransition(Action),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported argument type: {0}")]
    UnsupportedArgumentType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution failed: {0}")]
    ExecutionFailure(#[source] Cause),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Wrap `err` as an execution failure. An error that already is one is
    /// returned unchanged so the original cause stays one `source()` away.
    pub fn execution(err: RuntimeError) -> RuntimeError {
        match err {
            RuntimeError::ExecutionFailure(_) => err,
            other => RuntimeError::ExecutionFailure(Arc::new(other)),
        }
    }

    /// The cause of an execution failure, if this is one.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            RuntimeError::ExecutionFailure(cause) => Some(cause),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("Missing runtime service: {0}")]
    MissingService(String),

    #[error("Stage initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Stage failed: {0}")]
    Failed(String),

    #[error("Downstream disconnected")]
    Disconnected,
}
