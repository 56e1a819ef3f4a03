use serde::{Deserialize, Serialize};

/// Well-known keys of a submission configuration object.
pub mod configs {
    /// Name given to the job created by a submission.
    pub const JOB_NAME: &str = "jobName";
}

/// Default alias of the application service control.
pub const DEFAULT_APPLICATION_ALIAS: &str = "edgeflow.appservice";

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the channel between two connected stages.
    pub stream_capacity: usize,
    /// Capacity of the job event broadcast.
    pub event_buffer_size: usize,
    /// Alias the application service registers its control under.
    pub application_alias: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
            event_buffer_size: 1000,
            application_alias: DEFAULT_APPLICATION_ALIAS.to_string(),
        }
    }
}
