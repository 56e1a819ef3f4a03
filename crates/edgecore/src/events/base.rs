use crate::{JobId, JobSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted as jobs come and go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    JobAdded {
        snapshot: JobSnapshot,
    },
    JobUpdated {
        snapshot: JobSnapshot,
    },
    JobRemoved {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobAdded { snapshot } | JobEvent::JobUpdated { snapshot } => &snapshot.id,
            JobEvent::JobRemoved { job_id, .. } => job_id,
        }
    }
}

/// Broadcast bus for job events
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Send an event; having no subscribers is not an error.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }
}
