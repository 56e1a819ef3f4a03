use edgecore::{EventBus, JobEvent, JobId, JobSnapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Receives job snapshots as jobs are created and change state.
///
/// Jobs only ever write to a registry; they never read it back.
pub trait JobRegistry: Send + Sync {
    fn add_job(&self, snapshot: JobSnapshot);

    fn update_job(&self, snapshot: JobSnapshot);

    /// Forget a job. Returns whether it was known.
    fn remove_job(&self, job_id: &str) -> bool;
}

/// Job registry keeping the latest snapshot of every job and broadcasting
/// each change as a [`JobEvent`].
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, JobSnapshot>>,
    events: Arc<EventBus>,
}

impl InMemoryJobRegistry {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            events: Arc::new(EventBus::new(event_buffer_size)),
        }
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.read().get(job_id).cloned()
    }

    /// Latest snapshot of every known job, ordered by id.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self.read().values().cloned().collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, JobSnapshot>> {
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, snapshot: JobSnapshot) {
        self.jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(snapshot.id.clone(), snapshot);
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn add_job(&self, snapshot: JobSnapshot) {
        tracing::info!("Job added: {} ({})", snapshot.id, snapshot.name);
        self.store(snapshot.clone());
        self.events.emit(JobEvent::JobAdded { snapshot });
    }

    fn update_job(&self, snapshot: JobSnapshot) {
        tracing::debug!(
            "Job updated: {} {} -> {:?}",
            snapshot.id,
            snapshot.current_state,
            snapshot.next_state
        );
        self.store(snapshot.clone());
        self.events.emit(JobEvent::JobUpdated { snapshot });
    }

    fn remove_job(&self, job_id: &str) -> bool {
        let removed = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(job_id)
            .is_some();
        if removed {
            tracing::info!("Job removed: {}", job_id);
            self.events.emit(JobEvent::JobRemoved {
                job_id: job_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        removed
    }
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new(edgecore::RuntimeConfig::default().event_buffer_size)
    }
}
