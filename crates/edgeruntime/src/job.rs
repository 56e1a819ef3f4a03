use crate::control::{ControlInterface, ControlRegistry, ParamType};
use crate::executor::Executable;
use crate::oplet::RuntimeServices;
use crate::registry::JobRegistry;
use chrono::Utc;
use edgecore::{Action, JobId, JobSnapshot, JobState, Result, RuntimeError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Prefix of job identifiers.
pub const ID_PREFIX: &str = "JOB_";

/// Control type jobs register under.
pub const JOB_CONTROL_TYPE: &str = "job";

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a new process-unique job id.
pub fn next_job_id() -> JobId {
    format!("{}{}", ID_PREFIX, NEXT_JOB_ID.fetch_add(1, Ordering::SeqCst))
}

struct Status {
    name: String,
    current: JobState,
    next: Option<JobState>,
}

/// A running instance of a topology.
///
/// The job owns its [`Executable`] and moves it through the lifecycle
/// `CONSTRUCTED -> INITIALIZED -> RUNNING -> CLOSED`. One transition may be
/// in flight at a time; requests made meanwhile are rejected.
pub struct Job {
    id: JobId,
    topology_name: String,
    status: Mutex<Status>,
    state: watch::Sender<JobState>,
    executable: Box<dyn Executable>,
    jobs: Option<Arc<dyn JobRegistry>>,
    control_id: Option<String>,
}

impl Job {
    /// Create a job and publish it to the control and job registries in
    /// `services`. The name defaults to `<topologyName>_<id>`.
    pub fn new(
        id: JobId,
        topology_name: &str,
        name: Option<String>,
        executable: Box<dyn Executable>,
        services: &RuntimeServices,
    ) -> Result<Arc<Job>> {
        let name = name.unwrap_or_else(|| format!("{}_{}", topology_name, id));
        let control_id = services
            .controls
            .as_ref()
            .map(|_| ControlRegistry::control_id(JOB_CONTROL_TYPE, &id, Some(&name)));
        let (state, _) = watch::channel(JobState::Constructed);

        let job = Arc::new(Job {
            id,
            topology_name: topology_name.to_string(),
            status: Mutex::new(Status {
                name: name.clone(),
                current: JobState::Constructed,
                next: None,
            }),
            state,
            executable,
            jobs: services.jobs.clone(),
            control_id,
        });

        if let Some(controls) = &services.controls {
            controls.register_control(
                JOB_CONTROL_TYPE,
                &job.id,
                Some(&name),
                Job::control_interface(),
                job.clone(),
            )?;
        }
        if let Some(jobs) = &job.jobs {
            jobs.add_job(job.snapshot());
        }

        tracing::info!("Created job {} ({})", job.id, name);
        Ok(job)
    }

    /// Operations remote callers may invoke on a job.
    pub fn control_interface() -> ControlInterface<Job> {
        ControlInterface::new("JobControl").operation(
            "stateChange",
            [ParamType::enumeration::<Action>()],
            |job: Arc<Job>, args| async move {
                let action = args.enumeration::<Action>(0)?;
                job.state_change(action).await
            },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let mut status = self.lock();
        status.name = name.into();
        self.update_registry(&status);
    }

    pub fn topology_name(&self) -> &str {
        &self.topology_name
    }

    pub fn current_state(&self) -> JobState {
        self.lock().current
    }

    pub fn next_state(&self) -> Option<JobState> {
        self.lock().next
    }

    /// Control id the job registered under, if a control registry was
    /// available.
    pub fn control_id(&self) -> Option<&str> {
        self.control_id.as_deref()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        Self::snapshot_of(&self.id, &self.lock())
    }

    /// Request a state change.
    ///
    /// `CLOSE` is idempotent: closing a closed job succeeds without closing
    /// the executable again. `PAUSE` and `RESUME` are not supported.
    pub async fn state_change(&self, action: Action) -> Result<()> {
        tracing::info!("Job {} state change requested: {}", self.id, action);
        match action {
            Action::Initialize => {
                self.set_next(JobState::Initialized, action)?;
                self.perform(self.executable.initialize()).await
            }
            Action::Start => {
                self.set_next(JobState::Running, action)?;
                self.perform(self.executable.start()).await
            }
            Action::Pause | Action::Resume => {
                Err(RuntimeError::UnsupportedOperation(action.to_string()))
            }
            Action::Close => {
                if self.set_next(JobState::Closed, action)? == JobState::Closed {
                    self.complete_transition();
                    Ok(())
                } else {
                    self.perform(self.executable.close()).await
                }
            }
        }
    }

    /// Wait until the graph completes. Returns immediately if the job is
    /// closed or closing.
    pub async fn complete(&self) -> Result<()> {
        if self.closing() {
            return Ok(());
        }
        self.await_complete(None).await.map(|_| ())
    }

    /// Like [`Job::complete`] but fails with `Timeout` once `timeout`
    /// elapses.
    pub async fn complete_timeout(&self, timeout: Duration) -> Result<()> {
        if self.closing() {
            return Ok(());
        }
        if self.await_complete(Some(timeout)).await? {
            Ok(())
        } else {
            Err(RuntimeError::Timeout(timeout))
        }
    }

    /// Resolves once the job has reached `CLOSED`.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        // `self` owns the sender, so the channel cannot close under us.
        let _ = state.wait_for(|s| *s == JobState::Closed).await;
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closing(&self) -> bool {
        let status = self.lock();
        status.current == JobState::Closed || status.next == Some(JobState::Closed)
    }

    async fn await_complete(&self, timeout: Option<Duration>) -> Result<bool> {
        self.executable
            .complete(timeout)
            .await
            .map_err(RuntimeError::execution)
    }

    /// Mark `desired` as the in-flight transition and return the current
    /// state.
    fn set_next(&self, desired: JobState, cause: Action) -> Result<JobState> {
        let mut status = self.lock();
        if status.next.is_some() || !status.current.can_reach(desired) {
            tracing::warn!(
                "Job {} rejected {}: {} -> {} (in flight: {:?})",
                self.id,
                cause,
                status.current,
                desired,
                status.next
            );
            return Err(RuntimeError::IllegalTransition(cause));
        }
        status.next = Some(desired);
        self.update_registry(&status);
        Ok(status.current)
    }

    async fn perform<F>(&self, action: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        match action.await {
            Ok(()) => {
                self.complete_transition();
                Ok(())
            }
            Err(e) => {
                self.abandon_transition();
                Err(RuntimeError::execution(e))
            }
        }
    }

    fn complete_transition(&self) {
        let mut status = self.lock();
        if let Some(next) = status.next.take() {
            status.current = next;
        }
        tracing::info!("Job {} is {}", self.id, status.current);
        // Registry first: watchers of `closed()` may remove the job right away.
        self.update_registry(&status);
        self.state.send_replace(status.current);
    }

    fn abandon_transition(&self) {
        let mut status = self.lock();
        if let Some(next) = status.next.take() {
            tracing::warn!("Job {} failed to reach {}", self.id, next);
        }
        self.update_registry(&status);
    }

    fn update_registry(&self, status: &Status) {
        if let Some(jobs) = &self.jobs {
            jobs.update_job(Self::snapshot_of(&self.id, status));
        }
    }

    fn snapshot_of(id: &str, status: &Status) -> JobSnapshot {
        JobSnapshot {
            id: id.to_string(),
            name: status.name.clone(),
            current_state: status.current,
            next_state: status.next,
            updated_at: Utc::now(),
        }
    }
}
