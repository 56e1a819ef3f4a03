use crate::control::{ControlDispatcher, ControlRegistry};
use crate::executor::GraphExecutable;
use crate::job::{next_job_id, Job};
use crate::oplet::RuntimeServices;
use crate::pubsub::PublishSubscribe;
use crate::registry::{InMemoryJobRegistry, JobRegistry};
use crate::topology::{Submitter, Topology, TopologyProvider};
use async_trait::async_trait;
use edgecore::{configs, Action, JobEvent, JobState, JsonObject, Result, RuntimeConfig, RuntimeError};
use std::sync::Arc;

/// In-process runtime: provides topologies and runs submitted ones as jobs
/// on the current tokio runtime.
///
/// Every job it submits is watched; once the job's graph completes or fails
/// the job is closed, its control withdrawn and it is removed from the job
/// registry.
pub struct DirectProvider {
    services: RuntimeServices,
    controls: Arc<ControlRegistry>,
    jobs: Arc<InMemoryJobRegistry>,
    pubsub: Arc<PublishSubscribe>,
    config: RuntimeConfig,
}

impl DirectProvider {
    /// Create a new provider with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new provider with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let controls = Arc::new(ControlRegistry::new());
        let jobs = Arc::new(InMemoryJobRegistry::new(config.event_buffer_size));
        let pubsub = Arc::new(PublishSubscribe::new());
        let services = RuntimeServices {
            controls: Some(controls.clone()),
            jobs: Some(jobs.clone() as Arc<dyn JobRegistry>),
            pubsub: Some(pubsub.clone()),
        };

        Self {
            services,
            controls,
            jobs,
            pubsub,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Services handed to every job and stage this provider runs.
    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    pub fn controls(&self) -> &Arc<ControlRegistry> {
        &self.controls
    }

    pub fn job_registry(&self) -> &Arc<InMemoryJobRegistry> {
        &self.jobs
    }

    pub fn pubsub(&self) -> &Arc<PublishSubscribe> {
        &self.pubsub
    }

    /// Dispatcher resolving control requests against this provider's
    /// controls.
    pub fn dispatcher(&self) -> ControlDispatcher {
        ControlDispatcher::new(self.controls.clone())
    }

    /// Subscribe to job events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.jobs.subscribe()
    }

    async fn launch(
        services: RuntimeServices,
        stream_capacity: usize,
        topology: Topology,
        config: JsonObject,
    ) -> Result<Arc<Job>> {
        let id = next_job_id();
        let topology_name = topology.name().to_string();
        let executable = GraphExecutable::new(
            id.clone(),
            topology.into_graph(),
            services.clone(),
            stream_capacity,
        );

        let name = config
            .get(configs::JOB_NAME)
            .and_then(|name| name.as_str())
            .map(str::to_string);
        let job = Job::new(id, &topology_name, name, Box::new(executable), &services)?;

        let started = async {
            job.state_change(Action::Initialize).await?;
            job.state_change(Action::Start).await
        }
        .await;
        if let Err(e) = started {
            tracing::error!("Job {} failed to start: {}", job.id(), e);
            if let Err(close_error) = job.state_change(Action::Close).await {
                tracing::warn!("Job {} close after failed start: {}", job.id(), close_error);
            }
            Self::withdraw(&job, &services);
            return Err(e);
        }

        tokio::spawn(Self::teardown(job.clone(), services));
        Ok(job)
    }

    /// Close `job` once its graph is done, then withdraw it.
    async fn teardown(job: Arc<Job>, services: RuntimeServices) {
        if let Err(e) = job.complete().await {
            tracing::error!("Job {} failed: {}", job.id(), e);
        }

        if job.next_state().is_none() && job.current_state() != JobState::Closed {
            if let Err(e) = job.state_change(Action::Close).await {
                tracing::debug!("Job {} close after completion: {}", job.id(), e);
            }
        }
        job.closed().await;

        Self::withdraw(&job, &services);
        tracing::info!("Job {} torn down", job.id());
    }

    fn withdraw(job: &Job, services: &RuntimeServices) {
        if let (Some(controls), Some(control_id)) = (&services.controls, job.control_id()) {
            controls.unregister(control_id);
        }
        if let Some(jobs) = &services.jobs {
            jobs.remove_job(job.id());
        }
    }
}

impl Default for DirectProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyProvider for DirectProvider {
    fn new_topology(&self, name: &str) -> Topology {
        Topology::new(name)
    }
}

#[async_trait]
impl Submitter for DirectProvider {
    /// Run `topology` as a new job, returning once it is `RUNNING`.
    ///
    /// The job is named, and its control aliased, by the `jobName` entry of
    /// `config` when present. A name still in use by a live job fails with
    /// `DuplicateControl`.
    async fn submit(&self, topology: Topology, config: JsonObject) -> Result<Arc<Job>> {
        tracing::info!("Submitting topology: {}", topology.name());
        let launched = tokio::spawn(Self::launch(
            self.services.clone(),
            self.config.stream_capacity,
            topology,
            config,
        ));

        match launched.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RuntimeError::ExecutionFailure(Arc::new(e))),
        }
    }
}
