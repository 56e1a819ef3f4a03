use crate::control::ControlRegistry;
use crate::pubsub::PublishSubscribe;
use crate::registry::JobRegistry;
use async_trait::async_trait;
use edgecore::{StageError, Tuple};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Services a runtime makes available to jobs and their stages.
///
/// Every service is optional; a component whose service is missing runs
/// without it (no control registration, no registry updates).
#[derive(Clone, Default)]
pub struct RuntimeServices {
    pub controls: Option<Arc<ControlRegistry>>,
    pub jobs: Option<Arc<dyn JobRegistry>>,
    pub pubsub: Option<Arc<PublishSubscribe>>,
}

impl RuntimeServices {
    /// The publish/subscribe service, or a stage error naming it.
    pub fn require_pubsub(&self) -> Result<&Arc<PublishSubscribe>, StageError> {
        self.pubsub
            .as_ref()
            .ok_or_else(|| StageError::MissingService("PublishSubscribe".to_string()))
    }
}

/// A single processing stage of a running graph.
#[async_trait]
pub trait Oplet: Send {
    /// Short type identifier (e.g. "source.strings", "sink.publish")
    fn kind(&self) -> &str;

    /// Optional: acquire resources before the graph starts.
    async fn initialize(&mut self, _ctx: &OpletContext) -> Result<(), StageError> {
        Ok(())
    }

    /// Process the stage until its input drains or the job is cancelled.
    async fn run(&mut self, ctx: &mut OpletContext) -> Result<(), StageError>;

    /// Optional: release resources once `run` has returned.
    async fn close(&mut self, _ctx: &OpletContext) -> Result<(), StageError> {
        Ok(())
    }
}

/// Execution context handed to each stage
pub struct OpletContext {
    stage_id: String,
    job_id: String,
    services: RuntimeServices,
    scheduler: tokio::runtime::Handle,
    input: Option<mpsc::Receiver<Tuple>>,
    emitter: Emitter,
}

impl OpletContext {
    pub(crate) fn new(
        stage_id: String,
        job_id: String,
        services: RuntimeServices,
        scheduler: tokio::runtime::Handle,
        input: Option<mpsc::Receiver<Tuple>>,
        outputs: Vec<mpsc::Sender<Tuple>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            stage_id,
            job_id,
            services,
            scheduler,
            input,
            emitter: Emitter {
                outputs,
                cancellation,
            },
        }
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    /// Scheduling facility for work the stage runs on its own cadence.
    pub fn scheduler(&self) -> &tokio::runtime::Handle {
        &self.scheduler
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.emitter.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.emitter.cancellation.is_cancelled()
    }

    /// A name unique to this stage of this job.
    pub fn uniquify(&self, name: &str) -> String {
        format!("{}.{}.{}", self.job_id, self.stage_id, name)
    }

    /// Next input tuple; `None` once the input drained or the job is
    /// cancelled.
    pub async fn next(&mut self) -> Option<Tuple> {
        let cancellation = self.emitter.cancellation.clone();
        match self.input.as_mut() {
            Some(input) => tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                tuple = input.recv() => tuple,
            },
            None => None,
        }
    }

    /// Send a tuple to every downstream stage.
    pub async fn submit(&self, tuple: Tuple) -> Result<(), StageError> {
        self.emitter.submit(tuple).await
    }

    /// Cloneable handle on this stage's outputs.
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }

    /// Release the outputs so downstream stages see end of stream.
    pub(crate) fn disconnect(&mut self) {
        self.emitter.outputs.clear();
        self.input = None;
    }
}

/// Sends tuples to the downstream stages of one stage.
#[derive(Clone)]
pub struct Emitter {
    outputs: Vec<mpsc::Sender<Tuple>>,
    cancellation: CancellationToken,
}

impl Emitter {
    /// Send `tuple` downstream. Tuples submitted after cancellation are
    /// dropped; a stage whose every consumer is gone gets `Disconnected`.
    pub async fn submit(&self, tuple: Tuple) -> Result<(), StageError> {
        if self.outputs.is_empty() {
            return Ok(());
        }

        let mut delivered = false;
        for output in &self.outputs {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Ok(()),
                sent = output.send(tuple.clone()) => delivered |= sent.is_ok(),
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(StageError::Disconnected)
        }
    }
}
