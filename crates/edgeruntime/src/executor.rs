use crate::oplet::{Oplet, OpletContext, RuntimeServices};
use crate::topology::StageGraph;
use async_trait::async_trait;
use edgecore::{Cause, JobId, Result, RuntimeError, StageError, Tuple};
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

/// Runtime handle starting, stopping and awaiting one job's graph.
///
/// A [`Job`](crate::Job) drives these in response to state changes; it does
/// not implement them.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Wait for the graph to complete, without bound when `timeout` is
    /// `None`. Returns `Ok(false)` if the bound elapsed first.
    async fn complete(&self, timeout: Option<Duration>) -> Result<bool>;
}

#[derive(Clone)]
enum Completion {
    Pending,
    Completed,
    Failed(Cause),
}

impl Completion {
    fn is_done(&self) -> bool {
        !matches!(self, Completion::Pending)
    }
}

struct Stage {
    oplet: Box<dyn Oplet>,
    ctx: OpletContext,
}

enum Phase {
    Constructed(StageGraph),
    Initialized(Vec<Stage>),
    Started,
    Closed,
}

/// Executes a [`StageGraph`] with one tokio task per stage.
///
/// The graph completes when every stage has returned. The first failing
/// stage cancels the others and becomes the completion failure.
pub struct GraphExecutable {
    job_id: JobId,
    services: RuntimeServices,
    stream_capacity: usize,
    phase: Mutex<Phase>,
    cancellation: CancellationToken,
    completion: Arc<watch::Sender<Completion>>,
}

impl GraphExecutable {
    pub fn new(
        job_id: JobId,
        graph: StageGraph,
        services: RuntimeServices,
        stream_capacity: usize,
    ) -> Self {
        let (completion, _) = watch::channel(Completion::Pending);
        Self {
            job_id,
            services,
            stream_capacity: stream_capacity.max(1),
            phase: Mutex::new(Phase::Constructed(graph)),
            cancellation: CancellationToken::new(),
            completion: Arc::new(completion),
        }
    }

    /// Wire the stages with channels, in topological order.
    fn prepare(&self, graph: StageGraph) -> Result<Vec<Stage>> {
        let order = toposort(&graph, None).map_err(|cycle| {
            RuntimeError::InvalidArgument(format!(
                "graph contains a cycle through stage OP_{}",
                cycle.node_id().index()
            ))
        })?;

        // A stage with inputs gets one channel; every upstream shares its sender.
        let mut inputs: HashMap<NodeIndex, mpsc::Receiver<Tuple>> = HashMap::new();
        let mut senders: HashMap<NodeIndex, mpsc::Sender<Tuple>> = HashMap::new();
        for index in graph.node_indices() {
            if graph
                .neighbors_directed(index, petgraph::Direction::Incoming)
                .next()
                .is_some()
            {
                let (tx, rx) = mpsc::channel(self.stream_capacity);
                senders.insert(index, tx);
                inputs.insert(index, rx);
            }
        }

        let mut outputs: HashMap<NodeIndex, Vec<mpsc::Sender<Tuple>>> = HashMap::new();
        for edge in graph.raw_edges() {
            if let Some(tx) = senders.get(&edge.target()) {
                outputs.entry(edge.source()).or_default().push(tx.clone());
            }
        }
        drop(senders);

        let (nodes, _) = graph.into_nodes_edges();
        let mut oplets: Vec<Option<Box<dyn Oplet>>> =
            nodes.into_iter().map(|node| Some(node.weight)).collect();

        let scheduler = tokio::runtime::Handle::current();
        let mut stages = Vec::with_capacity(oplets.len());
        for index in order {
            let Some(oplet) = oplets[index.index()].take() else {
                continue;
            };
            let ctx = OpletContext::new(
                format!("OP_{}", index.index()),
                self.job_id.clone(),
                self.services.clone(),
                scheduler.clone(),
                inputs.remove(&index),
                outputs.remove(&index).unwrap_or_default(),
                self.cancellation.child_token(),
            );
            stages.push(Stage { oplet, ctx });
        }
        Ok(stages)
    }

    /// Close stages that were initialized but never run.
    async fn close_stages(stages: &mut [Stage]) {
        for stage in stages.iter_mut() {
            stage.ctx.disconnect();
            if let Err(e) = stage.oplet.close(&stage.ctx).await {
                tracing::warn!("Closing stage {} failed: {}", stage.ctx.stage_id(), e);
            }
        }
    }

    async fn run_stage(mut stage: Stage) -> std::result::Result<(), StageError> {
        let result = stage.oplet.run(&mut stage.ctx).await;
        stage.ctx.disconnect();
        let closed = stage.oplet.close(&stage.ctx).await;
        if let Err(e) = &result {
            tracing::error!("Stage {} ({}) failed: {}", stage.ctx.stage_id(), stage.oplet.kind(), e);
        }
        result.and(closed)
    }

    fn spawn_supervisor(&self, stages: Vec<Stage>) {
        let job_id = self.job_id.clone();
        let cancellation = self.cancellation.clone();
        let completion = self.completion.clone();

        let mut running: FuturesUnordered<_> = stages
            .into_iter()
            .map(|stage| tokio::spawn(Self::run_stage(stage)))
            .collect();

        tokio::spawn(async move {
            let mut failure: Option<Cause> = None;
            while let Some(joined) = running.next().await {
                let outcome: std::result::Result<(), Cause> = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(Arc::new(e)),
                    Err(join_error) => Err(Arc::new(join_error)),
                };
                if let Err(cause) = outcome {
                    if failure.is_none() && !cancellation.is_cancelled() {
                        cancellation.cancel();
                        failure = Some(cause);
                    }
                }
            }

            match failure {
                Some(cause) => {
                    tracing::error!("Job {} graph failed: {}", job_id, cause);
                    completion.send_replace(Completion::Failed(cause));
                }
                None => {
                    tracing::info!("Job {} graph completed", job_id);
                    completion.send_replace(Completion::Completed);
                }
            }
        });
    }
}

#[async_trait]
impl Executable for GraphExecutable {
    async fn initialize(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        let graph = match std::mem::replace(&mut *phase, Phase::Closed) {
            Phase::Constructed(graph) => graph,
            other => {
                *phase = other;
                return Err(RuntimeError::InvalidArgument(
                    "graph already initialized".to_string(),
                ));
            }
        };

        let mut stages = self.prepare(graph)?;
        for initialized in 0..stages.len() {
            let stage = &mut stages[initialized];
            if let Err(e) = stage.oplet.initialize(&stage.ctx).await {
                tracing::error!(
                    "Stage {} ({}) failed to initialize: {}",
                    stage.ctx.stage_id(),
                    stage.oplet.kind(),
                    e
                );
                Self::close_stages(&mut stages[..initialized]).await;
                return Err(e.into());
            }
        }

        tracing::info!("Job {} initialized {} stages", self.job_id, stages.len());
        *phase = Phase::Initialized(stages);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        let stages = match std::mem::replace(&mut *phase, Phase::Started) {
            Phase::Initialized(stages) => stages,
            other => {
                *phase = other;
                return Err(RuntimeError::InvalidArgument(
                    "graph is not initialized".to_string(),
                ));
            }
        };

        tracing::info!("Job {} starting {} stages", self.job_id, stages.len());
        self.spawn_supervisor(stages);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancellation.cancel();

        let started = {
            let mut phase = self.phase.lock().await;
            match std::mem::replace(&mut *phase, Phase::Closed) {
                Phase::Started => true,
                Phase::Initialized(mut stages) => {
                    Self::close_stages(&mut stages).await;
                    false
                }
                Phase::Constructed(_) | Phase::Closed => false,
            }
        };

        if started {
            let mut completion = self.completion.subscribe();
            // The sender lives as long as `self`, so waiting cannot fail.
            let _ = completion.wait_for(Completion::is_done).await;
        } else {
            self.completion.send_if_modified(|state| {
                if state.is_done() {
                    false
                } else {
                    *state = Completion::Completed;
                    true
                }
            });
        }
        Ok(())
    }

    async fn complete(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut completion = self.completion.subscribe();
        let wait = async {
            completion
                .wait_for(Completion::is_done)
                .await
                .map(|state| (*state).clone())
        };

        let state = match timeout {
            Some(bound) => match tokio::time::timeout(bound, wait).await {
                Ok(state) => state,
                Err(_) => return Ok(false),
            },
            None => wait.await,
        };

        match state {
            Ok(Completion::Failed(cause)) => Err(RuntimeError::ExecutionFailure(cause)),
            Ok(_) => Ok(true),
            Err(_) => Err(RuntimeError::InvalidArgument(
                "completion signal dropped".to_string(),
            )),
        }
    }
}
