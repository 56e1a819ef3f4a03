use crate::job::Job;
use crate::oplet::Oplet;
use async_trait::async_trait;
use edgecore::{JsonObject, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::sync::Arc;

/// Graph of stages owned by one job.
pub type StageGraph = DiGraph<Box<dyn Oplet>, ()>;

/// Handle on the output of a stage within a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream {
    index: NodeIndex,
}

/// A not-yet-running description of a dataflow graph.
pub struct Topology {
    name: String,
    graph: StageGraph,
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: DiGraph::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a stage with no input.
    pub fn add_source(&mut self, oplet: impl Oplet + 'static) -> Stream {
        Stream {
            index: self.graph.add_node(Box::new(oplet)),
        }
    }

    /// Add a stage consuming `input` and return its output stream.
    pub fn add_stage(&mut self, input: Stream, oplet: impl Oplet + 'static) -> Stream {
        let index = self.graph.add_node(Box::new(oplet));
        self.graph.add_edge(input.index, index, ());
        Stream { index }
    }

    /// Add a terminal stage consuming `input`.
    pub fn add_sink(&mut self, input: Stream, oplet: impl Oplet + 'static) {
        self.add_stage(input, oplet);
    }

    /// Feed `other` into the stage producing `into` as an additional input.
    pub fn connect(&mut self, other: Stream, into: Stream) {
        self.graph.add_edge(other.index, into.index, ());
    }

    pub fn stage_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Kinds of the stages, in insertion order.
    pub fn stage_kinds(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .map(|oplet| oplet.kind().to_string())
            .collect()
    }

    pub(crate) fn into_graph(self) -> StageGraph {
        self.graph
    }
}

/// Creates empty topologies.
pub trait TopologyProvider: Send + Sync {
    fn new_topology(&self, name: &str) -> Topology;
}

/// Turns a built topology into a running job.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, topology: Topology, config: JsonObject) -> Result<Arc<Job>>;
}
