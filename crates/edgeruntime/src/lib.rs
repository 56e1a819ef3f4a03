//! Job control and execution runtime
//!
//! This crate provides the runtime core: the control registry and JSON
//! control dispatcher, jobs and the executable that runs their stage graphs,
//! periodic scheduling, the application service and the in-process
//! [`DirectProvider`] tying them together.

pub mod control;
mod appservice;
mod executor;
mod job;
mod oplet;
mod periodic;
mod pubsub;
mod registry;
mod runtime;
mod topology;

pub use appservice::{ApplicationService, TopologyBuilder, APPLICATION_SERVICE_TYPE};
pub use control::{ControlDispatcher, ControlInterface, ControlRegistry, ParamType};
pub use executor::{Executable, GraphExecutable};
pub use job::{next_job_id, Job, ID_PREFIX, JOB_CONTROL_TYPE};
pub use oplet::{Emitter, Oplet, OpletContext, RuntimeServices};
pub use periodic::{PeriodicScheduler, PERIODIC_CONTROL_TYPE};
pub use pubsub::PublishSubscribe;
pub use registry::{InMemoryJobRegistry, JobRegistry};
pub use runtime::DirectProvider;
pub use topology::{StageGraph, Stream, Submitter, Topology, TopologyProvider};
