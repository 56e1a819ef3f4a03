mod base;

pub use base::{EventBus, JobEvent};
