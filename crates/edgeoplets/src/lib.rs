//! Standard oplet library
//!
//! Sources, transforms and sinks for common stages, plus [`TopologyExt`]
//! for wiring them into a [`Topology`] fluently.

mod debug;
mod sink;
mod source;
mod time;
mod transform;

pub use debug::DebugSink;
pub use sink::{PublishOplet, SinkOplet};
pub use source::ValuesSource;
pub use time::{FetchFn, PeriodicSource};
pub use transform::{JsonParseOplet, MapOplet};

use edgecore::{StageError, TimeUnit, Tuple};
use edgeruntime::{Stream, Topology};

/// Fluent helpers adding the standard oplets to a topology
pub trait TopologyExt {
    /// Source emitting `values` as JSON strings.
    fn strings<I, S>(&mut self, values: I) -> Stream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;

    fn values<I>(&mut self, values: I) -> Stream
    where
        I: IntoIterator<Item = Tuple>;

    /// Source calling `fetch` every `period` `unit`s.
    fn poll<F>(&mut self, period: u64, unit: TimeUnit, fetch: F) -> Stream
    where
        F: Fn() -> Result<Option<Tuple>, StageError> + Send + Sync + 'static;

    fn map<F>(&mut self, input: Stream, f: F) -> Stream
    where
        F: FnMut(Tuple) -> Option<Tuple> + Send + 'static;

    fn sink<F>(&mut self, input: Stream, f: F)
    where
        F: FnMut(Tuple) + Send + 'static;

    fn publish(&mut self, input: Stream, topic: &str);

    fn debug(&mut self, input: Stream);
}

impl TopologyExt for Topology {
    fn strings<I, S>(&mut self, values: I) -> Stream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_source(ValuesSource::strings(values))
    }

    fn values<I>(&mut self, values: I) -> Stream
    where
        I: IntoIterator<Item = Tuple>,
    {
        self.add_source(ValuesSource::new(values))
    }

    fn poll<F>(&mut self, period: u64, unit: TimeUnit, fetch: F) -> Stream
    where
        F: Fn() -> Result<Option<Tuple>, StageError> + Send + Sync + 'static,
    {
        self.add_source(PeriodicSource::new(period, unit, fetch))
    }

    fn map<F>(&mut self, input: Stream, f: F) -> Stream
    where
        F: FnMut(Tuple) -> Option<Tuple> + Send + 'static,
    {
        self.add_stage(input, MapOplet::new(f))
    }

    fn sink<F>(&mut self, input: Stream, f: F)
    where
        F: FnMut(Tuple) + Send + 'static,
    {
        self.add_sink(input, SinkOplet::new(f))
    }

    fn publish(&mut self, input: Stream, topic: &str) {
        self.add_sink(input, PublishOplet::new(topic))
    }

    fn debug(&mut self, input: Stream) {
        self.add_sink(input, DebugSink)
    }
}
