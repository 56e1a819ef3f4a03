//! Remotely invocable controls.
//!
//! Components publish an operation table ([`ControlInterface`]) into a
//! [`ControlRegistry`]; the [`ControlDispatcher`] resolves JSON requests
//! against it by operation name and argument count.

mod dispatcher;
mod interface;
mod registry;

pub use dispatcher::{ControlDispatcher, ALIAS_KEY, ARGS_KEY, OP_KEY, TYPE_KEY};
pub use interface::{ControlArg, ControlArgs, ControlInterface, EnumType, Operation, ParamType};
pub use registry::ControlRegistry;
