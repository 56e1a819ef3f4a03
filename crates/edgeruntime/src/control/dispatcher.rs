use super::interface::ControlArgs;
use super::registry::ControlRegistry;
use edgecore::{Result, RuntimeError};
use serde_json::Value;
use std::sync::Arc;

/// Key for the type of the control in a JSON request.
pub const TYPE_KEY: &str = "type";

/// Key for the alias of the control in a JSON request.
pub const ALIAS_KEY: &str = "alias";

/// Key for the operation name.
pub const OP_KEY: &str = "op";

/// Key for the argument list. May be missing or empty for operations
/// without arguments.
pub const ARGS_KEY: &str = "args";

/// Executes JSON control requests against a [`ControlRegistry`].
///
/// A request is `{"type": .., "alias": .., "op": .., "args": [..]}`. The
/// target is always resolved by alias, never by raw id.
#[derive(Clone)]
pub struct ControlDispatcher {
    registry: Arc<ControlRegistry>,
}

impl ControlDispatcher {
    pub fn new(registry: Arc<ControlRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    /// Handle a JSON control request on the calling task.
    ///
    /// Returns JSON `null` when the request carries no operation, `false`
    /// when no target or matching operation exists, and `true` once the
    /// operation ran. A failing operation returns its own error.
    pub async fn handle(&self, request: &Value) -> Result<Value> {
        if request.get(OP_KEY).is_none() {
            return Ok(Value::Null);
        }
        self.control_operation(request).await
    }

    async fn control_operation(&self, request: &Value) -> Result<Value> {
        let control_type = required_str(request, TYPE_KEY)?;
        let alias = required_str(request, ALIAS_KEY)?;

        let control = match self.registry.resolve(control_type, alias) {
            Some(control) => control,
            None => {
                tracing::debug!("No control {}:{}", control_type, alias);
                return Ok(Value::Bool(false));
            }
        };

        let op = required_str(request, OP_KEY)?;
        let args: &[Value] = match request.get(ARGS_KEY) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(args)) => args.as_slice(),
            Some(other) => {
                return Err(RuntimeError::InvalidArgument(format!(
                    "'{}' must be an array, got {}",
                    ARGS_KEY, other
                )))
            }
        };

        let params = match control.signature(op, args.len()) {
            Some(params) => params,
            None => {
                tracing::debug!(
                    "No operation {}/{} on {}:{}",
                    op,
                    args.len(),
                    control_type,
                    alias
                );
                return Ok(Value::Bool(false));
            }
        };

        let coerced = params
            .iter()
            .zip(args)
            .map(|(param, arg)| param.coerce(arg))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Invoking {} on {}:{}", op, control_type, alias);
        match control.invoke(op, ControlArgs::new(coerced)) {
            Some(invocation) => invocation.await?,
            None => return Ok(Value::Bool(false)),
        }

        Ok(Value::Bool(true))
    }
}

fn required_str<'a>(request: &'a Value, key: &str) -> Result<&'a str> {
    request
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::InvalidArgument(format!("request requires a string '{}'", key)))
}
