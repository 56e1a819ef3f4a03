use edgecore::{ControlEnum, Result, RuntimeError};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Declared type of an operation parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Int,
    Long,
    Double,
    Boolean,
    Enum(EnumType),
    /// A native type with no JSON representation. Interfaces declaring one
    /// are not eligible for registration.
    Opaque(&'static str),
}

/// Name and constants of an enum parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: &'static str,
    pub constants: Vec<&'static str>,
}

impl ParamType {
    pub fn enumeration<E: ControlEnum>() -> Self {
        ParamType::Enum(EnumType {
            name: E::TYPE_NAME,
            constants: E::constant_names(),
        })
    }

    pub fn is_json_representable(&self) -> bool {
        !matches!(self, ParamType::Opaque(_))
    }

    /// Coerce a JSON argument into a value of this type.
    pub fn coerce(&self, arg: &Value) -> Result<ControlArg> {
        match self {
            ParamType::String => match arg {
                Value::String(s) => Ok(ControlArg::String(s.clone())),
                Value::Object(_) => Ok(ControlArg::String(serde_json::to_string(arg)?)),
                Value::Number(n) => Ok(ControlArg::String(n.to_string())),
                Value::Bool(b) => Ok(ControlArg::String(b.to_string())),
                _ => Err(mismatch(self, arg)),
            },
            ParamType::Int => {
                let n = integer(arg).ok_or_else(|| mismatch(self, arg))?;
                i32::try_from(n)
                    .map(ControlArg::Int)
                    .map_err(|_| mismatch(self, arg))
            }
            ParamType::Long => integer(arg)
                .map(ControlArg::Long)
                .ok_or_else(|| mismatch(self, arg)),
            ParamType::Double => {
                let d = match arg {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                d.map(ControlArg::Double).ok_or_else(|| mismatch(self, arg))
            }
            ParamType::Boolean => match arg {
                Value::Bool(b) => Ok(ControlArg::Boolean(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(ControlArg::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(ControlArg::Boolean(false)),
                _ => Err(mismatch(self, arg)),
            },
            ParamType::Enum(enum_type) => {
                let name = arg.as_str().ok_or_else(|| mismatch(self, arg))?;
                if enum_type.constants.contains(&name) {
                    Ok(ControlArg::Enum(name.to_string()))
                } else {
                    Err(RuntimeError::InvalidArgument(format!(
                        "no constant {} in {}",
                        name, enum_type.name
                    )))
                }
            }
            ParamType::Opaque(name) => Err(RuntimeError::UnsupportedArgumentType(name.to_string())),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => f.write_str("string"),
            ParamType::Int => f.write_str("int"),
            ParamType::Long => f.write_str("long"),
            ParamType::Double => f.write_str("double"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::Enum(e) => f.write_str(e.name),
            ParamType::Opaque(name) => f.write_str(name),
        }
    }
}

fn integer(arg: &Value) -> Option<i64> {
    match arg {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn mismatch(expected: &ParamType, arg: &Value) -> RuntimeError {
    RuntimeError::InvalidArgument(format!("cannot convert {} to {}", arg, expected))
}

/// A coerced operation argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlArg {
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Enum(String),
}

/// Coerced arguments handed to an operation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlArgs(Vec<ControlArg>);

impl ControlArgs {
    pub fn new(args: Vec<ControlArg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, index: usize) -> Result<&ControlArg> {
        self.0
            .get(index)
            .ok_or_else(|| RuntimeError::InvalidArgument(format!("missing argument {}", index)))
    }

    pub fn string(&self, index: usize) -> Result<&str> {
        match self.get(index)? {
            ControlArg::String(s) => Ok(s),
            other => Err(wrong_kind(index, "string", other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        match self.get(index)? {
            ControlArg::Int(n) => Ok(*n),
            other => Err(wrong_kind(index, "int", other)),
        }
    }

    pub fn long(&self, index: usize) -> Result<i64> {
        match self.get(index)? {
            ControlArg::Long(n) => Ok(*n),
            other => Err(wrong_kind(index, "long", other)),
        }
    }

    pub fn double(&self, index: usize) -> Result<f64> {
        match self.get(index)? {
            ControlArg::Double(d) => Ok(*d),
            other => Err(wrong_kind(index, "double", other)),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        match self.get(index)? {
            ControlArg::Boolean(b) => Ok(*b),
            other => Err(wrong_kind(index, "boolean", other)),
        }
    }

    pub fn enumeration<E: ControlEnum>(&self, index: usize) -> Result<E> {
        match self.get(index)? {
            ControlArg::Enum(name) => E::from_constant(name).ok_or_else(|| {
                RuntimeError::InvalidArgument(format!("no constant {} in {}", name, E::TYPE_NAME))
            }),
            other => Err(wrong_kind(index, E::TYPE_NAME, other)),
        }
    }
}

fn wrong_kind(index: usize, expected: &str, actual: &ControlArg) -> RuntimeError {
    RuntimeError::InvalidArgument(format!(
        "argument {} should be {}, got {:?}",
        index, expected, actual
    ))
}

pub(crate) type OperationFn<T> =
    Arc<dyn Fn(Arc<T>, ControlArgs) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One remotely invocable operation of a control interface.
pub struct Operation<T: ?Sized> {
    name: &'static str,
    params: Vec<ParamType>,
    pub(crate) invoke: OperationFn<T>,
}

impl<T: ?Sized> Operation<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Operation table of a control object of type `T`.
///
/// Operations are addressed by name and argument count; overloading on
/// parameter types alone is rejected by [`ControlInterface::validate`].
pub struct ControlInterface<T: ?Sized> {
    name: &'static str,
    operations: Vec<Operation<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ControlInterface<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            operations: Vec::new(),
        }
    }

    pub fn operation<F, Fut>(
        mut self,
        name: &'static str,
        params: impl Into<Vec<ParamType>>,
        f: F,
    ) -> Self
    where
        F: Fn(Arc<T>, ControlArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let invoke: OperationFn<T> = Arc::new(move |control, args| Box::pin(f(control, args)));
        self.operations.push(Operation {
            name,
            params: params.into(),
            invoke,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn operations(&self) -> &[Operation<T>] {
        &self.operations
    }

    /// Operation with exactly this name and argument count.
    pub fn find(&self, name: &str, arity: usize) -> Option<&Operation<T>> {
        self.operations
            .iter()
            .find(|op| op.name == name && op.arity() == arity)
    }

    /// Whether both tables declare the same name and operation signatures.
    pub fn same_signatures(&self, other: &ControlInterface<T>) -> bool {
        self.name == other.name
            && self.operations.len() == other.operations.len()
            && other.operations.iter().all(|theirs| {
                self.find(theirs.name, theirs.arity())
                    .is_some_and(|ours| ours.params == theirs.params)
            })
    }

    /// Check the interface is usable through JSON control requests.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| RuntimeError::InvalidControlInterface {
            interface: self.name.to_string(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("interface name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for op in &self.operations {
            if op.name.is_empty() {
                return Err(invalid("operation name is empty".to_string()));
            }
            if !seen.insert((op.name, op.arity())) {
                return Err(invalid(format!(
                    "operation {} declared twice with {} arguments",
                    op.name,
                    op.arity()
                )));
            }
            if let Some(param) = op.params.iter().find(|p| !p.is_json_representable()) {
                return Err(invalid(format!(
                    "operation {} takes unsupported parameter type {}",
                    op.name, param
                )));
            }
        }
        Ok(())
    }
}
