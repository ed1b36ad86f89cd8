//! Native callables and receiver binding

use super::Value;
use crate::error::VmError;
use crate::types::Instance;
use crate::vm::CallContext;
use std::fmt;
use std::rc::{Rc, Weak};

/// Signature of registry builtins
pub type BuiltinFn = fn(&mut CallContext<'_>) -> Result<Value, VmError>;

/// Signature of host-provided closures
pub type UserFn = Rc<dyn Fn(&mut CallContext<'_>) -> Result<Value, VmError>>;

/// A builtin from the process-wide registry
#[derive(Debug, Clone)]
pub struct BuiltinFunction {
    pub name: String,
    pub func: BuiltinFn,
    /// Receives the value preceding it on the stack as `this`
    pub is_method: bool,
}

/// A host-provided native closure
#[derive(Clone)]
pub struct UserFunction {
    pub name: String,
    pub func: UserFn,
    pub is_method: bool,
}

impl UserFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut CallContext<'_>) -> Result<Value, VmError> + 'static,
    ) -> Self {
        UserFunction {
            name: name.into(),
            func: Rc::new(func),
            is_method: false,
        }
    }

    pub fn method(mut self) -> Self {
        self.is_method = true;
        self
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("is_method", &self.is_method)
            .finish()
    }
}

impl From<UserFunction> for Value {
    fn from(u: UserFunction) -> Self {
        Value::UserFunction(Rc::new(u))
    }
}

/// Receiver of a bound method.
///
/// Methods cached on an [`Instance`] hold it weakly, so the instance never
/// keeps itself alive through its own cache.
#[derive(Debug, Clone)]
pub enum Receiver {
    Strong(Value),
    Instance(Weak<Instance>),
}

impl Receiver {
    pub fn get(&self) -> Result<Value, VmError> {
        match self {
            Receiver::Strong(v) => Ok(v.clone()),
            Receiver::Instance(weak) => weak
                .upgrade()
                .map(Value::Instance)
                .ok_or_else(|| VmError::Conversion("method receiver no longer exists".into())),
        }
    }
}

/// A callable paired with the receiver it was looked up on
#[derive(Debug)]
pub struct BoundMethod {
    pub func: Value,
    pub receiver: Receiver,
}
