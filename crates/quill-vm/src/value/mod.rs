//! Runtime values
//!
//! Every runtime datum is a [`Value`]. Containers keep their storage in
//! [`Shared`] cells, so cloning a `Value` is cheap and aliases the
//! container; [`Value::copy`] produces an independent deep copy.
//!
//! The capability surface (indexing, iteration, calling, operators) is
//! spread over the submodules; this file holds the enum itself, type
//! names, display, truthiness, equality and copying.

mod callable;
mod graph;
mod index;
mod ops;
mod string;

pub use callable::{BoundMethod, BuiltinFn, BuiltinFunction, Receiver, UserFn, UserFunction};
pub use string::StringObject;

use crate::bytecode::CompiledFunction;
use crate::error::VmError;
use crate::types::{
    Instance, TypeField, TypeFields, TypeMethod, TypeMethods, TypeObject, TypeProperties,
    TypeProperty,
};
use crate::vm::iterator::ValueIterator;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared, interior-mutable storage
pub type Shared<T> = Rc<RefCell<T>>;

/// Helper to create a `Shared<T>`
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// String-keyed map storage used by Map values, tags and instances
pub type ValueMap = HashMap<String, Value>;

/// Upvalue box shared between a closure and its defining scope
pub type Upvalue = Rc<RefCell<Value>>;

/// Runtime value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    /// Sentinel for "use the declared default"
    Default,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(Rc<StringObject>),
    Bytes(Rc<Vec<u8>>),
    Array(Shared<Vec<Value>>),
    ImmutableArray(Shared<Vec<Value>>),
    Map(Shared<ValueMap>),
    ImmutableMap(Shared<ValueMap>),
    /// Script-level error wrapping one value
    Error(Rc<Value>),
    CompiledFunction(Rc<CompiledFunction>),
    Builtin(Rc<BuiltinFunction>),
    UserFunction(Rc<UserFunction>),
    /// Callable bound to a receiver
    BoundMethod(Rc<BoundMethod>),
    ObjectPtr(Upvalue),
    Type(Shared<TypeObject>),
    Instance(Rc<Instance>),
    TypeField(Shared<TypeField>),
    TypeFields(Shared<TypeFields>),
    TypeMethod(Shared<TypeMethod>),
    TypeMethods(Shared<TypeMethods>),
    TypeProperty(Shared<TypeProperty>),
    TypeProperties(Shared<TypeProperties>),
    Iterator(Shared<ValueIterator>),
}

impl Value {
    // ===== Constructors =====

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::new(StringObject::new(s.into())))
    }

    pub fn bytes(b: Vec<u8>) -> Value {
        Value::Bytes(Rc::new(b))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(shared(items))
    }

    pub fn immutable_array(items: Vec<Value>) -> Value {
        Value::ImmutableArray(shared(items))
    }

    pub fn map(map: ValueMap) -> Value {
        Value::Map(shared(map))
    }

    pub fn immutable_map(map: ValueMap) -> Value {
        Value::ImmutableMap(shared(map))
    }

    pub fn error(value: Value) -> Value {
        Value::Error(Rc::new(value))
    }

    pub fn function(func: CompiledFunction) -> Value {
        Value::CompiledFunction(Rc::new(func))
    }

    // ===== Capability surface =====

    /// Type name as seen by scripts
    pub fn type_name(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Default => "default".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Char(_) => "char".into(),
            Value::String(_) => "string".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::Array(_) => "array".into(),
            Value::ImmutableArray(_) => "immutable-array".into(),
            Value::Map(_) => "map".into(),
            Value::ImmutableMap(_) => "immutable-map".into(),
            Value::Error(_) => "error".into(),
            Value::CompiledFunction(_) => "compiled-function".into(),
            Value::Builtin(b) => format!("builtin-function:{}", b.name),
            Value::UserFunction(u) => format!("user-function:{}", u.name),
            Value::BoundMethod(m) => m.func.type_name(),
            Value::ObjectPtr(_) => "<free-var>".into(),
            Value::Type(_) => "type".into(),
            Value::Instance(i) => format!("instance::{}", i.type_ref().borrow().name),
            Value::TypeField(_) => "type-field".into(),
            Value::TypeFields(_) => "type-fields".into(),
            Value::TypeMethod(_) => "type-method".into(),
            Value::TypeMethods(_) => "type-methods".into(),
            Value::TypeProperty(_) => "type-property".into(),
            Value::TypeProperties(_) => "type-properties".into(),
            Value::Iterator(_) => "iterator".into(),
        }
    }

    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Undefined | Value::Default | Value::Error(_) => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => f.is_nan(),
            Value::Char(c) => *c == '\0',
            Value::String(s) => s.as_str().is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(a) | Value::ImmutableArray(a) => a.borrow().is_empty(),
            Value::Map(m) | Value::ImmutableMap(m) => m.borrow().is_empty(),
            Value::Instance(i) => i.values().borrow().is_empty(),
            _ => false,
        }
    }

    /// Equality as seen by `==`: structural for scalars and containers,
    /// identity for everything else
    pub fn equals(&self, other: &Value) -> bool {
        graph::Equality::default().values(self, other)
    }

    /// Deep copy. Containers and type-system tables are copied
    /// recursively; immutable values, types and boxes keep their identity.
    /// Immutable containers copy into their mutable counterparts, and a
    /// container reached twice is copied once.
    pub fn copy(&self) -> Value {
        graph::DeepCopy::default().value(self)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::CompiledFunction(_)
                | Value::Builtin(_)
                | Value::UserFunction(_)
                | Value::BoundMethod(_)
                | Value::Type(_)
        )
    }

    pub fn is_iterable(&self) -> bool {
        matches!(
            self,
            Value::Undefined
                | Value::Default
                | Value::String(_)
                | Value::Bytes(_)
                | Value::Array(_)
                | Value::ImmutableArray(_)
                | Value::Map(_)
                | Value::ImmutableMap(_)
                | Value::Instance(_)
        )
    }

    /// Whether the callable expects its receiver as `this`
    pub fn is_method(&self) -> bool {
        match self {
            Value::CompiledFunction(f) => f.code.is_method,
            Value::Builtin(b) => b.is_method,
            Value::UserFunction(u) => u.is_method,
            Value::BoundMethod(m) => m.func.is_method(),
            _ => false,
        }
    }

    /// Receiver this value is bound to, if any
    pub fn method_target(&self) -> Option<Value> {
        match self {
            Value::BoundMethod(m) => m.receiver.get().ok(),
            _ => None,
        }
    }

    /// Whether [`Value::to_method_of`] accepts this value
    pub fn is_method_convertible(&self) -> bool {
        matches!(
            self,
            Value::CompiledFunction(_)
                | Value::Builtin(_)
                | Value::UserFunction(_)
                | Value::BoundMethod(_)
        )
    }

    /// Bind this callable to a receiver. Compiled functions are duplicated
    /// so every binding carries its own busy flag.
    pub fn to_method_of(&self, receiver: Receiver) -> Result<Value, VmError> {
        let func = match self {
            Value::BoundMethod(m) => m.func.clone(),
            Value::CompiledFunction(f) => Value::CompiledFunction(Rc::new(f.duplicate())),
            v if v.is_method_convertible() => v.clone(),
            other => return Err(VmError::NotAMethod(other.type_name())),
        };
        Ok(Value::BoundMethod(Rc::new(BoundMethod { func, receiver })))
    }

    /// String form used for map keys and string concatenation;
    /// `None` for Undefined
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Value::Undefined => None,
            Value::String(s) => Some(s.as_str().to_string()),
            Value::Char(c) => Some(c.to_string()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Structural mapping of maps, instances and type-system objects
    pub fn to_map(&self, deep: bool) -> Option<ValueMap> {
        match self {
            Value::Map(m) | Value::ImmutableMap(m) => Some(if deep {
                copy_map(&m.borrow())
            } else {
                m.borrow().clone()
            }),
            Value::Instance(i) => Some(if deep {
                copy_map(&i.values().borrow())
            } else {
                i.values().borrow().clone()
            }),
            Value::Type(t) => Some(t.borrow().to_map(deep)),
            Value::TypeField(f) => Some(f.borrow().to_map(deep)),
            Value::TypeFields(f) => Some(f.borrow().to_map(deep)),
            Value::TypeMethod(m) => Some(m.borrow().to_map(deep)),
            Value::TypeMethods(m) => Some(m.borrow().to_map(deep)),
            Value::TypeProperty(p) => Some(p.borrow().to_map(deep)),
            Value::TypeProperties(p) => Some(p.borrow().to_map(deep)),
            _ => None,
        }
    }
}

pub(crate) fn copy_map(map: &ValueMap) -> ValueMap {
    graph::DeepCopy::default().map(map)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        graph::write_value(f, self)
    }
}

impl Value {
    /// Display of values holding no other values
    fn fmt_flat(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "<undefined>"),
            Value::Default => write!(f, "<default>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::CompiledFunction(_) => write!(f, "<compiled-function>"),
            Value::Builtin(b) => write!(f, "<builtin-function:{}>", b.name),
            Value::UserFunction(u) => write!(f, "<user-function:{}>", u.name),
            Value::ObjectPtr(_) => write!(f, "free-var"),
            Value::Type(t) => write!(f, "<type:{}>", t.borrow().name),
            Value::TypeFields(fields) => write!(f, "<fields {}>", fields.borrow().len()),
            Value::TypeMethods(m) => write!(f, "<methods {}>", m.borrow().len()),
            Value::TypeProperty(_) => write!(f, "<property>"),
            Value::TypeProperties(p) => write!(f, "<properties {}>", p.borrow().len()),
            Value::Iterator(_) => write!(f, "<iterator>"),
            Value::Array(_)
            | Value::ImmutableArray(_)
            | Value::Map(_)
            | Value::ImmutableMap(_)
            | Value::Instance(_)
            | Value::Error(_)
            | Value::BoundMethod(_)
            | Value::TypeField(_)
            | Value::TypeMethod(_) => graph::write_value(f, self),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::string(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::array(v)
    }
}
