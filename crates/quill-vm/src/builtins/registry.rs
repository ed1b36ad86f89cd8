//! Process-wide builtin table
//!
//! Bytecode refers to builtins by their `u8` position (`GetBuiltin`), so
//! entries are append-only: a name keeps its index for the life of the
//! process. Every [`Vm`](crate::vm::Vm) snapshots the table when created.

use crate::value::{BuiltinFn, BuiltinFunction, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::rc::Rc;

/// One registered native callable
#[derive(Clone, Debug)]
pub struct BuiltinEntry {
    pub name: String,
    pub func: BuiltinFn,
    /// Takes the value preceding it on the stack as its receiver
    pub is_method: bool,
}

impl BuiltinEntry {
    pub fn to_value(&self) -> Value {
        Value::Builtin(Rc::new(BuiltinFunction {
            name: self.name.clone(),
            func: self.func,
            is_method: self.is_method,
        }))
    }
}

/// Ordered builtin table with a name index
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinEntry>,
    by_name: HashMap<String, u8>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a builtin and return its index
    ///
    /// # Panics
    /// Panics if `name` is already taken or all 256 indices are used.
    pub fn register(&mut self, name: &str, func: BuiltinFn, is_method: bool) -> u8 {
        if self.by_name.contains_key(name) {
            panic!("Built-in function '{}' already registered", name);
        }
        let Ok(index) = u8::try_from(self.entries.len()) else {
            panic!("Too many built-in functions (max 256)");
        };

        self.by_name.insert(name.to_string(), index);
        self.entries.push(BuiltinEntry {
            name: name.to_string(),
            func,
            is_method,
        });
        index
    }

    #[inline]
    pub fn entry(&self, index: u8) -> Option<&BuiltinEntry> {
        self.entries.get(index as usize)
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static REGISTRY: Lazy<RwLock<BuiltinRegistry>> =
    Lazy::new(|| RwLock::new(super::create_builtin_registry()));

/// Append a builtin to the process-wide table and return its index.
/// VMs created afterwards see it.
///
/// # Panics
/// Panics if `name` is already registered or the table is full.
pub fn register_builtin(name: &str, func: BuiltinFn, is_method: bool) -> u8 {
    REGISTRY.write().register(name, func, is_method)
}

pub fn builtin_index(name: &str) -> Option<u8> {
    REGISTRY.read().index_of(name)
}

pub fn builtin_value(index: u8) -> Option<Value> {
    REGISTRY.read().entry(index).map(BuiltinEntry::to_value)
}

pub fn builtin_by_name(name: &str) -> Option<Value> {
    let registry = REGISTRY.read();
    registry
        .index_of(name)
        .and_then(|index| registry.entry(index))
        .map(BuiltinEntry::to_value)
}

/// Every registered builtin as a runtime value, in index order
pub fn snapshot() -> Rc<[Value]> {
    REGISTRY
        .read()
        .entries
        .iter()
        .map(BuiltinEntry::to_value)
        .collect()
}
