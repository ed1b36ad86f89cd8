//! Iteration over iterable values
//!
//! A [`ValueIterator`] is created by `IteratorInit` and driven by the
//! `IteratorNext`/`IteratorKey`/`IteratorValue` instructions. It starts
//! positioned before the first element: `next` must be called once before
//! `key`/`value` are meaningful.

use crate::error::VmError;
use crate::value::{Shared, Value, ValueMap};
use std::rc::Rc;

/// Cursor over one iterable value
#[derive(Clone, Debug)]
pub enum ValueIterator {
    /// Undefined and Default iterate as empty
    Empty,

    /// Array or immutable array; sees in-place element updates
    Array {
        items: Shared<Vec<Value>>,
        len: usize,
        index: usize,
    },

    /// Bytes yield their octets as Int
    Bytes { data: Rc<Vec<u8>>, index: usize },

    /// String yields Chars (code points, not bytes)
    String { runes: Vec<char>, index: usize },

    /// Map-like value; keys are snapshotted in sorted order
    Map {
        map: Shared<ValueMap>,
        keys: Vec<String>,
        index: usize,
    },
}

impl ValueIterator {
    /// Create an iterator from a value
    ///
    /// # Arguments
    /// * `value` - The value to iterate over
    ///
    /// # Returns
    /// * `Ok(ValueIterator)` - Iterator positioned before the first element
    /// * `Err(VmError::NotIterable)` - Value is not iterable
    pub fn new(value: &Value) -> Result<Self, VmError> {
        match value {
            Value::Undefined | Value::Default => Ok(ValueIterator::Empty),
            Value::Array(items) | Value::ImmutableArray(items) => Ok(ValueIterator::Array {
                len: items.borrow().len(),
                items: items.clone(),
                index: 0,
            }),
            Value::Bytes(data) => Ok(ValueIterator::Bytes {
                data: data.clone(),
                index: 0,
            }),
            Value::String(s) => Ok(ValueIterator::String {
                runes: s.runes().to_vec(),
                index: 0,
            }),
            Value::Map(map) | Value::ImmutableMap(map) => Ok(Self::over_map(map.clone())),
            Value::Instance(instance) => Ok(Self::over_map(instance.values().clone())),
            other => Err(VmError::NotIterable(other.type_name())),
        }
    }

    fn over_map(map: Shared<ValueMap>) -> Self {
        let mut keys: Vec<String> = map.borrow().keys().cloned().collect();
        keys.sort();
        ValueIterator::Map {
            map,
            keys,
            index: 0,
        }
    }

    fn len(&self) -> usize {
        match self {
            ValueIterator::Empty => 0,
            ValueIterator::Array { len, .. } => *len,
            ValueIterator::Bytes { data, .. } => data.len(),
            ValueIterator::String { runes, .. } => runes.len(),
            ValueIterator::Map { keys, .. } => keys.len(),
        }
    }

    fn position(&self) -> usize {
        match self {
            ValueIterator::Empty => 0,
            ValueIterator::Array { index, .. }
            | ValueIterator::Bytes { index, .. }
            | ValueIterator::String { index, .. }
            | ValueIterator::Map { index, .. } => *index,
        }
    }

    /// Advance; false once the elements are exhausted
    pub fn next(&mut self) -> bool {
        let len = self.len();
        match self {
            ValueIterator::Empty => false,
            ValueIterator::Array { index, .. }
            | ValueIterator::Bytes { index, .. }
            | ValueIterator::String { index, .. }
            | ValueIterator::Map { index, .. } => {
                if *index <= len {
                    *index += 1;
                }
                *index <= len
            }
        }
    }

    /// Current key: the 0-based position, or the map key
    pub fn key(&self) -> Value {
        let Some(at) = self.current() else {
            return Value::Undefined;
        };
        match self {
            ValueIterator::Map { keys, .. } => Value::from(keys[at].as_str()),
            _ => Value::Int(at as i64),
        }
    }

    /// Current element. A map entry deleted mid-iteration reads as Undefined.
    pub fn value(&self) -> Value {
        let Some(at) = self.current() else {
            return Value::Undefined;
        };
        match self {
            ValueIterator::Empty => Value::Undefined,
            ValueIterator::Array { items, .. } => {
                items.borrow().get(at).cloned().unwrap_or_default()
            }
            ValueIterator::Bytes { data, .. } => Value::Int(data[at] as i64),
            ValueIterator::String { runes, .. } => Value::Char(runes[at]),
            ValueIterator::Map { map, keys, .. } => {
                map.borrow().get(&keys[at]).cloned().unwrap_or_default()
            }
        }
    }

    /// Index of the element `next` last moved onto
    fn current(&self) -> Option<usize> {
        let index = self.position();
        (index > 0 && index <= self.len()).then(|| index - 1)
    }
}
