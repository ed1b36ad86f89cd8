//! Indexed get/set/delete and slicing

use super::{Value, ValueMap};
use crate::error::VmError;
use crate::types::{self, to_map_method, TypeFields, TypeMethods, TypeProperties};
use crate::vm::Vm;

impl Value {
    /// `self[index]`
    pub fn index_get(&self, vm: &mut Vm, index: &Value) -> Result<Value, VmError> {
        match self {
            Value::Undefined | Value::Default => Ok(Value::Undefined),
            Value::Array(items) | Value::ImmutableArray(items) => {
                let i = int_index(index)?;
                let items = items.borrow();
                Ok(position(i, items.len())
                    .map(|i| items[i].clone())
                    .unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                let i = int_index(index)?;
                let runes = s.runes();
                Ok(position(i, runes.len())
                    .map(|i| Value::Char(runes[i]))
                    .unwrap_or(Value::Undefined))
            }
            Value::Bytes(b) => {
                let i = int_index(index)?;
                Ok(position(i, b.len())
                    .map(|i| Value::Int(b[i] as i64))
                    .unwrap_or(Value::Undefined))
            }
            Value::Map(m) | Value::ImmutableMap(m) => {
                let key = map_key(index)?;
                Ok(m.borrow().get(&key).cloned().unwrap_or(Value::Undefined))
            }
            Value::Error(inner) => match index.as_str() {
                Some("value") => Ok(inner.as_ref().clone()),
                _ => Err(VmError::InvalidIndexOnError),
            },
            Value::Instance(instance) => instance.get(vm, str_index(index)?),
            Value::Type(ty) => types::type_index_get(ty, str_index(index)?),
            Value::TypeField(f) => container_get(self, index, |key| f.borrow().index_get(key)),
            Value::TypeFields(f) => container_get(self, index, |key| Ok(f.borrow().index_get(key))),
            Value::TypeMethod(m) => container_get(self, index, |key| m.borrow().index_get(key)),
            Value::TypeMethods(m) => container_get(self, index, |key| Ok(m.borrow().index_get(key))),
            Value::TypeProperty(p) => container_get(self, index, |key| p.borrow().index_get(key)),
            Value::TypeProperties(p) => {
                container_get(self, index, |key| Ok(p.borrow().index_get(key)))
            }
            other => Err(VmError::NotIndexable(other.type_name())),
        }
    }

    /// `self[index] = value`
    pub fn index_set(&self, vm: &mut Vm, index: Value, value: Value) -> Result<(), VmError> {
        match self {
            Value::Array(items) => {
                let i = int_index(&index)?;
                let mut items = items.borrow_mut();
                let len = items.len();
                let slot = position(i, len).ok_or(VmError::IndexOutOfBounds)?;
                items[slot] = value;
                Ok(())
            }
            Value::Map(m) => {
                let key = map_key(&index)?;
                m.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Instance(instance) => instance.set(vm, str_index(&index)?, value),
            Value::Type(ty) => types::type_index_set(ty, str_index(&index)?, value),
            Value::TypeField(f) => container_set(self, &index, value, |key, v| {
                let v = types::entry_value(key, v)?;
                f.borrow_mut().index_set(key, v)
            }),
            Value::TypeFields(f) => container_set(self, &index, value, |key, v| {
                let entry = TypeFields::entry(key, v)?;
                f.borrow_mut().insert(key, entry);
                Ok(())
            }),
            Value::TypeMethod(m) => container_set(self, &index, value, |key, v| {
                let v = types::entry_value(key, v)?;
                m.borrow_mut().index_set(key, v)
            }),
            Value::TypeMethods(m) => container_set(self, &index, value, |key, v| {
                let entry = TypeMethods::entry(key, v)?;
                m.borrow_mut().insert(key, entry);
                Ok(())
            }),
            Value::TypeProperty(p) => container_set(self, &index, value, |key, v| {
                let v = types::entry_value(key, v)?;
                p.borrow_mut().index_set(key, v)
            }),
            Value::TypeProperties(p) => container_set(self, &index, value, |key, v| {
                let update = TypeProperties::update(key, v)?;
                p.borrow_mut().apply(update);
                Ok(())
            }),
            other => Err(VmError::NotIndexAssignable(other.type_name())),
        }
    }

    /// Delete keys from a map-like value
    pub fn index_del(&self, keys: &[Value]) -> Result<(), VmError> {
        match self {
            Value::Map(m) => {
                let mut m = m.borrow_mut();
                for key in keys {
                    m.remove(&map_key(key)?);
                }
                Ok(())
            }
            Value::TypeFields(f) => {
                let mut f = f.borrow_mut();
                for key in keys {
                    f.remove(str_index(key)?);
                }
                Ok(())
            }
            Value::TypeMethods(m) => {
                let mut m = m.borrow_mut();
                for key in keys {
                    m.remove(str_index(key)?);
                }
                Ok(())
            }
            Value::TypeProperties(p) => {
                let mut p = p.borrow_mut();
                for key in keys {
                    p.remove(str_index(key)?);
                }
                Ok(())
            }
            other => Err(VmError::NotIndexDeletable(other.type_name())),
        }
    }

    /// `self[low:high]`; Undefined bounds mean "from start"/"to end"
    pub fn slice(&self, low: &Value, high: &Value) -> Result<Value, VmError> {
        match self {
            Value::Array(items) | Value::ImmutableArray(items) => {
                let items = items.borrow();
                let (low, high) = slice_bounds(low, high, items.len())?;
                Ok(Value::array(items[low..high].to_vec()))
            }
            Value::String(s) => {
                let runes = s.runes();
                let (low, high) = slice_bounds(low, high, runes.len())?;
                Ok(Value::string(runes[low..high].iter().collect::<String>()))
            }
            Value::Bytes(b) => {
                let (low, high) = slice_bounds(low, high, b.len())?;
                Ok(Value::bytes(b[low..high].to_vec()))
            }
            other => Err(VmError::NotIndexable(other.type_name())),
        }
    }

    /// Load a type-system container from its mapping form
    pub(crate) fn load_map(&self, map: &ValueMap) -> Result<(), VmError> {
        match self {
            Value::TypeField(f) => f.borrow_mut().load_map(map),
            Value::TypeFields(f) => f.borrow_mut().load_map(map),
            Value::TypeMethod(m) => m.borrow_mut().load_map(map),
            Value::TypeMethods(m) => m.borrow_mut().load_map(map),
            Value::TypeProperty(p) => p.borrow_mut().load_map(map),
            Value::TypeProperties(p) => p.borrow_mut().load_map(map),
            other => Err(VmError::NotIndexAssignable(other.type_name())),
        }
    }
}

/// Index get on a type-system container; `__map__` yields a to-map callable
fn container_get(
    this: &Value,
    index: &Value,
    get: impl FnOnce(&str) -> Result<Value, VmError>,
) -> Result<Value, VmError> {
    let key = str_index(index)?;
    if key == "__map__" {
        return Ok(to_map_method(this.clone()));
    }
    get(key)
}

/// Index set on a type-system container; `__map__` reloads it from a mapping
fn container_set(
    this: &Value,
    index: &Value,
    value: Value,
    set: impl FnOnce(&str, Value) -> Result<(), VmError>,
) -> Result<(), VmError> {
    let key = str_index(index)?;
    if key == "__map__" {
        let map = value
            .to_map(true)
            .ok_or_else(|| VmError::InvalidIndexValueType(value.type_name()))?;
        return this.load_map(&map);
    }
    set(key, value)
}

fn int_index(index: &Value) -> Result<i64, VmError> {
    index
        .as_int()
        .ok_or_else(|| VmError::InvalidIndexType(index.type_name()))
}

fn str_index(index: &Value) -> Result<&str, VmError> {
    index
        .as_str()
        .ok_or_else(|| VmError::InvalidIndexType(index.type_name()))
}

fn map_key(index: &Value) -> Result<String, VmError> {
    index
        .to_key_string()
        .ok_or_else(|| VmError::InvalidIndexType(index.type_name()))
}

/// In-range position for an Int index
fn position(i: i64, len: usize) -> Option<usize> {
    usize::try_from(i).ok().filter(|&i| i < len)
}

fn slice_bound(v: &Value, default: i64) -> Result<i64, VmError> {
    match v {
        Value::Undefined => Ok(default),
        Value::Int(i) => Ok(*i),
        other => Err(VmError::InvalidSliceIndexType(other.type_name())),
    }
}

/// Half-open bounds: low > high is an error, then both clamp to [0, len]
fn slice_bounds(low: &Value, high: &Value, len: usize) -> Result<(usize, usize), VmError> {
    let len_i = len as i64;
    let low = slice_bound(low, 0)?;
    let high = slice_bound(high, len_i)?;
    if low > high {
        return Err(VmError::InvalidSliceIndex { low, high });
    }
    let clamp = |i: i64| i.clamp(0, len_i) as usize;
    Ok((clamp(low), clamp(high)))
}
