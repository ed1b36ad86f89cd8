//! Method declarations

use super::{tags_from, tags_value};
use crate::error::VmError;
use crate::value::{shared, Shared, Value, ValueMap};
use std::collections::HashMap;

/// A declared method: a method-convertible callable plus tags
#[derive(Debug, Clone)]
pub struct TypeMethod {
    pub value: Value,
    pub tags: ValueMap,
}

impl TypeMethod {
    pub fn new(value: Value) -> Result<Self, VmError> {
        Ok(TypeMethod {
            value: method_value(value)?,
            tags: ValueMap::new(),
        })
    }

    pub fn with_tags(mut self, tags: ValueMap) -> Self {
        self.tags = tags;
        self
    }

    pub fn index_get(&self, key: &str) -> Result<Value, VmError> {
        match key {
            "value" => Ok(self.value.clone()),
            "tags" => Ok(Value::map(self.tags.clone())),
            _ => Err(VmError::InvalidIndex(key.to_string())),
        }
    }

    pub fn index_set(&mut self, key: &str, value: Value) -> Result<(), VmError> {
        match key {
            "value" => self.value = method_value(value)?,
            "tags" => self.tags = tags_from(&value)?,
            _ => return Err(VmError::InvalidIndex(key.to_string())),
        }
        Ok(())
    }

    pub fn to_map(&self, deep: bool) -> ValueMap {
        let mut m = ValueMap::new();
        m.insert(
            "value".into(),
            if deep { self.value.copy() } else { self.value.clone() },
        );
        if !self.tags.is_empty() {
            m.insert("tags".into(), tags_value(&self.tags, deep));
        }
        m
    }

    pub fn load_map(&mut self, map: &ValueMap) -> Result<(), VmError> {
        self.value = method_value(map.get("value").cloned().unwrap_or_default())?;
        self.tags = match map.get("tags") {
            Some(tags) => tags_from(tags)?,
            None => ValueMap::new(),
        };
        Ok(())
    }

    pub fn from_map(map: &ValueMap) -> Result<Self, VmError> {
        let mut method = TypeMethod {
            value: Value::Undefined,
            tags: ValueMap::new(),
        };
        method.load_map(map)?;
        Ok(method)
    }
}

fn method_value(value: Value) -> Result<Value, VmError> {
    if value.is_method_convertible() {
        Ok(value)
    } else {
        Err(VmError::NotAMethod(value.type_name()))
    }
}

/// Method table of a type
#[derive(Debug, Clone, Default)]
pub struct TypeMethods {
    entries: HashMap<String, Shared<TypeMethod>>,
}

impl TypeMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Shared<TypeMethod>> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Shared<TypeMethod>)> {
        self.entries.iter()
    }

    pub fn index_get(&self, key: &str) -> Value {
        self.entries
            .get(key)
            .map(|m| Value::TypeMethod(m.clone()))
            .unwrap_or(Value::Undefined)
    }

    /// Declare a method from a TypeMethod, a `{value, tags}` Map or a callable
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), VmError> {
        let method = Self::entry(key, value)?;
        self.entries.insert(key.to_string(), method);
        Ok(())
    }

    pub fn entry(key: &str, value: Value) -> Result<Shared<TypeMethod>, VmError> {
        if key.is_empty() {
            return Err(VmError::InvalidIndex(String::new()));
        }
        Ok(match value {
            Value::TypeMethod(m) => m,
            Value::Map(m) | Value::ImmutableMap(m) => shared(TypeMethod::from_map(&m.borrow())?),
            other => shared(TypeMethod::new(other)?),
        })
    }

    /// Add or replace an entry as is
    pub fn insert(&mut self, name: impl Into<String>, entry: Shared<TypeMethod>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn to_map(&self, deep: bool) -> ValueMap {
        self.entries
            .iter()
            .map(|(k, m)| {
                let v = if deep {
                    Value::map(m.borrow().to_map(true))
                } else {
                    Value::TypeMethod(m.clone())
                };
                (k.clone(), v)
            })
            .collect()
    }

    pub fn load_map(&mut self, map: &ValueMap) -> Result<(), VmError> {
        for (key, value) in map {
            self.set(key, value.clone())?;
        }
        Ok(())
    }
}
