//! Field declarations: one default value plus tags per field name

use super::{tags_from, tags_value};
use crate::error::VmError;
use crate::value::{shared, Shared, Value, ValueMap};
use std::collections::HashMap;

/// A declared field: its default value and free-form tags
#[derive(Debug, Clone, Default)]
pub struct TypeField {
    pub value: Value,
    pub tags: ValueMap,
}

impl TypeField {
    pub fn new(value: Value) -> Self {
        TypeField {
            value,
            tags: ValueMap::new(),
        }
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
            "value" => self.value = value,
            "tags" => self.tags = tags_from(&value)?,
            _ => return Err(VmError::InvalidIndex(key.to_string())),
        }
        Ok(())
    }

    /// `{value, tags?}`
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

    /// Reset from `{value, tags?}`
    pub fn load_map(&mut self, map: &ValueMap) -> Result<(), VmError> {
        self.value = map.get("value").cloned().unwrap_or_default();
        self.tags = match map.get("tags") {
            Some(tags) => tags_from(tags)?,
            None => ValueMap::new(),
        };
        Ok(())
    }

    pub fn from_map(map: &ValueMap) -> Result<Self, VmError> {
        let mut field = TypeField::default();
        field.load_map(map)?;
        Ok(field)
    }
}

/// Field table of a type
#[derive(Debug, Clone, Default)]
pub struct TypeFields {
    entries: HashMap<String, Shared<TypeField>>,
}

impl TypeFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Shared<TypeField>> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Shared<TypeField>)> {
        self.entries.iter()
    }

    /// Declared field object, or Undefined
    pub fn index_get(&self, key: &str) -> Value {
        self.entries
            .get(key)
            .map(|f| Value::TypeField(f.clone()))
            .unwrap_or(Value::Undefined)
    }

    /// Declare a field. A TypeField is shared as is, a Map is read as
    /// `{value, tags}`, Default declares an Undefined default and any other
    /// value becomes the default itself.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), VmError> {
        let field = Self::entry(key, value)?;
        self.entries.insert(key.to_string(), field);
        Ok(())
    }

    /// The entry [`TypeFields::set`] would store, built without the table
    pub fn entry(key: &str, value: Value) -> Result<Shared<TypeField>, VmError> {
        if key.is_empty() {
            return Err(VmError::InvalidIndex(String::new()));
        }
        Ok(match value {
            Value::TypeField(f) => f,
            Value::Map(m) | Value::ImmutableMap(m) => shared(TypeField::from_map(&m.borrow())?),
            Value::Default => shared(TypeField::new(Value::Undefined)),
            other => shared(TypeField::new(other)),
        })
    }

    /// Add or replace an entry as is
    pub fn insert(&mut self, name: impl Into<String>, entry: Shared<TypeField>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn to_map(&self, deep: bool) -> ValueMap {
        self.entries
            .iter()
            .map(|(k, f)| {
                let v = if deep {
                    Value::map(f.borrow().to_map(true))
                } else {
                    Value::TypeField(f.clone())
                };
                (k.clone(), v)
            })
            .collect()
    }

    /// Merge every entry of the mapping in
    pub fn load_map(&mut self, map: &ValueMap) -> Result<(), VmError> {
        for (key, value) in map {
            self.set(key, value.clone())?;
        }
        Ok(())
    }
}
