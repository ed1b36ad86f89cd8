//! Property declarations: getter/setter pairs intercepting instance access

use super::{tags_from, tags_value};
use crate::error::VmError;
use crate::value::{shared, Shared, Value, ValueMap};
use std::collections::HashMap;

/// Accessor pair for one name. Either side may be absent.
#[derive(Debug, Clone, Default)]
pub struct TypeProperty {
    pub getter: Option<Value>,
    pub setter: Option<Value>,
    pub tags: ValueMap,
}

impl TypeProperty {
    pub fn new(getter: Option<Value>, setter: Option<Value>) -> Result<Self, VmError> {
        Ok(TypeProperty {
            getter: accessor(getter.unwrap_or_default())?,
            setter: accessor(setter.unwrap_or_default())?,
            tags: ValueMap::new(),
        })
    }

    pub fn with_tags(mut self, tags: ValueMap) -> Self {
        self.tags = tags;
        self
    }

    /// Neither getter nor setter
    pub fn is_empty(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }

    pub fn index_get(&self, key: &str) -> Result<Value, VmError> {
        match key {
            "get" => Ok(self.getter.clone().unwrap_or_default()),
            "set" => Ok(self.setter.clone().unwrap_or_default()),
            "tags" => Ok(Value::map(self.tags.clone())),
            _ => Err(VmError::InvalidIndex(key.to_string())),
        }
    }

    /// Undefined clears an accessor
    pub fn index_set(&mut self, key: &str, value: Value) -> Result<(), VmError> {
        match key {
            "get" => self.getter = accessor(value)?,
            "set" => self.setter = accessor(value)?,
            "tags" => self.tags = tags_from(&value)?,
            _ => return Err(VmError::InvalidIndex(key.to_string())),
        }
        Ok(())
    }

    /// `{get?, set?, tags?}`
    pub fn to_map(&self, deep: bool) -> ValueMap {
        let leaf = |v: &Value| if deep { v.copy() } else { v.clone() };
        let mut m = ValueMap::new();
        if let Some(getter) = &self.getter {
            m.insert("get".into(), leaf(getter));
        }
        if let Some(setter) = &self.setter {
            m.insert("set".into(), leaf(setter));
        }
        if !self.tags.is_empty() {
            m.insert("tags".into(), tags_value(&self.tags, deep));
        }
        m
    }

    /// Apply the keys present in the mapping
    pub fn load_map(&mut self, map: &ValueMap) -> Result<(), VmError> {
        for key in ["get", "set", "tags"] {
            if let Some(value) = map.get(key) {
                self.index_set(key, value.clone())?;
            }
        }
        Ok(())
    }
}

fn accessor(value: Value) -> Result<Option<Value>, VmError> {
    match value {
        Value::Undefined => Ok(None),
        v if v.is_method_convertible() => Ok(Some(v)),
        other => Err(VmError::NotAMethod(other.type_name())),
    }
}

/// A converted assignment to a property table
#[derive(Debug)]
pub enum PropertyUpdate {
    /// Attach or clear one accessor of `name`
    Accessor {
        name: String,
        setter: bool,
        func: Option<Value>,
    },
    /// Replace `name`, or remove it when `entry` is None
    Replace {
        name: String,
        entry: Option<Shared<TypeProperty>>,
    },
}

/// Property table of a type
#[derive(Debug, Clone, Default)]
pub struct TypeProperties {
    entries: HashMap<String, Shared<TypeProperty>>,
}

impl TypeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Shared<TypeProperty>> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Shared<TypeProperty>)> {
        self.entries.iter()
    }

    pub fn index_get(&self, key: &str) -> Value {
        self.entries
            .get(key)
            .map(|p| Value::TypeProperty(p.clone()))
            .unwrap_or(Value::Undefined)
    }

    /// Declare or update a property.
    ///
    /// `get_<name>`/`set_<name>` attach one accessor to `<name>`, creating
    /// the property if needed. Undefined removes the property; a Map is read
    /// as `{get, set, tags}`. A property left without accessors is removed.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), VmError> {
        let update = Self::update(key, value)?;
        self.apply(update);
        Ok(())
    }

    /// Convert an assignment to `key` without touching the table
    pub fn update(key: &str, value: Value) -> Result<PropertyUpdate, VmError> {
        if key.is_empty() {
            return Err(VmError::InvalidIndex(String::new()));
        }
        if let Some((side, name)) = split_accessor_key(key) {
            return Ok(PropertyUpdate::Accessor {
                name: name.to_string(),
                setter: side == "set",
                func: accessor(value)?,
            });
        }

        let entry = match value {
            Value::Undefined => None,
            Value::Map(m) | Value::ImmutableMap(m) => {
                let mut prop = TypeProperty::default();
                prop.load_map(&m.borrow())?;
                (!prop.is_empty()).then(|| shared(prop))
            }
            Value::TypeProperty(p) => Some(p),
            other => return Err(VmError::InvalidIndexValueType(other.type_name())),
        };
        Ok(PropertyUpdate::Replace {
            name: key.to_string(),
            entry,
        })
    }

    pub fn apply(&mut self, update: PropertyUpdate) {
        match update {
            PropertyUpdate::Accessor { name, setter, func } => {
                let prop = self.entries.entry(name.clone()).or_default().clone();
                let emptied = {
                    let mut prop = prop.borrow_mut();
                    if setter {
                        prop.setter = func;
                    } else {
                        prop.getter = func;
                    }
                    prop.is_empty()
                };
                if emptied {
                    self.entries.remove(&name);
                }
            }
            PropertyUpdate::Replace { name, entry: Some(prop) } => {
                self.entries.insert(name, prop);
            }
            PropertyUpdate::Replace { name, entry: None } => {
                self.entries.remove(&name);
            }
        }
    }

    /// Add or replace an entry as is
    pub fn insert(&mut self, name: impl Into<String>, entry: Shared<TypeProperty>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn to_map(&self, deep: bool) -> ValueMap {
        self.entries
            .iter()
            .map(|(k, p)| {
                let v = if deep {
                    Value::map(p.borrow().to_map(true))
                } else {
                    Value::TypeProperty(p.clone())
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

/// `get_x` -> ("get", "x"), `set_x` -> ("set", "x")
fn split_accessor_key(key: &str) -> Option<(&'static str, &str)> {
    if let Some(name) = key.strip_prefix("get_").filter(|n| !n.is_empty()) {
        return Some(("get", name));
    }
    key.strip_prefix("set_")
        .filter(|n| !n.is_empty())
        .map(|name| ("set", name))
}
