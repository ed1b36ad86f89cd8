//! Script-defined types
//!
//! A [`TypeObject`] is a record shape assembled at run time: a field table
//! with default values, a method table, a property table and an optional
//! constructor. Calling a type produces an [`Instance`].
//!
//! Every table converts to and from a plain mapping (`to_map` /
//! `load_map`), which is also how scripts inspect and clone type shapes
//! through the `__map__` key.

mod fields;
mod methods;
mod properties;

pub use fields::{TypeField, TypeFields};
pub use methods::{TypeMethod, TypeMethods};
pub use properties::{PropertyUpdate, TypeProperties, TypeProperty};

use crate::error::VmError;
use crate::value::{copy_map, shared, Receiver, Shared, UserFunction, Value, ValueMap};
use crate::vm::Vm;
use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A script-defined type
#[derive(Debug, Clone)]
pub struct TypeObject {
    pub name: String,
    pub tags: ValueMap,
    /// Custom constructor; `None` builds instances from field defaults
    pub constructor: Option<Value>,
    pub fields: Shared<TypeFields>,
    pub methods: Shared<TypeMethods>,
    pub properties: Shared<TypeProperties>,
}

impl TypeObject {
    pub fn new(name: impl Into<String>) -> Self {
        TypeObject {
            name: name.into(),
            tags: ValueMap::new(),
            constructor: None,
            fields: shared(TypeFields::new()),
            methods: shared(TypeMethods::new()),
            properties: shared(TypeProperties::new()),
        }
    }

    /// `{name, new?, tags?, methods, fields, properties}`
    pub fn to_map(&self, deep: bool) -> ValueMap {
        let mut m = ValueMap::new();
        m.insert("name".into(), Value::from(self.name.as_str()));
        if let Some(ctor) = &self.constructor {
            m.insert("new".into(), ctor.clone());
        }
        if !self.tags.is_empty() {
            m.insert("tags".into(), tags_value(&self.tags, deep));
        }
        m.insert("methods".into(), Value::map(self.methods.borrow().to_map(deep)));
        m.insert("fields".into(), Value::map(self.fields.borrow().to_map(deep)));
        m.insert(
            "properties".into(),
            Value::map(self.properties.borrow().to_map(deep)),
        );
        m
    }

    /// Build a type from its mapping form. `fields`, `methods` and
    /// `properties` may be mappings or the matching table objects, which
    /// are then shared rather than copied.
    pub fn from_map(map: &ValueMap) -> Result<Self, VmError> {
        let name = match map.get("name") {
            None | Some(Value::Undefined) => return Err(VmError::UndefinedTypeName),
            Some(Value::String(s)) if s.as_str().is_empty() => {
                return Err(VmError::EmptyTypeName)
            }
            Some(Value::String(s)) => s.as_str().to_string(),
            Some(other) => {
                return Err(VmError::InvalidArgumentType {
                    name: "name".into(),
                    expected: "string".into(),
                    found: other.type_name(),
                })
            }
        };

        let mut ty = TypeObject::new(name);
        for key in ["tags", "new", "fields", "methods", "properties"] {
            if let Some(value) = map.get(key) {
                ty.apply(TypeMember::convert(key, value.clone())?);
            }
        }
        Ok(ty)
    }

    fn apply(&mut self, member: TypeMember) {
        match member {
            TypeMember::Tags(tags) => self.tags = tags,
            TypeMember::Constructor(ctor) => self.constructor = ctor,
            TypeMember::Fields(fields) => self.fields = fields,
            TypeMember::Methods(methods) => self.methods = methods,
            TypeMember::Properties(properties) => self.properties = properties,
        }
    }
}

/// A value converted for one assignable key of a type. Conversion reads
/// the value only, so it may refer to the type being assigned to.
enum TypeMember {
    Tags(ValueMap),
    Constructor(Option<Value>),
    Fields(Shared<TypeFields>),
    Methods(Shared<TypeMethods>),
    Properties(Shared<TypeProperties>),
}

impl TypeMember {
    fn convert(key: &str, value: Value) -> Result<Self, VmError> {
        Ok(match key {
            "tags" => TypeMember::Tags(tags_from(&value)?),
            "new" => TypeMember::Constructor(match value {
                Value::Undefined => None,
                v if v.is_callable() => Some(v),
                _ => return Err(VmError::Conversion("'new' isn't callable".into())),
            }),
            "fields" => TypeMember::Fields(table(key, "<fields>", value, |v| match v {
                Value::TypeFields(f) => Some(f.clone()),
                _ => None,
            }, TypeFields::load_map)?),
            "methods" => TypeMember::Methods(table(key, "<methods>", value, |v| match v {
                Value::TypeMethods(m) => Some(m.clone()),
                _ => None,
            }, TypeMethods::load_map)?),
            "properties" | "props" => {
                TypeMember::Properties(table(key, "<properties>", value, |v| match v {
                    Value::TypeProperties(p) => Some(p.clone()),
                    _ => None,
                }, TypeProperties::load_map)?)
            }
            _ => return Err(VmError::InvalidIndex(key.to_string())),
        })
    }
}

/// Resolve a table assignment: the table object itself, a mapping loaded
/// into a fresh table, or Undefined for an empty one
fn table<T: Default>(
    key: &str,
    kind: &str,
    value: Value,
    unwrap: impl Fn(&Value) -> Option<Shared<T>>,
    load: impl Fn(&mut T, &ValueMap) -> Result<(), VmError>,
) -> Result<Shared<T>, VmError> {
    if let Some(existing) = unwrap(&value) {
        return Ok(existing);
    }
    let mut fresh = T::default();
    match &value {
        Value::Undefined => {}
        Value::Map(m) | Value::ImmutableMap(m) => load(&mut fresh, &m.borrow())?,
        _ => {
            return Err(VmError::Conversion(format!(
                "'{}' isn't map or {}",
                key, kind
            )))
        }
    }
    Ok(shared(fresh))
}

/// `type[key]`
pub fn type_index_get(ty: &Shared<TypeObject>, key: &str) -> Result<Value, VmError> {
    let t = ty.borrow();
    Ok(match key {
        "name" => Value::from(t.name.as_str()),
        "tags" => Value::map(t.tags.clone()),
        "new" => t.constructor.clone().unwrap_or_default(),
        "fields" => Value::TypeFields(t.fields.clone()),
        "methods" => Value::TypeMethods(t.methods.clone()),
        "props" => Value::TypeProperties(t.properties.clone()),
        "__map__" => Value::map(t.to_map(true)),
        _ => return Err(VmError::InvalidIndex(key.to_string())),
    })
}

/// `type[key] = value`; the name is fixed once the type exists
pub fn type_index_set(ty: &Shared<TypeObject>, key: &str, value: Value) -> Result<(), VmError> {
    match key {
        "tags" | "new" | "fields" | "methods" | "props" => {
            let member = TypeMember::convert(key, value)?;
            ty.borrow_mut().apply(member);
            Ok(())
        }
        _ => Err(VmError::InvalidIndex(key.to_string())),
    }
}

/// Callable returning the mapping form of `target`: shallow with no
/// argument, deep when its single argument is truthy
pub fn to_map_method(target: Value) -> Value {
    UserFunction::new("__map__", move |ctx| {
        let deep = match ctx.args.as_slice() {
            [] => false,
            [flag] => !flag.is_falsy(),
            _ => return Err(VmError::WrongArgumentCount),
        };
        target.to_map(deep).map(Value::map).ok_or_else(|| {
            VmError::Conversion(format!("{} isn't convertible to map", target.type_name()))
        })
    })
    .into()
}

pub(crate) fn tags_from(value: &Value) -> Result<ValueMap, VmError> {
    match value {
        Value::Undefined => Ok(ValueMap::new()),
        v => v
            .to_map(false)
            .ok_or_else(|| VmError::Conversion("value of \"tags\" isn't convertible to map".into())),
    }
}

/// Store form of a value assigned to `key` of a field, method or
/// property entry: tags become a detached mapping
pub(crate) fn entry_value(key: &str, value: Value) -> Result<Value, VmError> {
    match key {
        "tags" => Ok(Value::map(tags_from(&value)?)),
        _ => Ok(value),
    }
}

pub(crate) fn tags_value(tags: &ValueMap, deep: bool) -> Value {
    Value::map(if deep { copy_map(tags) } else { tags.clone() })
}

/// Call a type: build an instance, or delegate to its constructor
pub(crate) fn construct(
    vm: &mut Vm,
    ty: &Shared<TypeObject>,
    args: Vec<Value>,
    kwargs: ValueMap,
) -> Result<Value, VmError> {
    let constructor = ty.borrow().constructor.clone();
    match constructor {
        None => {
            if !args.is_empty() {
                return Err(VmError::WrongNumArguments {
                    want: 0,
                    got: args.len(),
                });
            }
            let instance = Instance::new(ty);
            // initialization overlay writes storage directly
            instance.values.borrow_mut().extend(kwargs);
            Ok(Value::Instance(instance))
        }
        Some(ctor @ Value::CompiledFunction(_)) => {
            let instance = Instance::new(ty);
            vm.call_method(&ctor, Value::Instance(instance.clone()), args, kwargs)?;
            Ok(Value::Instance(instance))
        }
        Some(ctor) => vm.call_method(&ctor, Value::Type(ty.clone()), args, kwargs),
    }
}

/// One constructed value of a [`TypeObject`]
pub struct Instance {
    ty: Shared<TypeObject>,
    values: Shared<ValueMap>,
    /// Bound methods, filled on first lookup
    methods: RefCell<HashMap<String, Value>>,
}

impl Instance {
    /// Fresh instance holding deep copies of the field defaults
    pub fn new(ty: &Shared<TypeObject>) -> Rc<Self> {
        let values = ty
            .borrow()
            .fields
            .borrow()
            .iter()
            .map(|(name, field)| (name.clone(), field.borrow().value.copy()))
            .collect();
        Rc::new(Instance {
            ty: ty.clone(),
            values: shared(values),
            methods: RefCell::new(HashMap::new()),
        })
    }

    pub fn type_ref(&self) -> &Shared<TypeObject> {
        &self.ty
    }

    pub fn values(&self) -> &Shared<ValueMap> {
        &self.values
    }

    /// Instance with no field values, filled in by the caller
    pub(crate) fn new_empty(ty: &Shared<TypeObject>) -> Rc<Self> {
        Rc::new(Instance {
            ty: ty.clone(),
            values: shared(ValueMap::new()),
            methods: RefCell::new(HashMap::new()),
        })
    }

    /// Member lookup: `__map__`, `__type__`, properties, fields, methods
    pub fn get(self: &Rc<Self>, vm: &mut Vm, name: &str) -> Result<Value, VmError> {
        match name {
            "__map__" => return Ok(Value::Map(self.values.clone())),
            "__type__" => return Ok(Value::Type(self.ty.clone())),
            _ => {}
        }

        let property = self.ty.borrow().properties.borrow().get(name).cloned();
        if let Some(property) = property {
            let getter = property.borrow().getter.clone();
            return match getter {
                Some(getter) => vm.call_method(
                    &getter,
                    Value::Instance(self.clone()),
                    Vec::new(),
                    ValueMap::new(),
                ),
                None => Ok(Value::Undefined),
            };
        }

        if let Some(value) = self.values.borrow().get(name) {
            return Ok(value.clone());
        }
        if let Some(bound) = self.methods.borrow().get(name) {
            return Ok(bound.clone());
        }

        let method = self
            .ty
            .borrow()
            .methods
            .borrow()
            .get(name)
            .map(|m| m.borrow().value.clone());
        match method {
            Some(method) => {
                let bound = method.to_method_of(Receiver::Instance(Rc::downgrade(self)))?;
                trace!("bound method '{}' cached on {}", name, self.ty.borrow().name);
                self.methods
                    .borrow_mut()
                    .insert(name.to_string(), bound.clone());
                Ok(bound)
            }
            None => Ok(Value::Undefined),
        }
    }

    /// Member store: a property's setter, else field storage
    pub fn set(self: &Rc<Self>, vm: &mut Vm, name: &str, value: Value) -> Result<(), VmError> {
        let property = self.ty.borrow().properties.borrow().get(name).cloned();
        if let Some(property) = property {
            let setter = property.borrow().setter.clone();
            return match setter {
                Some(setter) => vm
                    .call_method(
                        &setter,
                        Value::Instance(self.clone()),
                        vec![value],
                        ValueMap::new(),
                    )
                    .map(|_| ()),
                None => Err(VmError::ReadOnlyProperty(name.to_string())),
            };
        }
        self.values.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.ty.borrow().name)
            .field("values", &self.values.borrow().len())
            .finish()
    }
}
