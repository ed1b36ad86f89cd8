//! Type-system built-in functions
//!
//! `type` assembles a [`TypeObject`]; the remaining builders produce the
//! field, method and property containers explicitly. Keyword arguments
//! that are not part of a builder's signature become tags.

use crate::error::VmError;
use crate::types::{
    TypeField, TypeFields, TypeMethod, TypeMethods, TypeObject, TypeProperties, TypeProperty,
};
use crate::value::{shared, Value, ValueMap};
use crate::vm::{CallContext, ValueIterator};
use log::debug;

/// type(name, [new], [fields], [methods], [properties], **tables) or
/// type(map)
pub fn builtin_type(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    let first = ctx.args.first().ok_or(VmError::WrongArgumentCount)?;

    let spec = match first {
        Value::Map(map) | Value::ImmutableMap(map) => {
            ctx.check_args(1, 1)?;
            ctx.check_kwargs(&[])?;
            map.borrow().clone()
        }
        Value::String(_) => {
            ctx.check_kwargs(&["new", "fields", "methods", "properties", "tags"])?;
            let mut spec = ValueMap::new();
            spec.insert("name".into(), first.clone());
            for (i, arg) in ctx.args.iter().enumerate().skip(1) {
                let key = match arg {
                    Value::TypeFields(_) => "fields",
                    Value::TypeMethods(_) => "methods",
                    Value::TypeProperties(_) => "properties",
                    ctor if i == 1 && ctor.is_callable() => "new",
                    other => {
                        return Err(VmError::InvalidArgumentType {
                            name: format!("arg #{}", i),
                            expected: "fields|methods|properties".into(),
                            found: other.type_name(),
                        })
                    }
                };
                spec.insert(key.into(), arg.clone());
            }
            spec.extend(ctx.kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
            spec
        }
        other => {
            return Err(VmError::InvalidArgumentType {
                name: "arg #0".into(),
                expected: "string|map".into(),
                found: other.type_name(),
            })
        }
    };

    let ty = TypeObject::from_map(&spec)?;
    debug!(
        "type '{}' defined: {} fields, {} methods, {} properties",
        ty.name,
        ty.fields.borrow().len(),
        ty.methods.borrow().len(),
        ty.properties.borrow().len()
    );
    Ok(Value::Type(shared(ty)))
}

/// typeof(instance) - the instance's type
pub fn builtin_typeof(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(1, 1)?;
    match &ctx.args[0] {
        Value::Instance(instance) => Ok(Value::Type(instance.type_ref().clone())),
        other => Err(VmError::InvalidArgumentType {
            name: "arg #0".into(),
            expected: "instance".into(),
            found: other.type_name(),
        }),
    }
}

/// field(value, **tags)
pub fn builtin_field(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(1, 1)?;
    let field = TypeField::new(ctx.args[0].clone()).with_tags(ctx.kwargs.clone());
    Ok(Value::TypeField(shared(field)))
}

/// fields(**name_to_default) or fields(map)
pub fn builtin_fields(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(0, 1)?;
    let mut fields = TypeFields::new();
    if let Some(map) = positional_map(ctx)? {
        fields.load_map(&map)?;
    }
    for (name, value) in sorted(&ctx.kwargs) {
        let field = match value {
            Value::TypeField(field) => field.clone(),
            Value::Default => shared(TypeField::new(Value::Undefined)),
            other => shared(TypeField::new(other.clone())),
        };
        fields.insert(name.as_str(), field);
    }
    Ok(Value::TypeFields(shared(fields)))
}

/// method(callable, **tags)
pub fn builtin_method(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(1, 1)?;
    let method = TypeMethod::new(ctx.args[0].clone())?.with_tags(ctx.kwargs.clone());
    Ok(Value::TypeMethod(shared(method)))
}

/// methods(**name_to_callable) or methods(map)
pub fn builtin_methods(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(0, 1)?;
    let mut methods = TypeMethods::new();
    if let Some(map) = positional_map(ctx)? {
        methods.load_map(&map)?;
    }
    for (name, value) in sorted(&ctx.kwargs) {
        let method = match value {
            Value::TypeMethod(method) => method.clone(),
            callable if callable.is_callable() => shared(TypeMethod::new(callable.clone())?),
            _ => {
                return Err(VmError::Conversion(format!(
                    "method {:?}: value isn't callable",
                    name
                )))
            }
        };
        methods.insert(name.as_str(), method);
    }
    Ok(Value::TypeMethods(shared(methods)))
}

/// property(getter, setter, **tags) or property(get=, set=, **tags)
pub fn builtin_property(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    let mut tags = ctx.kwargs.clone();
    let (getter, setter) = match ctx.args.as_slice() {
        [] => (tags.remove("get"), tags.remove("set")),
        [getter, setter] => (Some(getter.clone()), Some(setter.clone())),
        _ => return Err(VmError::WrongArgumentCount),
    };
    let property = TypeProperty::new(getter, setter)?.with_tags(tags);
    Ok(Value::TypeProperty(shared(property)))
}

/// properties(**name_to_property) or properties(map)
pub fn builtin_properties(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(0, 1)?;
    let mut properties = TypeProperties::new();
    if let Some(map) = positional_map(ctx)? {
        properties.load_map(&map)?;
    }
    for (name, value) in sorted(&ctx.kwargs) {
        let property = match value {
            Value::TypeProperty(property) => property.clone(),
            Value::Map(map) | Value::ImmutableMap(map) => {
                let mut property = TypeProperty::default();
                property.load_map(&map.borrow())?;
                shared(property)
            }
            _ => {
                return Err(VmError::Conversion(format!(
                    "bad property {:?} value type",
                    name
                )))
            }
        };
        properties.insert(name.as_str(), property);
    }
    Ok(Value::TypeProperties(shared(properties)))
}

/// receiver.get_methods() - the receiver's method-flagged values
pub fn builtin_get_methods(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(0, 0)?;
    let this = ctx.this.clone().unwrap_or_default();
    let mut iterator = ValueIterator::new(&this)?;
    let mut items = Vec::new();
    while iterator.next() {
        let item = iterator.value();
        if item.is_method() {
            items.push(item);
        }
    }
    Ok(Value::array(items))
}

fn positional_map(ctx: &CallContext<'_>) -> Result<Option<ValueMap>, VmError> {
    match ctx.args.first() {
        None => Ok(None),
        Some(Value::Map(map)) | Some(Value::ImmutableMap(map)) => Ok(Some(map.borrow().clone())),
        Some(other) => Err(VmError::InvalidArgumentType {
            name: "arg #0".into(),
            expected: "map".into(),
            found: other.type_name(),
        }),
    }
}

/// Entries in key order, so the first failing entry is deterministic
fn sorted(map: &ValueMap) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}
