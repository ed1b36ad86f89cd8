//! Whole-graph traversals over values: deep copy, structural equality and
//! display. Containers may hold themselves, so each traversal remembers
//! the containers it has entered.

use super::{shared, BoundMethod, Shared, Value, ValueMap};
use crate::types::{
    Instance, TypeField, TypeFields, TypeMethod, TypeMethods, TypeProperties, TypeProperty,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

type Identity = *const ();

fn identity<T: ?Sized>(rc: &Rc<T>) -> Identity {
    Rc::as_ptr(rc) as *const ()
}

/// Deep copy of a value graph. Every container reached twice is copied
/// once, so shared and cyclic structure is preserved in the copy.
#[derive(Default)]
pub(crate) struct DeepCopy {
    copies: HashMap<Identity, Value>,
}

impl DeepCopy {
    pub fn value(&mut self, value: &Value) -> Value {
        match value {
            Value::Bytes(b) => Value::bytes(b.as_ref().clone()),
            Value::Array(a) | Value::ImmutableArray(a) => {
                if let Some(done) = self.copies.get(&identity(a)) {
                    return done.clone();
                }
                let copy = shared(Vec::new());
                self.copies.insert(identity(a), Value::Array(copy.clone()));
                let items: Vec<Value> = a.borrow().iter().map(|item| self.value(item)).collect();
                *copy.borrow_mut() = items;
                Value::Array(copy)
            }
            Value::Map(m) | Value::ImmutableMap(m) => {
                if let Some(done) = self.copies.get(&identity(m)) {
                    return done.clone();
                }
                let copy = shared(ValueMap::new());
                self.copies.insert(identity(m), Value::Map(copy.clone()));
                let entries = self.map(&m.borrow());
                *copy.borrow_mut() = entries;
                Value::Map(copy)
            }
            Value::Error(inner) => Value::error(self.value(inner)),
            Value::CompiledFunction(f) => Value::CompiledFunction(Rc::new(f.duplicate())),
            Value::BoundMethod(m) => Value::BoundMethod(Rc::new(BoundMethod {
                func: self.value(&m.func),
                receiver: m.receiver.clone(),
            })),
            Value::Instance(i) => {
                if let Some(done) = self.copies.get(&identity(i)) {
                    return done.clone();
                }
                let copy = Instance::new_empty(i.type_ref());
                self.copies.insert(identity(i), Value::Instance(copy.clone()));
                let values = self.map(&i.values().borrow());
                *copy.values().borrow_mut() = values;
                Value::Instance(copy)
            }
            Value::TypeField(f) => Value::TypeField(self.field(f)),
            Value::TypeMethod(m) => Value::TypeMethod(self.method(m)),
            Value::TypeProperty(p) => Value::TypeProperty(self.property(p)),
            Value::TypeFields(t) => {
                if let Some(done) = self.copies.get(&identity(t)) {
                    return done.clone();
                }
                let copy = shared(TypeFields::new());
                self.copies.insert(identity(t), Value::TypeFields(copy.clone()));
                let entries: Vec<_> = t.borrow().iter().map(|(k, f)| (k.clone(), f.clone())).collect();
                for (name, field) in entries {
                    let field = self.field(&field);
                    copy.borrow_mut().insert(name, field);
                }
                Value::TypeFields(copy)
            }
            Value::TypeMethods(t) => {
                if let Some(done) = self.copies.get(&identity(t)) {
                    return done.clone();
                }
                let copy = shared(TypeMethods::new());
                self.copies.insert(identity(t), Value::TypeMethods(copy.clone()));
                let entries: Vec<_> = t.borrow().iter().map(|(k, m)| (k.clone(), m.clone())).collect();
                for (name, method) in entries {
                    let method = self.method(&method);
                    copy.borrow_mut().insert(name, method);
                }
                Value::TypeMethods(copy)
            }
            Value::TypeProperties(t) => {
                if let Some(done) = self.copies.get(&identity(t)) {
                    return done.clone();
                }
                let copy = shared(TypeProperties::new());
                self.copies.insert(identity(t), Value::TypeProperties(copy.clone()));
                let entries: Vec<_> = t.borrow().iter().map(|(k, p)| (k.clone(), p.clone())).collect();
                for (name, prop) in entries {
                    let prop = self.property(&prop);
                    copy.borrow_mut().insert(name, prop);
                }
                Value::TypeProperties(copy)
            }
            other => other.clone(),
        }
    }

    pub fn map(&mut self, map: &ValueMap) -> ValueMap {
        map.iter().map(|(k, v)| (k.clone(), self.value(v))).collect()
    }

    fn field(&mut self, f: &Shared<TypeField>) -> Shared<TypeField> {
        if let Some(Value::TypeField(done)) = self.copies.get(&identity(f)) {
            return done.clone();
        }
        let copy = shared(TypeField::default());
        self.copies.insert(identity(f), Value::TypeField(copy.clone()));
        let source = f.borrow();
        let value = self.value(&source.value);
        let tags = self.map(&source.tags);
        *copy.borrow_mut() = TypeField { value, tags };
        copy
    }

    fn method(&mut self, m: &Shared<TypeMethod>) -> Shared<TypeMethod> {
        if let Some(Value::TypeMethod(done)) = self.copies.get(&identity(m)) {
            return done.clone();
        }
        let copy = shared(TypeMethod {
            value: Value::Undefined,
            tags: ValueMap::new(),
        });
        self.copies.insert(identity(m), Value::TypeMethod(copy.clone()));
        let source = m.borrow();
        let value = self.value(&source.value);
        let tags = self.map(&source.tags);
        *copy.borrow_mut() = TypeMethod { value, tags };
        copy
    }

    fn property(&mut self, p: &Shared<TypeProperty>) -> Shared<TypeProperty> {
        if let Some(Value::TypeProperty(done)) = self.copies.get(&identity(p)) {
            return done.clone();
        }
        let copy = shared(TypeProperty::default());
        self.copies.insert(identity(p), Value::TypeProperty(copy.clone()));
        let source = p.borrow();
        let getter = source.getter.as_ref().map(|g| self.value(g));
        let setter = source.setter.as_ref().map(|s| self.value(s));
        let tags = self.map(&source.tags);
        *copy.borrow_mut() = TypeProperty {
            getter,
            setter,
            tags,
        };
        copy
    }
}

/// Structural equality. A pair of containers already being compared is
/// assumed equal, which makes equal cyclic graphs compare equal.
#[derive(Default)]
pub(crate) struct Equality {
    entered: HashSet<(Identity, Identity)>,
}

impl Equality {
    pub fn values(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined, Value::Undefined) | (Value::Default, Value::Default) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a.as_str() == b.as_str(),
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (
                Value::Array(a) | Value::ImmutableArray(a),
                Value::Array(b) | Value::ImmutableArray(b),
            ) => {
                Rc::ptr_eq(a, b)
                    || !self.enter(identity(a), identity(b))
                    || self.slices(&a.borrow(), &b.borrow())
            }
            (Value::Map(a) | Value::ImmutableMap(a), Value::Map(b) | Value::ImmutableMap(b)) => {
                Rc::ptr_eq(a, b)
                    || !self.enter(identity(a), identity(b))
                    || self.maps(&a.borrow(), &b.borrow())
            }
            (Value::Instance(a), Value::Instance(b)) => {
                Rc::ptr_eq(a, b)
                    || (Rc::ptr_eq(a.type_ref(), b.type_ref())
                        && (!self.enter(identity(a), identity(b))
                            || self.maps(&a.values().borrow(), &b.values().borrow())))
            }
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::UserFunction(a), Value::UserFunction(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::ObjectPtr(a), Value::ObjectPtr(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::TypeField(a), Value::TypeField(b)) => Rc::ptr_eq(a, b),
            (Value::TypeFields(a), Value::TypeFields(b)) => Rc::ptr_eq(a, b),
            (Value::TypeMethod(a), Value::TypeMethod(b)) => Rc::ptr_eq(a, b),
            (Value::TypeMethods(a), Value::TypeMethods(b)) => Rc::ptr_eq(a, b),
            (Value::TypeProperty(a), Value::TypeProperty(b)) => Rc::ptr_eq(a, b),
            (Value::TypeProperties(a), Value::TypeProperties(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// False when the pair is already being compared
    fn enter(&mut self, a: Identity, b: Identity) -> bool {
        self.entered.insert((a, b))
    }

    fn slices(&mut self, a: &[Value], b: &[Value]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.values(x, y))
    }

    fn maps(&mut self, a: &ValueMap, b: &ValueMap) -> bool {
        a.len() == b.len()
            && a.iter()
                .all(|(k, v)| b.get(k).map_or(false, |other| self.values(v, other)))
    }
}

/// Write `value` through `f`. A container met again inside itself is
/// written as `[...]`, `{...}` or `<...>`.
pub(crate) fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    let mut path = Vec::new();
    write_nested(f, value, &mut path)
}

fn write_nested(f: &mut fmt::Formatter<'_>, value: &Value, path: &mut Vec<Identity>) -> fmt::Result {
    match value {
        Value::Array(a) | Value::ImmutableArray(a) => {
            if path.contains(&identity(a)) {
                return write!(f, "[...]");
            }
            path.push(identity(a));
            write!(f, "[")?;
            for (i, item) in a.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_nested(f, item, path)?;
            }
            path.pop();
            write!(f, "]")
        }
        Value::Map(m) | Value::ImmutableMap(m) => {
            if path.contains(&identity(m)) {
                return write!(f, "{{...}}");
            }
            path.push(identity(m));
            write_map(f, &m.borrow(), path)?;
            path.pop();
            Ok(())
        }
        Value::Instance(i) => {
            if path.contains(&identity(i)) {
                return write!(f, "{}{{...}}", i.type_ref().borrow().name);
            }
            path.push(identity(i));
            write!(f, "{}", i.type_ref().borrow().name)?;
            write_map(f, &i.values().borrow(), path)?;
            path.pop();
            Ok(())
        }
        Value::Error(inner) => {
            write!(f, "error: ")?;
            write_nested(f, inner, path)
        }
        Value::BoundMethod(m) => write_nested(f, &m.func, path),
        Value::TypeField(field) => {
            if path.contains(&identity(field)) {
                return write!(f, "<...>");
            }
            path.push(identity(field));
            write!(f, "<field ")?;
            write_nested(f, &field.borrow().value, path)?;
            path.pop();
            write!(f, ">")
        }
        Value::TypeMethod(m) => {
            if path.contains(&identity(m)) {
                return write!(f, "<...>");
            }
            path.push(identity(m));
            write!(f, "<method ")?;
            write_nested(f, &m.borrow().value, path)?;
            path.pop();
            write!(f, ">")
        }
        other => other.fmt_flat(f),
    }
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &ValueMap, path: &mut Vec<Identity>) -> fmt::Result {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    write!(f, "{{")?;
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: ", key)?;
        write_nested(f, &map[key], path)?;
    }
    write!(f, "}}")
}
