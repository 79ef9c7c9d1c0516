//! First-class l-values and the index/field access paths they wrap.

use std::rc::Rc;

use crate::{
    builtins::Builtins,
    errors::RuntimeError,
    object::OuterCell,
    state::SharedState,
    value::Value,
};

/// Longest chain of references `deref` follows before giving up.
pub const MAX_DEREF_DEPTH: usize = 64;

/// A handle to a storage location. Reading yields the location's current
/// value; writing replaces it.
pub enum Reference {
    Global { state: SharedState, name: Rc<str> },
    /// A local of a live frame, held through the same cell a closure would
    /// capture, so it stays valid after the local's scope ends.
    Local(OuterCell),
    Outer(OuterCell),
    Index { target: Value, key: Value },
    /// Field of `target`. Built-in values resolve methods through `builtins`.
    Field { target: Value, name: Rc<str>, builtins: Rc<Builtins> },
}

impl Reference {
    /// Current value of the location, one level deep.
    pub fn get(&self) -> Result<Value, RuntimeError> {
        match self {
            Reference::Global { state, name } => Ok(state.load(name)),
            Reference::Local(cell) | Reference::Outer(cell) => Ok(cell.get()),
            Reference::Index { target, key } => load_index(target, key),
            Reference::Field { target, name, builtins } => load_field(builtins, target, name),
        }
    }

    /// Writes the location itself, even when it holds another reference.
    pub fn set(&self, value: Value) -> Result<(), RuntimeError> {
        match self {
            Reference::Global { state, name } => {
                state.store_raw(name, value);
                Ok(())
            },
            Reference::Local(cell) | Reference::Outer(cell) => {
                cell.set_raw(value);
                Ok(())
            },
            Reference::Index { target, key } => write_index(target, key, value, false),
            Reference::Field { target, name, .. } => write_field(target, name, value, false),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Reference::Global { .. } => "global",
            Reference::Local(_) => "local",
            Reference::Outer(_) => "outer",
            Reference::Index { .. } => "index",
            Reference::Field { .. } => "field",
        }
    }
}

/// Follows references until a plain value is reached.
pub fn deref(value: Value) -> Result<Value, RuntimeError> {
    let mut value = value;
    for _ in 0..MAX_DEREF_DEPTH {
        match value {
            Value::Reference(reference) => value = reference.get()?,
            plain => return Ok(plain),
        }
    }
    match value {
        Value::Reference(_) => Err(RuntimeError::InvalidReferenceTarget(format!(
            "reference chain longer than {}",
            MAX_DEREF_DEPTH
        ))),
        plain => Ok(plain),
    }
}

/// The reference a store must write through when the slot holds `current`.
pub fn redirect_of(current: &Value) -> Option<Rc<Reference>> {
    match current {
        Value::Reference(reference) => Some(reference.clone()),
        _ => None,
    }
}

fn position(index: i64, len: usize) -> Result<usize, RuntimeError> {
    if index < 0 || index as usize >= len {
        return Err(RuntimeError::IndexOutOfBounds { index, len });
    }
    Ok(index as usize)
}

fn not_indexable(target: &Value, key: &Value) -> RuntimeError {
    RuntimeError::NotIndexable {
        target: target.type_name(),
        key: key.type_name(),
    }
}

/// `target[key]` on dereferenced operands.
pub fn load_index(target: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match (target, key) {
        (Value::List(list), Value::Num(_)) => {
            let index = key.as_int().ok_or_else(|| not_indexable(target, key))?;
            let list = list.borrow();
            Ok(list[position(index, list.len())?].clone())
        },
        (Value::Tuple(tuple), Value::Num(_)) => {
            let index = key.as_int().ok_or_else(|| not_indexable(target, key))?;
            Ok(tuple[position(index, tuple.len())?].clone())
        },
        (Value::Str(s), Value::Num(_)) => {
            let index = key.as_int().ok_or_else(|| not_indexable(target, key))?;
            let len = s.chars().count();
            let c = s.chars().nth(position(index, len)?).map(String::from).unwrap_or_default();
            Ok(Value::string(&c))
        },
        (Value::Object(_) | Value::Kit(_) | Value::Type(_), Value::Str(name)) => {
            own_field(target, name).ok_or_else(|| missing_field(target, name))
        },
        _ => Err(not_indexable(target, key)),
    }
}

/// `target[key] = value`, redirected through a reference held by the element.
pub fn store_index(target: &Value, key: &Value, value: Value) -> Result<(), RuntimeError> {
    write_index(target, key, value, true)
}

fn write_index(target: &Value, key: &Value, value: Value, redirect: bool) -> Result<(), RuntimeError> {
    match (target, key) {
        (Value::List(list), Value::Num(_)) => {
            let index = key.as_int().ok_or_else(|| not_indexable(target, key))?;
            let mut elements = list.borrow_mut();
            let at = position(index, elements.len())?;
            let through = match &elements[at] {
                Value::Reference(reference) if redirect => Some(reference.clone()),
                _ => None,
            };
            match through {
                Some(reference) => {
                    drop(elements);
                    reference.set(value)
                },
                None => {
                    elements[at] = value;
                    Ok(())
                },
            }
        },
        (Value::Tuple(_) | Value::Str(_), _) => Err(RuntimeError::InvalidReferenceTarget(format!(
            "elements of a {} cannot be assigned",
            target.type_name()
        ))),
        (Value::Object(_) | Value::Kit(_) | Value::Type(_), Value::Str(name)) => {
            write_field(target, name, value, redirect)
        },
        _ => Err(not_indexable(target, key)),
    }
}

fn field_owner(target: &Value) -> String {
    match target {
        Value::Kit(kit) => format!("kit {}", kit.name),
        Value::Type(type_def) => format!("type {}", type_def.name),
        other => other.type_name(),
    }
}

/// Fields of values that carry their own tables: objects (fields, then
/// their type's methods), kits and type descriptors.
fn own_field(target: &Value, name: &str) -> Option<Value> {
    match target {
        Value::Object(object) => object.field(name).or_else(|| object.type_def.method(name)),
        Value::Kit(kit) => kit.get(name),
        Value::Type(type_def) => type_def.method(name),
        _ => None,
    }
}

fn missing_field(target: &Value, name: &str) -> RuntimeError {
    RuntimeError::MissingField {
        target: field_owner(target),
        field: name.to_string(),
    }
}

/// `target.name`: object fields first, then the descriptor's methods.
pub fn load_field(builtins: &Builtins, target: &Value, name: &str) -> Result<Value, RuntimeError> {
    let found = match target {
        Value::Object(_) | Value::Kit(_) | Value::Type(_) => own_field(target, name),
        other => builtins.type_def_of(other).method(name),
    };
    found.ok_or_else(|| missing_field(target, name))
}

/// `target.name = value`, redirected through a reference held by the field.
pub fn store_field(target: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
    write_field(target, name, value, true)
}

fn write_field(target: &Value, name: &str, value: Value, redirect: bool) -> Result<(), RuntimeError> {
    match target {
        Value::Object(object) => match object.field(name) {
            Some(Value::Reference(reference)) if redirect => reference.set(value),
            _ => {
                object.set_field(name, value);
                Ok(())
            },
        },
        Value::Kit(kit) => match kit.get(name) {
            Some(Value::Reference(reference)) if redirect => reference.set(value),
            _ => {
                kit.set(name, value);
                Ok(())
            },
        },
        Value::Type(type_def) if value.is_invocable() => {
            type_def.set_method(name, value);
            Ok(())
        },
        _ => Err(RuntimeError::FieldNotWritable {
            target: field_owner(target),
            field: name.to_string(),
        }),
    }
}
