//! Type descriptors for the built-in value kinds.

use std::rc::Rc;

use crate::{
    errors::RuntimeError,
    object::{Callback, TypeDef},
    value::{Number, Value},
    vm::Vm,
};

type MethodFn = fn(&mut Vm, &Value, &[Value]) -> Result<Value, RuntimeError>;

/// One descriptor per built-in value kind. Each [`SharedState`](crate::state::SharedState)
/// owns its own table, so extending `Int` in one state is invisible to others.
pub struct Builtins {
    null: Rc<TypeDef>,
    boolean: Rc<TypeDef>,
    int: Rc<TypeDef>,
    float: Rc<TypeDef>,
    string: Rc<TypeDef>,
    list: Rc<TypeDef>,
    tuple: Rc<TypeDef>,
    closure: Rc<TypeDef>,
    callback: Rc<TypeDef>,
    type_def: Rc<TypeDef>,
    kit: Rc<TypeDef>,
    reference: Rc<TypeDef>,
}

impl Builtins {
    /// Descriptor used for field lookup and operator dispatch on `value`.
    pub fn type_def_of(&self, value: &Value) -> Rc<TypeDef> {
        let type_def = match value {
            Value::Object(object) => return object.type_def.clone(),
            Value::Null => &self.null,
            Value::Bool(_) => &self.boolean,
            Value::Num(Number::Int(_)) => &self.int,
            Value::Num(Number::Float(_)) => &self.float,
            Value::Str(_) => &self.string,
            Value::List(_) => &self.list,
            Value::Tuple(_) => &self.tuple,
            Value::Closure(_) => &self.closure,
            Value::Callback(_) => &self.callback,
            Value::Type(_) => &self.type_def,
            Value::Kit(_) => &self.kit,
            Value::Reference(_) => &self.reference,
        };
        type_def.clone()
    }

    /// Descriptors exposed to scripts by name, so they can be extended.
    pub fn named_types(&self) -> Vec<(&'static str, Rc<TypeDef>)> {
        vec![
            ("Null", self.null.clone()),
            ("Bool", self.boolean.clone()),
            ("Int", self.int.clone()),
            ("Float", self.float.clone()),
            ("String", self.string.clone()),
            ("List", self.list.clone()),
            ("Tuple", self.tuple.clone()),
            ("Closure", self.closure.clone()),
        ]
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

fn method(type_def: &TypeDef, name: &'static str, arity: usize, func: MethodFn) {
    let callback = Callback::new(name, move |vm, this, args| {
        if args.len() != arity {
            return Err(RuntimeError::bad_arity(name, arity, args.len()));
        }
        match this {
            Some(receiver) => func(vm, receiver, args),
            None => Err(RuntimeError::custom(format!("'{}' must be called as a method.", name))),
        }
    });
    type_def.set_method(name, Value::Callback(Rc::new(callback)));
}

fn receiver_error(name: &str, receiver: &Value) -> RuntimeError {
    RuntimeError::custom(format!("'{}' cannot be called on {}.", name, receiver.type_name()))
}

impl Builtins {
    pub fn new() -> Self {
        let int = TypeDef::builtin("int");
        method(&int, "hex", 0, |_, this, _| match this {
            Value::Num(Number::Int(i)) => Ok(Value::string(&format!("{:x}", i))),
            other => Err(receiver_error("hex", other)),
        });
        method(&int, "float", 0, |_, this, _| match this {
            Value::Num(n) => Ok(Value::float(n.as_f64())),
            other => Err(receiver_error("float", other)),
        });

        let float = TypeDef::builtin("float");
        method(&float, "floor", 0, |_, this, _| match this {
            Value::Num(n) => Ok(Value::int(n.as_f64().floor() as i64)),
            other => Err(receiver_error("floor", other)),
        });
        method(&float, "ceil", 0, |_, this, _| match this {
            Value::Num(n) => Ok(Value::int(n.as_f64().ceil() as i64)),
            other => Err(receiver_error("ceil", other)),
        });
        method(&float, "int", 0, |_, this, _| match this {
            Value::Num(n) => Ok(Value::int(n.as_f64() as i64)),
            other => Err(receiver_error("int", other)),
        });

        let string = TypeDef::builtin("string");
        method(&string, "length", 0, |_, this, _| match this {
            Value::Str(s) => Ok(Value::int(s.chars().count() as i64)),
            other => Err(receiver_error("length", other)),
        });
        method(&string, "upper", 0, |_, this, _| match this {
            Value::Str(s) => Ok(Value::string(&s.to_uppercase())),
            other => Err(receiver_error("upper", other)),
        });
        method(&string, "lower", 0, |_, this, _| match this {
            Value::Str(s) => Ok(Value::string(&s.to_lowercase())),
            other => Err(receiver_error("lower", other)),
        });

        let list = TypeDef::builtin("list");
        method(&list, "append", 1, |_, this, args| match this {
            Value::List(l) => {
                l.borrow_mut().push(args[0].clone());
                Ok(Value::Null)
            },
            other => Err(receiver_error("append", other)),
        });
        method(&list, "length", 0, |_, this, _| match this {
            Value::List(l) => Ok(Value::int(l.borrow().len() as i64)),
            other => Err(receiver_error("length", other)),
        });
        method(&list, "pop", 0, |_, this, _| match this {
            Value::List(l) => l.borrow_mut().pop().ok_or(RuntimeError::IndexOutOfBounds { index: -1, len: 0 }),
            other => Err(receiver_error("pop", other)),
        });
        method(&list, "clear", 0, |_, this, _| match this {
            Value::List(l) => {
                l.borrow_mut().clear();
                Ok(Value::Null)
            },
            other => Err(receiver_error("clear", other)),
        });

        let tuple = TypeDef::builtin("tuple");
        method(&tuple, "length", 0, |_, this, _| match this {
            Value::Tuple(t) => Ok(Value::int(t.len() as i64)),
            other => Err(receiver_error("length", other)),
        });

        Self {
            null: Rc::new(TypeDef::builtin("null")),
            boolean: Rc::new(TypeDef::builtin("bool")),
            int: Rc::new(int),
            float: Rc::new(float),
            string: Rc::new(string),
            list: Rc::new(list),
            tuple: Rc::new(tuple),
            closure: Rc::new(TypeDef::builtin("closure")),
            callback: Rc::new(TypeDef::builtin("callback")),
            type_def: Rc::new(TypeDef::builtin("type")),
            kit: Rc::new(TypeDef::builtin("kit")),
            reference: Rc::new(TypeDef::builtin("reference")),
        }
    }
}
