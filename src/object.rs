use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{errors::RuntimeError, function::FunctionPrototype, value::Value, vm::Vm};

/// Locals array of a live frame. Shared with the open upvalue cells and
/// local references that point into it.
pub type Locals = Rc<RefCell<Vec<Value>>>;

pub struct Closure {
    pub prototype: Rc<FunctionPrototype>,
    pub captures: Box<[OuterCell]>,
}

impl Closure {
    pub fn new(prototype: Rc<FunctionPrototype>, captures: Box<[OuterCell]>) -> Self {
        Self { prototype, captures }
    }
}

enum OuterValue {
    Open { locals: Locals, index: usize },
    Closed(Value),
}

/// An upvalue cell. While open it aliases a slot of a live frame; closing it
/// copies the slot's value into the cell, after which the frame is no longer
/// involved.
#[derive(Clone)]
pub struct OuterCell(Rc<RefCell<OuterValue>>);

impl OuterCell {
    pub fn open(locals: Locals, index: usize) -> Self {
        Self(Rc::new(RefCell::new(OuterValue::Open { locals, index })))
    }
    pub fn closed(value: Value) -> Self {
        Self(Rc::new(RefCell::new(OuterValue::Closed(value))))
    }
    pub fn get(&self) -> Value {
        match &*self.0.borrow() {
            OuterValue::Open { locals, index } => locals.borrow().get(*index).cloned().unwrap_or(Value::Null),
            OuterValue::Closed(value) => value.clone(),
        }
    }
    /// Overwrites the cell's value without following references.
    pub fn set_raw(&self, value: Value) {
        match &mut *self.0.borrow_mut() {
            OuterValue::Open { locals, index } => {
                if let Some(slot) = locals.borrow_mut().get_mut(*index) {
                    *slot = value;
                }
            },
            OuterValue::Closed(slot) => *slot = value,
        }
    }
    /// Slot index while the cell is open.
    pub fn open_index(&self) -> Option<usize> {
        match &*self.0.borrow() {
            OuterValue::Open { index, .. } => Some(*index),
            OuterValue::Closed(_) => None,
        }
    }
    pub fn close(&self) {
        let value = self.get();
        *self.0.borrow_mut() = OuterValue::Closed(value);
    }
}

pub type NativeFn = dyn Fn(&mut Vm, Option<&Value>, &[Value]) -> Result<Value, RuntimeError>;

/// A host function callable from scripts.
pub struct Callback {
    pub name: Rc<str>,
    func: Box<NativeFn>,
}

impl Callback {
    pub fn new(
        name: &str,
        func: impl Fn(&mut Vm, Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            func: Box::new(func),
        }
    }
    pub fn call(&self, vm: &mut Vm, this: Option<&Value>, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.func)(vm, this, args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Callback({})", self.name)
    }
}

pub type FieldMap = IndexMap<Rc<str>, Value>;

/// Method and operator tables shared by every value of one kind, or by every
/// instance of a user type.
pub struct TypeDef {
    pub name: Rc<str>,
    ctor: Option<Value>,
    invoke: Option<Value>,
    methods: RefCell<FieldMap>,
    prefix: FieldMap,
    infix: FieldMap,
    instantiable: bool,
}

impl TypeDef {
    /// A user type; invoking it creates an [`Object`].
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            ctor: None,
            invoke: None,
            methods: RefCell::new(FieldMap::new()),
            prefix: FieldMap::new(),
            infix: FieldMap::new(),
            instantiable: true,
        }
    }
    /// A descriptor for a built-in value kind, which cannot be instantiated.
    pub fn builtin(name: &str) -> Self {
        Self {
            instantiable: false,
            ..Self::new(name)
        }
    }
    pub fn set_ctor(&mut self, ctor: Value) {
        self.ctor = Some(ctor);
    }
    pub fn set_invoke(&mut self, invoke: Value) {
        self.invoke = Some(invoke);
    }
    pub fn add_prefix(&mut self, op: &str, function: Value) {
        self.prefix.insert(Rc::from(op), function);
    }
    pub fn add_infix(&mut self, op: &str, function: Value) {
        self.infix.insert(Rc::from(op), function);
    }
    pub fn ctor(&self) -> Option<&Value> {
        self.ctor.as_ref()
    }
    pub fn invoke(&self) -> Option<&Value> {
        self.invoke.as_ref()
    }
    pub fn is_instantiable(&self) -> bool {
        self.instantiable
    }
    pub fn method(&self, name: &str) -> Option<Value> {
        self.methods.borrow().get(name).cloned()
    }
    pub fn set_method(&self, name: &str, function: Value) {
        self.methods.borrow_mut().insert(Rc::from(name), function);
    }
    pub fn prefix_op(&self, op: &str) -> Option<Value> {
        self.prefix.get(op).cloned()
    }
    pub fn infix_op(&self, op: &str) -> Option<Value> {
        self.infix.get(op).cloned()
    }
}

/// Instance of a user type.
pub struct Object {
    pub type_def: Rc<TypeDef>,
    fields: RefCell<FieldMap>,
}

impl Object {
    pub fn new(type_def: Rc<TypeDef>) -> Self {
        Self {
            type_def,
            fields: RefCell::new(FieldMap::new()),
        }
    }
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }
    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(Rc::from(name), value);
    }
}

/// A host namespace of values and callbacks.
pub struct Kit {
    pub name: Rc<str>,
    fields: RefCell<FieldMap>,
}

impl Kit {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            fields: RefCell::new(FieldMap::new()),
        }
    }
    pub fn set(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(Rc::from(name), value);
    }
    pub fn set_function(
        &self,
        name: &str,
        func: impl Fn(&mut Vm, Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + 'static,
    ) {
        self.set(name, Value::Callback(Rc::new(Callback::new(name, func))));
    }
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }
    pub fn fields(&self) -> Vec<(Rc<str>, Value)> {
        self.fields.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
