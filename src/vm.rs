use std::{cell::RefCell, rc::Rc};

use crate::{
    chunk::{Instruction, OpCode, RefKind},
    config::VmConfig,
    errors::RuntimeError,
    function::{FunctionPrototype, MatchKey, OuterKind},
    object::{Closure, Locals, Object, OuterCell, TypeDef},
    reference::{self, deref, Reference},
    state::SharedState,
    value::{Number, Value},
};

/// Executes compiled prototypes against a [`SharedState`]. Calls recurse on
/// the host stack, bounded by [`VmConfig::max_call_depth`].
pub struct Vm {
    state: SharedState,
    config: VmConfig,
    depth: usize,
}

struct StackFrame {
    closure: Rc<Closure>,
    this: Option<Value>,
    locals: Locals,
    stack: Vec<Value>,
    ip: usize,
    open_outers: Vec<OuterCell>,
}

impl StackFrame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }
    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }
    fn peek(&self) -> Result<Value, RuntimeError> {
        self.stack.last().cloned().ok_or(RuntimeError::StackUnderflow)
    }
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.stack.len() < n {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
    fn local(&self, slot: usize) -> Result<Value, RuntimeError> {
        self.locals.borrow().get(slot).cloned().ok_or(RuntimeError::InvalidInstruction(slot as u32))
    }
    fn outer(&self, position: usize) -> Result<&OuterCell, RuntimeError> {
        self.closure
            .captures
            .get(position)
            .ok_or(RuntimeError::InvalidInstruction(position as u32))
    }
    /// Cell aliasing `slot`, shared with every earlier capture of that slot.
    fn capture_local(&mut self, slot: usize) -> OuterCell {
        if let Some(cell) = self.open_outers.iter().find(|cell| cell.open_index() == Some(slot)) {
            return cell.clone();
        }
        let cell = OuterCell::open(self.locals.clone(), slot);
        self.open_outers.push(cell.clone());
        cell
    }
    fn close_outers(&mut self, from: usize) {
        let before = self.open_outers.len();
        self.open_outers.retain(|cell| match cell.open_index() {
            Some(index) if index >= from => {
                cell.close();
                false
            },
            _ => true,
        });
        if before != self.open_outers.len() {
            tracing::trace!(from, closed = before - self.open_outers.len(), "closed outers");
        }
    }
}

fn string_constant(prototype: &FunctionPrototype, index: u32) -> Result<Rc<str>, RuntimeError> {
    prototype
        .constants
        .get(index as usize)
        .and_then(|constant| constant.as_str())
        .cloned()
        .ok_or(RuntimeError::InvalidInstruction(index))
}

fn compare_strings(op: &str, a: &str, b: &str) -> Option<Value> {
    let ordering = a.cmp(b);
    Some(match op {
        "<" => Value::Bool(ordering.is_lt()),
        "<=" => Value::Bool(ordering.is_le()),
        ">" => Value::Bool(ordering.is_gt()),
        ">=" => Value::Bool(ordering.is_ge()),
        "<=>" => Value::int(ordering as i64),
        _ => return None,
    })
}

/// Longest string `*` may produce, in bytes.
pub const MAX_REPEAT_LEN: usize = 1 << 28;

fn repeat(s: &str, count: i64) -> Result<String, RuntimeError> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(s.repeat(count)),
        _ => Err(RuntimeError::custom(format!(
            "Repeating a string of length {} {} times exceeds {} bytes.",
            s.len(),
            count,
            MAX_REPEAT_LEN
        ))),
    }
}

fn numeric_infix(op: &str, a: Number, b: Number) -> Result<Option<Value>, RuntimeError> {
    let num = |n: Option<Number>| n.map(Value::Num);
    Ok(match op {
        "+" => Some(Value::Num(a + b)),
        "-" => Some(Value::Num(a - b)),
        "*" => Some(Value::Num(a * b)),
        "/" => Some(Value::Num((a / b).ok_or(RuntimeError::DivisionByZero)?)),
        "//" => Some(Value::Num(a.floor_div(b).ok_or(RuntimeError::DivisionByZero)?)),
        "%" => Some(Value::Num((a % b).ok_or(RuntimeError::DivisionByZero)?)),
        "^" => Some(Value::Num(a.pow(b))),
        "&" => num(a & b),
        "|" => num(a | b),
        "~" => num(a ^ b),
        "<<" => num(a.shl(b)),
        ">>" => num(a.shr(b)),
        ">>>" => num(a.ushr(b)),
        "<" => Some(Value::Bool(a < b)),
        "<=" => Some(Value::Bool(a <= b)),
        ">" => Some(Value::Bool(a > b)),
        ">=" => Some(Value::Bool(a >= b)),
        "<=>" => Some(Value::int(a.compare(b))),
        "->" => match (a, b) {
            (Number::Int(from), Number::Int(to)) if from <= to => Some(Value::list((from..to).map(Value::int).collect())),
            (Number::Int(from), Number::Int(to)) => {
                Some(Value::list((to + 1..=from).rev().map(Value::int).collect()))
            },
            _ => None,
        },
        _ => None,
    })
}

impl Vm {
    pub fn new(state: SharedState) -> Self {
        Self::with_config(state, VmConfig::default())
    }
    pub fn with_config(state: SharedState, config: VmConfig) -> Self {
        Self { state, config, depth: 0 }
    }
    pub fn state(&self) -> &SharedState {
        &self.state
    }
    /// Another VM over the same globals and kits. Both run on the calling
    /// thread; nothing orders their accesses to the shared table.
    pub fn spawn_side_thread(&self) -> Vm {
        tracing::debug!(parent_depth = self.depth, "spawned side vm");
        Vm::with_config(self.state.clone(), self.config)
    }

    /// Runs a root prototype with no arguments.
    pub fn run(&mut self, prototype: Rc<FunctionPrototype>) -> Result<Value, RuntimeError> {
        self.invoke_prototype(prototype, vec![])
    }
    pub fn invoke_prototype(&mut self, prototype: Rc<FunctionPrototype>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let captures = prototype.outers.iter().map(|_| OuterCell::closed(Value::Null)).collect();
        let closure = Rc::new(Closure::new(prototype, captures));
        self.call_closure(&closure, None, args)
    }

    /// Calls any invocable value. References are followed first.
    pub fn invoke(&mut self, callee: &Value, this: Option<Value>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match deref(callee.clone())? {
            Value::Closure(closure) => self.call_closure(&closure, this, args),
            Value::Callback(callback) => callback.call(self, this.as_ref(), &args),
            Value::Type(type_def) => self.instantiate(&type_def, args),
            Value::Object(object) => {
                let function = object.type_def.invoke().cloned();
                match function {
                    Some(function) => self.invoke(&function, Some(Value::Object(object)), args),
                    None => Err(RuntimeError::NotInvocable(object.type_def.name.to_string())),
                }
            },
            other => Err(RuntimeError::NotInvocable(other.type_name())),
        }
    }

    /// Looks up `name` on the receiver and calls it with `this` bound.
    pub fn invoke_method(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let receiver = deref(receiver)?;
        let method = reference::load_field(&self.state.builtins(), &receiver, name)?;
        self.invoke(&method, Some(receiver), args)
    }

    pub fn prefix(&mut self, op: &str, operand: Value) -> Result<Value, RuntimeError> {
        let operand = deref(operand)?;
        if let Value::Object(object) = &operand {
            if let Some(function) = object.type_def.prefix_op(op) {
                return self.invoke(&function, Some(operand.clone()), vec![]);
            }
        }
        match (op, &operand) {
            ("-", Value::Num(n)) => Ok(Value::Num(-*n)),
            ("+", Value::Num(n)) => Ok(Value::Num(*n)),
            ("~", Value::Num(Number::Int(i))) => Ok(Value::int(!i)),
            _ => Err(RuntimeError::invalid_operator(op, operand.type_name())),
        }
    }

    pub fn infix(&mut self, op: &str, left: Value, right: Value) -> Result<Value, RuntimeError> {
        let left = deref(left)?;
        let right = deref(right)?;
        if let Value::Object(object) = &left {
            if let Some(function) = object.type_def.infix_op(op) {
                return self.invoke(&function, Some(left.clone()), vec![right]);
            }
        }
        let result = match (op, &left, &right) {
            ("==", _, _) => Some(Value::Bool(left.equals(&right))),
            ("!=", _, _) => Some(Value::Bool(!left.equals(&right))),
            ("<>", _, _) => Some(Value::string(&format!("{}{}", left, right))),
            (_, Value::Num(a), Value::Num(b)) => numeric_infix(op, *a, *b)?,
            ("+", Value::Str(_), _) | ("+", _, Value::Str(_)) => Some(Value::string(&format!("{}{}", left, right))),
            ("*", Value::Str(s), Value::Num(Number::Int(n))) => Some(Value::string(&repeat(s, *n)?)),
            ("+", Value::List(a), Value::List(b)) => {
                let mut joined = a.borrow().clone();
                joined.extend(b.borrow().iter().cloned());
                Some(Value::list(joined))
            },
            (_, Value::Str(a), Value::Str(b)) => compare_strings(op, a, b),
            _ => None,
        };
        result.ok_or_else(|| {
            RuntimeError::invalid_operator(op, format!("{} and {}", left.type_name(), right.type_name()))
        })
    }

    fn instantiate(&mut self, type_def: &Rc<TypeDef>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if !type_def.is_instantiable() {
            return Err(RuntimeError::NotInvocable(format!("type {}", type_def.name)));
        }
        let object = Value::Object(Rc::new(Object::new(type_def.clone())));
        match type_def.ctor().cloned() {
            Some(ctor) => {
                self.invoke(&ctor, Some(object.clone()), args)?;
            },
            None if !args.is_empty() => return Err(RuntimeError::bad_arity(&type_def.name, 0, args.len())),
            None => {},
        }
        Ok(object)
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Option<Value>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded(self.config.max_call_depth));
        }
        let prototype = &closure.prototype;
        let required = prototype.required_args();
        if prototype.variadic {
            if args.len() < required {
                return Err(RuntimeError::bad_arity(
                    prototype.display_name(),
                    format!("at least {}", required),
                    args.len(),
                ));
            }
        }
        else if args.len() != required {
            return Err(RuntimeError::bad_arity(prototype.display_name(), required, args.len()));
        }

        let mut locals = vec![Value::Null; prototype.max_locals.max(prototype.num_params as usize)];
        let mut args = args;
        if prototype.variadic {
            let rest = args.split_off(required);
            locals[required] = Value::list(rest);
        }
        for (slot, arg) in args.into_iter().enumerate() {
            locals[slot] = arg;
        }

        let mut frame = StackFrame {
            closure: closure.clone(),
            this,
            locals: Rc::new(RefCell::new(locals)),
            stack: Vec::with_capacity(prototype.max_stack),
            ip: 0,
            open_outers: vec![],
        };
        self.depth += 1;
        tracing::trace!(function = prototype.display_name(), depth = self.depth, "push frame");
        let result = self.execute(&mut frame);
        frame.close_outers(0);
        self.depth -= 1;
        tracing::trace!(function = prototype.display_name(), ok = result.is_ok(), "pop frame");
        result
    }

    fn execute(&mut self, frame: &mut StackFrame) -> Result<Value, RuntimeError> {
        let prototype = frame.closure.prototype.clone();
        while frame.ip < prototype.code.len() {
            #[cfg(feature = "debug_code")]
            {
                crate::debug::print_stack(&frame.stack);
                crate::debug::print_instruction(&prototype, frame.ip);
            }
            let word = prototype.code[frame.ip];
            frame.ip += 1;
            if let Err(error) = self.step(frame, &prototype, word) {
                return Err(error.at_line(prototype.line(frame.ip - 1)));
            }
        }
        Ok(frame.stack.pop().unwrap_or(Value::Null))
    }

    fn make_closure(&mut self, frame: &mut StackFrame, prototype: &Rc<FunctionPrototype>) -> Result<Rc<Closure>, RuntimeError> {
        let mut captures = Vec::with_capacity(prototype.outers.len());
        for outer in prototype.outers.iter() {
            let cell = match outer.kind {
                OuterKind::LocalInParent => frame.capture_local(outer.position as usize),
                OuterKind::OuterInParent => frame.outer(outer.position as usize)?.clone(),
            };
            captures.push(cell);
        }
        Ok(Rc::new(Closure::new(prototype.clone(), captures.into_boxed_slice())))
    }

    fn nested(prototype: &FunctionPrototype, index: u32) -> Result<&Rc<FunctionPrototype>, RuntimeError> {
        prototype.nested.get(index as usize).ok_or(RuntimeError::InvalidInstruction(index))
    }

    fn member(&mut self, frame: &mut StackFrame, prototype: &FunctionPrototype, index: u32) -> Result<Value, RuntimeError> {
        let closure = self.make_closure(frame, Self::nested(prototype, index)?)?;
        Ok(Value::Closure(closure))
    }

    fn make_type(&mut self, frame: &mut StackFrame, prototype: &FunctionPrototype, index: u32) -> Result<Value, RuntimeError> {
        let description = prototype.types.get(index as usize).ok_or(RuntimeError::InvalidInstruction(index))?;
        let mut type_def = TypeDef::new(&description.name);
        if let Some(ctor) = description.ctor {
            type_def.set_ctor(self.member(frame, prototype, ctor)?);
        }
        if let Some(invoke) = description.invoke {
            type_def.set_invoke(self.member(frame, prototype, invoke)?);
        }
        for (op, nested) in &description.prefix {
            type_def.add_prefix(op, self.member(frame, prototype, *nested)?);
        }
        for (op, nested) in &description.infix {
            type_def.add_infix(op, self.member(frame, prototype, *nested)?);
        }
        for (name, nested) in &description.methods {
            type_def.set_method(name, self.member(frame, prototype, *nested)?);
        }
        tracing::trace!(name = %description.name, "created type");
        Ok(Value::Type(Rc::new(type_def)))
    }

    fn step(&mut self, frame: &mut StackFrame, prototype: &FunctionPrototype, word: Instruction) -> Result<(), RuntimeError> {
        let op = word.op().ok_or(RuntimeError::InvalidInstruction(word.0))?;
        match op {
            OpCode::POP => {
                frame.pop()?;
            },
            OpCode::DUP => {
                let top = frame.peek()?;
                frame.push(top);
            },
            OpCode::DUP2 => {
                let top = frame.pop_n(2)?;
                frame.stack.extend(top.iter().cloned());
                frame.stack.extend(top);
            },
            OpCode::CLOSE_OUTERS => frame.close_outers(word.c() as usize),

            OpCode::JUMP => frame.ip = word.c() as usize,
            OpCode::JUMP_TRUE => {
                if deref(frame.pop()?)?.as_bool() {
                    frame.ip = word.c() as usize;
                }
            },
            OpCode::JUMP_FALSE => {
                if !deref(frame.pop()?)?.as_bool() {
                    frame.ip = word.c() as usize;
                }
            },
            OpCode::AND => {
                if deref(frame.peek()?)?.as_bool() {
                    frame.pop()?;
                }
                else {
                    frame.ip = word.c() as usize;
                }
            },
            OpCode::OR => {
                if deref(frame.peek()?)?.as_bool() {
                    frame.ip = word.c() as usize;
                }
                else {
                    frame.pop()?;
                }
            },

            OpCode::LOAD_LOCAL => {
                let value = frame.local(word.c() as usize)?;
                frame.push(value);
            },
            OpCode::STORE_LOCAL => {
                let slot = word.c() as usize;
                let value = frame.peek()?;
                match reference::redirect_of(&frame.local(slot)?) {
                    Some(target) => target.set(value)?,
                    None => frame.locals.borrow_mut()[slot] = value,
                }
            },
            OpCode::INIT_LOCAL => {
                let value = frame.peek()?;
                match frame.locals.borrow_mut().get_mut(word.c() as usize) {
                    Some(local) => *local = value,
                    None => return Err(RuntimeError::InvalidInstruction(word.0)),
                }
            },
            OpCode::LOAD_OUTER => {
                let value = frame.outer(word.c() as usize)?.get();
                frame.push(value);
            },
            OpCode::STORE_OUTER => {
                let value = frame.peek()?;
                let cell = frame.outer(word.c() as usize)?;
                match reference::redirect_of(&cell.get()) {
                    Some(target) => target.set(value)?,
                    None => cell.set_raw(value),
                }
            },
            OpCode::LOAD_GLOBAL => {
                let name = string_constant(prototype, word.c())?;
                frame.push(self.state.load(&name));
            },
            OpCode::STORE_GLOBAL => {
                let name = string_constant(prototype, word.c())?;
                let value = frame.peek()?;
                match reference::redirect_of(&self.state.load(&name)) {
                    Some(target) => target.set(value)?,
                    None => self.state.store_raw(&name, value),
                }
            },
            OpCode::LOAD_INDEX => {
                let key = deref(frame.pop()?)?;
                let target = deref(frame.pop()?)?;
                frame.push(reference::load_index(&target, &key)?);
            },
            OpCode::STORE_INDEX => {
                let value = frame.pop()?;
                let key = deref(frame.pop()?)?;
                let target = deref(frame.pop()?)?;
                reference::store_index(&target, &key, value.clone())?;
                frame.push(value);
            },
            OpCode::LOAD_FIELD => {
                let name = string_constant(prototype, word.c())?;
                let target = deref(frame.pop()?)?;
                frame.push(reference::load_field(&self.state.builtins(), &target, &name)?);
            },
            OpCode::STORE_FIELD => {
                let name = string_constant(prototype, word.c())?;
                let value = frame.pop()?;
                let target = deref(frame.pop()?)?;
                reference::store_field(&target, &name, value.clone())?;
                frame.push(value);
            },

            OpCode::NULL => frame.push(Value::Null),
            OpCode::TRUE => frame.push(Value::Bool(true)),
            OpCode::FALSE => frame.push(Value::Bool(false)),
            OpCode::CONST => {
                let constant = prototype
                    .constants
                    .get(word.c() as usize)
                    .ok_or(RuntimeError::InvalidInstruction(word.0))?;
                frame.push(constant.to_value());
            },
            OpCode::INT_M1 => frame.push(Value::int(-1)),
            OpCode::INT_0 => frame.push(Value::int(0)),
            OpCode::INT_1 => frame.push(Value::int(1)),
            OpCode::INT_2 => frame.push(Value::int(2)),
            OpCode::INT_3 => frame.push(Value::int(3)),
            OpCode::INT_4 => frame.push(Value::int(4)),
            OpCode::INT_5 => frame.push(Value::int(5)),
            OpCode::FLOAT_M1 => frame.push(Value::float(-1.0)),
            OpCode::FLOAT_0 => frame.push(Value::float(0.0)),
            OpCode::FLOAT_1 => frame.push(Value::float(1.0)),
            OpCode::FLOAT_2 => frame.push(Value::float(2.0)),
            OpCode::FLOAT_3 => frame.push(Value::float(3.0)),
            OpCode::FLOAT_4 => frame.push(Value::float(4.0)),
            OpCode::FLOAT_5 => frame.push(Value::float(5.0)),

            OpCode::LIST => {
                let values = frame.pop_n(word.c() as usize)?;
                frame.push(Value::list(values));
            },
            OpCode::TUPLE => {
                let values = frame.pop_n(word.c() as usize)?;
                frame.push(Value::tuple(values));
            },
            OpCode::CLOSURE => {
                let nested = Self::nested(prototype, word.c())?;
                let closure = self.make_closure(frame, nested)?;
                frame.push(Value::Closure(closure));
            },
            OpCode::TYPE => {
                let type_def = self.make_type(frame, prototype, word.c())?;
                frame.push(type_def);
            },
            OpCode::THIS => {
                let this = frame.this.clone().unwrap_or(Value::Null);
                frame.push(this);
            },

            OpCode::INVOKE => {
                let args = frame.pop_n(word.c() as usize)?;
                let callee = frame.pop()?;
                let result = self.invoke(&callee, None, args)?;
                frame.push(result);
            },
            OpCode::INVOKE_METHOD => {
                let name = string_constant(prototype, word.b())?;
                let args = frame.pop_n(word.a() as usize)?;
                let receiver = frame.pop()?;
                let result = self.invoke_method(receiver, &name, args)?;
                frame.push(result);
            },
            OpCode::PREFIX => {
                let op = string_constant(prototype, word.c())?;
                let operand = frame.pop()?;
                let result = self.prefix(&op, operand)?;
                frame.push(result);
            },
            OpCode::INFIX => {
                let op = string_constant(prototype, word.c())?;
                let right = frame.pop()?;
                let left = frame.pop()?;
                let result = self.infix(&op, left, right)?;
                frame.push(result);
            },
            OpCode::EQ | OpCode::NEQ => {
                let right = deref(frame.pop()?)?;
                let left = deref(frame.pop()?)?;
                let equal = left.equals(&right);
                frame.push(Value::Bool(if op == OpCode::EQ {equal} else {!equal}));
            },
            OpCode::NOT => {
                let value = deref(frame.pop()?)?;
                frame.push(Value::Bool(!value.as_bool()));
            },

            OpCode::MATCH => {
                let scrutinee = deref(frame.pop()?)?;
                let target = prototype
                    .jump_tables
                    .get(word.c() as usize)
                    .and_then(|table| table.target(MatchKey::of(&scrutinee)))
                    .ok_or(RuntimeError::InvalidInstruction(word.0))?;
                frame.ip = target as usize;
            },
            OpCode::REF => {
                let kind = RefKind::from_u32(word.a()).ok_or(RuntimeError::InvalidInstruction(word.0))?;
                let reference = match kind {
                    RefKind::Global => Reference::Global {
                        state: self.state.clone(),
                        name: string_constant(prototype, word.b())?,
                    },
                    RefKind::Local => Reference::Local(frame.capture_local(word.b() as usize)),
                    RefKind::Outer => Reference::Outer(frame.outer(word.b() as usize)?.clone()),
                    RefKind::Index => {
                        let key = deref(frame.pop()?)?;
                        let target = deref(frame.pop()?)?;
                        Reference::Index { target, key }
                    },
                    RefKind::Field => Reference::Field {
                        target: deref(frame.pop()?)?,
                        name: string_constant(prototype, word.b())?,
                        builtins: self.state.builtins(),
                    },
                };
                frame.push(Value::Reference(Rc::new(reference)));
            },
            OpCode::DEREF => {
                let value = deref(frame.pop()?)?;
                frame.push(value);
            },
            OpCode::STORE_DEREF => {
                let value = frame.pop()?;
                match frame.pop()? {
                    Value::Reference(target) => target.set(value.clone())?,
                    other => return Err(RuntimeError::InvalidReferenceTarget(other.type_name())),
                }
                frame.push(value);
            },
            OpCode::RET => {
                let value = frame.pop()?;
                frame.stack.clear();
                frame.push(value);
                frame.ip = prototype.code.len();
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PrototypeBuilder;

    fn run(builder: PrototypeBuilder) -> Result<Value, RuntimeError> {
        let mut vm = Vm::new(SharedState::new());
        vm.run(Rc::new(builder.build()))
    }

    #[test]
    fn empty_stack_returns_null() {
        assert_eq!(run(PrototypeBuilder::new(None)).unwrap(), Value::Null);
    }

    #[test]
    fn arithmetic_and_locals() {
        let mut builder = PrototypeBuilder::new(None);
        let x = builder.add_local("x").unwrap();
        builder.op_int(40);
        builder.op_store_local(x);
        builder.op_pop();
        builder.op_load_local(x);
        builder.op_int(2);
        builder.op_infix("+");
        assert_eq!(run(builder).unwrap(), Value::int(42));
    }

    #[test]
    fn errors_carry_the_line() {
        let mut builder = PrototypeBuilder::new(None);
        builder.set_line(7);
        builder.op_int(1);
        builder.op_int(0);
        builder.op_infix("//");
        let error = run(builder).unwrap_err();
        assert_eq!(error, RuntimeError::DivisionByZero.at_line(7));
    }

    #[test]
    fn jump_true_skips_the_fallthrough() {
        let mut builder = PrototypeBuilder::new(None);
        builder.op_bool(true);
        let jump = builder.op_jump_true(0);
        builder.op_int(1);
        builder.op_ret();
        let target = builder.position();
        builder.patch_jump(jump, target);
        builder.op_int(2);
        assert_eq!(run(builder).unwrap(), Value::int(2));
    }

    #[test]
    fn ranges_go_both_ways() {
        let mut vm = Vm::new(SharedState::new());
        assert_eq!(
            vm.infix("->", Value::int(1), Value::int(4)).unwrap(),
            Value::list(vec![Value::int(1), Value::int(2), Value::int(3)])
        );
        assert_eq!(
            vm.infix("->", Value::int(3), Value::int(0)).unwrap(),
            Value::list(vec![Value::int(3), Value::int(2), Value::int(1)])
        );
    }

    #[test]
    fn oversized_repetition_faults() {
        let mut vm = Vm::new(SharedState::new());
        assert_eq!(vm.infix("*", Value::string("ab"), Value::int(3)).unwrap(), Value::string("ababab"));
        assert_eq!(vm.infix("*", Value::string("ab"), Value::int(-2)).unwrap(), Value::string(""));
        assert!(matches!(
            vm.infix("*", Value::string("ab"), Value::int(i64::MAX)),
            Err(RuntimeError::Custom(_))
        ));
        assert!(vm.infix("*", Value::string(""), Value::int(i64::MAX)).is_ok());
    }

    #[test]
    fn unsupported_operator_names_operands() {
        let mut vm = Vm::new(SharedState::new());
        let error = vm.infix("-", Value::string("a"), Value::Null).unwrap_err();
        assert_eq!(error, RuntimeError::invalid_operator("-", "string and null"));
        assert!(vm.prefix("~", Value::float(1.0)).is_err());
    }

    #[test]
    fn call_depth_is_bounded() {
        let mut builder = PrototypeBuilder::new(Some("loop"));
        builder.op_load_global("loop");
        builder.op_invoke(0);
        let prototype = Rc::new(builder.build());
        let state = SharedState::new();
        let closure = Value::Closure(Rc::new(Closure::new(prototype.clone(), Box::new([]))));
        state.store_raw("loop", closure);
        let mut vm = Vm::with_config(state, VmConfig::new().with_max_call_depth(10));
        let error = vm.run(prototype).unwrap_err();
        assert_eq!(error.kind(), &RuntimeError::CallDepthExceeded(10));
    }
}
