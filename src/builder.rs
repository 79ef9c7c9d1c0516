use std::rc::Rc;

use thiserror::Error;

use crate::{
    chunk::{Insn, Instruction, LineTable, OpCode, RefKind},
    function::{
        Constant, FunctionPrototype, JumpTable, LocalValueInfo, OuterKind, OuterValueInfo,
        TypePrototype, CAPTURED,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("A local named '{0}' already exists in this function.")]
pub struct DuplicateLocal(pub String);

/// Accumulates the compiled state of one function. Builders for enclosing
/// functions are kept by the compiler and passed to [`resolve_outer`].
#[derive(Debug)]
pub struct PrototypeBuilder {
    name: Option<Rc<str>>,
    num_params: u32,
    variadic: bool,
    code: Vec<Insn>,
    lines: LineTable,
    line: u32,
    constants: Vec<Constant>,
    active_locals: Vec<LocalValueInfo>,
    retired_locals: Vec<LocalValueInfo>,
    scopes: Vec<usize>,
    outers: Vec<OuterValueInfo>,
    nested: Vec<Rc<FunctionPrototype>>,
    types: Vec<TypePrototype>,
    jump_tables: Vec<JumpTable>,
    stack: usize,
    max_stack: usize,
    max_locals: usize,
    oversized: bool,
}

impl PrototypeBuilder {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(Rc::from),
            num_params: 0,
            variadic: false,
            code: vec![],
            lines: LineTable::new(),
            line: 0,
            constants: vec![],
            active_locals: vec![],
            retired_locals: vec![],
            scopes: vec![],
            outers: vec![],
            nested: vec![],
            types: vec![],
            jump_tables: vec![],
            stack: 0,
            max_stack: 0,
            max_locals: 0,
            oversized: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }
    /// Set when some operand did not fit its field; the prototype is unusable.
    pub fn is_oversized(&self) -> bool {
        self.oversized
    }
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }
    pub fn code(&self) -> &[Insn] {
        &self.code
    }
}

// locals, scopes and outers
impl PrototypeBuilder {
    pub fn add_parameter(&mut self, name: &str) -> Result<u32, DuplicateLocal> {
        let slot = self.add_local(name)?;
        self.num_params += 1;
        Ok(slot)
    }
    pub fn set_variadic(&mut self) {
        self.variadic = true;
    }
    pub fn add_local(&mut self, name: &str) -> Result<u32, DuplicateLocal> {
        if self.active_locals.iter().any(|local| &*local.name == name) {
            return Err(DuplicateLocal(name.to_string()));
        }
        let slot = self.active_locals.len() as u32;
        self.active_locals.push(LocalValueInfo {
            name: Rc::from(name),
            slot,
            start_op: self.position(),
            end_op: 0,
        });
        self.max_locals = self.max_locals.max(self.active_locals.len());
        Ok(slot)
    }
    pub fn local_slot(&self, name: &str) -> Option<u32> {
        self.active_locals.iter().rev().find(|local| &*local.name == name).map(|local| local.slot)
    }
    pub fn mark_captured(&mut self, slot: u32) {
        if let Some(local) = self.active_locals.iter_mut().find(|local| local.slot == slot) {
            local.end_op = CAPTURED;
        }
    }
    pub fn outer_position(&self, name: &str) -> Option<u32> {
        self.outers.iter().position(|outer| &*outer.name == name).map(|i| i as u32)
    }
    pub fn push_outer(&mut self, name: &str, position: u32, kind: OuterKind) -> u32 {
        self.outers.push(OuterValueInfo {
            name: Rc::from(name),
            position,
            kind,
        });
        self.outers.len() as u32 - 1
    }
    pub fn start_scope(&mut self) {
        self.scopes.push(self.active_locals.len());
    }
    pub fn end_scope(&mut self) {
        let base = match self.scopes.pop() {
            Some(base) => base,
            None => panic!("Error in code: ended a scope that was never started."),
        };
        let retired = self.active_locals.split_off(base);
        if retired.iter().any(LocalValueInfo::is_captured) {
            self.op_close_outers(base as u32);
        }
        self.retire(retired);
    }
    fn retire(&mut self, locals: Vec<LocalValueInfo>) {
        let end = self.position();
        for mut local in locals {
            if !local.is_captured() {
                local.end_op = end;
            }
            self.retired_locals.push(local);
        }
    }
}

/// Resolves `name` as an outer value of `current`, walking the enclosing
/// builders from innermost (`parents.last()`) outwards. Returns `None` when
/// the name is not bound in any enclosing function.
pub fn resolve_outer(current: &mut PrototypeBuilder, parents: &mut [PrototypeBuilder], name: &str) -> Option<u32> {
    if let Some(position) = current.outer_position(name) {
        return Some(position);
    }
    let (parent, rest) = parents.split_last_mut()?;
    if let Some(slot) = parent.local_slot(name) {
        parent.mark_captured(slot);
        return Some(current.push_outer(name, slot, OuterKind::LocalInParent));
    }
    let position = resolve_outer(parent, rest, name)?;
    Some(current.push_outer(name, position, OuterKind::OuterInParent))
}

// pools
impl PrototypeBuilder {
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        if let Some(i) = self.constants.iter().position(|c| *c == constant) {
            return i as u32;
        }
        self.constants.push(constant);
        self.constants.len() as u32 - 1
    }
    fn string_constant(&mut self, s: &str) -> u32 {
        self.add_constant(Constant::Str(Rc::from(s)))
    }
    pub fn reserve_jump_table(&mut self) -> u32 {
        self.jump_tables.push(JumpTable::default());
        self.jump_tables.len() as u32 - 1
    }
    pub fn fill_jump_table(&mut self, index: u32, table: JumpTable) {
        if let Some(slot) = self.jump_tables.get_mut(index as usize) {
            *slot = table;
        }
    }
}

// stack height tracking
impl PrototypeBuilder {
    pub fn stack_height(&self) -> usize {
        self.stack
    }
    /// Used where control flow joins: every incoming path has the same height.
    pub fn set_stack_height(&mut self, height: usize) {
        self.stack = height;
        self.max_stack = self.max_stack.max(height);
    }
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }
    fn grow(&mut self, n: usize) {
        self.stack += n;
        self.max_stack = self.max_stack.max(self.stack);
    }
    fn shrink(&mut self, n: usize) {
        assert!(
            self.stack >= n,
            "Error in code: operand stack height of '{}' would drop below zero.",
            self.name.as_deref().unwrap_or("<anonymous>")
        );
        self.stack -= n;
    }
    fn replace(&mut self, popped: usize, pushed: usize) {
        self.shrink(popped);
        self.grow(pushed);
    }
}

// emitting instructions
impl PrototypeBuilder {
    fn emit(&mut self, insn: Insn) -> usize {
        if !insn.fits() {
            self.oversized = true;
        }
        self.code.push(insn);
        self.lines.add_line(self.line);
        self.code.len() - 1
    }
    /// Rewrites only the operand of the jump at `at`.
    pub fn patch_jump(&mut self, at: usize, target: u32) {
        if let Some(insn) = self.code.get_mut(at) {
            insn.a = target;
            if !insn.fits() {
                self.oversized = true;
            }
        }
    }
    pub fn op_pop(&mut self) {
        self.shrink(1);
        self.emit(Insn::simple(OpCode::POP));
    }
    pub fn op_dup(&mut self) {
        self.replace(1, 2);
        self.emit(Insn::simple(OpCode::DUP));
    }
    /// Duplicates the top two values, keeping their order.
    pub fn op_dup2(&mut self) {
        self.replace(2, 4);
        self.emit(Insn::simple(OpCode::DUP2));
    }
    pub fn op_close_outers(&mut self, from: u32) {
        self.emit(Insn::wide(OpCode::CLOSE_OUTERS, from));
    }
    pub fn op_jump(&mut self, target: u32) -> usize {
        self.emit(Insn::wide(OpCode::JUMP, target))
    }
    pub fn op_jump_true(&mut self, target: u32) -> usize {
        self.shrink(1);
        self.emit(Insn::wide(OpCode::JUMP_TRUE, target))
    }
    pub fn op_jump_false(&mut self, target: u32) -> usize {
        self.shrink(1);
        self.emit(Insn::wide(OpCode::JUMP_FALSE, target))
    }
    /// Keeps the left operand and jumps when it is falsy, otherwise pops it.
    pub fn op_and(&mut self, target: u32) -> usize {
        self.shrink(1);
        self.emit(Insn::wide(OpCode::AND, target))
    }
    pub fn op_or(&mut self, target: u32) -> usize {
        self.shrink(1);
        self.emit(Insn::wide(OpCode::OR, target))
    }
    pub fn op_load_local(&mut self, slot: u32) {
        self.grow(1);
        self.emit(Insn::wide(OpCode::LOAD_LOCAL, slot));
    }
    pub fn op_store_local(&mut self, slot: u32) {
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::STORE_LOCAL, slot));
    }
    /// Stores into a newly declared local, ignoring whatever the slot held
    /// for a local of an earlier scope.
    pub fn op_init_local(&mut self, slot: u32) {
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::INIT_LOCAL, slot));
    }
    pub fn op_load_outer(&mut self, position: u32) {
        self.grow(1);
        self.emit(Insn::wide(OpCode::LOAD_OUTER, position));
    }
    pub fn op_store_outer(&mut self, position: u32) {
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::STORE_OUTER, position));
    }
    pub fn op_load_global(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.grow(1);
        self.emit(Insn::wide(OpCode::LOAD_GLOBAL, index));
    }
    pub fn op_store_global(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::STORE_GLOBAL, index));
    }
    pub fn op_load_index(&mut self) {
        self.replace(2, 1);
        self.emit(Insn::simple(OpCode::LOAD_INDEX));
    }
    pub fn op_store_index(&mut self) {
        self.replace(3, 1);
        self.emit(Insn::simple(OpCode::STORE_INDEX));
    }
    pub fn op_load_field(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::LOAD_FIELD, index));
    }
    pub fn op_store_field(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.replace(2, 1);
        self.emit(Insn::wide(OpCode::STORE_FIELD, index));
    }
    pub fn op_null(&mut self) {
        self.grow(1);
        self.emit(Insn::simple(OpCode::NULL));
    }
    pub fn op_bool(&mut self, value: bool) {
        self.grow(1);
        self.emit(Insn::simple(if value {OpCode::TRUE} else {OpCode::FALSE}));
    }
    pub fn op_int(&mut self, value: i64) {
        self.grow(1);
        let op = match value {
            -1 => OpCode::INT_M1,
            0 => OpCode::INT_0,
            1 => OpCode::INT_1,
            2 => OpCode::INT_2,
            3 => OpCode::INT_3,
            4 => OpCode::INT_4,
            5 => OpCode::INT_5,
            _ => {
                let index = self.add_constant(Constant::Int(value));
                self.emit(Insn::wide(OpCode::CONST, index));
                return;
            },
        };
        self.emit(Insn::simple(op));
    }
    pub fn op_float(&mut self, value: f64) {
        self.grow(1);
        let small = value.fract() == 0.0 && (-1.0..=5.0).contains(&value) && !(value == 0.0 && value.is_sign_negative());
        if !small {
            let index = self.add_constant(Constant::Float(value));
            self.emit(Insn::wide(OpCode::CONST, index));
            return;
        }
        let op = match value as i64 {
            -1 => OpCode::FLOAT_M1,
            0 => OpCode::FLOAT_0,
            1 => OpCode::FLOAT_1,
            2 => OpCode::FLOAT_2,
            3 => OpCode::FLOAT_3,
            4 => OpCode::FLOAT_4,
            _ => OpCode::FLOAT_5,
        };
        self.emit(Insn::simple(op));
    }
    pub fn op_string(&mut self, value: &str) {
        let index = self.string_constant(value);
        self.grow(1);
        self.emit(Insn::wide(OpCode::CONST, index));
    }
    pub fn op_list(&mut self, count: u32) {
        self.replace(count as usize, 1);
        self.emit(Insn::wide(OpCode::LIST, count));
    }
    pub fn op_tuple(&mut self, count: u32) {
        self.replace(count as usize, 1);
        self.emit(Insn::wide(OpCode::TUPLE, count));
    }
    pub fn op_closure(&mut self, prototype: FunctionPrototype) {
        self.nested.push(Rc::new(prototype));
        let index = self.nested.len() as u32 - 1;
        self.grow(1);
        self.emit(Insn::wide(OpCode::CLOSURE, index));
    }
    /// Adds a member prototype for a type definition without emitting code.
    pub fn add_nested(&mut self, prototype: FunctionPrototype) -> u32 {
        self.nested.push(Rc::new(prototype));
        self.nested.len() as u32 - 1
    }
    pub fn op_type(&mut self, prototype: TypePrototype) {
        self.types.push(prototype);
        let index = self.types.len() as u32 - 1;
        self.grow(1);
        self.emit(Insn::wide(OpCode::TYPE, index));
    }
    pub fn op_this(&mut self) {
        self.grow(1);
        self.emit(Insn::simple(OpCode::THIS));
    }
    pub fn op_invoke(&mut self, arg_count: u32) {
        self.replace(arg_count as usize + 1, 1);
        self.emit(Insn::wide(OpCode::INVOKE, arg_count));
    }
    pub fn op_invoke_method(&mut self, name: &str, arg_count: u32) {
        let index = self.string_constant(name);
        self.replace(arg_count as usize + 1, 1);
        self.emit(Insn::split(OpCode::INVOKE_METHOD, arg_count, index));
    }
    pub fn op_prefix(&mut self, op: &str) {
        let index = self.string_constant(op);
        self.replace(1, 1);
        self.emit(Insn::wide(OpCode::PREFIX, index));
    }
    pub fn op_infix(&mut self, op: &str) {
        let index = self.string_constant(op);
        self.replace(2, 1);
        self.emit(Insn::wide(OpCode::INFIX, index));
    }
    pub fn op_eq(&mut self, negated: bool) {
        self.replace(2, 1);
        self.emit(Insn::simple(if negated {OpCode::NEQ} else {OpCode::EQ}));
    }
    pub fn op_not(&mut self) {
        self.replace(1, 1);
        self.emit(Insn::simple(OpCode::NOT));
    }
    pub fn op_match(&mut self, table: u32) {
        self.shrink(1);
        self.emit(Insn::wide(OpCode::MATCH, table));
    }
    pub fn op_ref_local(&mut self, slot: u32) {
        self.grow(1);
        self.emit(Insn::split(OpCode::REF, RefKind::Local as u32, slot));
    }
    pub fn op_ref_outer(&mut self, position: u32) {
        self.grow(1);
        self.emit(Insn::split(OpCode::REF, RefKind::Outer as u32, position));
    }
    pub fn op_ref_global(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.grow(1);
        self.emit(Insn::split(OpCode::REF, RefKind::Global as u32, index));
    }
    pub fn op_ref_index(&mut self) {
        self.replace(2, 1);
        self.emit(Insn::split(OpCode::REF, RefKind::Index as u32, 0));
    }
    pub fn op_ref_field(&mut self, name: &str) {
        let index = self.string_constant(name);
        self.replace(1, 1);
        self.emit(Insn::split(OpCode::REF, RefKind::Field as u32, index));
    }
    pub fn op_deref(&mut self) {
        self.replace(1, 1);
        self.emit(Insn::simple(OpCode::DEREF));
    }
    pub fn op_store_deref(&mut self) {
        self.replace(2, 1);
        self.emit(Insn::simple(OpCode::STORE_DEREF));
    }
    pub fn op_ret(&mut self) {
        self.shrink(1);
        self.emit(Insn::simple(OpCode::RET));
    }
}

impl PrototypeBuilder {
    pub fn build(mut self) -> FunctionPrototype {
        let remaining = std::mem::take(&mut self.active_locals);
        self.retire(remaining);
        tracing::debug!(
            name = self.name.as_deref().unwrap_or("<anonymous>"),
            instructions = self.code.len(),
            constants = self.constants.len(),
            outers = self.outers.len(),
            max_stack = self.max_stack,
            max_locals = self.max_locals,
            "built prototype"
        );
        FunctionPrototype {
            name: self.name,
            code: self.code.iter().map(|insn| Instruction(insn.pack())).collect(),
            num_params: self.num_params,
            variadic: self.variadic,
            max_locals: self.max_locals,
            max_stack: self.max_stack,
            constants: self.constants.into_boxed_slice(),
            outers: self.outers.into_boxed_slice(),
            nested: self.nested.into_boxed_slice(),
            types: self.types.into_boxed_slice(),
            jump_tables: self.jump_tables.into_boxed_slice(),
            locals: self.retired_locals.into_boxed_slice(),
            lines: self.lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(builder: &PrototypeBuilder) -> Vec<OpCode> {
        builder.code().iter().map(|insn| insn.op).collect()
    }

    #[test]
    fn small_literals_use_dedicated_opcodes() {
        let mut builder = PrototypeBuilder::new(None);
        builder.op_int(-1);
        builder.op_int(5);
        builder.op_int(6);
        builder.op_float(2.0);
        builder.op_float(-0.0);
        builder.op_float(2.5);
        assert_eq!(
            ops(&builder),
            vec![OpCode::INT_M1, OpCode::INT_5, OpCode::CONST, OpCode::FLOAT_2, OpCode::CONST, OpCode::CONST]
        );
        let prototype = builder.build();
        assert_eq!(prototype.constants.len(), 3);
        assert_eq!(prototype.max_stack, 6);
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut builder = PrototypeBuilder::new(None);
        let a = builder.add_constant(Constant::Str(Rc::from("x")));
        let b = builder.add_constant(Constant::Int(100));
        let c = builder.add_constant(Constant::Str(Rc::from("x")));
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn duplicate_locals_in_one_function() {
        let mut builder = PrototypeBuilder::new(None);
        builder.add_local("x").unwrap();
        builder.start_scope();
        assert_eq!(builder.add_local("x"), Err(DuplicateLocal("x".to_string())));
        builder.add_local("y").unwrap();
        builder.end_scope();
        assert_eq!(builder.add_local("y"), Ok(1));
    }

    #[test]
    fn scope_exit_closes_only_captured_locals() {
        let mut builder = PrototypeBuilder::new(None);
        builder.add_local("a").unwrap();
        builder.start_scope();
        builder.add_local("b").unwrap();
        builder.end_scope();
        assert!(ops(&builder).is_empty());

        builder.start_scope();
        let slot = builder.add_local("c").unwrap();
        builder.mark_captured(slot);
        builder.end_scope();
        assert_eq!(builder.code(), &[Insn::wide(OpCode::CLOSE_OUTERS, 1)]);

        let prototype = builder.build();
        let c = prototype.locals.iter().find(|l| &*l.name == "c").unwrap();
        assert!(c.is_captured());
        assert_eq!(prototype.max_locals, 2);
    }

    #[test]
    fn outers_resolve_through_the_chain() {
        let mut grandparent = PrototypeBuilder::new(Some("outer"));
        grandparent.add_local("x").unwrap();
        let mut parents = vec![grandparent, PrototypeBuilder::new(Some("middle"))];
        let mut current = PrototypeBuilder::new(Some("inner"));

        assert_eq!(resolve_outer(&mut current, &mut parents, "x"), Some(0));
        assert_eq!(resolve_outer(&mut current, &mut parents, "x"), Some(0));
        assert_eq!(resolve_outer(&mut current, &mut parents, "missing"), None);

        let middle = parents.pop().unwrap().build();
        assert_eq!(middle.outers[0].kind, OuterKind::LocalInParent);
        let inner = current.build();
        assert_eq!(inner.outers.len(), 1);
        assert_eq!(inner.outers[0].kind, OuterKind::OuterInParent);
        let outer = parents.pop().unwrap().build();
        assert!(outer.locals[0].is_captured());
    }

    #[test]
    fn jumps_are_backpatched() {
        let mut builder = PrototypeBuilder::new(None);
        builder.op_bool(true);
        let jump = builder.op_jump_false(0);
        builder.op_int(1);
        builder.op_pop();
        let end = builder.position();
        builder.patch_jump(jump, end);
        assert_eq!(builder.code()[jump], Insn::wide(OpCode::JUMP_FALSE, 4));
        assert_eq!(builder.stack_height(), 0);
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn popping_an_empty_stack_is_a_bug() {
        let mut builder = PrototypeBuilder::new(None);
        builder.op_pop();
    }

    #[test]
    fn method_invoke_uses_split_layout() {
        let mut builder = PrototypeBuilder::new(None);
        builder.op_null();
        builder.op_int(1);
        builder.op_invoke_method("append", 1);
        let prototype = builder.build();
        let word = prototype.code[2];
        assert_eq!(word.op(), Some(OpCode::INVOKE_METHOD));
        assert_eq!(word.a(), 1);
        assert_eq!(prototype.constants[word.b() as usize], Constant::Str(Rc::from("append")));
    }
}
