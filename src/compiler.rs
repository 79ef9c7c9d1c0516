//! Lowers a normalized syntax tree into function prototypes.

use std::{mem, rc::Rc};

use crate::{
    ast::{FunctionData, MatchArm, MatchPattern, Node, NodeKind, TypeData},
    builder::{resolve_outer, PrototypeBuilder},
    diagnostics::{DiagnosticSink, Location},
    function::{FunctionPrototype, JumpTable, MatchKey, TypePrototype},
};

enum Binding {
    Local(u32),
    Outer(u32),
    Global,
}

/// Compiles a whole program into its root prototype. Errors go to
/// `diagnostics`; when any were reported the prototype must not be run.
pub fn compile_program(items: &[Node], diagnostics: &mut DiagnosticSink) -> FunctionPrototype {
    let mut compiler = Compiler::new(diagnostics);
    for item in items {
        compiler.node(item);
    }
    compiler.finish(Location::new(1, 1))
}

pub struct Compiler<'d> {
    builder: PrototypeBuilder,
    enclosing: Vec<PrototypeBuilder>,
    diagnostics: &'d mut DiagnosticSink,
}

impl<'d> Compiler<'d> {
    pub fn new(diagnostics: &'d mut DiagnosticSink) -> Self {
        Self {
            builder: PrototypeBuilder::new(Some("script")),
            enclosing: vec![],
            diagnostics,
        }
    }

    pub fn finish(mut self, location: Location) -> FunctionPrototype {
        self.check_size(location);
        self.builder.build()
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.diagnostics.error(location, message);
    }

    fn check_size(&mut self, location: Location) {
        if self.builder.is_oversized() {
            let name = self.builder.name().unwrap_or("<anonymous>").to_string();
            self.error(location, format!("Function '{}' is too large to encode.", name));
        }
    }

    fn is_root(&self) -> bool {
        self.enclosing.is_empty() && self.builder.scope_depth() == 0
    }

    fn resolve(&mut self, name: &str) -> Binding {
        if let Some(slot) = self.builder.local_slot(name) {
            return Binding::Local(slot);
        }
        match resolve_outer(&mut self.builder, &mut self.enclosing, name) {
            Some(position) => Binding::Outer(position),
            None => Binding::Global,
        }
    }

    fn discard(&mut self, required: bool) {
        if !required {
            self.builder.op_pop();
        }
    }

    fn declare_local(&mut self, name: &str, location: Location) -> Option<u32> {
        match self.builder.add_local(name) {
            Ok(slot) => Some(slot),
            Err(error) => {
                self.error(location, error.to_string());
                None
            },
        }
    }

    fn node(&mut self, node: &Node) {
        self.builder.set_line(node.location.line);
        let required = node.is_result_required;
        match &node.kind {
            NodeKind::Null => {
                if required {
                    self.builder.op_null();
                }
            },
            NodeKind::Bool(b) => {
                if required {
                    self.builder.op_bool(*b);
                }
            },
            NodeKind::Int(i) => {
                if required {
                    self.builder.op_int(*i);
                }
            },
            NodeKind::Float(f) => {
                if required {
                    self.builder.op_float(*f);
                }
            },
            NodeKind::Str(s) => {
                if required {
                    self.builder.op_string(s);
                }
            },
            NodeKind::Identifier(name) => {
                if required {
                    self.load(name);
                }
            },
            NodeKind::This => {
                if required {
                    self.builder.op_this();
                }
            },
            NodeKind::Prefix { op, operand } => {
                self.node(operand);
                self.builder.op_prefix(op);
                self.discard(required);
            },
            NodeKind::Infix { op, left, right } => {
                self.node(left);
                self.node(right);
                match op.as_str() {
                    "==" => self.builder.op_eq(false),
                    "!=" => self.builder.op_eq(true),
                    _ => self.builder.op_infix(op),
                }
                self.discard(required);
            },
            NodeKind::And { left, right } => {
                self.node(left);
                let jump = self.builder.op_and(0);
                self.node(right);
                self.builder.patch_jump(jump, self.builder.position());
                self.discard(required);
            },
            NodeKind::Or { left, right } => {
                self.node(left);
                let jump = self.builder.op_or(0);
                self.node(right);
                self.builder.patch_jump(jump, self.builder.position());
                self.discard(required);
            },
            NodeKind::Not(operand) => {
                self.node(operand);
                self.builder.op_not();
                self.discard(required);
            },
            NodeKind::Scope(items) => {
                self.builder.start_scope();
                for item in items {
                    self.node(item);
                }
                if items.is_empty() && required {
                    self.builder.op_null();
                }
                self.builder.end_scope();
            },
            NodeKind::VarDef(definitions) => self.var_def(definitions, node.location, required),
            NodeKind::FnDef { name, function } => {
                let slot = self.declare_binding(name, node.location);
                let prototype = self.function(Some(name.as_str()), function, node.location);
                self.builder.op_closure(prototype);
                self.bind(name, slot);
                self.discard(required);
            },
            NodeKind::Fn(function) => {
                let prototype = self.function(None, function, node.location);
                self.builder.op_closure(prototype);
                self.discard(required);
            },
            NodeKind::TypeDef(data) => {
                let slot = self.declare_binding(&data.name, node.location);
                let prototype = self.type_def(data, node.location);
                self.builder.op_type(prototype);
                self.bind(&data.name, slot);
                self.discard(required);
            },
            NodeKind::Assign { target, value } => self.assign(target, value, required),
            NodeKind::CompoundAssign { op, target, value } => self.compound_assign(op, target, value, required),
            NodeKind::Invoke { target, args } => {
                match &target.kind {
                    NodeKind::Field { target: receiver, name } => {
                        self.node(receiver);
                        for arg in args {
                            self.node(arg);
                        }
                        self.builder.set_line(node.location.line);
                        self.builder.op_invoke_method(name, args.len() as u32);
                    },
                    _ => {
                        self.node(target);
                        for arg in args {
                            self.node(arg);
                        }
                        self.builder.set_line(node.location.line);
                        self.builder.op_invoke(args.len() as u32);
                    },
                }
                self.discard(required);
            },
            NodeKind::Index { target, index } => {
                self.node(target);
                self.node(index);
                self.builder.op_load_index();
                self.discard(required);
            },
            NodeKind::Field { target, name } => {
                self.node(target);
                self.builder.op_load_field(name);
                self.discard(required);
            },
            NodeKind::If { condition, pass, fail } => self.if_expr(condition, pass, fail.as_deref(), required),
            NodeKind::While { condition, body, el } => self.while_expr(condition, body, el.as_deref(), required),
            NodeKind::Match { scrutinee, arms } => self.match_expr(scrutinee, arms, required),
            NodeKind::Ref(operand) => {
                self.reference(operand);
                self.discard(required);
            },
            NodeKind::Deref(operand) => {
                self.node(operand);
                self.builder.op_deref();
                self.discard(required);
            },
            NodeKind::List(elements) => {
                for element in elements {
                    self.node(element);
                }
                self.builder.op_list(elements.len() as u32);
                self.discard(required);
            },
            NodeKind::Tuple(elements) => {
                for element in elements {
                    self.node(element);
                }
                self.builder.op_tuple(elements.len() as u32);
                self.discard(required);
            },
            NodeKind::Ret(value) => {
                match value {
                    Some(value) => self.node(value),
                    None => self.builder.op_null(),
                }
                self.builder.op_ret();
                // Code after `ret` is unreachable; keep the height its parent expects.
                if required {
                    let height = self.builder.stack_height();
                    self.builder.set_stack_height(height + 1);
                }
            },
        }
    }

    fn load(&mut self, name: &str) {
        match self.resolve(name) {
            Binding::Local(slot) => self.builder.op_load_local(slot),
            Binding::Outer(position) => self.builder.op_load_outer(position),
            Binding::Global => self.builder.op_load_global(name),
        }
    }

    fn store(&mut self, name: &str) {
        match self.resolve(name) {
            Binding::Local(slot) => self.builder.op_store_local(slot),
            Binding::Outer(position) => self.builder.op_store_outer(position),
            Binding::Global => self.builder.op_store_global(name),
        }
    }

    /// Named functions and types are globals at the top level of the script
    /// and locals everywhere else. The local exists before its value is
    /// compiled so the body can refer to itself.
    fn declare_binding(&mut self, name: &str, location: Location) -> Option<u32> {
        if self.is_root() {
            None
        }
        else {
            self.declare_local(name, location)
        }
    }

    fn bind(&mut self, name: &str, slot: Option<u32>) {
        match slot {
            Some(slot) => self.builder.op_init_local(slot),
            None if self.is_root() => self.builder.op_store_global(name),
            None => {},
        }
    }

    fn var_def(&mut self, definitions: &[(String, Node)], location: Location, required: bool) {
        let count = definitions.len();
        for (i, (name, value)) in definitions.iter().enumerate() {
            let slot = self.declare_local(name, location);
            self.node(value);
            if let Some(slot) = slot {
                self.builder.op_init_local(slot);
            }
            if !(required && i + 1 == count) {
                self.builder.op_pop();
            }
        }
        if count == 0 && required {
            self.builder.op_null();
        }
    }

    fn assign(&mut self, target: &Node, value: &Node, required: bool) {
        match &target.kind {
            NodeKind::Identifier(name) => {
                self.node(value);
                self.store(name);
            },
            NodeKind::Index { target, index } => {
                self.node(target);
                self.node(index);
                self.node(value);
                self.builder.op_store_index();
            },
            NodeKind::Field { target, name } => {
                self.node(target);
                self.node(value);
                self.builder.op_store_field(name);
            },
            NodeKind::Deref(inner) => {
                self.node(inner);
                self.node(value);
                self.builder.op_store_deref();
            },
            _ => {
                self.error(target.location, "Invalid assignment target.");
                self.node(value);
            },
        }
        self.discard(required);
    }

    /// Reads the target, applies `op` and writes back, evaluating the
    /// target's receiver and key only once.
    fn compound_assign(&mut self, op: &str, target: &Node, value: &Node, required: bool) {
        match &target.kind {
            NodeKind::Identifier(name) => {
                self.load(name);
                self.node(value);
                self.builder.op_infix(op);
                self.store(name);
            },
            NodeKind::Index { target, index } => {
                self.node(target);
                self.node(index);
                self.builder.op_dup2();
                self.builder.op_load_index();
                self.node(value);
                self.builder.op_infix(op);
                self.builder.op_store_index();
            },
            NodeKind::Field { target, name } => {
                self.node(target);
                self.builder.op_dup();
                self.builder.op_load_field(name);
                self.node(value);
                self.builder.op_infix(op);
                self.builder.op_store_field(name);
            },
            NodeKind::Deref(inner) => {
                self.node(inner);
                self.builder.op_dup();
                self.builder.op_deref();
                self.node(value);
                self.builder.op_infix(op);
                self.builder.op_store_deref();
            },
            _ => {
                self.error(target.location, "Invalid assignment target.");
                self.node(value);
            },
        }
        self.discard(required);
    }

    fn reference(&mut self, operand: &Node) {
        match &operand.kind {
            NodeKind::Identifier(name) => match self.resolve(name) {
                Binding::Local(slot) => {
                    self.builder.mark_captured(slot);
                    self.builder.op_ref_local(slot);
                },
                Binding::Outer(position) => self.builder.op_ref_outer(position),
                Binding::Global => self.builder.op_ref_global(name),
            },
            NodeKind::Index { target, index } => {
                self.node(target);
                self.node(index);
                self.builder.op_ref_index();
            },
            NodeKind::Field { target, name } => {
                self.node(target);
                self.builder.op_ref_field(name);
            },
            _ => {
                self.error(operand.location, "'ref' expects a variable, an index or a field.");
                self.builder.op_null();
            },
        }
    }

    fn if_expr(&mut self, condition: &Node, pass: &Node, fail: Option<&Node>, required: bool) {
        let skip_pass = match &condition.kind {
            NodeKind::Not(operand) => {
                self.node(operand);
                self.builder.op_jump_true(0)
            },
            _ => {
                self.node(condition);
                self.builder.op_jump_false(0)
            },
        };
        let height = self.builder.stack_height();
        self.node(pass);
        if fail.is_none() && !required {
            self.builder.patch_jump(skip_pass, self.builder.position());
            return;
        }
        let end = self.builder.op_jump(0);
        self.builder.patch_jump(skip_pass, self.builder.position());
        self.builder.set_stack_height(height);
        match fail {
            Some(fail) => self.node(fail),
            None => self.builder.op_null(),
        }
        self.builder.patch_jump(end, self.builder.position());
    }

    /// The `el` branch runs only when the condition fails on entry. A
    /// required loop evaluates to the list of its body values.
    fn while_expr(&mut self, condition: &Node, body: &Node, el: Option<&Node>, required: bool) {
        let height = self.builder.stack_height();
        let skip_loop = el.map(|_| {
            self.node(condition);
            self.builder.op_jump_false(0)
        });
        if required {
            self.builder.op_list(0);
        }
        let enter_body = el.map(|_| self.builder.op_jump(0));

        let start = self.builder.position();
        self.node(condition);
        let exit = self.builder.op_jump_false(0);
        if let Some(enter_body) = enter_body {
            self.builder.patch_jump(enter_body, self.builder.position());
        }
        if required {
            self.builder.op_dup();
            self.node(body);
            self.builder.op_invoke_method("append", 1);
            self.builder.op_pop();
        }
        else {
            self.node(body);
        }
        self.builder.op_jump(start);
        self.builder.patch_jump(exit, self.builder.position());

        if let (Some(el), Some(skip_loop)) = (el, skip_loop) {
            let end = self.builder.op_jump(0);
            self.builder.patch_jump(skip_loop, self.builder.position());
            self.builder.set_stack_height(height);
            self.node(el);
            self.builder.patch_jump(end, self.builder.position());
        }
    }

    fn match_key(&mut self, arm: &MatchArm) -> Option<MatchKey> {
        let pattern = match &arm.pattern {
            MatchPattern::Wildcard => return Some(MatchKey::Default),
            MatchPattern::Literal(pattern) => pattern,
        };
        match &pattern.kind {
            NodeKind::Null => Some(MatchKey::Null),
            NodeKind::Bool(b) => Some(MatchKey::Bool(*b)),
            NodeKind::Int(i) => Some(MatchKey::Int(*i)),
            NodeKind::Str(s) => Some(MatchKey::Str(Rc::from(s.as_str()))),
            _ => {
                self.error(pattern.location, "Match cases must be null, bool, int or string literals.");
                None
            },
        }
    }

    fn match_expr(&mut self, scrutinee: &Node, arms: &[MatchArm], required: bool) {
        self.node(scrutinee);
        let table_index = self.builder.reserve_jump_table();
        self.builder.op_match(table_index);
        let height = self.builder.stack_height();

        let mut table = JumpTable::default();
        let mut ends = vec![];
        for arm in arms {
            let key = match self.match_key(arm) {
                Some(key) => key,
                None => continue,
            };
            if table.cases.contains_key(&key) {
                self.error(arm.location, format!("Duplicate match case '{}'.", key));
                continue;
            }
            table.cases.insert(key, self.builder.position());
            self.builder.set_stack_height(height);
            self.node(&arm.body);
            ends.push(self.builder.op_jump(0));
        }

        let has_default = table.cases.contains_key(&MatchKey::Default);
        if !has_default && required {
            table.cases.insert(MatchKey::Default, self.builder.position());
            self.builder.set_stack_height(height);
            self.builder.op_null();
        }
        let end = self.builder.position();
        for jump in ends {
            self.builder.patch_jump(jump, end);
        }
        if !has_default && !required {
            table.cases.insert(MatchKey::Default, end);
        }
        self.builder.fill_jump_table(table_index, table);
        self.builder.set_stack_height(height + required as usize);
    }

    fn function(&mut self, name: Option<&str>, function: &FunctionData, location: Location) -> FunctionPrototype {
        let parent = mem::replace(&mut self.builder, PrototypeBuilder::new(name));
        self.enclosing.push(parent);
        self.builder.set_line(location.line);
        for param in &function.params {
            if let Err(error) = self.builder.add_parameter(param) {
                self.error(location, error.to_string());
            }
        }
        if function.variadic {
            self.builder.set_variadic();
        }
        self.node(&function.body);
        self.check_size(location);

        let parent = self.enclosing.pop().unwrap_or_else(|| PrototypeBuilder::new(None));
        let finished = mem::replace(&mut self.builder, parent);
        finished.build()
    }

    fn type_def(&mut self, data: &TypeData, location: Location) -> TypePrototype {
        let member = |compiler: &mut Self, suffix: &str, function: &FunctionData| {
            let name = format!("{}.{}", data.name, suffix);
            let prototype = compiler.function(Some(name.as_str()), function, location);
            compiler.builder.add_nested(prototype)
        };
        let mut prototype = TypePrototype {
            name: Rc::from(data.name.as_str()),
            ..TypePrototype::default()
        };
        if let Some(ctor) = &data.ctor {
            prototype.ctor = Some(member(self, "ctor", ctor));
        }
        if let Some(invoke) = &data.invoke {
            prototype.invoke = Some(member(self, "invoke", invoke));
        }
        for (name, function) in &data.methods {
            let index = member(self, name, function);
            prototype.methods.push((Rc::from(name.as_str()), index));
        }
        for (op, function) in &data.prefix {
            let index = member(self, op, function);
            prototype.prefix.push((Rc::from(op.as_str()), index));
        }
        for (op, function) in &data.infix {
            let index = member(self, op, function);
            prototype.infix.push((Rc::from(op.as_str()), index));
        }
        prototype
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunk::OpCode, normalize::normalize_program, parser::parse};

    fn compile(source: &str) -> (FunctionPrototype, DiagnosticSink) {
        let mut diagnostics = DiagnosticSink::new();
        let mut items = parse(source, &mut diagnostics);
        normalize_program(&mut items, &mut diagnostics);
        let prototype = compile_program(&items, &mut diagnostics);
        (prototype, diagnostics)
    }

    fn ops(prototype: &FunctionPrototype) -> Vec<OpCode> {
        prototype.code.iter().filter_map(|word| word.op()).collect()
    }

    fn errors(diagnostics: &DiagnosticSink) -> Vec<String> {
        diagnostics.iter().filter(|d| d.severity == crate::diagnostics::Severity::Error).map(|d| d.message.clone()).collect()
    }

    #[test]
    fn unused_literals_emit_nothing() {
        let (prototype, diagnostics) = compile("1; \"two\"; 3");
        assert!(!diagnostics.has_errors());
        assert_eq!(ops(&prototype), vec![OpCode::INT_3]);
    }

    #[test]
    fn var_definition_keeps_only_the_last_value() {
        let (prototype, _) = compile("var x = 1, y = 2");
        assert_eq!(
            ops(&prototype),
            vec![OpCode::INT_1, OpCode::INIT_LOCAL, OpCode::POP, OpCode::INT_2, OpCode::INIT_LOCAL]
        );
        assert_eq!(prototype.max_locals, 2);
    }

    #[test]
    fn duplicate_locals_are_reported() {
        let (_, diagnostics) = compile("var x = 1; var x = 2");
        assert_eq!(errors(&diagnostics), vec!["A local named 'x' already exists in this function.".to_string()]);
    }

    #[test]
    fn invalid_assignment_target() {
        let (_, diagnostics) = compile("1 = 2");
        assert_eq!(errors(&diagnostics), vec!["Invalid assignment target.".to_string()]);
    }

    #[test]
    fn malformed_ref_operand() {
        let (_, diagnostics) = compile("ref 1 + 2");
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn negated_conditions_branch_on_the_operand() {
        let (prototype, _) = compile("var c = 1; if not c 2 el 3");
        let ops = ops(&prototype);
        assert!(ops.contains(&OpCode::JUMP_TRUE));
        assert!(!ops.contains(&OpCode::NOT));
    }

    #[test]
    fn duplicate_match_case() {
        let (_, diagnostics) = compile("match 1 { 1: 2, 1: 3 }");
        assert_eq!(errors(&diagnostics), vec!["Duplicate match case '1'.".to_string()]);
    }

    #[test]
    fn method_calls_use_invoke_method() {
        let (prototype, _) = compile("var l = []; l.append(1)");
        assert!(ops(&prototype).contains(&OpCode::INVOKE_METHOD));
        assert!(!ops(&prototype).contains(&OpCode::LOAD_FIELD));
    }

    #[test]
    fn top_level_functions_are_globals() {
        let (prototype, _) = compile("fn f() 1");
        assert_eq!(ops(&prototype), vec![OpCode::CLOSURE, OpCode::STORE_GLOBAL]);
        assert_eq!(prototype.nested[0].display_name(), "f");
        assert_eq!(prototype.nested[0].code.len(), 1);
    }

    #[test]
    fn nested_functions_capture_outer_locals() {
        let (prototype, diagnostics) = compile("fn outer() { var x = 1; fn inner() x; inner }");
        assert!(!diagnostics.has_errors());
        let outer = &prototype.nested[0];
        let inner = &outer.nested[0];
        assert_eq!(inner.outers.len(), 1);
        assert_eq!(&*inner.outers[0].name, "x");
        assert!(ops(outer).contains(&OpCode::CLOSE_OUTERS));
    }

    #[test]
    fn if_without_else_yields_null_when_required() {
        let (prototype, _) = compile("var c = false; if c 1");
        let ops = ops(&prototype);
        assert_eq!(ops.iter().filter(|op| **op == OpCode::NULL).count(), 1);
        assert_eq!(prototype.max_stack, 1);
    }

    #[test]
    fn required_loops_collect_into_a_list() {
        let (prototype, _) = compile("var i = 0; while i < 3 i = i + 1");
        let ops = ops(&prototype);
        assert!(ops.contains(&OpCode::LIST));
        assert!(ops.contains(&OpCode::DUP));
        assert!(ops.contains(&OpCode::INVOKE_METHOD));
    }
}
