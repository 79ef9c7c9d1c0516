//! Assigns `is_result_required` to every node and folds trivial constants.

use crate::{
    ast::{FunctionData, MatchPattern, Node, NodeKind},
    diagnostics::DiagnosticSink,
};

/// Normalizes a parsed program in place. Only the last top-level item keeps
/// its value, which becomes the program's result.
pub fn normalize_program(items: &mut [Node], diagnostics: &mut DiagnosticSink) {
    let mut normalizer = Normalizer { diagnostics };
    let count = items.len();
    for (i, item) in items.iter_mut().enumerate() {
        normalizer.visit(item, i + 1 == count);
    }
}

struct Normalizer<'d> {
    diagnostics: &'d mut DiagnosticSink,
}

impl<'d> Normalizer<'d> {
    fn visit(&mut self, node: &mut Node, required: bool) {
        node.is_result_required = required;
        match &mut node.kind {
            NodeKind::Null | NodeKind::Bool(_) | NodeKind::Int(_) | NodeKind::Float(_)
                | NodeKind::Str(_) | NodeKind::Identifier(_) | NodeKind::This => {},
            NodeKind::Prefix { operand, .. } => self.visit(operand, true),
            NodeKind::Infix { left, right, .. }
                | NodeKind::And { left, right }
                | NodeKind::Or { left, right } => {
                self.visit(left, true);
                self.visit(right, true);
            },
            NodeKind::Not(operand) | NodeKind::Ref(operand) | NodeKind::Deref(operand) => {
                self.visit(operand, true)
            },
            NodeKind::Scope(items) => {
                let count = items.len();
                for (i, item) in items.iter_mut().enumerate() {
                    self.visit(item, required && i + 1 == count);
                }
            },
            NodeKind::VarDef(definitions) => {
                for (_, value) in definitions.iter_mut() {
                    self.visit(value, true);
                }
            },
            NodeKind::FnDef { function, .. } | NodeKind::Fn(function) => self.function(function),
            NodeKind::TypeDef(data) => {
                for function in data.functions_mut() {
                    self.function(function);
                }
            },
            NodeKind::Assign { target, value } | NodeKind::CompoundAssign { target, value, .. } => {
                self.target(target);
                self.visit(value, true);
            },
            NodeKind::Invoke { target, args } => {
                self.visit(target, true);
                for arg in args.iter_mut() {
                    self.visit(arg, true);
                }
            },
            NodeKind::Index { target, index } => {
                self.visit(target, true);
                self.visit(index, true);
            },
            NodeKind::Field { target, .. } => self.visit(target, true),
            NodeKind::If { condition, pass, fail } => {
                self.visit(condition, true);
                self.visit(pass, required);
                if let Some(fail) = fail {
                    self.visit(fail, required);
                }
            },
            NodeKind::While { condition, body, el } => {
                self.visit(condition, true);
                self.visit(body, required);
                if let Some(el) = el {
                    self.visit(el, required);
                }
            },
            NodeKind::Match { scrutinee, arms } => {
                self.visit(scrutinee, true);
                for arm in arms.iter_mut() {
                    if let MatchPattern::Literal(pattern) = &mut arm.pattern {
                        self.visit(pattern, true);
                    }
                    self.visit(&mut arm.body, required);
                }
            },
            NodeKind::List(elements) | NodeKind::Tuple(elements) => {
                for element in elements.iter_mut() {
                    self.visit(element, true);
                }
            },
            NodeKind::Ret(value) => {
                if let Some(value) = value {
                    self.visit(value, true);
                }
            },
        }
        self.fold(node);
    }

    fn function(&mut self, function: &mut FunctionData) {
        self.visit(&mut function.body, true);
    }

    // Assignment targets are never folded away.
    fn target(&mut self, target: &mut Node) {
        target.is_result_required = true;
        match &mut target.kind {
            NodeKind::Index { target, index } => {
                self.visit(target, true);
                self.visit(index, true);
            },
            NodeKind::Field { target, .. } | NodeKind::Deref(target) => self.visit(target, true),
            _ => {},
        }
    }

    fn fold(&mut self, node: &mut Node) {
        let required = node.is_result_required;
        let location = node.location;
        let folded = match &mut node.kind {
            NodeKind::If { condition, pass, fail } => match condition.literal_truth() {
                Some(truth) => {
                    self.diagnostics.warning(condition.location, format!("Condition is always {}.", truth));
                    if truth {
                        Some(std::mem::replace(&mut **pass, Node::new(NodeKind::Null, location)))
                    }
                    else {
                        match fail.take() {
                            Some(fail) => Some(*fail),
                            None => Some(Node::new(NodeKind::Null, location)),
                        }
                    }
                },
                None => None,
            },
            NodeKind::Not(operand) => operand.literal_truth().map(|truth| Node::new(NodeKind::Bool(!truth), location)),
            NodeKind::Prefix { op, operand } => match (op.as_str(), &operand.kind) {
                ("-", NodeKind::Int(i)) => i.checked_neg().map(NodeKind::Int),
                ("-", NodeKind::Float(f)) => Some(NodeKind::Float(-f)),
                ("+", NodeKind::Int(i)) => Some(NodeKind::Int(*i)),
                ("+", NodeKind::Float(f)) => Some(NodeKind::Float(*f)),
                ("~", NodeKind::Int(i)) => Some(NodeKind::Int(!i)),
                _ => None,
            }.map(|kind| Node::new(kind, location)),
            NodeKind::Infix { op, left, right } => fold_arithmetic(op, &left.kind, &right.kind)
                .map(|kind| Node::new(kind, location)),
            _ => None,
        };
        if let Some(mut replacement) = folded {
            replacement.is_result_required = required;
            *node = replacement;
        }
    }
}

fn fold_arithmetic(op: &str, left: &NodeKind, right: &NodeKind) -> Option<NodeKind> {
    match (left, right) {
        (NodeKind::Int(a), NodeKind::Int(b)) => match op {
            "+" => a.checked_add(*b).map(NodeKind::Int),
            "-" => a.checked_sub(*b).map(NodeKind::Int),
            "*" => a.checked_mul(*b).map(NodeKind::Int),
            _ => None,
        },
        (NodeKind::Int(_) | NodeKind::Float(_), NodeKind::Int(_) | NodeKind::Float(_)) => {
            let a = numeric(left)?;
            let b = numeric(right)?;
            match op {
                "+" => Some(NodeKind::Float(a + b)),
                "-" => Some(NodeKind::Float(a - b)),
                "*" => Some(NodeKind::Float(a * b)),
                _ => None,
            }
        },
        _ => None,
    }
}

fn numeric(kind: &NodeKind) -> Option<f64> {
    match kind {
        NodeKind::Int(i) => Some(*i as f64),
        NodeKind::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn normalized(source: &str) -> (Vec<Node>, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let mut nodes = parse(source, &mut sink);
        normalize_program(&mut nodes, &mut sink);
        (nodes, sink)
    }

    #[test]
    fn only_last_top_level_item_is_required() {
        let (nodes, _) = normalized("var x = 1; x; x + 1");
        assert!(!nodes[0].is_result_required);
        assert!(!nodes[1].is_result_required);
        assert!(nodes[2].is_result_required);
    }

    #[test]
    fn last_item_of_scope_inherits() {
        let (nodes, _) = normalized("{ 1; 2 }");
        match &nodes[0].kind {
            NodeKind::Scope(items) => {
                assert!(!items[0].is_result_required);
                assert!(items[1].is_result_required);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn function_body_is_required() {
        let (nodes, _) = normalized("fn f() { 1; 2 }; 0");
        match &nodes[0].kind {
            NodeKind::FnDef { function, .. } => assert!(function.body.is_result_required),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn folds_literal_conditions() {
        let (nodes, sink) = normalized("if true 1 el 2");
        assert_eq!(nodes[0].kind, NodeKind::Int(1));
        assert!(nodes[0].is_result_required);
        assert_eq!(sink.warning_count(), 1);

        let (nodes, _) = normalized("if false 1");
        assert_eq!(nodes[0].kind, NodeKind::Null);
    }

    #[test]
    fn folds_negative_literals_and_arithmetic() {
        let (nodes, _) = normalized("-1; 2 * 3 + 1; 1.5 + 1");
        assert_eq!(nodes[0].kind, NodeKind::Int(-1));
        assert_eq!(nodes[1].kind, NodeKind::Int(7));
        assert_eq!(nodes[2].kind, NodeKind::Float(2.5));
    }

    #[test]
    fn does_not_fold_overflow() {
        let (nodes, _) = normalized("9223372036854775807 + 1");
        assert!(matches!(nodes[0].kind, NodeKind::Infix { .. }));
    }
}
