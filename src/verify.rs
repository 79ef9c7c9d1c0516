//! Static check of operand stack usage over every reachable path.

use thiserror::Error;

use crate::{
    chunk::{Instruction, OpCode, RefKind},
    function::FunctionPrototype,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackCheckError {
    #[error("{function}@{at}: operand stack underflow.")]
    Underflow { function: String, at: usize },
    #[error("{function}@{at}: height {height} exceeds the recorded maximum {max}.")]
    Overflow { function: String, at: usize, height: usize, max: usize },
    #[error("{function}@{at}: paths join with heights {expected} and {found}.")]
    Mismatch { function: String, at: usize, expected: usize, found: usize },
    #[error("{function}: leaves {height} values on the stack.")]
    Unbalanced { function: String, height: usize },
    #[error("{function}@{at}: jump to {target} is outside the code.")]
    BadJump { function: String, at: usize, target: usize },
    #[error("{function}@{at}: invalid instruction {word:#010x}.")]
    InvalidInstruction { function: String, at: usize, word: u32 },
}

/// Where control goes after an instruction, and with which height.
enum Flow {
    Next(usize),
    Jump(usize),
    Branch { taken: usize, fallthrough: usize },
    Match(usize),
    Return,
}

/// Values popped and pushed by `word`, ignoring its control effect.
fn stack_effect(op: OpCode, word: Instruction) -> Option<(usize, usize)> {
    use OpCode::*;
    Some(match op {
        CLOSE_OUTERS | JUMP => (0, 0),
        POP | JUMP_TRUE | JUMP_FALSE | MATCH | RET => (1, 0),
        DUP => (1, 2),
        DUP2 => (2, 4),
        AND | OR => (1, 1),
        LOAD_LOCAL | LOAD_OUTER | LOAD_GLOBAL | NULL | TRUE | FALSE | CONST | INT_M1 | INT_0 | INT_1 | INT_2
        | INT_3 | INT_4 | INT_5 | FLOAT_M1 | FLOAT_0 | FLOAT_1 | FLOAT_2 | FLOAT_3 | FLOAT_4 | FLOAT_5
        | CLOSURE | TYPE | THIS => (0, 1),
        STORE_LOCAL | INIT_LOCAL | STORE_OUTER | STORE_GLOBAL | LOAD_FIELD | PREFIX | NOT | DEREF => (1, 1),
        LOAD_INDEX | STORE_FIELD | INFIX | EQ | NEQ | STORE_DEREF => (2, 1),
        STORE_INDEX => (3, 1),
        LIST | TUPLE => (word.c() as usize, 1),
        INVOKE => (word.c() as usize + 1, 1),
        INVOKE_METHOD => (word.a() as usize + 1, 1),
        REF => match RefKind::from_u32(word.a())? {
            RefKind::Global | RefKind::Local | RefKind::Outer => (0, 1),
            RefKind::Index => (2, 1),
            RefKind::Field => (1, 1),
        },
    })
}

fn flow(op: OpCode, word: Instruction, at: usize) -> Flow {
    use OpCode::*;
    match op {
        JUMP => Flow::Jump(word.c() as usize),
        JUMP_TRUE | JUMP_FALSE | AND | OR => Flow::Branch { taken: word.c() as usize, fallthrough: at + 1 },
        MATCH => Flow::Match(word.c() as usize),
        RET => Flow::Return,
        _ => Flow::Next(at + 1),
    }
}

struct Checker<'p> {
    prototype: &'p FunctionPrototype,
    heights: Vec<Option<usize>>,
    pending: Vec<usize>,
}

impl<'p> Checker<'p> {
    fn name(&self) -> String {
        self.prototype.display_name().to_string()
    }

    /// Records the height on entry to `at`. Offset `code.len()` is the exit.
    fn reach(&mut self, from: usize, at: usize, height: usize) -> Result<(), StackCheckError> {
        if at > self.prototype.code.len() {
            return Err(StackCheckError::BadJump { function: self.name(), at: from, target: at });
        }
        match self.heights[at] {
            Some(expected) if expected != height => Err(StackCheckError::Mismatch {
                function: self.name(),
                at,
                expected,
                found: height,
            }),
            Some(_) => Ok(()),
            None => {
                self.heights[at] = Some(height);
                if at < self.prototype.code.len() {
                    self.pending.push(at);
                }
                Ok(())
            },
        }
    }

    fn run(&mut self) -> Result<(), StackCheckError> {
        self.reach(0, 0, 0)?;
        while let Some(at) = self.pending.pop() {
            let height = self.heights[at].unwrap_or(0);
            let word = self.prototype.code[at];
            let invalid = || StackCheckError::InvalidInstruction { function: self.name(), at, word: word.0 };
            let op = word.op().ok_or_else(invalid)?;
            let (popped, pushed) = stack_effect(op, word).ok_or_else(invalid)?;
            if height < popped {
                return Err(StackCheckError::Underflow { function: self.name(), at });
            }
            let after = height - popped + pushed;
            if after > self.prototype.max_stack {
                return Err(StackCheckError::Overflow {
                    function: self.name(),
                    at,
                    height: after,
                    max: self.prototype.max_stack,
                });
            }
            match flow(op, word, at) {
                Flow::Next(next) => self.reach(at, next, after)?,
                Flow::Jump(target) => self.reach(at, target, after)?,
                Flow::Branch { taken, fallthrough } => {
                    // AND/OR keep the deciding value only on the jump.
                    let fall_height = if matches!(op, OpCode::AND | OpCode::OR) {after - 1} else {after};
                    self.reach(at, taken, after)?;
                    self.reach(at, fallthrough, fall_height)?;
                },
                Flow::Match(table) => {
                    let targets: Vec<usize> = self
                        .prototype
                        .jump_tables
                        .get(table)
                        .ok_or_else(invalid)?
                        .cases
                        .values()
                        .map(|target| *target as usize)
                        .collect();
                    for target in targets {
                        self.reach(at, target, after)?;
                    }
                },
                Flow::Return => {},
            }
        }
        let end = self.prototype.code.len();
        match self.heights[end] {
            Some(height) if height > 1 => Err(StackCheckError::Unbalanced { function: self.name(), height }),
            _ => Ok(()),
        }
    }
}

/// Checks `prototype` and every prototype nested in it.
pub fn check_stack_heights(prototype: &FunctionPrototype) -> Result<(), StackCheckError> {
    let mut checker = Checker {
        prototype,
        heights: vec![None; prototype.code.len() + 1],
        pending: vec![],
    };
    checker.run()?;
    for nested in prototype.nested.iter() {
        check_stack_heights(nested)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::PrototypeBuilder,
        chunk::Insn,
        compiler::compile_program,
        diagnostics::DiagnosticSink,
        normalize::normalize_program,
        parser::parse,
    };

    fn compile(source: &str) -> FunctionPrototype {
        let mut diagnostics = DiagnosticSink::new();
        let mut items = parse(source, &mut diagnostics);
        normalize_program(&mut items, &mut diagnostics);
        let prototype = compile_program(&items, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.iter().collect::<Vec<_>>());
        prototype
    }

    #[test]
    fn compiled_control_flow_is_balanced() {
        let sources = [
            "var x = 1, y = 2; x + y",
            "if true 1 el 2",
            "var c = 0; if c 1",
            "var i = 0; while i < 3 { i = i + 1 } el 0",
            "var i = 0; while i < 3 i = i + 1",
            "match 2 { 1: \"a\", 2: \"b\", _: \"z\" }",
            "var m = 3; match m { 1: 1 }; m",
            "fn f(a, b..) { if a ret b; a and b or null }; f(1, 2, 3)",
            "var x = 0; var r = ref x; deref r = 5; x",
            "type P { ctor(x) this.x = x  fn get() this.x  infix +(o) P(this.x + o.x) }; P(1) + P(2)",
        ];
        for source in sources {
            let prototype = compile(source);
            assert_eq!(check_stack_heights(&prototype), Ok(()), "{}", source);
        }
    }

    #[test]
    fn underflow_is_detected() {
        let mut prototype = PrototypeBuilder::new(Some("bad")).build();
        prototype.code = vec![Instruction(Insn::simple(OpCode::POP).pack())].into_boxed_slice();
        assert_eq!(
            check_stack_heights(&prototype),
            Err(StackCheckError::Underflow { function: "bad".to_string(), at: 0 })
        );
    }

    #[test]
    fn leftover_values_are_detected() {
        let mut builder = PrototypeBuilder::new(Some("leaky"));
        builder.op_int(1);
        builder.op_int(2);
        let prototype = builder.build();
        assert_eq!(
            check_stack_heights(&prototype),
            Err(StackCheckError::Unbalanced { function: "leaky".to_string(), height: 2 })
        );
    }

    #[test]
    fn mismatched_join_is_detected() {
        let mut builder = PrototypeBuilder::new(Some("join"));
        builder.op_bool(true);
        let jump = builder.op_jump_false(0);
        builder.op_int(1);
        builder.patch_jump(jump, builder.position());
        let prototype = builder.build();
        assert!(matches!(check_stack_heights(&prototype), Err(StackCheckError::Mismatch { .. })));
    }
}
