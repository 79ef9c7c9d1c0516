use std::fmt::Write;

use crate::{
    chunk::{Layout, OpCode, RefKind},
    function::FunctionPrototype,
    value::Value,
};

/// Renders a prototype and every prototype nested in it.
pub fn disassemble(prototype: &FunctionPrototype) -> String {
    let mut out = String::new();
    disassemble_into(&mut out, prototype);
    out
}

fn disassemble_into(out: &mut String, prototype: &FunctionPrototype) {
    let _ = writeln!(
        out,
        "== {} (params {}{}, locals {}, stack {}) ==",
        prototype.display_name(),
        prototype.num_params,
        if prototype.variadic {".."} else {""},
        prototype.max_locals,
        prototype.max_stack
    );
    for i in 0..prototype.code.len() {
        let _ = writeln!(out, "{}", disassemble_instruction(prototype, i));
    }
    for nested in prototype.nested.iter() {
        disassemble_into(out, nested);
    }
}

pub fn disassemble_instruction(prototype: &FunctionPrototype, i: usize) -> String {
    let mut out = format!("{:04} ", i);
    if i > 0 && prototype.line(i) == prototype.line(i - 1) {
        out.push_str("   | ");
    }
    else {
        let _ = write!(out, "{:4} ", prototype.line(i));
    }
    let word = prototype.code[i];
    let op = match word.op() {
        Some(op) => op,
        None => {
            out.push_str("????");
            return out;
        },
    };
    out.push_str(op.name());
    match op {
        OpCode::CONST | OpCode::LOAD_GLOBAL | OpCode::STORE_GLOBAL | OpCode::LOAD_FIELD | OpCode::STORE_FIELD
            | OpCode::PREFIX | OpCode::INFIX => constant_operand(&mut out, prototype, word.c()),
        OpCode::INVOKE_METHOD => {
            let _ = write!(out, " {}", word.a());
            constant_operand(&mut out, prototype, word.b());
        },
        OpCode::REF => match RefKind::from_u32(word.a()) {
            Some(kind @ (RefKind::Global | RefKind::Field)) => {
                let _ = write!(out, " {:?}", kind);
                constant_operand(&mut out, prototype, word.b());
            },
            Some(kind) => {
                let _ = write!(out, " {:?} {}", kind, word.b());
            },
            None => out.push_str(" ?"),
        },
        OpCode::CLOSURE => {
            let name = prototype.nested.get(word.c() as usize).map(|p| p.display_name()).unwrap_or("?");
            let _ = write!(out, " {} <{}>", word.c(), name);
        },
        OpCode::MATCH => {
            let _ = write!(out, " {}", word.c());
            if let Some(table) = prototype.jump_tables.get(word.c() as usize) {
                let cases: Vec<String> = table.cases.iter().map(|(k, v)| format!("{} -> {}", k, v)).collect();
                let _ = write!(out, " {{{}}}", cases.join(", "));
            }
        },
        _ => match op.layout() {
            Layout::None => {},
            Layout::Wide => {
                let _ = write!(out, " {}", word.c());
            },
            Layout::Split => {
                let _ = write!(out, " {} {}", word.a(), word.b());
            },
        },
    }
    out
}

fn constant_operand(out: &mut String, prototype: &FunctionPrototype, index: u32) {
    match prototype.constants.get(index as usize) {
        Some(constant) => {
            let _ = write!(out, " {} {}", index, constant);
        },
        None => {
            let _ = write!(out, " {} ?", index);
        },
    }
}

pub fn print_stack(stack: &[Value]) {
    print!("        [ ");
    for value in stack {
        print!("{} ", value.repr());
    }
    println!("]");
}

pub fn print_instruction(prototype: &FunctionPrototype, i: usize) {
    println!("{}", disassemble_instruction(prototype, i));
}
