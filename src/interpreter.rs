use std::rc::Rc;

use crate::{
    ast::Node,
    compiler::compile_program,
    diagnostics::DiagnosticSink,
    errors::VMError,
    function::FunctionPrototype,
    kit,
    normalize::normalize_program,
    parser,
    state::SharedState,
    value::Value,
    vm::Vm,
};

fn front_end(source: &str, diagnostics: &mut DiagnosticSink) -> Vec<Node> {
    let mut items = parser::parse(source, diagnostics);
    if !diagnostics.has_errors() {
        normalize_program(&mut items, diagnostics);
    }
    items
}

fn report_warnings(diagnostics: &DiagnosticSink) {
    for diagnostic in diagnostics.iter() {
        tracing::warn!(%diagnostic, "compile warning");
    }
}

/// Parses and normalizes `source`.
pub fn parse(source: &str) -> Result<Vec<Node>, VMError> {
    let mut diagnostics = DiagnosticSink::new();
    let items = front_end(source, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(VMError::compile_error(diagnostics.into_diagnostics()));
    }
    report_warnings(&diagnostics);
    Ok(items)
}

pub fn compile(source: &str) -> Result<Rc<FunctionPrototype>, VMError> {
    let mut diagnostics = DiagnosticSink::new();
    let items = front_end(source, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(VMError::compile_error(diagnostics.into_diagnostics()));
    }
    let prototype = compile_program(&items, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(VMError::compile_error(diagnostics.into_diagnostics()));
    }
    report_warnings(&diagnostics);

    #[cfg(feature = "print_code")]
    {
        use crate::{debug, verify};
        print!("{}", debug::disassemble(&prototype));
        if let Err(e) = verify::check_stack_heights(&prototype) {
            println!("stack check failed: {}", e);
        }
    }
    Ok(Rc::new(prototype))
}

/// Runs `source` on a fresh state with the standard kit installed.
pub fn interpret(source: &str) -> Result<Value, VMError> {
    let state = SharedState::new();
    kit::install(&state, kit::std_kit(&state))?;
    let mut vm = Vm::new(state);
    interpret_in(&mut vm, source)
}

/// Runs `source` on an existing VM, so globals persist between calls.
pub fn interpret_in(vm: &mut Vm, source: &str) -> Result<Value, VMError> {
    let prototype = compile(source)?;
    Ok(vm.run(prototype)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RuntimeError;

    #[test]
    fn syntax_errors_are_collected() {
        match compile("var = ;") {
            Err(VMError::CompileError { errors, diagnostics }) => {
                assert!(errors >= 1);
                assert!(diagnostics.len() >= errors);
            },
            other => panic!("expected a compile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn globals_survive_between_runs() {
        let state = SharedState::new();
        let mut vm = Vm::new(state);
        interpret_in(&mut vm, "fn twice(x) x * 2").unwrap();
        assert_eq!(interpret_in(&mut vm, "twice(21)").unwrap(), Value::int(42));
    }

    #[test]
    fn runtime_errors_keep_their_line() {
        match interpret("var a = 1\n\na()") {
            Err(VMError::RuntimeError(RuntimeError::Located { line, source })) => {
                assert_eq!(line, 3);
                assert!(matches!(*source, RuntimeError::NotInvocable(_)));
            },
            other => panic!("unexpected result {:?}", other),
        }
    }
}
