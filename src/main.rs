use std::{env, fs, io::{self, Write}};

use sable::{errors::VMError, interpreter, kit, SharedState, Vm};

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => eprintln!("Usage: sable [script]"),
    }
}

fn new_vm() -> Option<Vm> {
    let state = SharedState::new();
    if let Err(e) = kit::install(&state, kit::std_kit(&state)) {
        eprintln!("Unable to install the standard kit: {}", e);
        return None;
    }
    Some(Vm::new(state))
}

fn report(error: &VMError) {
    match error {
        VMError::CompileError { diagnostics, .. } => {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic);
            }
            eprintln!("{}", error);
        },
        VMError::RuntimeError(_) => eprintln!("{}", error),
    }
}

fn repl() {
    let Some(mut vm) = new_vm() else { return };
    let mut line = String::new();
    loop {
        line.clear();
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }
        match io::stdin().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {},
            Err(e) => {
                eprintln!("Unable to read input: {}", e);
                break;
            },
        }
        match interpreter::interpret_in(&mut vm, &line) {
            Ok(value) => println!("{}", value.repr()),
            Err(e) => report(&e),
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Unable to read file: {}", e);
            return;
        },
    };
    let Some(mut vm) = new_vm() else { return };

    match interpreter::interpret_in(&mut vm, &source) {
        Ok(v) => println!("Program exited successfully with value: {}", v.repr()),
        Err(e) => {
            report(&e);
            std::process::exit(70);
        },
    }
}
