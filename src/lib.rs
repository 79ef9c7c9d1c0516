pub mod ast;
pub mod builder;
pub mod builtins;
pub mod chunk;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod diagnostics;
pub mod errors;
pub mod function;
pub mod interpreter;
pub mod kit;
pub mod normalize;
pub mod object;
pub mod parser;
pub mod reference;
pub mod scanner;
pub mod state;
pub mod value;
pub mod verify;
pub mod vm;

pub use errors::{RuntimeError, VMError};
pub use interpreter::{compile, interpret, interpret_in};
pub use state::SharedState;
pub use value::Value;
pub use vm::Vm;
