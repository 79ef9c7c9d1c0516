use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Faults raised while executing bytecode. They abort the current
/// invocation and propagate to the host.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("{target} has no field '{field}'.")]
    MissingField { target: String, field: String },
    #[error("Cannot assign field '{field}' on {target}.")]
    FieldNotWritable { target: String, field: String },
    #[error("Operator '{op}' is not supported for {operands}.")]
    InvalidOperator { op: String, operands: String },
    #[error("Value of type {0} is not invocable.")]
    NotInvocable(String),
    #[error("Invalid reference target: {0}.")]
    InvalidReferenceTarget(String),
    #[error("Cannot index {target} with {key}.")]
    NotIndexable { target: String, key: String },
    #[error("Index {index} is out of bounds for length {len}.")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("'{name}' expected {expected} argument(s) but got {got}.")]
    BadArity { name: String, expected: String, got: usize },
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Maximum call depth of {0} exceeded.")]
    CallDepthExceeded(usize),
    #[error("Operand stack underflow.")]
    StackUnderflow,
    #[error("Invalid instruction {0:#010x}.")]
    InvalidInstruction(u32),
    #[error("{0}")]
    Custom(String),
    #[error("[line {line}] {source}")]
    Located {
        line: u32,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    pub fn custom(msg: impl Into<String>) -> RuntimeError {
        RuntimeError::Custom(msg.into())
    }

    pub fn invalid_operator(op: &str, operands: impl Into<String>) -> RuntimeError {
        RuntimeError::InvalidOperator { op: op.to_string(), operands: operands.into() }
    }

    pub fn bad_arity(name: &str, expected: impl ToString, got: usize) -> RuntimeError {
        RuntimeError::BadArity { name: name.to_string(), expected: expected.to_string(), got }
    }

    /// Attaches a source line unless an inner frame already did.
    pub fn at_line(self, line: u32) -> RuntimeError {
        match self {
            RuntimeError::Located { .. } => self,
            other => RuntimeError::Located { line, source: Box::new(other) },
        }
    }

    /// The fault without its location wrapper.
    pub fn kind(&self) -> &RuntimeError {
        match self {
            RuntimeError::Located { source, .. } => source.kind(),
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum VMError {
    #[error("Program could not compile: {errors} error(s).")]
    CompileError { errors: usize, diagnostics: Vec<Diagnostic> },
    #[error(transparent)]
    RuntimeError(#[from] RuntimeError),
}

impl VMError {
    pub fn compile_error(diagnostics: Vec<Diagnostic>) -> VMError {
        let errors = diagnostics
            .iter()
            .filter(|d| d.severity == crate::diagnostics::Severity::Error)
            .count();
        VMError::CompileError { errors, diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_attached_once() {
        let error = RuntimeError::DivisionByZero.at_line(3).at_line(9);
        assert_eq!(error.to_string(), "[line 3] Division by zero.");
        assert_eq!(error.kind(), &RuntimeError::DivisionByZero);
    }
}
