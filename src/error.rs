//! Error taxonomy surfaced to hosts.
//!
//! `SyntaxError` always happens before execution begins (lexing, parsing,
//! lowering). `RuntimeError` halts a VM mid-run and freezes it in the error
//! state. `EvalError` belongs to host-side expression evaluation and never
//! touches run state.

use thiserror::Error;

/// Malformed source, reported with the position of the first problem found.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn at_line(message: impl Into<String>, line: usize) -> Self {
        Self::new(message, line, 0)
    }
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Unknown command or function '{name}'")]
    UnknownVerb { name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Unsupported operand types for '{operation}': {left} and {right}")]
    UnsupportedOperands {
        operation: String,
        left: String,
        right: String,
    },
    #[error("Invalid argument for '{operation}': expected {expected}, got {got}")]
    InvalidArgumentType {
        operation: String,
        expected: String,
        got: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Index must be a whole number, got {got}")]
    InvalidIndex { got: String },
    #[error("Index out of bounds: index {index}, len {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Missing key \"{key}\"")]
    MissingKey { key: String },
    #[error("Value of type {type_name} cannot be indexed")]
    NotIndexable { type_name: String },
    #[error("Value of type {type_name} is not iterable")]
    NotIterable { type_name: String },
    #[error("Unknown method '{method}' for type {type_name}")]
    UnknownMethod { method: String, type_name: String },
    #[error("range() step must not be zero")]
    ZeroRangeStep,
    #[error("range() would produce more than {limit} items")]
    RangeTooLarge { limit: usize },
    #[error("'{name}' failed: {message}")]
    NativeFailure { name: String, message: String },
    #[error("Step limit of {limit} exceeded; the program may loop forever")]
    StepLimitExceeded { limit: usize },
    #[error("Call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
    #[error("Invalid jump target {target}")]
    InvalidJumpTarget { target: usize },
    #[error("Stack underflow")]
    StackUnderflow,
}

/// A failure while executing a program, tied to the user line that caused it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}{}", .line.map(|line| format!(" (line {line})")).unwrap_or_default())]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, line: Option<usize>) -> Self {
        Self { kind, line }
    }

    pub(crate) fn expect_function_arity(
        name: &str,
        expected: usize,
        found: usize,
    ) -> Result<(), RuntimeErrorKind> {
        if expected != found {
            return Err(RuntimeErrorKind::FunctionArityMismatch {
                name: name.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }
}

/// Failure of a host-supplied expression such as a win condition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Invalid expression: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("Undefined name '{name}' in expression")]
    UndefinedName { name: String },
    #[error("Unknown sensor '{name}' in expression")]
    UndefinedSensor { name: String },
    #[error("'{name}' cannot be called from an expression")]
    UnsupportedCall { name: String },
    #[error("{0}")]
    Evaluation(RuntimeErrorKind),
}

impl From<RuntimeErrorKind> for EvalError {
    fn from(kind: RuntimeErrorKind) -> Self {
        match kind {
            RuntimeErrorKind::UndefinedVariable { name } => EvalError::UndefinedName { name },
            other => EvalError::Evaluation(other),
        }
    }
}

/// Either kind of program failure, for callers that compile and run in one go.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_mentions_line_when_known() {
        let error = RuntimeError::new(
            RuntimeErrorKind::UnknownVerb {
                name: "fly".to_string(),
            },
            Some(3),
        );
        assert_eq!(error.to_string(), "Unknown command or function 'fly' (line 3)");

        let error = RuntimeError::new(RuntimeErrorKind::DivisionByZero, None);
        assert_eq!(error.to_string(), "Division by zero");
    }

    #[test]
    fn undefined_variable_maps_to_undefined_name() {
        let error: EvalError = RuntimeErrorKind::UndefinedVariable {
            name: "x".to_string(),
        }
        .into();
        assert_eq!(
            error,
            EvalError::UndefinedName {
                name: "x".to_string()
            }
        );
    }
}
