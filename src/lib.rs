pub mod ast;
pub mod blocks;
pub mod builtins;
pub mod bytecode;
pub mod config;
pub mod error;
pub mod lexer;
pub mod natives;
pub mod parser;
pub mod stdlib;
pub mod token;
pub mod value;
pub mod vm;

pub use blocks::{
    Block, BlockExpr, BlockKind, GameType, GeneratedCode, generate_code,
    generate_code_with_line_map, parse_code_to_blocks,
};
pub use bytecode::Program;
pub use config::VmConfig;
pub use error::{Error, EvalError, RuntimeError, RuntimeErrorKind, SyntaxError};
pub use natives::NativeRegistry;
pub use value::Value;
pub use vm::{FrameView, StepOutcome, Vm, VmState, VmStatus};

/// Parses and lowers `source` in one go.
pub fn compile(source: &str) -> Result<Program, SyntaxError> {
    let program = parser::parse(source)?;
    compile_to_ir(&program)
}

pub fn compile_to_ir(program: &ast::Program) -> Result<Program, SyntaxError> {
    bytecode::compile(program)
}
