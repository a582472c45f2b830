#![allow(dead_code)]
use std::fs;

use blocklang::ast::Program;
use blocklang::{NativeRegistry, lexer, parser};

pub const WORKLOADS: [(&str, &str); 2] = [
    ("bubble_sort", "tests/programs/bubble_sort.bl"),
    ("spiral", "tests/programs/spiral.bl"),
];

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_program(path: &str) -> Program {
    let source = load_source(path);
    let tokens = lexer::tokenize(&source).unwrap_or_else(|err| panic!("tokenize {path}: {err}"));
    parser::parse_tokens(tokens).unwrap_or_else(|err| panic!("parse {path}: {err}"))
}

/// Turtle verbs that accept anything and do nothing.
pub fn quiet_natives() -> NativeRegistry {
    NativeRegistry::new()
        .with_command("move", |_| Ok(()))
        .with_command("turn", |_| Ok(()))
        .with_command("pen", |_| Ok(()))
}
