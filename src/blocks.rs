//! Block trees of the drag-and-drop editor and their translation to and
//! from source text.
//!
//! `generate_code` always emits the unified verb form with every argument
//! explicit; `parse_code_to_blocks` accepts legacy verb shapes too and
//! returns `None` for source the block palette cannot express.

mod codegen;
mod from_code;
mod verbs;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::BinaryOperator;

pub use self::codegen::{GeneratedCode, generate_code, generate_code_with_line_map};
pub use self::from_code::parse_code_to_blocks;

/// Game whose verb vocabulary a block tree uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Maze,
    Turtle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockKind {
    /// A game verb such as `move` or `turn`.
    Command {
        verb: String,
        args: Vec<BlockExpr>,
    },
    Repeat {
        count: BlockExpr,
        body: Vec<Block>,
    },
    While {
        condition: BlockExpr,
        body: Vec<Block>,
    },
    If {
        condition: BlockExpr,
        then_body: Vec<Block>,
        else_body: Option<Vec<Block>>,
    },
    For {
        variable: String,
        from: BlockExpr,
        to: BlockExpr,
        step: Option<BlockExpr>,
        body: Vec<Block>,
    },
    ForEach {
        variable: String,
        iterable: BlockExpr,
        body: Vec<Block>,
    },
    SetVariable {
        name: String,
        value: BlockExpr,
    },
    Print {
        value: BlockExpr,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Vec<Block>,
    },
    FunctionCall {
        name: String,
        args: Vec<BlockExpr>,
    },
    Return {
        value: Option<BlockExpr>,
    },
    ListAppend {
        list: String,
        value: BlockExpr,
    },
    ListRemove {
        list: String,
        index: Option<BlockExpr>,
    },
    ListInsert {
        list: String,
        index: BlockExpr,
        value: BlockExpr,
    },
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockExpr {
    Number {
        value: f64,
    },
    Text {
        value: String,
    },
    Boolean {
        value: bool,
    },
    Variable {
        name: String,
    },
    Binary {
        op: ArithmeticOp,
        left: Box<BlockExpr>,
        right: Box<BlockExpr>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<BlockExpr>,
        right: Box<BlockExpr>,
    },
    /// Game sensor used as a condition; `negated` renders as `not sensor()`.
    SensorCall {
        name: String,
        args: Vec<BlockExpr>,
        negated: bool,
    },
    Array {
        items: Vec<BlockExpr>,
    },
    ArrayAccess {
        array: Box<BlockExpr>,
        index: Box<BlockExpr>,
    },
    Length {
        value: Box<BlockExpr>,
    },
    Random,
    RandInt {
        min: Box<BlockExpr>,
        max: Box<BlockExpr>,
    },
    Object {
        entries: IndexMap<String, BlockExpr>,
    },
    ObjectAccess {
        object: Box<BlockExpr>,
        key: String,
    },
}

impl BlockExpr {
    pub fn number(value: f64) -> Self {
        BlockExpr::Number { value }
    }

    pub fn text(value: impl Into<String>) -> Self {
        BlockExpr::Text {
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        BlockExpr::Variable { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
}

impl ArithmeticOp {
    pub fn to_ast(self) -> BinaryOperator {
        match self {
            ArithmeticOp::Add => BinaryOperator::Add,
            ArithmeticOp::Sub => BinaryOperator::Sub,
            ArithmeticOp::Mul => BinaryOperator::Mul,
            ArithmeticOp::Div => BinaryOperator::Div,
            ArithmeticOp::Mod => BinaryOperator::Mod,
            ArithmeticOp::And => BinaryOperator::And,
            ArithmeticOp::Or => BinaryOperator::Or,
        }
    }
}

impl ComparisonOp {
    pub fn to_ast(self) -> BinaryOperator {
        match self {
            ComparisonOp::Equal => BinaryOperator::Equal,
            ComparisonOp::NotEqual => BinaryOperator::NotEqual,
            ComparisonOp::Less => BinaryOperator::LessThan,
            ComparisonOp::LessEqual => BinaryOperator::LessEqual,
            ComparisonOp::Greater => BinaryOperator::GreaterThan,
            ComparisonOp::GreaterEqual => BinaryOperator::GreaterEqual,
        }
    }
}

/// Splits an AST operator into the block palette's arithmetic or comparison family.
pub(crate) enum PaletteOp {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
}

impl From<BinaryOperator> for PaletteOp {
    fn from(op: BinaryOperator) -> Self {
        match op {
            BinaryOperator::Add => PaletteOp::Arithmetic(ArithmeticOp::Add),
            BinaryOperator::Sub => PaletteOp::Arithmetic(ArithmeticOp::Sub),
            BinaryOperator::Mul => PaletteOp::Arithmetic(ArithmeticOp::Mul),
            BinaryOperator::Div => PaletteOp::Arithmetic(ArithmeticOp::Div),
            BinaryOperator::Mod => PaletteOp::Arithmetic(ArithmeticOp::Mod),
            BinaryOperator::And => PaletteOp::Arithmetic(ArithmeticOp::And),
            BinaryOperator::Or => PaletteOp::Arithmetic(ArithmeticOp::Or),
            BinaryOperator::Equal => PaletteOp::Comparison(ComparisonOp::Equal),
            BinaryOperator::NotEqual => PaletteOp::Comparison(ComparisonOp::NotEqual),
            BinaryOperator::LessThan => PaletteOp::Comparison(ComparisonOp::Less),
            BinaryOperator::LessEqual => PaletteOp::Comparison(ComparisonOp::LessEqual),
            BinaryOperator::GreaterThan => PaletteOp::Comparison(ComparisonOp::Greater),
            BinaryOperator::GreaterEqual => PaletteOp::Comparison(ComparisonOp::GreaterEqual),
        }
    }
}
