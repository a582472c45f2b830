use log::debug;

use crate::ast::{AssignTarget, Expression, Statement, StatementKind, UnaryOperator};
use crate::blocks::verbs::{is_sensor, normalize_command};
use crate::blocks::{Block, BlockExpr, BlockKind, GameType, PaletteOp};
use crate::parser::parse;

/// Converts source into a block tree, or `None` when some statement or
/// expression has no block form (the host should stay in text mode).
pub fn parse_code_to_blocks(code: &str, game: GameType) -> Option<Vec<Block>> {
    let program = match parse(code) {
        Ok(program) => program,
        Err(error) => {
            debug!("no block form: {error}");
            return None;
        }
    };
    let mut converter = Converter { game, next_id: 0 };
    program
        .statements
        .iter()
        .map(|statement| converter.statement(statement))
        .collect()
}

struct Converter {
    game: GameType,
    next_id: usize,
}

impl Converter {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("b{}", self.next_id)
    }

    /// A nested body holding only `pass` is the editor's empty body.
    fn body(&mut self, statements: &[Statement]) -> Option<Vec<Block>> {
        if let [only] = statements
            && matches!(only.kind, StatementKind::Pass)
        {
            return Some(Vec::new());
        }
        statements
            .iter()
            .map(|statement| self.statement(statement))
            .collect()
    }

    fn statement(&mut self, statement: &Statement) -> Option<Block> {
        let id = self.fresh_id();
        let kind = self.statement_kind(&statement.kind);
        if kind.is_none() {
            debug!("line {} has no block form", statement.line);
        }
        Some(Block::new(id, kind?))
    }

    fn statement_kind(&mut self, kind: &StatementKind) -> Option<BlockKind> {
        let block = match kind {
            StatementKind::FunctionDef { name, params, body } => BlockKind::FunctionDef {
                name: name.clone(),
                params: params.clone(),
                body: self.body(body)?,
            },
            StatementKind::Assign {
                target: AssignTarget::Name(name),
                value,
            } => BlockKind::SetVariable {
                name: name.clone(),
                value: self.expr(value)?,
            },
            StatementKind::Assign {
                target: AssignTarget::Index { .. },
                ..
            } => return None,
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => BlockKind::If {
                condition: self.expr(condition)?,
                then_body: self.body(then_body)?,
                else_body: if else_body.is_empty() {
                    None
                } else {
                    Some(self.body(else_body)?)
                },
            },
            StatementKind::While { condition, body } => BlockKind::While {
                condition: self.expr(condition)?,
                body: self.body(body)?,
            },
            StatementKind::ForRange {
                target,
                start,
                end,
                step,
                body,
            } => BlockKind::For {
                variable: target.clone(),
                from: self.expr(start)?,
                to: self.expr(end)?,
                step: match step {
                    Some(step) => Some(self.expr(step)?),
                    None => None,
                },
                body: self.body(body)?,
            },
            StatementKind::ForEach {
                target,
                iterable,
                body,
            } => BlockKind::ForEach {
                variable: target.clone(),
                iterable: self.expr(iterable)?,
                body: self.body(body)?,
            },
            StatementKind::Repeat { count, body } => BlockKind::Repeat {
                count: self.expr(count)?,
                body: self.body(body)?,
            },
            StatementKind::Return(value) => BlockKind::Return {
                value: match value {
                    Some(value) => Some(self.expr(value)?),
                    None => None,
                },
            },
            StatementKind::Break => BlockKind::Break,
            StatementKind::Continue => BlockKind::Continue,
            StatementKind::Pass => BlockKind::Pass,
            StatementKind::Expr(Expression::Call { name, args }) => {
                let args = self.exprs(args)?;
                if name == "print"
                    && let [value] = args.as_slice()
                {
                    return Some(BlockKind::Print {
                        value: value.clone(),
                    });
                }
                match normalize_command(self.game, name, &args) {
                    Some((verb, args)) => BlockKind::Command {
                        verb: verb.to_string(),
                        args,
                    },
                    None => BlockKind::FunctionCall {
                        name: name.clone(),
                        args,
                    },
                }
            }
            StatementKind::Expr(Expression::MethodCall {
                receiver,
                method,
                args,
            }) => {
                let list = receiver.clone();
                let mut args = self.exprs(args)?;
                match (method.as_str(), args.len()) {
                    ("append", 1) => BlockKind::ListAppend {
                        list,
                        value: args.pop()?,
                    },
                    ("pop", 0 | 1) => BlockKind::ListRemove {
                        list,
                        index: args.pop(),
                    },
                    ("insert", 2) => {
                        let value = args.pop()?;
                        BlockKind::ListInsert {
                            list,
                            index: args.pop()?,
                            value,
                        }
                    }
                    _ => return None,
                }
            }
            StatementKind::Expr(_) => return None,
        };
        Some(block)
    }

    fn exprs(&mut self, expressions: &[Expression]) -> Option<Vec<BlockExpr>> {
        expressions.iter().map(|expression| self.expr(expression)).collect()
    }

    fn expr(&mut self, expression: &Expression) -> Option<BlockExpr> {
        let block = match expression {
            Expression::Number(value) => BlockExpr::number(*value),
            Expression::String(value) => BlockExpr::text(value.clone()),
            Expression::Boolean(value) => BlockExpr::Boolean { value: *value },
            Expression::Identifier(name) => BlockExpr::variable(name.clone()),
            Expression::List(items) => BlockExpr::Array {
                items: self.exprs(items)?,
            },
            Expression::Object(entries) => BlockExpr::Object {
                entries: entries
                    .iter()
                    .map(|(key, value)| Some((key.clone(), self.expr(value)?)))
                    .collect::<Option<_>>()?,
            },
            Expression::Index { object, index } => match index.as_ref() {
                Expression::String(key) => BlockExpr::ObjectAccess {
                    object: Box::new(self.expr(object)?),
                    key: key.clone(),
                },
                index => BlockExpr::ArrayAccess {
                    array: Box::new(self.expr(object)?),
                    index: Box::new(self.expr(index)?),
                },
            },
            Expression::BinaryOp { left, op, right } => {
                let left = Box::new(self.expr(left)?);
                let right = Box::new(self.expr(right)?);
                match PaletteOp::from(*op) {
                    PaletteOp::Arithmetic(op) => BlockExpr::Binary { op, left, right },
                    PaletteOp::Comparison(op) => BlockExpr::Comparison { op, left, right },
                }
            }
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => match self.expr(operand)? {
                BlockExpr::SensorCall {
                    name,
                    args,
                    negated: false,
                } => BlockExpr::SensorCall {
                    name,
                    args,
                    negated: true,
                },
                _ => return None,
            },
            Expression::Call { name, args } => {
                let args = self.exprs(args)?;
                if is_sensor(self.game, name) {
                    return Some(BlockExpr::SensorCall {
                        name: name.clone(),
                        args,
                        negated: false,
                    });
                }
                match (name.as_str(), args.as_slice()) {
                    ("len", [value]) => BlockExpr::Length {
                        value: Box::new(value.clone()),
                    },
                    ("random", []) => BlockExpr::Random,
                    ("randint", [min, max]) => BlockExpr::RandInt {
                        min: Box::new(min.clone()),
                        max: Box::new(max.clone()),
                    },
                    _ => return None,
                }
            }
            Expression::Null
            | Expression::Unary {
                op: UnaryOperator::Negate,
                ..
            }
            | Expression::MethodCall { .. } => return None,
        };
        Some(block)
    }
}
