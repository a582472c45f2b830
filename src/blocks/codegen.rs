use std::collections::BTreeMap;

use serde::Serialize;

use crate::blocks::verbs::normalize_command;
use crate::blocks::{Block, BlockExpr, BlockKind, GameType};
use crate::value::{escape_string, format_number};

const INDENT: &str = "    ";
/// Binding strength of atoms and postfix forms (`a[i]`, calls).
const POSTFIX: u8 = 8;
const UNARY: u8 = 7;
const NOT: u8 = 3;

/// Source text plus the block each generated line came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub code: String,
    /// 1-based line number to block id, for lines that stand for one block.
    pub line_map: BTreeMap<usize, String>,
}

pub fn generate_code(blocks: &[Block], game: GameType) -> String {
    generate_code_with_line_map(blocks, game).code
}

pub fn generate_code_with_line_map(blocks: &[Block], game: GameType) -> GeneratedCode {
    let mut emitter = Emitter {
        game,
        lines: Vec::new(),
        line_map: BTreeMap::new(),
    };
    for block in blocks {
        emitter.block(block, 0);
    }
    GeneratedCode {
        code: emitter.lines.join("\n"),
        line_map: emitter.line_map,
    }
}

struct Emitter {
    game: GameType,
    lines: Vec<String>,
    line_map: BTreeMap<usize, String>,
}

impl Emitter {
    fn line(&mut self, depth: usize, text: String, block_id: Option<&str>) {
        self.lines.push(format!("{}{text}", INDENT.repeat(depth)));
        if let Some(id) = block_id {
            self.line_map.insert(self.lines.len(), id.to_string());
        }
    }

    fn body(&mut self, blocks: &[Block], depth: usize) {
        if blocks.is_empty() {
            self.line(depth, "pass".to_string(), None);
        }
        for block in blocks {
            self.block(block, depth);
        }
    }

    fn block(&mut self, block: &Block, depth: usize) {
        let id = Some(block.id.as_str());
        match &block.kind {
            BlockKind::Command { verb: name, args } | BlockKind::FunctionCall { name, args } => {
                let text = match normalize_command(self.game, name, args) {
                    Some((verb, args)) => call(verb, &args),
                    None => call(name, args),
                };
                self.line(depth, text, id);
            }
            BlockKind::Repeat { count, body } => {
                self.line(depth, format!("repeat {} times:", expr(count)), id);
                self.body(body, depth + 1);
            }
            BlockKind::While { condition, body } => {
                self.line(depth, format!("while {}:", expr(condition)), id);
                self.body(body, depth + 1);
            }
            BlockKind::If {
                condition,
                then_body,
                else_body,
            } => self.if_chain(&block.id, "if", condition, then_body, else_body, depth),
            BlockKind::For {
                variable,
                from,
                to,
                step,
                body,
            } => {
                let mut bounds = vec![expr(from), expr(to)];
                bounds.extend(step.as_ref().map(expr));
                self.line(
                    depth,
                    format!("for {variable} in range({}):", bounds.join(", ")),
                    id,
                );
                self.body(body, depth + 1);
            }
            BlockKind::ForEach {
                variable,
                iterable,
                body,
            } => {
                self.line(depth, format!("for {variable} in {}:", expr(iterable)), id);
                self.body(body, depth + 1);
            }
            BlockKind::SetVariable { name, value } => {
                self.line(depth, format!("{name} = {}", expr(value)), id);
            }
            BlockKind::Print { value } => {
                self.line(depth, format!("print({})", expr(value)), id);
            }
            BlockKind::FunctionDef { name, params, body } => {
                self.line(depth, format!("def {name}({}):", params.join(", ")), id);
                self.body(body, depth + 1);
            }
            BlockKind::Return { value } => {
                let text = match value {
                    Some(value) => format!("return {}", expr(value)),
                    None => "return".to_string(),
                };
                self.line(depth, text, id);
            }
            BlockKind::ListAppend { list, value } => {
                self.line(depth, format!("{list}.append({})", expr(value)), id);
            }
            BlockKind::ListRemove { list, index } => {
                let index = index.as_ref().map(expr).unwrap_or_default();
                self.line(depth, format!("{list}.pop({index})"), id);
            }
            BlockKind::ListInsert { list, index, value } => {
                self.line(
                    depth,
                    format!("{list}.insert({}, {})", expr(index), expr(value)),
                    id,
                );
            }
            BlockKind::Break => self.line(depth, "break".to_string(), id),
            BlockKind::Continue => self.line(depth, "continue".to_string(), id),
            BlockKind::Pass => self.line(depth, "pass".to_string(), id),
        }
    }

    /// An else branch holding exactly one `if` block is written as `elif`.
    fn if_chain(
        &mut self,
        id: &str,
        keyword: &str,
        condition: &BlockExpr,
        then_body: &[Block],
        else_body: &Option<Vec<Block>>,
        depth: usize,
    ) {
        self.line(depth, format!("{keyword} {}:", expr(condition)), Some(id));
        self.body(then_body, depth + 1);
        match else_body.as_deref() {
            None => {}
            Some(
                [
                    Block {
                        id: nested_id,
                        kind:
                            BlockKind::If {
                                condition,
                                then_body,
                                else_body,
                            },
                    },
                ],
            ) => self.if_chain(nested_id, "elif", condition, then_body, else_body, depth),
            Some(else_body) => {
                self.line(depth, "else:".to_string(), None);
                self.body(else_body, depth + 1);
            }
        }
    }
}

fn call(name: &str, args: &[BlockExpr]) -> String {
    let args = args.iter().map(expr).collect::<Vec<_>>();
    format!("{name}({})", args.join(", "))
}

fn precedence(expression: &BlockExpr) -> u8 {
    match expression {
        BlockExpr::Binary { op, .. } => op.to_ast().precedence(),
        BlockExpr::Comparison { op, .. } => op.to_ast().precedence(),
        BlockExpr::SensorCall { negated: true, .. } => NOT,
        BlockExpr::Number { value } if *value < 0.0 => UNARY,
        _ => POSTFIX,
    }
}

/// Renders `operand`, parenthesized when it binds looser than its parent.
/// Right operands also need parentheses at equal strength (left associativity).
fn operand(operand: &BlockExpr, parent: u8, right: bool) -> String {
    let own = precedence(operand);
    let text = expr(operand);
    if own < parent || (right && own == parent) {
        format!("({text})")
    } else {
        text
    }
}

pub(crate) fn expr(expression: &BlockExpr) -> String {
    match expression {
        BlockExpr::Number { value } => format_number(*value),
        BlockExpr::Text { value } => format!("\"{}\"", escape_string(value)),
        BlockExpr::Boolean { value } => value.to_string(),
        BlockExpr::Variable { name } => name.clone(),
        BlockExpr::Binary { op, left, right } => {
            let parent = op.to_ast().precedence();
            format!(
                "{} {} {}",
                operand(left, parent, false),
                op.to_ast().symbol(),
                operand(right, parent, true)
            )
        }
        BlockExpr::Comparison { op, left, right } => {
            let parent = op.to_ast().precedence();
            format!(
                "{} {} {}",
                operand(left, parent, false),
                op.to_ast().symbol(),
                operand(right, parent, true)
            )
        }
        BlockExpr::SensorCall {
            name,
            args,
            negated,
        } => {
            let text = call(name, args);
            if *negated { format!("not {text}") } else { text }
        }
        BlockExpr::Array { items } => {
            let items = items.iter().map(expr).collect::<Vec<_>>();
            format!("[{}]", items.join(", "))
        }
        BlockExpr::ArrayAccess { array, index } => {
            format!("{}[{}]", operand(array, POSTFIX, false), expr(index))
        }
        BlockExpr::Length { value } => format!("len({})", expr(value)),
        BlockExpr::Random => "random()".to_string(),
        BlockExpr::RandInt { min, max } => format!("randint({}, {})", expr(min), expr(max)),
        BlockExpr::Object { entries } => {
            let entries = entries
                .iter()
                .map(|(key, value)| format!("\"{}\": {}", escape_string(key), expr(value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
        BlockExpr::ObjectAccess { object, key } => {
            format!("{}[\"{}\"]", operand(object, POSTFIX, false), escape_string(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{expr, generate_code, generate_code_with_line_map};
    use crate::blocks::{ArithmeticOp, Block, BlockExpr, BlockKind, ComparisonOp, GameType};
    use indoc::indoc;

    fn command(id: &str, verb: &str, args: Vec<BlockExpr>) -> Block {
        Block::new(
            id,
            BlockKind::Command {
                verb: verb.to_string(),
                args,
            },
        )
    }

    #[test]
    fn repeat_of_move_maps_each_line() {
        let blocks = vec![Block::new(
            "repeat-1",
            BlockKind::Repeat {
                count: BlockExpr::number(3.0),
                body: vec![command("move-1", "move", vec![BlockExpr::text("forward")])],
            },
        )];
        let generated = generate_code_with_line_map(&blocks, GameType::Maze);
        assert_eq!(generated.code, "repeat 3 times:\n    move(\"forward\")");
        assert_eq!(generated.line_map.get(&1).map(String::as_str), Some("repeat-1"));
        assert_eq!(generated.line_map.get(&2).map(String::as_str), Some("move-1"));
        assert_eq!(generated.line_map.len(), 2);
    }

    #[test]
    fn empty_bodies_get_unmapped_pass() {
        let blocks = vec![Block::new(
            "w",
            BlockKind::While {
                condition: BlockExpr::SensorCall {
                    name: "frontClear".to_string(),
                    args: Vec::new(),
                    negated: false,
                },
                body: Vec::new(),
            },
        )];
        let generated = generate_code_with_line_map(&blocks, GameType::Maze);
        assert_eq!(generated.code, "while frontClear():\n    pass");
        assert!(!generated.line_map.contains_key(&2));
    }

    #[test]
    fn legacy_and_short_commands_are_normalized() {
        let blocks = vec![
            command("a", "turnLeft", Vec::new()),
            command("b", "forward", vec![BlockExpr::number(30.0)]),
            command("c", "jump", Vec::new()),
        ];
        assert_eq!(
            generate_code(&blocks[..1], GameType::Maze),
            "turn(\"left\")"
        );
        assert_eq!(
            generate_code(&blocks[1..], GameType::Turtle),
            "move(\"forward\", 30)\njump()"
        );
    }

    #[test]
    fn function_call_named_like_a_verb_is_normalized() {
        let blocks = vec![Block::new(
            "call",
            BlockKind::FunctionCall {
                name: "move".to_string(),
                args: Vec::new(),
            },
        )];
        let generated = generate_code(&blocks, GameType::Maze);
        assert_eq!(generated, "move(\"forward\")");
        let reparsed =
            crate::blocks::parse_code_to_blocks(&generated, GameType::Maze).expect("convertible");
        assert_eq!(generate_code(&reparsed, GameType::Maze), generated);
    }

    #[test]
    fn nested_else_if_becomes_elif() {
        let condition = |name: &str, value: f64| BlockExpr::Comparison {
            op: ComparisonOp::Greater,
            left: Box::new(BlockExpr::variable(name)),
            right: Box::new(BlockExpr::number(value)),
        };
        let print = |id: &str, text: &str| {
            Block::new(
                id,
                BlockKind::Print {
                    value: BlockExpr::text(text),
                },
            )
        };
        let blocks = vec![Block::new(
            "if-1",
            BlockKind::If {
                condition: condition("x", 10.0),
                then_body: vec![print("p1", "big")],
                else_body: Some(vec![Block::new(
                    "if-2",
                    BlockKind::If {
                        condition: condition("x", 5.0),
                        then_body: vec![print("p2", "medium")],
                        else_body: Some(vec![print("p3", "small")]),
                    },
                )]),
            },
        )];
        let generated = generate_code_with_line_map(&blocks, GameType::Maze);
        assert_eq!(
            generated.code,
            indoc! {r#"
                if x > 10:
                    print("big")
                elif x > 5:
                    print("medium")
                else:
                    print("small")"#}
        );
        assert_eq!(generated.line_map.get(&3).map(String::as_str), Some("if-2"));
        assert!(!generated.line_map.contains_key(&5));
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let sum = BlockExpr::Binary {
            op: ArithmeticOp::Add,
            left: Box::new(BlockExpr::variable("a")),
            right: Box::new(BlockExpr::variable("b")),
        };
        let product = BlockExpr::Binary {
            op: ArithmeticOp::Mul,
            left: Box::new(sum.clone()),
            right: Box::new(BlockExpr::number(2.0)),
        };
        assert_eq!(expr(&product), "(a + b) * 2");
        let difference = BlockExpr::Binary {
            op: ArithmeticOp::Sub,
            left: Box::new(BlockExpr::variable("x")),
            right: Box::new(sum),
        };
        assert_eq!(expr(&difference), "x - (a + b)");
        let access = BlockExpr::ObjectAccess {
            object: Box::new(BlockExpr::variable("pos")),
            key: "row".to_string(),
        };
        assert_eq!(expr(&access), "pos[\"row\"]");
    }
}
