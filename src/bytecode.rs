//! Flat, line-tagged instruction sequence and the AST lowering that builds it.
//!
//! Every jump holds an absolute address into the same `code` vector. Simple
//! statements open with a `Statement` marker; everything between two markers
//! (conditions, loop bookkeeping, returns) is glue that runs inside whichever
//! step is in progress.

use rustc_hash::FxHashMap;

use crate::ast::{
    self, AssignTarget, BinaryOperator, Expression, Statement, StatementKind, UnaryOperator,
};
use crate::error::{SyntaxError, SyntaxResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// First instruction of a simple statement; a step ends in front of the next one.
    Statement,
    /// Top of a loop iteration; counted against the step ceiling.
    LoopHead,
    PushNumber(f64),
    PushString(String),
    PushBool(bool),
    PushNull,
    BuildList(usize),
    BuildMap(Vec<String>),
    LoadName(String),
    StoreName(String),
    LoadIndex,
    StoreIndex(String),
    Unary(UnaryOperator),
    Binary(BinaryOperator),
    JumpIfFalse(usize),
    JumpIfFalseOrPop(usize),
    JumpIfTrueOrPop(usize),
    Jump(usize),
    Call {
        name: String,
        argc: usize,
    },
    CallMethod {
        receiver: String,
        method: String,
        argc: usize,
    },
    Return,
    Pop,
    /// Replaces the value on top of the stack with the list of items it iterates.
    ToItems,
    RepeatNext {
        counter: String,
        exit: usize,
    },
    RangeNext {
        counter: String,
        end: String,
        step: String,
        target: String,
        exit: usize,
    },
    IterNext {
        items: String,
        index: String,
        target: String,
        exit: usize,
    },
}

impl Instruction {
    /// Address this instruction may transfer control to, if any.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Instruction::JumpIfFalse(target)
            | Instruction::JumpIfFalseOrPop(target)
            | Instruction::JumpIfTrueOrPop(target)
            | Instruction::Jump(target) => Some(*target),
            Instruction::RepeatNext { exit, .. }
            | Instruction::RangeNext { exit, .. }
            | Instruction::IterNext { exit, .. } => Some(*exit),
            _ => None,
        }
    }

    fn set_jump_target(&mut self, address: usize) {
        match self {
            Instruction::JumpIfFalse(target)
            | Instruction::JumpIfFalseOrPop(target)
            | Instruction::JumpIfTrueOrPop(target)
            | Instruction::Jump(target) => *target = address,
            Instruction::RepeatNext { exit, .. }
            | Instruction::RangeNext { exit, .. }
            | Instruction::IterNext { exit, .. } => *exit = address,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub instruction: Instruction,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub name: String,
    pub params: Vec<String>,
    pub entry: usize,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: Vec<Op>,
    pub functions: FxHashMap<String, FunctionEntry>,
    /// Lines belonging to library/custom-command source placed before user code.
    pub prefix_lines: usize,
}

impl Program {
    /// Maps a program line to the line the user wrote, hiding prefix lines.
    pub fn user_line(&self, line: usize) -> Option<usize> {
        (line > self.prefix_lines).then(|| line - self.prefix_lines)
    }

    pub fn is_prefix_line(&self, line: usize) -> bool {
        line <= self.prefix_lines
    }

    /// Checks that every jump and function entry stays inside this program.
    pub fn first_invalid_target(&self) -> Option<usize> {
        let len = self.code.len();
        self.code
            .iter()
            .filter_map(|op| op.instruction.jump_target())
            .chain(self.functions.values().map(|function| function.entry))
            .find(|target| *target > len)
    }
}

struct LoopLabels {
    continue_target: usize,
    break_patches: Vec<usize>,
}

struct Compiler {
    code: Vec<Op>,
    functions: FxHashMap<String, FunctionEntry>,
    loops: Vec<LoopLabels>,
    hidden_names: usize,
    line: usize,
}

pub fn compile(program: &ast::Program) -> SyntaxResult<Program> {
    compile_with_prefix(program, 0)
}

/// Lowers `program`, treating its first `prefix_lines` lines as library code.
pub fn compile_with_prefix(program: &ast::Program, prefix_lines: usize) -> SyntaxResult<Program> {
    let mut compiler = Compiler {
        code: Vec::new(),
        functions: FxHashMap::default(),
        loops: Vec::new(),
        hidden_names: 0,
        line: 1,
    };
    compiler.compile_block(&program.statements)?;
    Ok(Program {
        code: compiler.code,
        functions: compiler.functions,
        prefix_lines,
    })
}

impl Compiler {
    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(Op {
            instruction,
            line: self.line,
        });
        self.code.len() - 1
    }

    fn patch(&mut self, position: usize, address: usize) {
        self.code[position].instruction.set_jump_target(address);
    }

    fn hidden_name(&mut self, role: &str) -> String {
        self.hidden_names += 1;
        format!("__{role}_{}", self.hidden_names)
    }

    fn compile_block(&mut self, statements: &[Statement]) -> SyntaxResult<()> {
        for statement in statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Statement) -> SyntaxResult<()> {
        self.line = statement.line;
        match &statement.kind {
            StatementKind::FunctionDef { name, params, body } => {
                self.compile_function(name, params, body)?;
            }
            StatementKind::Assign { target, value } => {
                self.emit(Instruction::Statement);
                match target {
                    AssignTarget::Name(name) => {
                        self.compile_expression(value);
                        self.emit(Instruction::StoreName(name.clone()));
                    }
                    AssignTarget::Index { name, index } => {
                        self.compile_expression(index);
                        self.compile_expression(value);
                        self.emit(Instruction::StoreIndex(name.clone()));
                    }
                }
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.compile_expression(condition);
                let jump_if_false = self.emit(Instruction::JumpIfFalse(0));
                self.compile_block(then_body)?;
                if else_body.is_empty() {
                    let end = self.code.len();
                    self.patch(jump_if_false, end);
                } else {
                    self.line = statement.line;
                    let jump_to_end = self.emit(Instruction::Jump(0));
                    let else_start = self.code.len();
                    self.patch(jump_if_false, else_start);
                    self.compile_block(else_body)?;
                    let end = self.code.len();
                    self.patch(jump_to_end, end);
                }
            }
            StatementKind::While { condition, body } => {
                let head = self.emit(Instruction::LoopHead);
                self.compile_expression(condition);
                let exit_jump = self.emit(Instruction::JumpIfFalse(0));
                self.compile_loop_body(head, exit_jump, body, statement.line)?;
            }
            StatementKind::Repeat { count, body } => {
                let counter = self.hidden_name("repeat");
                self.compile_expression(count);
                self.emit(Instruction::StoreName(counter.clone()));
                let head = self.emit(Instruction::LoopHead);
                let next = self.emit(Instruction::RepeatNext { counter, exit: 0 });
                self.compile_loop_body(head, next, body, statement.line)?;
            }
            StatementKind::ForRange {
                target,
                start,
                end,
                step,
                body,
            } => {
                let counter = self.hidden_name("range");
                let end_name = self.hidden_name("end");
                let step_name = self.hidden_name("step");
                self.compile_expression(start);
                self.emit(Instruction::StoreName(counter.clone()));
                self.compile_expression(end);
                self.emit(Instruction::StoreName(end_name.clone()));
                match step {
                    Some(step) => self.compile_expression(step),
                    None => {
                        self.emit(Instruction::PushNumber(1.0));
                    }
                }
                self.emit(Instruction::StoreName(step_name.clone()));
                let head = self.emit(Instruction::LoopHead);
                let next = self.emit(Instruction::RangeNext {
                    counter,
                    end: end_name,
                    step: step_name,
                    target: target.clone(),
                    exit: 0,
                });
                self.compile_loop_body(head, next, body, statement.line)?;
            }
            StatementKind::ForEach {
                target,
                iterable,
                body,
            } => {
                let items = self.hidden_name("items");
                let index = self.hidden_name("index");
                self.compile_expression(iterable);
                self.emit(Instruction::ToItems);
                self.emit(Instruction::StoreName(items.clone()));
                self.emit(Instruction::PushNumber(0.0));
                self.emit(Instruction::StoreName(index.clone()));
                let head = self.emit(Instruction::LoopHead);
                let next = self.emit(Instruction::IterNext {
                    items,
                    index,
                    target: target.clone(),
                    exit: 0,
                });
                self.compile_loop_body(head, next, body, statement.line)?;
            }
            StatementKind::Return(value) => {
                self.emit(Instruction::Statement);
                match value {
                    Some(value) => self.compile_expression(value),
                    None => {
                        self.emit(Instruction::PushNull);
                    }
                }
                self.emit(Instruction::Return);
            }
            StatementKind::Break => {
                self.emit(Instruction::Statement);
                let jump = self.emit(Instruction::Jump(0));
                match self.loops.last_mut() {
                    Some(labels) => labels.break_patches.push(jump),
                    None => {
                        return Err(SyntaxError::at_line(
                            "'break' outside of a loop",
                            statement.line,
                        ));
                    }
                }
            }
            StatementKind::Continue => {
                self.emit(Instruction::Statement);
                let target = match self.loops.last() {
                    Some(labels) => labels.continue_target,
                    None => {
                        return Err(SyntaxError::at_line(
                            "'continue' outside of a loop",
                            statement.line,
                        ));
                    }
                };
                self.emit(Instruction::Jump(target));
            }
            StatementKind::Pass => {
                self.emit(Instruction::Statement);
            }
            StatementKind::Expr(expr) => {
                self.emit(Instruction::Statement);
                self.compile_expression(expr);
                self.emit(Instruction::Pop);
            }
        }
        Ok(())
    }

    /// Emits a loop body that jumps back to `head`; `exit_jump` and any
    /// `break` inside are patched to the first address after the loop.
    fn compile_loop_body(
        &mut self,
        head: usize,
        exit_jump: usize,
        body: &[Statement],
        header_line: usize,
    ) -> SyntaxResult<()> {
        self.loops.push(LoopLabels {
            continue_target: head,
            break_patches: Vec::new(),
        });
        let result = self.compile_block(body);
        let labels = self.loops.pop();
        result?;

        self.line = header_line;
        self.emit(Instruction::Jump(head));
        let exit = self.code.len();
        self.patch(exit_jump, exit);
        for position in labels.map(|labels| labels.break_patches).unwrap_or_default() {
            self.patch(position, exit);
        }
        Ok(())
    }

    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Statement],
    ) -> SyntaxResult<()> {
        let def_line = self.line;
        if self.functions.contains_key(name) {
            return Err(SyntaxError::at_line(
                format!("Duplicate function definition '{name}'"),
                def_line,
            ));
        }
        let skip = self.emit(Instruction::Jump(0));
        let entry = self.code.len();
        self.functions.insert(
            name.to_string(),
            FunctionEntry {
                name: name.to_string(),
                params: params.to_vec(),
                entry,
                line: def_line,
            },
        );

        let enclosing_loops = std::mem::take(&mut self.loops);
        let result = self.compile_block(body);
        self.loops = enclosing_loops;
        result?;

        self.line = def_line;
        self.emit(Instruction::PushNull);
        self.emit(Instruction::Return);
        let after = self.code.len();
        self.patch(skip, after);
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Number(value) => {
                self.emit(Instruction::PushNumber(*value));
            }
            Expression::String(value) => {
                self.emit(Instruction::PushString(value.clone()));
            }
            Expression::Boolean(value) => {
                self.emit(Instruction::PushBool(*value));
            }
            Expression::Null => {
                self.emit(Instruction::PushNull);
            }
            Expression::Identifier(name) => {
                self.emit(Instruction::LoadName(name.clone()));
            }
            Expression::List(items) => {
                for item in items {
                    self.compile_expression(item);
                }
                self.emit(Instruction::BuildList(items.len()));
            }
            Expression::Object(entries) => {
                for (_, value) in entries {
                    self.compile_expression(value);
                }
                let keys = entries.iter().map(|(key, _)| key.clone()).collect();
                self.emit(Instruction::BuildMap(keys));
            }
            Expression::Index { object, index } => {
                self.compile_expression(object);
                self.compile_expression(index);
                self.emit(Instruction::LoadIndex);
            }
            Expression::Unary { op, operand } => {
                self.compile_expression(operand);
                self.emit(Instruction::Unary(*op));
            }
            Expression::BinaryOp { left, op, right } => {
                self.compile_expression(left);
                match op {
                    BinaryOperator::And | BinaryOperator::Or => {
                        let short_circuit = if *op == BinaryOperator::And {
                            self.emit(Instruction::JumpIfFalseOrPop(0))
                        } else {
                            self.emit(Instruction::JumpIfTrueOrPop(0))
                        };
                        self.compile_expression(right);
                        let end = self.code.len();
                        self.patch(short_circuit, end);
                    }
                    _ => {
                        self.compile_expression(right);
                        self.emit(Instruction::Binary(*op));
                    }
                }
            }
            Expression::Call { name, args } => {
                for arg in args {
                    self.compile_expression(arg);
                }
                self.emit(Instruction::Call {
                    name: name.clone(),
                    argc: args.len(),
                });
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                for arg in args {
                    self.compile_expression(arg);
                }
                self.emit(Instruction::CallMethod {
                    receiver: receiver.clone(),
                    method: method.clone(),
                    argc: args.len(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Instruction, compile};
    use crate::parser::parse;
    use indoc::indoc;

    fn compile_source(source: &str) -> super::Program {
        compile(&parse(source).expect("parse should succeed")).expect("compile should succeed")
    }

    fn instructions(program: &super::Program) -> Vec<&Instruction> {
        program.code.iter().map(|op| &op.instruction).collect()
    }

    #[test]
    fn lowers_while_loop_to_test_and_backward_jump() {
        let program = compile_source(indoc! {"
            x = 1
            while x < 3:
                x = x + 1
        "});
        let code = instructions(&program);
        assert!(matches!(code[0], Instruction::Statement));
        assert!(matches!(code[3], Instruction::LoopHead));
        let Instruction::JumpIfFalse(exit) = code[7] else {
            panic!("expected conditional exit, got {:?}", code[7]);
        };
        assert_eq!(*exit, code.len());
        assert!(matches!(code[code.len() - 1], Instruction::Jump(3)));
        assert_eq!(program.code[4].line, 2);
        assert_eq!(program.code[8].line, 3);
    }

    #[test]
    fn functions_are_skipped_and_registered() {
        let program = compile_source(indoc! {"
            def seven():
                return 7
            x = seven()
        "});
        let function = program
            .functions
            .get("seven")
            .expect("expected compiled function 'seven'");
        assert_eq!(function.entry, 1);
        assert!(function.params.is_empty());
        let code = instructions(&program);
        assert!(matches!(code[0], Instruction::Jump(target) if *target == 6));
        assert!(matches!(
            code[7],
            Instruction::Call { name, argc: 0 } if name == "seven"
        ));
    }

    #[test]
    fn break_and_continue_resolve_against_innermost_loop() {
        let program = compile_source(indoc! {"
            for i in range(5):
                if i == 3:
                    break
                continue
        "});
        let code = instructions(&program);
        let exit = code.len();
        let head = code
            .iter()
            .position(|instruction| matches!(instruction, Instruction::LoopHead))
            .expect("loop head");
        let jumps = code
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Jump(target) => Some(*target),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(jumps, vec![exit, head, head]);
        assert_eq!(program.first_invalid_target(), None);
    }

    #[test]
    fn errors_on_break_outside_loop() {
        let program = parse("x = 1\nbreak\n").expect("parse should succeed");
        let error = compile(&program).expect_err("compile should fail");
        assert_eq!(error.line, 2);
        assert_eq!(error.message, "'break' outside of a loop");
    }

    #[test]
    fn errors_on_continue_in_function_outside_loop() {
        let program = parse(indoc! {"
            while true:
                pass
            def f():
                continue
        "})
        .expect("parse should succeed");
        let error = compile(&program).expect_err("compile should fail");
        assert_eq!(error.line, 4);
    }

    #[test]
    fn errors_on_duplicate_function_definitions() {
        let program = parse("def dup():\n    pass\ndef dup():\n    pass\n").expect("parse");
        let error = compile(&program).expect_err("compile should fail");
        assert_eq!(error.message, "Duplicate function definition 'dup'");
        assert_eq!(error.line, 3);
    }

    #[test]
    fn short_circuit_operators_jump_past_right_operand() {
        let program = compile_source("ok = a and b\n");
        let code = instructions(&program);
        assert!(matches!(code[2], Instruction::JumpIfFalseOrPop(4)));
    }

    #[test]
    fn repeat_uses_hidden_counter() {
        let program = compile_source("repeat 2 times:\n    pass\n");
        assert!(program.code.iter().any(|op| matches!(
            &op.instruction,
            Instruction::RepeatNext { counter, .. } if counter.starts_with("__")
        )));
    }

    #[test]
    fn prefix_lines_are_hidden_from_users() {
        let mut program = compile_source("x = 1\n");
        program.prefix_lines = 4;
        assert_eq!(program.user_line(3), None);
        assert_eq!(program.user_line(6), Some(2));
    }
}
