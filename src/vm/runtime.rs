use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::builtins::{BuiltinFunction, call_builtin};
use crate::bytecode::{Instruction, Op, Program};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::value::{Value, list_position};
use crate::vm::frame::{self, Frame};
use crate::vm::{StepOutcome, Vm, VmStatus};

type VmResult<T> = Result<T, RuntimeErrorKind>;

impl Vm {
    /// Executes one user statement marker and the glue after it, stopping in
    /// front of the next user statement.
    pub(super) fn run_step(&mut self) -> Result<StepOutcome, RuntimeError> {
        let program = Rc::clone(&self.program);
        let mut highlight_line = None;
        let mut executed_statement = false;
        while let Some(op) = program.code.get(self.ip) {
            if matches!(op.instruction, Instruction::Statement) && !program.is_prefix_line(op.line)
            {
                if executed_statement {
                    return Ok(StepOutcome {
                        done: false,
                        highlight_line,
                    });
                }
                executed_statement = true;
                highlight_line = program.user_line(op.line);
            }
            trace!("ip {} line {}: {:?}", self.ip, op.line, op.instruction);
            self.ip += 1;
            if let Err(kind) = self.execute_instruction(&program, op) {
                return Err(RuntimeError::new(kind, self.error_line(&program, op.line)));
            }
        }
        self.status = VmStatus::Done;
        Ok(StepOutcome {
            done: true,
            highlight_line,
        })
    }

    /// Innermost user line for an error raised at `line`; library code
    /// reports the user statement that called into it.
    fn error_line(&self, program: &Program, line: usize) -> Option<usize> {
        program
            .user_line(line)
            .or_else(|| self.frames.iter().rev().find_map(|frame| frame.line))
    }

    fn execute_instruction(&mut self, program: &Program, op: &Op) -> VmResult<()> {
        match &op.instruction {
            Instruction::Statement => {
                self.tick()?;
                if let Some(line) = program.user_line(op.line) {
                    self.current_frame_mut()?.line = Some(line);
                }
            }
            Instruction::LoopHead => self.tick()?,
            Instruction::PushNumber(value) => self.stack.push(Value::Number(*value)),
            Instruction::PushString(value) => self.stack.push(Value::String(value.clone())),
            Instruction::PushBool(value) => self.stack.push(Value::Boolean(*value)),
            Instruction::PushNull => self.stack.push(Value::Null),
            Instruction::BuildList(count) => {
                let values = self.pop_values(*count)?;
                self.stack.push(Value::List(values));
            }
            Instruction::BuildMap(keys) => {
                let values = self.pop_values(keys.len())?;
                let entries = keys.iter().cloned().zip(values).collect::<IndexMap<_, _>>();
                self.stack.push(Value::Map(entries));
            }
            Instruction::LoadName(name) => {
                let value = self.load_name(name)?;
                self.stack.push(value);
            }
            Instruction::StoreName(name) => {
                let value = self.pop_stack()?;
                self.store(name, value)?;
            }
            Instruction::LoadIndex => {
                let index = self.pop_stack()?;
                let object = self.pop_stack()?;
                self.stack.push(object.get_item(&index)?);
            }
            Instruction::StoreIndex(name) => {
                let value = self.pop_stack()?;
                let index = self.pop_stack()?;
                let target = frame::lookup_mut(&mut self.frames, name)
                    .ok_or_else(|| RuntimeErrorKind::UndefinedVariable { name: name.clone() })?;
                target.set_item(&index, value)?;
            }
            Instruction::Unary(op) => {
                let operand = self.pop_stack()?;
                self.stack.push(unary(*op, &operand)?);
            }
            Instruction::Binary(op) => {
                let right = self.pop_stack()?;
                let left = self.pop_stack()?;
                self.stack.push(binary(*op, &left, &right)?);
            }
            Instruction::JumpIfFalse(target) => {
                if !self.pop_stack()?.is_truthy() {
                    self.ip = *target;
                }
            }
            Instruction::JumpIfFalseOrPop(target) => {
                if self.peek_stack()?.is_truthy() {
                    self.pop_stack()?;
                } else {
                    self.ip = *target;
                }
            }
            Instruction::JumpIfTrueOrPop(target) => {
                if self.peek_stack()?.is_truthy() {
                    self.ip = *target;
                } else {
                    self.pop_stack()?;
                }
            }
            Instruction::Jump(target) => self.ip = *target,
            Instruction::Call { name, argc } => {
                let args = self.pop_values(*argc)?;
                self.call(program, name, args)?;
            }
            Instruction::CallMethod {
                receiver,
                method,
                argc,
            } => {
                let args = self.pop_values(*argc)?;
                let target = frame::lookup_mut(&mut self.frames, receiver).ok_or_else(|| {
                    RuntimeErrorKind::UndefinedVariable {
                        name: receiver.clone(),
                    }
                })?;
                let result = call_method(target, method, args)?;
                self.stack.push(result);
            }
            Instruction::Return => {
                let value = self.pop_stack()?;
                if self.frames.len() <= 1 {
                    self.ip = program.code.len();
                    return Ok(());
                }
                let frame = self.frames.pop().ok_or(RuntimeErrorKind::StackUnderflow)?;
                trace!("return from '{}' with {}", frame.name, value.repr());
                self.stack.truncate(frame.stack_base);
                self.ip = frame.return_address;
                self.stack.push(value);
            }
            Instruction::Pop => {
                self.pop_stack()?;
            }
            Instruction::ToItems => {
                let iterable = self.pop_stack()?;
                self.stack.push(Value::List(iterable.iteration_items()?));
            }
            Instruction::RepeatNext { counter, exit } => {
                let remaining = self.load_name(counter)?.as_number("repeat")?;
                if remaining >= 1.0 {
                    self.store(counter, Value::Number(remaining - 1.0))?;
                } else {
                    self.ip = *exit;
                }
            }
            Instruction::RangeNext {
                counter,
                end,
                step,
                target,
                exit,
            } => {
                let current = self.load_name(counter)?.as_number("range")?;
                let end = self.load_name(end)?.as_number("range")?;
                let step_by = self.load_name(step)?.as_number("range")?;
                if step_by == 0.0 {
                    return Err(RuntimeErrorKind::ZeroRangeStep);
                }
                if (step_by > 0.0 && current < end) || (step_by < 0.0 && current > end) {
                    self.store(target, Value::Number(current))?;
                    self.store(counter, Value::Number(current + step_by))?;
                } else {
                    self.ip = *exit;
                }
            }
            Instruction::IterNext {
                items,
                index,
                target,
                exit,
            } => {
                let position = self.load_name(index)?.as_number("for")? as usize;
                let Value::List(values) = self.load_name(items)? else {
                    return Err(RuntimeErrorKind::NotIterable {
                        type_name: "hidden loop state".to_string(),
                    });
                };
                match values.into_iter().nth(position) {
                    Some(item) => {
                        self.store(target, item)?;
                        self.store(index, Value::Number((position + 1) as f64))?;
                    }
                    None => self.ip = *exit,
                }
            }
        }
        Ok(())
    }

    /// Resolves a call by name: user function, then native verb, then builtin.
    fn call(&mut self, program: &Program, name: &str, args: Vec<Value>) -> VmResult<()> {
        if let Some(function) = program.functions.get(name) {
            RuntimeError::expect_function_arity(name, function.params.len(), args.len())?;
            if self.frames.len() > self.config.call_depth_limit {
                return Err(RuntimeErrorKind::CallDepthExceeded {
                    limit: self.config.call_depth_limit,
                });
            }
            let locals = function.params.iter().cloned().zip(args).collect();
            self.frames.push(Frame::call(
                name,
                self.ip,
                locals,
                program.user_line(function.line),
                self.stack.len(),
            ));
            self.ip = function.entry;
            return Ok(());
        }
        if let Some(result) = self.natives.invoke(name, &args) {
            debug!("native '{name}' called with {} args", args.len());
            self.stack.push(result?);
            return Ok(());
        }
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            let printed = self.output.len();
            let value = call_builtin(
                builtin,
                args,
                &mut self.rng,
                &mut self.output,
                self.config.step_limit,
            )?;
            for line in &self.output[printed..] {
                debug!("print: {line}");
            }
            self.stack.push(value);
            return Ok(());
        }
        Err(RuntimeErrorKind::UnknownVerb {
            name: name.to_string(),
        })
    }

    /// Runs `name` to its return outside the step contract and hands back the
    /// result. Bounded by the same step and call depth ceilings as a run.
    pub(super) fn run_function(&mut self, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let program = Rc::clone(&self.program);
        let depth = self.frames.len();
        self.call(&program, name, args)?;
        while self.frames.len() > depth {
            let op = program
                .code
                .get(self.ip)
                .ok_or(RuntimeErrorKind::InvalidJumpTarget { target: self.ip })?;
            self.ip += 1;
            self.execute_instruction(&program, op)?;
        }
        self.pop_stack()
    }

    fn tick(&mut self) -> VmResult<()> {
        self.ticks += 1;
        if self.ticks > self.config.step_limit {
            return Err(RuntimeErrorKind::StepLimitExceeded {
                limit: self.config.step_limit,
            });
        }
        Ok(())
    }

    fn load_name(&self, name: &str) -> VmResult<Value> {
        frame::lookup(&self.frames, name)
            .cloned()
            .ok_or_else(|| RuntimeErrorKind::UndefinedVariable {
                name: name.to_string(),
            })
    }

    /// Binds in the innermost frame; inside a function this is always local.
    fn store(&mut self, name: &str, value: Value) -> VmResult<()> {
        self.current_frame_mut()?
            .locals
            .insert(name.to_string(), value);
        Ok(())
    }

    fn current_frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames.last_mut().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn pop_stack(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn peek_stack(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn pop_values(&mut self, count: usize) -> VmResult<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(RuntimeErrorKind::StackUnderflow)?;
        Ok(self.stack.split_off(start))
    }
}

pub(super) fn unary(op: UnaryOperator, operand: &Value) -> VmResult<Value> {
    match op {
        UnaryOperator::Negate => operand.negate(),
        UnaryOperator::Not => Ok(Value::Boolean(!operand.is_truthy())),
    }
}

pub(super) fn binary(op: BinaryOperator, left: &Value, right: &Value) -> VmResult<Value> {
    let ordered = |accept: fn(Ordering) -> bool| {
        left.compare(op.symbol(), right)
            .map(|ordering| Value::Boolean(accept(ordering)))
    };
    match op {
        BinaryOperator::Add => left.add(right),
        BinaryOperator::Sub => left.sub(right),
        BinaryOperator::Mul => left.mul(right),
        BinaryOperator::Div => left.div(right),
        BinaryOperator::Mod => left.rem(right),
        BinaryOperator::Equal => Ok(Value::Boolean(left == right)),
        BinaryOperator::NotEqual => Ok(Value::Boolean(left != right)),
        BinaryOperator::LessThan => ordered(Ordering::is_lt),
        BinaryOperator::LessEqual => ordered(Ordering::is_le),
        BinaryOperator::GreaterThan => ordered(Ordering::is_gt),
        BinaryOperator::GreaterEqual => ordered(Ordering::is_ge),
        BinaryOperator::And => Ok(if left.is_truthy() {
            right.clone()
        } else {
            left.clone()
        }),
        BinaryOperator::Or => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),
    }
}

/// Methods callable on a variable; mutating ones update it in place.
pub(super) fn call_method(target: &mut Value, method: &str, mut args: Vec<Value>) -> VmResult<Value> {
    match (target, method) {
        (Value::List(values), "append") => {
            RuntimeError::expect_function_arity("append", 1, args.len())?;
            values.extend(args.pop());
            Ok(Value::Null)
        }
        (Value::List(values), "pop") => {
            let position = match args.as_slice() {
                [] if values.is_empty() => {
                    return Err(RuntimeErrorKind::IndexOutOfBounds { index: 0, len: 0 });
                }
                [] => values.len() - 1,
                [index] => list_position(index, values.len())?,
                _ => {
                    return Err(RuntimeErrorKind::FunctionArityMismatch {
                        name: "pop".to_string(),
                        expected: 1,
                        found: args.len(),
                    });
                }
            };
            Ok(values.remove(position))
        }
        (Value::List(values), "insert") => {
            RuntimeError::expect_function_arity("insert", 2, args.len())?;
            let value = args.pop().unwrap_or_default();
            let raw = args[0].as_number("insert")?.floor();
            let len = values.len() as f64;
            let position = if raw < 0.0 { (len + raw).max(0.0) } else { raw.min(len) };
            values.insert(position as usize, value);
            Ok(Value::Null)
        }
        (Value::Map(entries), "keys") => {
            RuntimeError::expect_function_arity("keys", 0, args.len())?;
            Ok(Value::List(
                entries.keys().cloned().map(Value::String).collect(),
            ))
        }
        (target, method) => Err(RuntimeErrorKind::UnknownMethod {
            method: method.to_string(),
            type_name: target.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{binary, call_method};
    use crate::ast::BinaryOperator;
    use crate::error::RuntimeErrorKind;
    use crate::value::Value;

    #[test]
    fn comparisons_require_matching_types() {
        assert_eq!(
            binary(
                BinaryOperator::LessEqual,
                &Value::Number(2.0),
                &Value::Number(2.0)
            ),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            binary(
                BinaryOperator::LessThan,
                &Value::Number(1.0),
                &Value::from("a")
            ),
            Err(RuntimeErrorKind::UnsupportedOperands {
                operation: "<".to_string(),
                left: "number".to_string(),
                right: "string".to_string(),
            })
        );
        assert_eq!(
            binary(BinaryOperator::Equal, &Value::from("a"), &Value::Number(1.0)),
            Ok(Value::Boolean(false))
        );
    }

    #[test]
    fn list_methods_mutate_in_place() {
        let mut items = Value::List(vec![Value::Number(1.0)]);
        call_method(&mut items, "append", vec![Value::Number(3.0)]).expect("append");
        call_method(&mut items, "insert", vec![Value::Number(1.0), Value::Number(2.0)])
            .expect("insert");
        let popped = call_method(&mut items, "pop", vec![Value::Number(0.0)]).expect("pop");
        assert_eq!(popped, Value::Number(1.0));
        assert_eq!(
            items,
            Value::List(vec![Value::Number(2.0), Value::Number(3.0)])
        );
        assert!(matches!(
            call_method(&mut items, "keys", Vec::new()),
            Err(RuntimeErrorKind::UnknownMethod { .. })
        ));
    }
}
