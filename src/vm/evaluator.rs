//! Side-effect-free evaluation of host expressions (win/fail conditions).
//!
//! Walks the expression tree directly against borrowed VM state, so it can
//! never move the instruction pointer, touch history, or run a command.
//! Pure library helpers run in a throwaway VM with no natives.

use std::rc::Rc;

use rand::rngs::StdRng;

use crate::ast::{BinaryOperator, Expression};
use crate::builtins::{BuiltinFunction, call_builtin};
use crate::bytecode::Program;
use crate::config::VmConfig;
use crate::error::EvalError;
use crate::natives::{NativeKind, NativeRegistry};
use crate::stdlib::PURE_HELPERS;
use crate::value::Value;
use crate::vm::Vm;
use crate::vm::frame::{self, Frame};
use crate::vm::runtime::{binary, call_method, unary};

pub(super) struct Evaluator<'vm> {
    frames: &'vm [Frame],
    natives: &'vm NativeRegistry,
    program: &'vm Rc<Program>,
    config: &'vm VmConfig,
    /// Private copy, so `random()` here never shifts the run's sequence.
    rng: StdRng,
}

impl<'vm> Evaluator<'vm> {
    pub(super) fn new(
        frames: &'vm [Frame],
        natives: &'vm NativeRegistry,
        program: &'vm Rc<Program>,
        config: &'vm VmConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            frames,
            natives,
            program,
            config,
            rng,
        }
    }

    pub(super) fn evaluate(&mut self, expression: &Expression) -> Result<Value, EvalError> {
        match expression {
            Expression::Number(value) => Ok(Value::Number(*value)),
            Expression::String(value) => Ok(Value::String(value.clone())),
            Expression::Boolean(value) => Ok(Value::Boolean(*value)),
            Expression::Null => Ok(Value::Null),
            Expression::Identifier(name) => frame::lookup(self.frames, name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedName { name: name.clone() }),
            Expression::List(items) => Ok(Value::List(self.evaluate_all(items)?)),
            Expression::Object(entries) => {
                let mut map = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), self.evaluate(value)?);
                }
                Ok(Value::Map(map))
            }
            Expression::Index { object, index } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                Ok(object.get_item(&index)?)
            }
            Expression::Unary { op, operand } => {
                let operand = self.evaluate(operand)?;
                Ok(unary(*op, &operand)?)
            }
            Expression::BinaryOp { left, op, right } => {
                let left = self.evaluate(left)?;
                match op {
                    BinaryOperator::And if !left.is_truthy() => Ok(left),
                    BinaryOperator::Or if left.is_truthy() => Ok(left),
                    BinaryOperator::And | BinaryOperator::Or => self.evaluate(right),
                    _ => {
                        let right = self.evaluate(right)?;
                        Ok(binary(*op, &left, &right)?)
                    }
                }
            }
            Expression::Call { name, args } => self.call(name, args),
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                if method != "keys" {
                    return Err(EvalError::UnsupportedCall {
                        name: format!("{receiver}.{method}"),
                    });
                }
                let mut target = frame::lookup(self.frames, receiver)
                    .cloned()
                    .ok_or_else(|| EvalError::UndefinedName {
                        name: receiver.clone(),
                    })?;
                let args = self.evaluate_all(args)?;
                Ok(call_method(&mut target, method, args)?)
            }
        }
    }

    fn evaluate_all(&mut self, expressions: &[Expression]) -> Result<Vec<Value>, EvalError> {
        expressions
            .iter()
            .map(|expression| self.evaluate(expression))
            .collect()
    }

    /// Sensors, pure builtins and pure library helpers only; user functions
    /// and commands could change state and are refused.
    fn call(&mut self, name: &str, args: &[Expression]) -> Result<Value, EvalError> {
        let unsupported = || EvalError::UnsupportedCall {
            name: name.to_string(),
        };
        if let Some(function) = self.program.functions.get(name) {
            if !self.program.is_prefix_line(function.line) || !PURE_HELPERS.contains(&name) {
                return Err(unsupported());
            }
            let args = self.evaluate_all(args)?;
            return self.run_helper(name, args);
        }
        match self.natives.kind(name) {
            Some(NativeKind::Command) => return Err(unsupported()),
            Some(NativeKind::Sensor) => {
                let args = self.evaluate_all(args)?;
                return match self.natives.sense(name, &args) {
                    Some(result) => Ok(result?),
                    None => Err(unsupported()),
                };
            }
            None => {}
        }
        match BuiltinFunction::from_name(name) {
            Some(builtin) if builtin.is_pure() => {
                let args = self.evaluate_all(args)?;
                Ok(call_builtin(
                    builtin,
                    args,
                    &mut self.rng,
                    &mut Vec::new(),
                    self.config.step_limit,
                )?)
            }
            Some(_) => Err(unsupported()),
            None => Err(EvalError::UndefinedSensor {
                name: name.to_string(),
            }),
        }
    }

    fn run_helper(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let mut sandbox = Vm::with_config(NativeRegistry::new(), self.config.clone());
        sandbox.program = Rc::clone(self.program);
        sandbox.rng = self.rng.clone();
        Ok(sandbox.run_function(name, args)?)
    }
}
