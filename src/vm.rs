//! Steppable virtual machine.
//!
//! The host drives execution one statement at a time with [`Vm::step`], can
//! rewind with [`Vm::step_back`], and inspects variables, frames and
//! arbitrary expressions between steps without disturbing the run.

mod debug;
mod evaluator;
mod frame;
mod history;
mod runtime;

use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::ast::StatementKind;
use crate::bytecode::{Instruction, Program, compile_with_prefix};
use crate::config::VmConfig;
use crate::error::{EvalError, RuntimeError, RuntimeErrorKind, SyntaxError};
use crate::natives::NativeRegistry;
use crate::parser::{parse, parse_expression};
use crate::stdlib::{CustomCommand, build_prefix};
use crate::value::Value;

use self::debug::Breakpoints;
use self::evaluator::Evaluator;
pub use self::frame::FrameView;
use self::frame::Frame;
use self::history::{History, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmState {
    pub status: VmStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one [`Vm::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub done: bool,
    /// User line of the statement the step executed.
    pub highlight_line: Option<usize>,
}

impl StepOutcome {
    fn finished() -> Self {
        Self {
            done: true,
            highlight_line: None,
        }
    }
}

pub struct Vm {
    config: VmConfig,
    natives: NativeRegistry,
    custom_commands: Vec<CustomCommand>,
    program: Rc<Program>,
    ip: usize,
    frames: Vec<Frame>,
    stack: Vec<Value>,
    status: VmStatus,
    error: Option<RuntimeError>,
    rng: StdRng,
    output: Vec<String>,
    steps: usize,
    ticks: usize,
    history: History,
    breakpoints: Breakpoints,
}

impl Vm {
    pub fn new(natives: NativeRegistry) -> Self {
        Self::with_config(natives, VmConfig::default())
    }

    pub fn with_config(natives: NativeRegistry, config: VmConfig) -> Self {
        Self {
            natives,
            custom_commands: Vec::new(),
            program: Rc::new(Program::default()),
            ip: 0,
            frames: vec![Frame::main()],
            stack: Vec::new(),
            status: VmStatus::Running,
            error: None,
            rng: StdRng::seed_from_u64(config.random_seed),
            output: Vec::new(),
            steps: 0,
            ticks: 0,
            history: History::new(config.history_limit),
            breakpoints: Breakpoints::default(),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Installs `program` and resets all run state.
    pub fn load(&mut self, program: Program) -> Result<(), RuntimeError> {
        if let Some(target) = program.first_invalid_target() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidJumpTarget { target },
                None,
            ));
        }
        self.install(program);
        Ok(())
    }

    /// Compiles library prefix + `code` as one program and loads it.
    ///
    /// Syntax errors report lines relative to `code`. Functions defined in
    /// `code` replace library or custom-command definitions of the same name.
    pub fn load_with_source(&mut self, code: &str) -> Result<(), SyntaxError> {
        let user_program = parse(code)?;
        let shadowed = user_program
            .statements
            .iter()
            .filter_map(|statement| match &statement.kind {
                StatementKind::FunctionDef { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect::<FxHashSet<_>>();
        let prefix = build_prefix(self.config.game, &self.custom_commands, &shadowed);
        let source = format!("{}{code}", prefix.source);
        let shift = |mut error: SyntaxError| {
            if error.line > prefix.lines {
                error.line -= prefix.lines;
            }
            error
        };
        let program = parse(&source).map_err(shift)?;
        let program = compile_with_prefix(&program, prefix.lines).map_err(shift)?;
        self.install(program);
        Ok(())
    }

    /// Restarts the loaded program from the top.
    pub fn reset(&mut self) {
        self.ip = 0;
        self.frames = vec![Frame::main()];
        self.stack.clear();
        self.status = VmStatus::Running;
        self.error = None;
        self.rng = StdRng::seed_from_u64(self.config.random_seed);
        self.output.clear();
        self.steps = 0;
        self.ticks = 0;
        self.history.clear();
    }

    fn install(&mut self, program: Program) {
        info!(
            "loaded program: {} instructions, {} functions, {} library lines",
            program.code.len(),
            program.functions.len(),
            program.prefix_lines
        );
        self.program = Rc::new(program);
        self.reset();
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command: impl FnMut(&[Value]) -> anyhow::Result<()> + 'static,
    ) {
        self.natives.register_command(name, command);
    }

    pub fn register_sensor(
        &mut self,
        name: impl Into<String>,
        sensor: impl Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    ) {
        self.natives.register_sensor(name, sensor);
    }

    /// Swaps in a different capability table, returning the previous one.
    pub fn set_natives(&mut self, natives: NativeRegistry) -> NativeRegistry {
        std::mem::replace(&mut self.natives, natives)
    }

    /// Adds a level-defined verb; it becomes callable from the next
    /// `load_with_source`. Redefining a name replaces the earlier body.
    ///
    /// A body that does not parse is rejected here, with lines counted from
    /// the body's first line, and any earlier definition is kept.
    pub fn define_custom_command(
        &mut self,
        name: impl Into<String>,
        params: Vec<String>,
        body: impl Into<String>,
    ) -> Result<(), SyntaxError> {
        let command = CustomCommand::new(name, params, body);
        command.validate()?;
        self.custom_commands
            .retain(|existing| existing.name != command.name);
        self.custom_commands.push(command);
        Ok(())
    }

    /// Runs exactly one statement plus the control flow leading to the next.
    ///
    /// Once the program has finished or failed, further calls do nothing and
    /// report `done`.
    pub fn step(&mut self) -> Result<StepOutcome, RuntimeError> {
        if self.status != VmStatus::Running {
            return Ok(StepOutcome::finished());
        }
        let snapshot = self.snapshot();
        self.history.push(snapshot);
        self.steps += 1;
        match self.run_step() {
            Ok(outcome) => {
                debug!(
                    "step {}: line {:?}, ip {}, depth {}, done {}",
                    self.steps,
                    outcome.highlight_line,
                    self.ip,
                    self.frames.len(),
                    outcome.done
                );
                Ok(outcome)
            }
            Err(error) => {
                debug!("step {} failed: {error}", self.steps);
                self.status = VmStatus::Error;
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Restores the state captured before the most recent step.
    pub fn step_back(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.restore(snapshot);
        debug!("stepped back to ip {}, step {}", self.ip, self.steps);
        true
    }

    /// Steps until the program finishes; returns how many steps ran.
    pub fn run_to_completion(&mut self) -> Result<usize, RuntimeError> {
        let start = self.steps;
        while !self.step()?.done {}
        Ok(self.steps - start)
    }

    /// Steps until the next statement to run sits on a breakpoint, or the
    /// program finishes.
    pub fn continue_to_breakpoint(&mut self) -> Result<StepOutcome, RuntimeError> {
        loop {
            let outcome = self.step()?;
            if outcome.done {
                return Ok(outcome);
            }
            if let Some(line) = self.pending_line()
                && self.breakpoints.contains(line)
            {
                debug!("paused at breakpoint on line {line}");
                return Ok(outcome);
            }
        }
    }

    /// Sets a breakpoint; returns false when no statement starts on `line`.
    pub fn set_breakpoint(&mut self, line: usize) -> bool {
        let has_statement = self.program.code.iter().any(|op| {
            matches!(op.instruction, Instruction::Statement)
                && self.program.user_line(op.line) == Some(line)
        });
        has_statement && self.breakpoints.insert(line)
    }

    pub fn clear_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.remove(line)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> Vec<usize> {
        self.breakpoints.lines()
    }

    /// User line of the statement the next step will run, when known.
    pub fn pending_line(&self) -> Option<usize> {
        if self.status != VmStatus::Running {
            return None;
        }
        let op = self.program.code.get(self.ip)?;
        match op.instruction {
            Instruction::Statement => self.program.user_line(op.line),
            _ => None,
        }
    }

    /// Visible variables at the current point: globals overlaid by the
    /// innermost frame's locals.
    pub fn get_variables(&self) -> IndexMap<String, Value> {
        let mut variables = IndexMap::new();
        let scopes = match self.frames.as_slice() {
            [globals] => vec![globals],
            [globals, .., innermost] => vec![globals, innermost],
            [] => Vec::new(),
        };
        for scope in scopes {
            for (name, value) in &scope.locals {
                if !self.config.is_internal_name(name) {
                    variables.insert(name.clone(), value.clone());
                }
            }
        }
        variables
    }

    /// Frames from the top-level script (first) to the innermost call (last).
    pub fn get_call_stack_for_visualization(&self) -> Vec<FrameView> {
        self.frames
            .iter()
            .map(|frame| FrameView {
                name: frame.name.clone(),
                line: frame.line,
                locals: frame
                    .locals
                    .iter()
                    .filter(|(name, _)| !self.config.is_internal_name(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            })
            .collect()
    }

    /// Evaluates a host expression against current state without side effects.
    ///
    /// Sensors, pure builtins and the library helpers `sum`, `contains`,
    /// `indexOf` and `reversed` may be called; commands, `print` and user
    /// functions are refused with [`EvalError::UnsupportedCall`].
    pub fn evaluate_expression(&self, source: &str) -> Result<Value, EvalError> {
        let expression = parse_expression(source)?;
        let mut evaluator = Evaluator::new(
            &self.frames,
            &self.natives,
            &self.program,
            &self.config,
            self.rng.clone(),
        );
        let result = evaluator.evaluate(&expression);
        debug!("evaluated {source:?}: {result:?}");
        result
    }

    pub fn get_state(&self) -> VmState {
        VmState {
            status: self.status,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }

    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    /// Lines printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn instruction_pointer(&self) -> usize {
        self.ip
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ip: self.ip,
            frames: self.frames.clone(),
            stack: self.stack.clone(),
            status: self.status,
            error: self.error.clone(),
            rng: self.rng.clone(),
            output_len: self.output.len(),
            steps: self.steps,
            ticks: self.ticks,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.ip = snapshot.ip;
        self.frames = snapshot.frames;
        self.stack = snapshot.stack;
        self.status = snapshot.status;
        self.error = snapshot.error;
        self.rng = snapshot.rng;
        self.output.truncate(snapshot.output_len);
        self.steps = snapshot.steps;
        self.ticks = snapshot.ticks;
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(NativeRegistry::new())
    }
}
