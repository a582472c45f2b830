//! Source placed in front of every program loaded with `Vm::load_with_source`.
//!
//! Everything here is plain language text: library helpers, the legacy verbs
//! of the configured game, and level-defined custom commands. All of it
//! compiles into ordinary functions sharing the user's address space.

use rustc_hash::FxHashSet;

use crate::blocks::GameType;
use crate::error::SyntaxError;
use crate::parser::parse;

const LIBRARY: &str = "\
def sum(items):
    total = 0
    for item in items:
        total = total + item
    return total

def contains(items, target):
    for item in items:
        if item == target:
            return true
    return false

def indexOf(items, target):
    position = 0
    for item in items:
        if item == target:
            return position
        position = position + 1
    return -1

def reversed(items):
    result = []
    position = len(items) - 1
    while position >= 0:
        result.append(items[position])
        position = position - 1
    return result
";

/// Library helpers that only read their arguments.
pub(crate) const PURE_HELPERS: [&str; 4] = ["sum", "contains", "indexOf", "reversed"];

const MAZE_PRELUDE: &str = "\
def moveForward():
    move(\"forward\")

def moveBackward():
    move(\"backward\")

def turnLeft():
    turn(\"left\")

def turnRight():
    turn(\"right\")
";

const TURTLE_PRELUDE: &str = "\
def forward(distance):
    move(\"forward\", distance)

def backward(distance):
    move(\"backward\", distance)

def left(degrees):
    turn(\"left\", degrees)

def right(degrees):
    turn(\"right\", degrees)

def penUp():
    pen(\"up\")

def penDown():
    pen(\"down\")
";

/// A level-defined verb written in the language itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

impl CustomCommand {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params,
            body: body.into(),
        }
    }

    /// Parses the command on its own so a broken body is reported against
    /// the command rather than the program it is later spliced in front of.
    /// Lines count from the first body line; 0 is the `def` header.
    pub fn validate(&self) -> Result<(), SyntaxError> {
        parse(&self.to_source()).map(|_| ()).map_err(|error| {
            SyntaxError::new(
                format!("in custom command '{}': {}", self.name, error.message),
                error.line.saturating_sub(1),
                error.column,
            )
        })
    }

    fn to_source(&self) -> String {
        let mut source = format!("def {}({}):\n", self.name, self.params.join(", "));
        let mut wrote_body = false;
        for line in self.body.lines() {
            if line.trim().is_empty() {
                source.push('\n');
                continue;
            }
            source.push_str("    ");
            source.push_str(line);
            source.push('\n');
            wrote_body = true;
        }
        if !wrote_body {
            source.push_str("    pass\n");
        }
        source
    }
}

/// Library text to splice before user code, plus how many lines it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub source: String,
    pub lines: usize,
}

/// Builds the prefix, leaving out any definition whose name is in `shadowed`
/// so user functions replace library ones instead of colliding with them.
pub fn build_prefix(
    game: Option<GameType>,
    custom_commands: &[CustomCommand],
    shadowed: &FxHashSet<String>,
) -> Prefix {
    let mut source = String::new();
    let mut chunks = vec![LIBRARY];
    match game {
        Some(GameType::Maze) => chunks.push(MAZE_PRELUDE),
        Some(GameType::Turtle) => chunks.push(TURTLE_PRELUDE),
        None => {}
    }
    for chunk in chunks {
        for definition in chunk.split("\n\n") {
            if !shadowed.contains(defined_name(definition)) {
                source.push_str(definition.trim_end());
                source.push('\n');
            }
        }
    }
    for command in custom_commands {
        if !shadowed.contains(&command.name) {
            source.push_str(&command.to_source());
        }
    }
    let lines = source.lines().count();
    Prefix { source, lines }
}

fn defined_name(definition: &str) -> &str {
    definition
        .trim_start()
        .strip_prefix("def ")
        .and_then(|rest| rest.split('(').next())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{CustomCommand, build_prefix};
    use crate::blocks::GameType;
    use crate::parser::parse;
    use rustc_hash::FxHashSet;

    #[test]
    fn prefix_parses_and_counts_its_lines() {
        let prefix = build_prefix(Some(GameType::Turtle), &[], &FxHashSet::default());
        let program = parse(&prefix.source).expect("library should parse");
        assert_eq!(prefix.lines, prefix.source.matches('\n').count());
        assert!(program.statements.len() >= 10);
    }

    #[test]
    fn shadowed_names_are_left_out() {
        let shadowed = FxHashSet::from_iter(["sum".to_string(), "turnLeft".to_string()]);
        let prefix = build_prefix(Some(GameType::Maze), &[], &shadowed);
        assert!(!prefix.source.contains("def sum("));
        assert!(!prefix.source.contains("def turnLeft("));
        assert!(prefix.source.contains("def turnRight("));
    }

    #[test]
    fn custom_commands_become_functions() {
        let command = CustomCommand::new(
            "zigzag",
            vec!["count".to_string()],
            "repeat count times:\n    move(\"forward\")\n    turn(\"left\")",
        );
        let prefix = build_prefix(None, &[command], &FxHashSet::default());
        assert!(prefix.source.ends_with(
            "def zigzag(count):\n    repeat count times:\n        move(\"forward\")\n        turn(\"left\")\n"
        ));
        parse(&prefix.source).expect("custom command should parse");

        let idle = CustomCommand::new("idle", Vec::new(), "");
        let empty = build_prefix(None, &[idle], &FxHashSet::default());
        assert!(empty.source.ends_with("def idle():\n    pass\n"));
    }

    #[test]
    fn broken_custom_command_names_itself() {
        let command = CustomCommand::new("spin", Vec::new(), "turn(\"left\")\nx = (");
        let error = command.validate().expect_err("unbalanced bracket");
        assert!(error.message.starts_with("in custom command 'spin': "));

        let command = CustomCommand::new("spin", Vec::new(), "turn(\"left\")\nx = 1 +\n");
        let error = command.validate().expect_err("missing operand");
        assert_eq!(error.line, 2);

        let fine = CustomCommand::new("spin", Vec::new(), "repeat 4 times:\n    turn(\"left\")");
        assert_eq!(fine.validate(), Ok(()));
    }
}
