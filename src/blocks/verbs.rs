//! Per-game verb vocabulary: unified verbs with their parameter defaults,
//! legacy aliases, and sensor names.

use crate::blocks::{BlockExpr, GameType};

#[derive(Debug, Clone, Copy)]
enum ParamDefault {
    Text(&'static str),
    Number(f64),
}

impl ParamDefault {
    fn to_expr(self) -> BlockExpr {
        match self {
            ParamDefault::Text(value) => BlockExpr::text(value),
            ParamDefault::Number(value) => BlockExpr::number(value),
        }
    }
}

struct Verb {
    name: &'static str,
    defaults: &'static [ParamDefault],
}

/// Pre-unification verb: `legacy(args..)` means `verb(fixed, args..)`.
/// Old single-purpose verb; `arity` matches its prelude definition.
struct LegacyVerb {
    legacy: &'static str,
    verb: &'static str,
    fixed: &'static str,
    arity: usize,
}

struct Vocabulary {
    verbs: &'static [Verb],
    legacy: &'static [LegacyVerb],
    sensors: &'static [&'static str],
}

const MAZE: Vocabulary = Vocabulary {
    verbs: &[
        Verb {
            name: "move",
            defaults: &[ParamDefault::Text("forward")],
        },
        Verb {
            name: "turn",
            defaults: &[ParamDefault::Text("left")],
        },
    ],
    legacy: &[
        LegacyVerb {
            legacy: "moveForward",
            verb: "move",
            fixed: "forward",
            arity: 0,
        },
        LegacyVerb {
            legacy: "moveBackward",
            verb: "move",
            fixed: "backward",
            arity: 0,
        },
        LegacyVerb {
            legacy: "turnLeft",
            verb: "turn",
            fixed: "left",
            arity: 0,
        },
        LegacyVerb {
            legacy: "turnRight",
            verb: "turn",
            fixed: "right",
            arity: 0,
        },
    ],
    sensors: &["frontClear", "leftClear", "rightClear", "atGoal"],
};

const TURTLE: Vocabulary = Vocabulary {
    verbs: &[
        Verb {
            name: "move",
            defaults: &[ParamDefault::Text("forward"), ParamDefault::Number(100.0)],
        },
        Verb {
            name: "turn",
            defaults: &[ParamDefault::Text("right"), ParamDefault::Number(90.0)],
        },
        Verb {
            name: "pen",
            defaults: &[ParamDefault::Text("down")],
        },
    ],
    legacy: &[
        LegacyVerb {
            legacy: "forward",
            verb: "move",
            fixed: "forward",
            arity: 1,
        },
        LegacyVerb {
            legacy: "backward",
            verb: "move",
            fixed: "backward",
            arity: 1,
        },
        LegacyVerb {
            legacy: "left",
            verb: "turn",
            fixed: "left",
            arity: 1,
        },
        LegacyVerb {
            legacy: "right",
            verb: "turn",
            fixed: "right",
            arity: 1,
        },
        LegacyVerb {
            legacy: "penUp",
            verb: "pen",
            fixed: "up",
            arity: 0,
        },
        LegacyVerb {
            legacy: "penDown",
            verb: "pen",
            fixed: "down",
            arity: 0,
        },
    ],
    sensors: &["isPenDown"],
};

fn vocabulary(game: GameType) -> &'static Vocabulary {
    match game {
        GameType::Maze => &MAZE,
        GameType::Turtle => &TURTLE,
    }
}

/// Rewrites a command call into its unified verb with every argument
/// explicit; `None` when `name` is not a game verb or has too many arguments.
pub(crate) fn normalize_command(
    game: GameType,
    name: &str,
    args: &[BlockExpr],
) -> Option<(&'static str, Vec<BlockExpr>)> {
    let vocabulary = vocabulary(game);
    let (verb_name, mut explicit) = match vocabulary.legacy.iter().find(|alias| alias.legacy == name)
    {
        Some(alias) if alias.arity != args.len() => return None,
        Some(alias) => {
            let mut explicit = vec![BlockExpr::text(alias.fixed)];
            explicit.extend(args.iter().cloned());
            (alias.verb, explicit)
        }
        None => (name, args.to_vec()),
    };
    let verb = vocabulary.verbs.iter().find(|verb| verb.name == verb_name)?;
    if explicit.len() > verb.defaults.len() {
        return None;
    }
    for default in &verb.defaults[explicit.len()..] {
        explicit.push(default.to_expr());
    }
    Some((verb.name, explicit))
}

pub(crate) fn is_sensor(game: GameType, name: &str) -> bool {
    vocabulary(game).sensors.contains(&name)
}

impl GameType {
    /// Unified command verbs a host must register for this game.
    pub fn command_verbs(self) -> Vec<&'static str> {
        vocabulary(self).verbs.iter().map(|verb| verb.name).collect()
    }

    pub fn sensors(self) -> &'static [&'static str] {
        vocabulary(self).sensors
    }
}

#[cfg(test)]
mod tests {
    use super::{is_sensor, normalize_command};
    use crate::blocks::{BlockExpr, GameType};

    #[test]
    fn legacy_maze_verbs_gain_a_direction() {
        assert_eq!(
            normalize_command(GameType::Maze, "turnRight", &[]),
            Some(("turn", vec![BlockExpr::text("right")]))
        );
        assert_eq!(
            normalize_command(GameType::Maze, "move", &[]),
            Some(("move", vec![BlockExpr::text("forward")]))
        );
    }

    #[test]
    fn turtle_verbs_fill_numeric_defaults() {
        assert_eq!(
            normalize_command(GameType::Turtle, "forward", &[BlockExpr::number(50.0)]),
            Some((
                "move",
                vec![BlockExpr::text("forward"), BlockExpr::number(50.0)]
            ))
        );
        assert_eq!(
            normalize_command(GameType::Turtle, "turn", &[BlockExpr::text("left")]),
            Some(("turn", vec![BlockExpr::text("left"), BlockExpr::number(90.0)]))
        );
        assert_eq!(
            normalize_command(
                GameType::Maze,
                "move",
                &[BlockExpr::text("forward"), BlockExpr::number(2.0)]
            ),
            None
        );
    }

    #[test]
    fn legacy_verbs_keep_their_prelude_arity() {
        assert_eq!(normalize_command(GameType::Turtle, "forward", &[]), None);
        assert_eq!(
            normalize_command(GameType::Turtle, "left", &[BlockExpr::number(1.0), BlockExpr::number(2.0)]),
            None
        );
        assert_eq!(
            normalize_command(GameType::Maze, "moveForward", &[BlockExpr::number(2.0)]),
            None
        );
        assert_eq!(
            normalize_command(GameType::Turtle, "penUp", &[]),
            Some(("pen", vec![BlockExpr::text("up")]))
        );
    }

    #[test]
    fn sensors_are_game_specific() {
        assert_eq!(GameType::Turtle.command_verbs(), vec!["move", "turn", "pen"]);
        assert!(is_sensor(GameType::Maze, "frontClear"));
        assert!(!is_sensor(GameType::Turtle, "frontClear"));
    }
}
