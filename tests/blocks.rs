use blocklang::{
    Block, BlockExpr, BlockKind, GameType, NativeRegistry, Value, Vm, generate_code,
    generate_code_with_line_map, parse_code_to_blocks,
};
use indoc::indoc;
use test_log::test;

const MAZE_CORPUS: &[&str] = &[
    indoc! {r#"
        repeat 4 times:
            move("forward")
            turn("right")"#},
    indoc! {r#"
        steps = 0
        while not atGoal():
            if frontClear():
                move("forward")
            elif leftClear():
                turn("left")
            else:
                turn("right")
            steps = steps + 1"#},
    indoc! {r#"
        def zigzag(times):
            for i in range(0, times):
                if i % 2 == 0:
                    turn("left")
                else:
                    turn("right")
                move("forward")
            return times * 2
        zigzag(3)"#},
    indoc! {r#"
        path = ["left", "right"]
        path.append("left")
        path.insert(0, "right")
        path.pop()
        for direction in path:
            turn(direction)
        print(len(path))"#},
    indoc! {r#"
        info = {"name": "maze", "size": 5}
        total = (info["size"] + 1) * 2
        lucky = randint(1, total) > random()
        first = path[0]
        while true:
            pass"#},
    indoc! {r#"
        for i in range(10, 0, 2):
            if i > 4 and i < 8 or i == 10:
                continue
            break"#},
];

const TURTLE_CORPUS: &[&str] = &[
    indoc! {r#"
        pen("down")
        repeat 36 times:
            move("forward", 10)
            turn("right", 10)
        pen("up")"#},
    indoc! {r#"
        size = 20
        while isPenDown():
            move("backward", size - 5)
            size = size / 2"#},
];

fn assert_stable(source: &str, game: GameType) {
    let blocks = parse_code_to_blocks(source, game)
        .unwrap_or_else(|| panic!("{source:?} should have a block form"));
    let regenerated = generate_code(&blocks, game);
    assert_eq!(regenerated, source, "canonical source should survive a round trip");

    let reparsed = parse_code_to_blocks(&regenerated, game).expect("regenerated code parses");
    assert_eq!(generate_code(&reparsed, game), regenerated);
}

#[test]
fn canonical_maze_programs_round_trip() {
    for source in MAZE_CORPUS {
        assert_stable(source, GameType::Maze);
    }
}

#[test]
fn canonical_turtle_programs_round_trip() {
    for source in TURTLE_CORPUS {
        assert_stable(source, GameType::Turtle);
    }
}

#[test]
fn legacy_sources_converge_after_one_round_trip() {
    let maze = "moveForward()\nturnRight()\nif frontClear():\n    pass\nelse:\n    moveBackward()";
    let blocks = parse_code_to_blocks(maze, GameType::Maze).expect("legacy maze");
    let generated = generate_code(&blocks, GameType::Maze);
    assert_eq!(
        generated,
        indoc! {r#"
            move("forward")
            turn("right")
            if frontClear():
                pass
            else:
                move("backward")"#}
    );
    assert_stable(&generated, GameType::Maze);

    let turtle = "penDown()\nforward(50)\nleft(120)\nmove()";
    let blocks = parse_code_to_blocks(turtle, GameType::Turtle).expect("legacy turtle");
    let generated = generate_code(&blocks, GameType::Turtle);
    assert_eq!(
        generated,
        "pen(\"down\")\nmove(\"forward\", 50)\nturn(\"left\", 120)\nmove(\"forward\", 100)"
    );
    assert_stable(&generated, GameType::Turtle);
}

#[test]
fn repeat_block_generates_mapped_lines() {
    let blocks = vec![Block::new(
        "repeat-1",
        BlockKind::Repeat {
            count: BlockExpr::number(3.0),
            body: vec![Block::new(
                "move-1",
                BlockKind::Command {
                    verb: "move".to_string(),
                    args: vec![BlockExpr::text("forward")],
                },
            )],
        },
    )];
    let generated = generate_code_with_line_map(&blocks, GameType::Maze);
    assert_eq!(generated.code, "repeat 3 times:\n    move(\"forward\")");
    let mapped = generated
        .line_map
        .iter()
        .map(|(line, id)| (*line, id.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(mapped, vec![(1, "repeat-1"), (2, "move-1")]);
}

#[test]
fn editor_json_deserializes_into_blocks() {
    let json = r#"[
        {"id": "a", "type": "setVariable", "name": "n", "value": {"type": "number", "value": 2}},
        {"id": "b", "type": "if",
         "condition": {"type": "sensorCall", "name": "frontClear", "args": [], "negated": true},
         "thenBody": [{"id": "c", "type": "command", "verb": "turnLeft", "args": []}],
         "elseBody": null},
        {"id": "d", "type": "for", "variable": "i",
         "from": {"type": "number", "value": 0}, "to": {"type": "variable", "name": "n"},
         "step": null,
         "body": [{"id": "e", "type": "command", "verb": "move", "args": []}]}
    ]"#;
    let blocks: Vec<Block> = serde_json::from_str(json).expect("valid editor json");
    assert_eq!(blocks.len(), 3);
    assert_eq!(
        generate_code(&blocks, GameType::Maze),
        indoc! {r#"
            n = 2
            if not frontClear():
                turn("left")
            for i in range(0, n):
                move("forward")"#}
    );

    let serialized = serde_json::to_value(&blocks).expect("serialize");
    assert_eq!(serialized[1]["thenBody"][0]["type"], "command");
    let back: Vec<Block> = serde_json::from_value(serialized).expect("deserialize");
    assert_eq!(back, blocks);
}

#[test]
fn highlighted_lines_map_back_to_blocks() {
    let blocks = parse_code_to_blocks(
        indoc! {r#"
            repeat 2 times:
                if frontClear():
                    move("forward")
                turn("left")
            done = true"#},
        GameType::Maze,
    )
    .expect("convertible");
    let generated = generate_code_with_line_map(&blocks, GameType::Maze);

    let natives = NativeRegistry::new()
        .with_command("move", |_| Ok(()))
        .with_command("turn", |_| Ok(()))
        .with_sensor("frontClear", |_| Ok(Value::Boolean(true)));
    let mut vm = Vm::new(natives);
    vm.load_with_source(&generated.code).expect("generated code compiles");

    let mut highlighted = Vec::new();
    loop {
        let outcome = vm.step().expect("step");
        let line = outcome.highlight_line.expect("every step runs a statement");
        highlighted.push(generated.line_map[&line].clone());
        if outcome.done {
            break;
        }
    }
    assert_eq!(highlighted, vec!["b3", "b4", "b3", "b4", "b5"]);
}

#[test]
fn unsupported_source_has_no_block_form() {
    for source in [
        "arr[0] = 5",
        "x = null",
        "x = -y",
        "x = not ready",
        "x = str(5)",
        "keys = info.keys()",
        "print(1, 2)\nx = (",
    ] {
        assert_eq!(
            parse_code_to_blocks(source, GameType::Maze),
            None,
            "{source:?} should be rejected"
        );
    }
}
