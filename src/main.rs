use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use blocklang::{Block, GameType, NativeRegistry, Vm, VmConfig, generate_code};
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut blocks_game: Option<GameType> = None;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after {arg}"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--blocks" | "-b" => {
                let game = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing game after {arg}"))?;
                blocks_game = Some(parse_game(&game)?);
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let mut config = match &config_path {
        Some(path) => VmConfig::from_path(path)?,
        None => VmConfig::default(),
    };
    if config.game.is_none() {
        config.game = blocks_game;
    }

    let input = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let source = match blocks_game {
        Some(game) => {
            let blocks: Vec<Block> =
                serde_json::from_str(&input).context("Parsing block tree JSON")?;
            let code = generate_code(&blocks, game);
            info!("generated {} lines from {} blocks", code.lines().count(), blocks.len());
            code
        }
        None => input,
    };

    let mut vm = Vm::with_config(logging_natives(config.game), config);
    vm.load_with_source(&source)?;

    let mut printed = 0;
    loop {
        let outcome = vm.step().context("Program failed")?;
        if let Some(line) = outcome.highlight_line {
            println!("[step {}] line {line}", vm.steps_taken());
        }
        for line in &vm.output()[printed..] {
            println!("{line}");
        }
        printed = vm.output().len();
        if outcome.done {
            break;
        }
    }

    let variables = vm.get_variables();
    println!(
        "{}",
        serde_json::to_string_pretty(&variables).context("Rendering variables")?
    );
    Ok(())
}

fn parse_game(name: &str) -> Result<GameType> {
    match name {
        "maze" => Ok(GameType::Maze),
        "turtle" => Ok(GameType::Turtle),
        other => bail!("Unknown game '{other}' (expected maze or turtle)"),
    }
}

/// Commands that only log; the CLI has no world to act on.
fn logging_natives(game: Option<GameType>) -> NativeRegistry {
    let mut natives = NativeRegistry::new();
    let Some(game) = game else {
        return natives;
    };
    for verb in game.command_verbs() {
        natives.register_command(verb, move |args| {
            let rendered = args.iter().map(|arg| arg.repr()).collect::<Vec<_>>();
            info!("{verb}({})", rendered.join(", "));
            Ok(())
        });
    }
    natives
}
