use anyhow::Result;
use rustyline::{error::ReadlineError, DefaultEditor};

use rant_lib::disasm;
use rant_lib::vm::RunOptions;
use rant_lib::Engine;

enum Command {
    Run(String),
    Seed(u64),
    Disassemble(String),
    Help,
    Quit,
}

const HELP: &str = "\
Enter a pattern to run it. Every run uses the next seed.
  :seed <n>      continue with seed n
  :dis <pattern> show the bytecode of a pattern
  :q             quit";

pub fn run(engine: &Engine, mut seed: u64, options: &RunOptions, debug: bool) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    loop {
        let cmd = match read_line(&mut rl)? {
            Some(cmd) => cmd,
            None => continue,
        };
        match cmd {
            Command::Quit => return Ok(()),
            Command::Help => println!("{}", HELP),
            Command::Seed(n) => seed = n,
            Command::Disassemble(src) => match engine.compile("repl", &src, debug) {
                Ok(program) => print!("{}", disasm::disassemble(&program)),
                Err(e) => eprintln!("{}", e),
            },
            Command::Run(src) => {
                match engine.compile("repl", &src, debug) {
                    Ok(program) => match engine.run(&program, seed, options) {
                        Ok(output) => println!("{}", output.main()),
                        Err(e) => eprintln!("{}", e),
                    },
                    Err(e) => eprintln!("{}", e),
                }
                seed = seed.wrapping_add(1);
            }
        }
    }
}

/// None for lines that aren't a command
fn read_line(rl: &mut DefaultEditor) -> Result<Option<Command>> {
    let line = rl.readline(">> ");
    use ReadlineError::*;
    match line {
        Ok(line) => {
            if !line.trim().is_empty() {
                let _ = rl.add_history_entry(line.as_str());
            }
            match parse_line(&line) {
                Ok(cmd) => Ok(cmd),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    Ok(None)
                }
            }
        }
        Err(Interrupted | Eof) => Ok(Some(Command::Quit)),
        Err(other) => Err(other.into()),
    }
}

fn parse_line(line: &str) -> Result<Option<Command>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Ok(Some(Command::Run(line.to_owned())));
    };
    let (cmd, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    Ok(Some(match cmd {
        "q" | "quit" => Command::Quit,
        "h" | "help" => Command::Help,
        "seed" => Command::Seed(arg.trim().parse()?),
        "dis" => Command::Disassemble(arg.to_owned()),
        _ => anyhow::bail!("unknown command ':{}', try :help", cmd),
    }))
}
