use anyhow::{anyhow, Context, Result};
use clap::Parser;

use rant_lib::core::Program;
use rant_lib::output::{Capitalization, FormatOptions, NumberFormat};
use rant_lib::rng::SeedPool;
use rant_lib::vm::RunOptions;
use rant_lib::{assembler, disasm, Engine};

use std::path::PathBuf;
use std::time::Duration;

mod repl;

/// number of seeds in a pool given with --pool
const POOL_SIZE: usize = 16;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// a pattern, or a compiled program with --compiled. Starts a repl when left out
    script: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// the script is a compiled program
    #[arg(short, long)]
    compiled: bool,

    /// save the compiled program to this file instead of running it
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// print the bytecode listing instead of running
    #[arg(short, long)]
    disassemble: bool,

    /// keep source positions in the bytecode, for runtime error locations
    #[arg(short = 'g', long)]
    debug: bool,

    /// a seed pool, given as name:seed
    #[arg(long, value_parser = parse_pool)]
    pool: Vec<(String, u64)>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    char_limit: Option<usize>,

    /// none, upper, lower, first, word or sentence
    #[arg(long, default_value = "none")]
    case: Capitalization,

    /// normal, group-commas or group-dots
    #[arg(long, default_value = "normal")]
    number_format: NumberFormat,

    /// print every channel, not only main
    #[arg(long)]
    channels: bool,

    #[cfg(feature = "dev")]
    #[arg(short = 't', long)]
    show_tokens: bool,

    #[cfg(feature = "dev")]
    #[arg(short = 'b', long)]
    show_byte_code: bool,
}

fn parse_pool(arg: &str) -> Result<(String, u64)> {
    let (name, seed) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("expected name:seed, got '{}'", arg))?;
    Ok((name.to_owned(), seed.parse()?))
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            format: FormatOptions {
                number_format: self.number_format,
                capitalization: self.case,
            },
            timeout: self.timeout_ms.map(Duration::from_millis),
            char_limit: self.char_limit,
            ..Default::default()
        }
    }

    fn engine(&self) -> Engine {
        let mut engine = Engine::new();
        for (name, seed) in &self.pool {
            engine.add_pool(name, SeedPool::new(*seed, POOL_SIZE));
        }
        engine
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("cli: {:?}", cli);
    let engine = cli.engine();

    let Some(script) = &cli.script else {
        return repl::run(&engine, cli.seed, &cli.run_options(), cli.debug);
    };

    let program = if cli.compiled {
        let bytes = std::fs::read(script).context(format!("reading {}", script.display()))?;
        engine.load(&bytes)?
    } else {
        let src = std::fs::read_to_string(script)
            .context(format!("reading {}", script.display()))?;

        #[cfg(feature = "dev")]
        if cli.show_tokens {
            for token in rant_lib::compiler::lexer::tokenize(&src) {
                println!("{:?}", token);
            }
            return Ok(());
        }

        let name = script
            .file_stem()
            .map_or("main".into(), |s| s.to_string_lossy());
        engine.compile(&name, &src, cli.debug)?
    };

    #[cfg(feature = "dev")]
    if cli.show_byte_code {
        dbg!(&program);
        return Ok(());
    }

    if cli.disassemble {
        print!("{}", disasm::disassemble(&program));
        return Ok(());
    }

    if let Some(path) = &cli.output {
        let bytes = assembler::save(&program)?;
        std::fs::write(path, bytes).context(format!("writing {}", path.display()))?;
        return Ok(());
    }

    run(&engine, &program, &cli)
}

fn run(engine: &Engine, program: &Program, cli: &Cli) -> Result<()> {
    match engine.run(program, cli.seed, &cli.run_options()) {
        Ok(output) if cli.channels => {
            for channel in output.channels() {
                println!("[{} ({})]\n{}", channel.name, channel.visibility, channel.text);
            }
            Ok(())
        }
        Ok(output) => {
            println!("{}", output.main());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
