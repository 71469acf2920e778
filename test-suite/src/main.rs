use anyhow::{anyhow, Context, Result};
use glob::glob;
use std::result::Result as StdResult;

use std::fs;
use std::path::Path;
use std::process::Command;

const RANT: &str = "../target/release/rant";

fn main() -> Result<()> {
    compile_rant().context("compiling interpreter")?;

    let patterns: Vec<_> = glob("tests/*.rant")?.collect::<StdResult<_, _>>()?;
    let mut failed = 0;
    for pattern in &patterns {
        let expected_output = pattern.with_extension("out");
        let expected_output = fs::read_to_string(&expected_output)
            .context(format!("loading expected output: {}", expected_output.display()))?;
        let output = run_pattern(pattern)?;
        if output == expected_output {
            println!("{}: passed", pattern.display());
        } else {
            failed += 1;
            println!(
                "{}: failed\nexpected output:\n{}\nactual output:\n{}",
                pattern.display(),
                expected_output,
                output
            );
        }
    }
    println!("{} of {} passed", patterns.len() - failed, patterns.len());
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs a pattern with seed 0. A first line of the form `# args: ...` passes extra arguments
/// to the interpreter, the line itself is not part of the pattern.
fn run_pattern(pattern: &Path) -> Result<String> {
    let src = fs::read_to_string(pattern)?;
    let mut cmd = Command::new(RANT);
    let (args, body) = match src.split_once('\n') {
        Some((first, rest)) if first.starts_with("# args:") => (Some(first), rest),
        _ => (None, src.as_str()),
    };
    if let Some(args) = args {
        cmd.args(args["# args:".len()..].split_whitespace());
    }
    let dir = std::env::temp_dir().join(format!("rant-test-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let script = dir.join(pattern.file_name().unwrap_or_default());
    fs::write(&script, body)?;
    let output = cmd
        .arg("--seed")
        .arg("0")
        .arg(&script)
        .output()
        .context(format!("running pattern {}", pattern.display()))?;
    let _ = fs::remove_file(&script);
    let mut text = String::from_utf8(output.stdout)?;
    text.push_str(&String::from_utf8(output.stderr)?);
    Ok(text)
}

fn compile_rant() -> Result<()> {
    let st = Command::new("cargo")
        .args(["build", "--release", "-p", "rant"])
        .current_dir("..")
        .status()?;
    if st.success() {
        Ok(())
    } else {
        Err(anyhow!("compiling the interpreter failed"))
    }
}
