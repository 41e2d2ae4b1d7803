//! relbase - SQL command loop over the relbase storage engine
//!
//! Reads statements from stdin (with a prompt) or from a script file and
//! executes them against table files in the data directory.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod exec;
mod sql;

use exec::SqlEngine;
use sql::Statement;

/// relbase - minimal relational engine over integer primary keys
#[derive(Parser, Debug)]
#[command(name = "relbase")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding table (.tbl) and index (.idx) files
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Script of statements to run instead of reading stdin
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = args.log_level.parse::<Level>().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let engine = SqlEngine::new(args.data_dir.clone());
    match &args.script {
        Some(path) => run_script(&engine, path),
        None => run_repl(&engine),
    }
}

/// Execute a statement script; the first failure aborts with its error.
fn run_script(engine: &SqlEngine, path: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("could not open script {}", path.display()))?;

    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match sql::parse(trimmed).map_err(anyhow::Error::from)? {
            Statement::Quit => break,
            stmt => engine
                .execute(stmt)
                .with_context(|| format!("statement failed: {trimmed}"))?,
        }
    }
    Ok(())
}

/// Interactive loop: prompt, parse, execute, report; errors do not end the
/// session.
fn run_repl(engine: &SqlEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        write!(stdout, "relbase> ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match sql::parse(trimmed) {
            Ok(Statement::Quit) => break,
            Ok(stmt) => {
                if let Err(e) = engine.execute(stmt) {
                    eprintln!("error: {e:#}");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
