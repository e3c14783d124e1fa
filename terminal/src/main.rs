use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;

use natlog::Engine;

/// Loads a .nl program and prints every answer to its query.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The program to run; its last clause is the query
    program: PathBuf,

    /// Stop after this many answers
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Print plain text without styling
    #[arg(long)]
    plain: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut engine = Engine::load(cli.program.clone())
        .with_context(|| format!("failed to load {}", cli.program.display()))?;

    let limit = cli.limit.unwrap_or(usize::MAX);
    let mut count = 0_usize;
    for answer in engine.answers().take(limit) {
        let answer = answer.context("query aborted")?;
        let line = answer.to_string();
        if cli.plain {
            println!("{line}");
        } else {
            println!("{}", line.green());
        }
        count += 1;
    }

    let summary = match count {
        0 => "no answers".to_string(),
        1 => "1 answer".to_string(),
        n => format!("{n} answers"),
    };
    if cli.plain {
        println!("{summary}");
    } else {
        println!("{}", summary.dark_grey());
    }

    Ok(())
}
