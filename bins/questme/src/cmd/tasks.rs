use clap::Parser;
use std::io::{self, Write};
use validator::{tasks, TaskCategory};

/// Error of the `tasks` subcommand.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Writing to stdout failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Serializing the listing failed.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// `tasks` subcommand
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Only list tasks of this category, e.g. `erc20` or `query`
    #[arg(short, long)]
    category: Option<String>,
    /// Print the listing as JSON
    #[arg(long)]
    json: bool,
}

impl Cmd {
    /// Runs `tasks` command.
    pub fn run(&self) -> Result<(), Error> {
        let selected = tasks()
            .filter(|info| self.category.as_deref().is_none_or(|c| matches(info.category, c)))
            .collect::<Vec<_>>();

        let mut out = io::stdout().lock();
        if self.json {
            serde_json::to_writer_pretty(&mut out, &selected)?;
            writeln!(out)?;
            return Ok(());
        }
        for info in &selected {
            writeln!(out, "{} [{}] pass: {}", info.id, info.category, info.pass_rule)?;
            for check in &info.checks {
                writeln!(out, "  {:>3}  {}", check.weight, check.name)?;
            }
        }
        Ok(())
    }
}

fn matches(category: TaskCategory, filter: &str) -> bool {
    category.to_string().eq_ignore_ascii_case(filter.trim())
}
