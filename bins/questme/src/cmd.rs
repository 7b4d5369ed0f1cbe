//! Subcommands.

pub mod composite;
pub mod generate;
pub mod tasks;
pub mod validate;

use clap::{Parser, Subcommand};

/// Command line of the `questme` binary.
#[derive(Parser, Debug)]
#[command(name = "questme", version, about, infer_subcommands = true)]
pub struct Cli {
    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: MainCmd,
}

/// `questme` subcommands.
#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum MainCmd {
    /// Replay recorded validation cases and compare against their expectations
    Validate(validate::Cmd),
    /// List registered tasks with their checks and pass rules
    Tasks(tasks::Cmd),
    /// Generate parameters and a prompt from task definitions
    Generate(generate::Cmd),
    /// Score a composite task from its recorded steps
    Composite(composite::Cmd),
}

/// Error of any subcommand.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Case replay failed.
    #[error(transparent)]
    Validate(#[from] validate::Error),
    /// Task generation failed.
    #[error(transparent)]
    Generate(#[from] generate::Error),
    /// Listing failed.
    #[error(transparent)]
    Tasks(#[from] tasks::Error),
}

impl MainCmd {
    /// Runs the selected subcommand.
    pub fn run(&self) -> Result<(), Error> {
        match self {
            Self::Validate(cmd) => cmd.run().map_err(Into::into),
            Self::Tasks(cmd) => cmd.run().map_err(Into::into),
            Self::Generate(cmd) => cmd.run().map_err(Into::into),
            Self::Composite(cmd) => cmd.run().map_err(Into::into),
        }
    }
}
