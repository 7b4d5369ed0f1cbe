mod runner;

pub use runner::{execute_case_file, find_all_json_tests, TestError as Error, TestErrorKind};

use clap::Parser;
use runner::{run, TestError};
use std::path::PathBuf;

/// `validate` subcommand
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Path to folder or file containing the cases
    ///
    /// If multiple paths are specified they will be run in sequence.
    ///
    /// Folders will be searched recursively for files with the extension `.json`.
    #[arg(required = true, num_args = 1..)]
    paths: Vec<PathBuf>,
    /// Run cases in a single thread
    #[arg(short = 's', long)]
    single_thread: bool,
    /// Print every validation result as a JSON line
    ///
    /// Implies `--single-thread`.
    #[arg(short = 'o', long)]
    json_outcome: bool,
    /// Keep going after a case failure
    #[arg(long, alias = "no-fail-fast")]
    keep_going: bool,
}

impl Cmd {
    /// Runs `validate` command.
    pub fn run(&self) -> Result<(), TestError> {
        for path in &self.paths {
            if !path.exists() {
                return Err(TestError {
                    name: "Path validation".to_string(),
                    path: path.display().to_string(),
                    kind: TestErrorKind::InvalidPath,
                });
            }

            let case_files = find_all_json_tests(path);

            if case_files.is_empty() {
                return Err(TestError {
                    name: "Path validation".to_string(),
                    path: path.display().to_string(),
                    kind: TestErrorKind::NoJsonFiles,
                });
            }

            if !self.json_outcome {
                println!("\nReplaying cases in {}...", path.display());
            }
            run(case_files, self.single_thread, self.json_outcome, self.keep_going)?;
        }
        Ok(())
    }
}
