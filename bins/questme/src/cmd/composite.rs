use super::validate::{Error as TestError, TestErrorKind};
use clap::Parser;
use quest_types::ValidationCase;
use std::path::{Path, PathBuf};
use validator::{CompositeDefinition, CompositeValidator};

/// `composite` subcommand
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Composite task definition
    definition: PathBuf,
    /// JSON array of recorded cases, one per atomic step in order
    cases: PathBuf,
    /// Exit with an error when the composite does not pass
    #[arg(long)]
    require_pass: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TestError> {
    let error = |kind: TestErrorKind| TestError {
        name: "Unknown".to_string(),
        path: path.display().to_string(),
        kind,
    };
    let s = std::fs::read_to_string(path).map_err(|e| error(e.into()))?;
    serde_json::from_str(&s).map_err(|e| error(e.into()))
}

impl Cmd {
    /// Runs `composite` command.
    pub fn run(&self) -> Result<(), TestError> {
        let definition: CompositeDefinition = read_json(&self.definition)?;
        let cases: Vec<ValidationCase> = read_json(&self.cases)?;

        let result = CompositeValidator::new(definition).validate(&cases);
        println!("{}", serde_json::to_string_pretty(&result).map_err(|e| TestError {
            name: result.composite_id.clone(),
            path: self.cases.display().to_string(),
            kind: e.into(),
        })?);

        if self.require_pass && !result.passed {
            return Err(TestError {
                name: result.composite_id.clone(),
                path: self.cases.display().to_string(),
                kind: TestErrorKind::UnexpectedOutcome {
                    expected_passed: Some(true),
                    got_passed: false,
                    expected_score: None,
                    got_score: result.score.round() as u32,
                    feedback: format!(
                        "{} of {} steps succeeded",
                        result.successful_operations(),
                        result.steps.len()
                    ),
                },
            });
        }
        Ok(())
    }
}
