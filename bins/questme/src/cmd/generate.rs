use super::validate::find_all_json_tests;
use clap::Parser;
use quest_types::ContractRegistry;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use validator::{GeneratedTask, ParameterGenerator, TaskSpec, ValidatorError};

/// Error of the `generate` subcommand.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file could not be read.
    #[error("{path}: {source}")]
    Io {
        /// File being read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A file is not a task definition or registry.
    #[error("{path}: {source}")]
    Serde {
        /// File being parsed.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Generation failed for a task.
    #[error("task {task}: {source}")]
    Validator {
        /// Task id.
        task: String,
        /// Underlying error.
        source: ValidatorError,
    },
    /// Nothing to generate from.
    #[error("no task definitions found in {0}")]
    NoTaskFiles(String),
    /// `--task` named a task the definitions do not contain.
    #[error("no definition for task {0:?}")]
    UnknownTask(String),
}

/// A definition file holds one task or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecFile {
    One(Box<TaskSpec>),
    Many(Vec<TaskSpec>),
}

/// `generate` subcommand
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Task definition file, or folder searched recursively for `.json` definitions
    path: PathBuf,
    /// Only generate this task id
    #[arg(short, long)]
    task: Option<String>,
    /// Seed for reproducible parameters
    #[arg(long)]
    seed: Option<u64>,
    /// Deployed contract registry (JSON); placeholders are used without it
    #[arg(long)]
    env: Option<PathBuf>,
    /// Instances per task
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, s: &str) -> Result<T, Error> {
    serde_json::from_str(s).map_err(|source| Error::Serde {
        path: path.display().to_string(),
        source,
    })
}

/// Loads every task definition under `path`.
pub fn load_specs(path: &Path) -> Result<Vec<TaskSpec>, Error> {
    let mut specs = Vec::new();
    for file in find_all_json_tests(path) {
        match parse::<SpecFile>(&file, &read(&file)?)? {
            SpecFile::One(spec) => specs.push(*spec),
            SpecFile::Many(many) => specs.extend(many),
        }
    }
    if specs.is_empty() {
        return Err(Error::NoTaskFiles(path.display().to_string()));
    }
    Ok(specs)
}

impl Cmd {
    /// Runs `generate` command.
    pub fn run(&self) -> Result<(), Error> {
        let mut specs = load_specs(&self.path)?;
        if let Some(task) = &self.task {
            specs.retain(|spec| spec.id == *task);
            if specs.is_empty() {
                return Err(Error::UnknownTask(task.clone()));
            }
        }

        let env: Option<ContractRegistry> = match &self.env {
            Some(path) => Some(parse(path, &read(path)?)?),
            None => None,
        };
        let mut generator = match self.seed {
            Some(seed) => ParameterGenerator::new(seed),
            None => ParameterGenerator::from_entropy(),
        };
        info!(tasks = specs.len(), seed = ?self.seed, with_env = env.is_some(), "generating");

        for spec in specs {
            for _ in 0..self.count {
                let generated = generate_one(spec.clone(), &mut generator, env.as_ref())?;
                let line = json!({
                    "task": generated.spec.id,
                    "template_index": generated.template_index,
                    "prompt": generated.prompt,
                    "params": generated.params,
                    "requires_contract": generated.spec.requires_contract,
                });
                println!("{line}");
            }
        }
        Ok(())
    }
}

/// Draws one instance and checks its parameters build the task's validator.
fn generate_one(
    spec: TaskSpec,
    generator: &mut ParameterGenerator,
    env: Option<&ContractRegistry>,
) -> Result<GeneratedTask, Error> {
    let task = spec.id.clone();
    let wrap = |source| Error::Validator {
        task: task.clone(),
        source,
    };
    let generated = GeneratedTask::generate(spec, generator, env).map_err(wrap)?;
    generated.validator().map_err(wrap)?;
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/tasks")
    }

    #[test]
    fn loads_single_and_list_files() {
        let specs = load_specs(&definitions()).unwrap();
        let mut ids: Vec<_> = specs.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["bnb_transfer_basic", "contract_call_simple", "erc20_approve"]);
    }

    #[test]
    fn generated_params_build_validators() {
        let mut generator = ParameterGenerator::new(42);
        for spec in load_specs(&definitions()).unwrap() {
            let generated = generate_one(spec, &mut generator, None).unwrap();
            assert!(!generated.prompt.contains('{'), "{}", generated.prompt);
        }
    }

    #[test]
    fn seeded_generation_repeats() {
        let specs = load_specs(&definitions()).unwrap();
        let draw = |seed| {
            let mut generator = ParameterGenerator::new(seed);
            specs
                .iter()
                .map(|spec| generate_one(spec.clone(), &mut generator, None).unwrap().prompt)
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(9), draw(9));
    }
}
