use indicatif::{ProgressBar, ProgressDrawTarget};
use quest_types::{CaseSuite, Expectation};
use serde_json::json;
use std::{
    io::stderr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::debug;
use validator::{create_validator, ValidationResult, ValidatorError};
use walkdir::{DirEntry, WalkDir};

/// Error that occurs while replaying a case
#[derive(Debug, Error)]
#[error("Path: {path}\nName: {name}\nError: {kind}")]
pub struct TestError {
    /// Case name inside the file.
    pub name: String,
    /// Case file.
    pub path: String,
    /// What went wrong.
    pub kind: TestErrorKind,
}

/// Specific kind of error that occurred while replaying a case
#[derive(Debug, Error)]
pub enum TestErrorKind {
    /// The replayed result differs from the recorded expectation.
    #[error(
        "unexpected outcome: got passed={got_passed} score={got_score}, \
         expected passed={expected_passed:?} score={expected_score:?}\n{feedback}"
    )]
    UnexpectedOutcome {
        /// Expected pass flag, if recorded.
        expected_passed: Option<bool>,
        /// Replayed pass flag.
        got_passed: bool,
        /// Expected score, if recorded.
        expected_score: Option<u32>,
        /// Replayed score.
        got_score: u32,
        /// Replayed feedback.
        feedback: String,
    },
    /// The validator could not be built from the case parameters.
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    /// The case file is not valid JSON or not a case suite.
    #[error(transparent)]
    SerdeDeserialize(#[from] serde_json::Error),
    /// The case file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A worker thread panicked.
    #[error("thread panicked")]
    Panic,
    /// The path does not exist.
    #[error("path does not exist")]
    InvalidPath,
    /// The path holds no case files.
    #[error("no JSON case files found in path")]
    NoJsonFiles,
}

/// Find all JSON case files in the given path
/// If path is a file, returns it in a vector
/// If path is a directory, recursively finds all .json files
pub fn find_all_json_tests(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        let mut files: Vec<_> = WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension() == Some("json".as_ref()))
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        files
    }
}

fn check_expectation(expect: &Expectation, result: &ValidationResult) -> Result<(), TestErrorKind> {
    let passed_ok = expect.passed.is_none_or(|passed| passed == result.passed);
    let score_ok = expect.score.is_none_or(|score| score == result.score);
    if passed_ok && score_ok {
        return Ok(());
    }
    Err(TestErrorKind::UnexpectedOutcome {
        expected_passed: expect.passed,
        got_passed: result.passed,
        expected_score: expect.score,
        got_score: result.score,
        feedback: result.feedback.clone(),
    })
}

/// Replays every case in the file at `path`.
///
/// Returns the number of cases replayed. The first failing case aborts the file.
pub fn execute_case_file(
    path: &Path,
    elapsed: &Mutex<Duration>,
    print_json_outcome: bool,
) -> Result<usize, TestError> {
    let display = path.to_string_lossy().into_owned();
    let error = |name: &str, kind: TestErrorKind| TestError {
        name: name.to_string(),
        path: display.clone(),
        kind,
    };

    let s = std::fs::read_to_string(path).map_err(|e| error("Unknown", e.into()))?;
    let suite: CaseSuite = serde_json::from_str(&s).map_err(|e| error("Unknown", e.into()))?;

    let mut replayed = 0;
    for (name, case) in &suite.0 {
        let validator =
            create_validator(&case.task, &case.params).map_err(|e| error(name, e.into()))?;

        let timer = Instant::now();
        let result = validator.validate(&case.tx, &case.receipt, &case.state_before, &case.state_after);
        *elapsed.lock().unwrap_or_else(PoisonError::into_inner) += timer.elapsed();
        debug!(case = %name, task = %case.task, score = result.score, passed = result.passed, "replayed");

        if print_json_outcome {
            let outcome = json!({
                "name": name,
                "path": display,
                "task": case.task,
                "result": result,
            });
            eprintln!("{outcome}");
        }

        if let Some(expect) = &case.expect {
            check_expectation(expect, &result).map_err(|kind| error(name, kind))?;
        }
        replayed += 1;
    }
    Ok(replayed)
}

#[derive(Clone, Copy)]
struct RunnerConfig {
    single_thread: bool,
    print_outcome: bool,
    keep_going: bool,
}

impl RunnerConfig {
    fn new(single_thread: bool, print_outcome: bool, keep_going: bool) -> Self {
        // Ordered output needs one worker.
        let single_thread = single_thread || print_outcome;
        Self {
            single_thread,
            print_outcome,
            keep_going,
        }
    }
}

#[derive(Clone)]
struct RunnerState {
    n_errors: Arc<AtomicUsize>,
    n_cases: Arc<AtomicUsize>,
    console_bar: Arc<ProgressBar>,
    queue: Arc<Mutex<(usize, Vec<PathBuf>)>>,
    elapsed: Arc<Mutex<Duration>>,
}

impl RunnerState {
    fn new(case_files: Vec<PathBuf>, print_outcome: bool) -> Self {
        let n_files = case_files.len();
        let target = if print_outcome {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        };
        Self {
            n_errors: Arc::new(AtomicUsize::new(0)),
            n_cases: Arc::new(AtomicUsize::new(0)),
            console_bar: Arc::new(ProgressBar::with_draw_target(Some(n_files as u64), target)),
            queue: Arc::new(Mutex::new((0usize, case_files))),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn next_file(&self) -> Option<PathBuf> {
        let (current_idx, queue) = &mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = *current_idx;
        let path = queue.get(idx).cloned()?;
        *current_idx = idx + 1;
        Some(path)
    }
}

fn run_worker(state: RunnerState, config: RunnerConfig) -> Result<(), TestError> {
    loop {
        if !config.keep_going && state.n_errors.load(Ordering::SeqCst) > 0 {
            return Ok(());
        }

        let Some(path) = state.next_file() else {
            return Ok(());
        };

        let result = execute_case_file(&path, &state.elapsed, config.print_outcome);

        state.console_bar.inc(1);

        match result {
            Ok(n) => {
                state.n_cases.fetch_add(n, Ordering::SeqCst);
            }
            Err(err) => {
                state.n_errors.fetch_add(1, Ordering::SeqCst);
                if !config.keep_going {
                    return Err(err);
                }
                state.console_bar.println(err.to_string());
            }
        }
    }
}

fn determine_thread_count(single_thread: bool, n_files: usize) -> usize {
    match (single_thread, std::thread::available_parallelism()) {
        (true, _) | (false, Err(_)) => 1,
        (false, Ok(n)) => n.get().min(n_files),
    }
}

/// Replay all case files in parallel or single-threaded mode
///
/// # Arguments
/// * `case_files` - List of case files to replay
/// * `single_thread` - Force single-threaded execution
/// * `print_outcome` - Print every result as a JSON line on stderr
/// * `keep_going` - Continue replaying even if some files fail
pub(crate) fn run(
    case_files: Vec<PathBuf>,
    single_thread: bool,
    print_outcome: bool,
    keep_going: bool,
) -> Result<(), TestError> {
    let config = RunnerConfig::new(single_thread, print_outcome, keep_going);
    let n_files = case_files.len();
    let state = RunnerState::new(case_files, config.print_outcome);
    let num_threads = determine_thread_count(config.single_thread, n_files);

    let mut handles = Vec::with_capacity(num_threads);
    for i in 0..num_threads {
        let state = state.clone();

        let thread = std::thread::Builder::new()
            .name(format!("runner-{i}"))
            .spawn(move || run_worker(state, config))
            .map_err(|e| TestError {
                name: format!("runner-{i}"),
                path: String::new(),
                kind: e.into(),
            })?;

        handles.push(thread);
    }

    let mut thread_errors = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => thread_errors.push(e),
            Err(_) => thread_errors.push(TestError {
                name: format!("thread {i} panicked"),
                path: String::new(),
                kind: TestErrorKind::Panic,
            }),
        }
    }

    state.console_bar.finish();

    let elapsed = *state.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
    let n_cases = state.n_cases.load(Ordering::SeqCst);
    let n_errors = state.n_errors.load(Ordering::SeqCst);
    if !config.print_outcome {
        println!(
            "Finished replay of {n_cases} cases. Total validation time: {:.6}s",
            elapsed.as_secs_f64()
        );
    }

    if n_errors == 0 && thread_errors.is_empty() {
        if !config.print_outcome {
            println!("All cases matched!");
        }
        return Ok(());
    }

    eprintln!("Encountered {n_errors} failing files out of {n_files} total");
    if thread_errors.is_empty() {
        std::process::exit(1);
    }
    if thread_errors.len() > 1 {
        eprintln!("{} threads returned an error, out of {num_threads} total:", thread_errors.len());
        for error in &thread_errors {
            eprintln!("{error}");
        }
    }
    Err(thread_errors.swap_remove(0))
}
