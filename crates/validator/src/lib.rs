//! Scoring of LLM generated BSC transactions against task semantics.
//!
//! A task id plus its generated parameters builds a [`Validator`]. The validator reads the
//! transaction, its receipt and the state snapshots taken around it, runs a fixed list of
//! weighted checks and returns a [`ValidationResult`] with a score out of 100 and feedback
//! text for the model.
//!
//! ```ignore
//! let validator = create_validator("bnb_transfer_basic", &params)?;
//! let result = validator.validate(&tx, &receipt, &before, &after);
//! println!("{}", result.feedback);
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod abi;
pub mod calldata;
pub mod composite;
pub mod engine;
mod error;
pub mod generator;
pub mod palette;
pub mod params;
pub mod registry;
pub mod result;
pub mod task;
pub mod units;
pub mod validators;

pub use composite::{CompositeDefinition, CompositeResult, CompositeValidator};
pub use engine::{Rules, Validator};
pub use error::ValidatorError;
pub use generator::ParameterGenerator;
pub use params::Params;
pub use registry::{create_validator, parse_task, tasks, TaskCategory, TaskId, TaskInfo};
pub use result::{Check, PassRule, ValidationResult, MAX_SCORE};
pub use task::{GeneratedTask, TaskSpec};

pub use quest_types as types;
