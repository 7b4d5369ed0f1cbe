use quest_types::{ContractKey, TypesError};
use thiserror::Error;

/// Errors raised while building validators or generating task parameters.
///
/// `validate` itself never fails; everything here happens before a transaction is judged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidatorError {
    /// No validator is registered under this task id.
    #[error("unknown task: {0:?}")]
    UnknownTask(String),
    /// A required parameter was not supplied.
    #[error("task {task}: missing required parameter {param:?}")]
    MissingParam {
        /// Task being constructed.
        task: String,
        /// Parameter name.
        param: &'static str,
    },
    /// A parameter was supplied with an unusable value.
    #[error("task {task}: invalid parameter {param:?}: {reason}")]
    InvalidParam {
        /// Task being constructed.
        task: String,
        /// Parameter name.
        param: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Human amount could not be scaled to base units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// Environment address required but not deployed.
    #[error("contract {0} is not registered")]
    MissingContract(ContractKey),
    /// Generation rule could not produce a value.
    #[error("cannot generate parameter {param:?}: {reason}")]
    Generation {
        /// Parameter name.
        param: String,
        /// What was wrong with the rule.
        reason: String,
    },
    /// Prompt still references a declared parameter after rendering.
    #[error("unresolved placeholder {{{0}}}")]
    UnresolvedPlaceholder(String),
    /// Malformed record value.
    #[error(transparent)]
    Types(#[from] TypesError),
}
