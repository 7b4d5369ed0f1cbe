use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{Receipt, StateSnapshot, Transaction};

/// One recorded evaluation: the task, its generated parameters and everything the harness
/// observed around the submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCase {
    /// Free-form provenance, ignored by the validators.
    #[serde(default, rename = "_info", skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    /// Task identifier, e.g. `erc20_transfer_fixed`.
    pub task: String,
    /// Generated parameters, keyword style.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Submitted transaction.
    pub tx: Transaction,
    /// Execution receipt.
    #[serde(default)]
    pub receipt: Receipt,
    /// Snapshot taken before the transaction.
    #[serde(default)]
    pub state_before: StateSnapshot,
    /// Snapshot taken after the transaction.
    #[serde(default)]
    pub state_after: StateSnapshot,
    /// Outcome the replay must reproduce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expectation>,
}

/// Expected replay outcome; unset fields are not compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// Expected pass flag.
    #[serde(default)]
    pub passed: Option<bool>,
    /// Expected score out of 100.
    #[serde(default)]
    pub score: Option<u32>,
}

/// Named cases stored in one JSON file.
#[derive(Debug, PartialEq, Eq, Deserialize)]
pub struct CaseSuite(pub BTreeMap<String, ValidationCase>);
