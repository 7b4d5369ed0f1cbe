//! Input records for the BSC quest validation engine.
//!
//! Everything here is produced by the execution harness (transaction, receipt,
//! the two state snapshots, the deployed contract registry) and consumed as-is by
//! `bsc-quest-validator`. Deserialization is lenient about number and address
//! encodings since the harness forwards whatever the generated code returned.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod case;
mod contracts;
mod deserializer;
mod error;
mod query;
mod receipt;
mod state;
mod transaction;

pub use case::*;
pub use contracts::*;
pub use deserializer::*;
pub use error::*;
pub use query::*;
pub use receipt::*;
pub use state::*;
pub use transaction::*;

pub use alloy_primitives as primitives;
