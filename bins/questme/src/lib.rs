//! `questme`: replay recorded validation cases, list tasks and generate task instances.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

// Only the binary target uses these.
use eyre as _;

pub mod cmd;
pub mod telemetry;
