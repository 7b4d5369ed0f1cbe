use thiserror::Error;

/// Errors raised while decoding harness records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    /// Value is not a decimal or `0x` hex unsigned integer.
    #[error("invalid quantity: {0:?}")]
    InvalidQuantity(String),
    /// Integer does not fit into the target width.
    #[error("quantity out of range: {0}")]
    QuantityOverflow(String),
    /// Value is not a 20 byte hex address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    /// Unknown contract registry key.
    #[error("unknown contract key: {0:?}")]
    UnknownContractKey(String),
}
