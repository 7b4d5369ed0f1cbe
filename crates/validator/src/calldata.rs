//! Positional decoding of ABI call data.
//!
//! Arguments are read slot by slot after the selector. Dynamic types are not followed;
//! the few checks that need a string go through [`alloy_sol_types::SolCall::abi_decode`].

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Width of one ABI slot.
pub const WORD: usize = 32;

/// Call data could not be read at the requested position.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than four bytes.
    #[error("call data too short for a selector ({len} bytes)")]
    MissingSelector {
        /// Call data length.
        len: usize,
    },
    /// Slot `index` runs past the end of the call data.
    #[error("argument {index} out of bounds ({len} bytes of call data)")]
    MissingArgument {
        /// Zero based argument position.
        index: usize,
        /// Call data length.
        len: usize,
    },
}

/// Borrowed view over raw call data.
#[derive(Clone, Copy, Debug)]
pub struct CallData<'a> {
    data: &'a [u8],
}

impl<'a> CallData<'a> {
    /// Wraps `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether there is no call data at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First four bytes.
    pub fn selector(&self) -> Result<[u8; 4], DecodeError> {
        self.data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(DecodeError::MissingSelector {
                len: self.data.len(),
            })
    }

    /// Whether the selector is one of `accepted`.
    pub fn has_selector(&self, accepted: &[[u8; 4]]) -> bool {
        self.selector().is_ok_and(|s| accepted.contains(&s))
    }

    /// Slot `index` after the selector.
    pub fn word(&self, index: usize) -> Result<&'a [u8; WORD], DecodeError> {
        let start = 4 + index * WORD;
        self.data
            .get(start..start + WORD)
            .and_then(|s| s.try_into().ok())
            .ok_or(DecodeError::MissingArgument {
                index,
                len: self.data.len(),
            })
    }

    /// Slot `index` as a uint256.
    pub fn uint(&self, index: usize) -> Result<U256, DecodeError> {
        self.word(index).map(|w| U256::from_be_bytes(*w))
    }

    /// Slot `index` as an address, read from the low 20 bytes.
    pub fn address(&self, index: usize) -> Result<Address, DecodeError> {
        self.word(index).map(|w| Address::from_slice(&w[12..]))
    }

    /// Slot `index` as a bool, any non zero word being true.
    pub fn flag(&self, index: usize) -> Result<bool, DecodeError> {
        self.word(index).map(|w| w.iter().any(|b| *b != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{IERC20, IERC721};
    use alloy_primitives::{address, hex};
    use alloy_sol_types::SolCall;

    #[test]
    fn decodes_transfer() {
        let to = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let data = IERC20::transferCall {
            to,
            amount: U256::from(1_500_000u64),
        }
        .abi_encode();
        let call = CallData::new(&data);
        assert_eq!(call.selector(), Ok(hex!("a9059cbb")));
        assert_eq!(call.address(0), Ok(to));
        assert_eq!(call.uint(1), Ok(U256::from(1_500_000u64)));
        assert_eq!(
            call.uint(2),
            Err(DecodeError::MissingArgument { index: 2, len: 68 })
        );
    }

    #[test]
    fn decodes_flag() {
        let data = IERC721::setApprovalForAllCall {
            operator: Address::repeat_byte(0x11),
            approved: true,
        }
        .abi_encode();
        assert_eq!(CallData::new(&data).flag(1), Ok(true));
    }

    #[test]
    fn short_input() {
        assert_eq!(
            CallData::new(&[0xa9, 0x05]).selector(),
            Err(DecodeError::MissingSelector { len: 2 })
        );
        let mut data = hex!("a9059cbb").to_vec();
        data.extend([0xff; 32]);
        assert_eq!(
            CallData::new(&data).address(0),
            Ok(Address::repeat_byte(0xff))
        );
        assert!(!CallData::new(&[]).has_selector(&[hex!("a9059cbb")]));
    }
}
