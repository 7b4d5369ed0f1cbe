use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::deserializer::{deserialize_maybe_empty, deserialize_quantity, deserialize_u64_quantity};

/// Receipt status of a successful transaction.
pub const STATUS_SUCCESS: u64 = 1;

/// Execution outcome of the submitted transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// `1` on success, `0` on revert.
    #[serde(default, deserialize_with = "deserialize_u64_quantity")]
    pub status: u64,
    /// Gas consumed.
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub gas_used: U256,
    /// Price paid per unit of gas.
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub effective_gas_price: U256,
    /// Address of a deployed contract.
    #[serde(
        default,
        deserialize_with = "deserialize_maybe_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub contract_address: Option<Address>,
    /// Emitted logs.
    #[serde(default)]
    pub logs: Vec<Log>,
}

/// Single emitted log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics.
    #[serde(default)]
    pub topics: Vec<B256>,
    /// Non-indexed data.
    #[serde(default)]
    pub data: Bytes,
}

impl Receipt {
    /// Receipt of a successful transaction.
    pub fn success(gas_used: u64, effective_gas_price: u64) -> Self {
        Self {
            status: STATUS_SUCCESS,
            gas_used: U256::from(gas_used),
            effective_gas_price: U256::from(effective_gas_price),
            ..Default::default()
        }
    }

    /// Receipt of a reverted transaction.
    pub fn reverted(gas_used: u64) -> Self {
        Self {
            status: 0,
            gas_used: U256::from(gas_used),
            ..Default::default()
        }
    }

    /// Whether the transaction succeeded.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// `gas_used * effective_gas_price`, saturating.
    pub fn gas_cost(&self) -> U256 {
        self.gas_used.saturating_mul(self.effective_gas_price)
    }

    /// `gas_used` narrowed to `u64`, saturating.
    pub fn gas_used_u64(&self) -> u64 {
        u64::try_from(self.gas_used).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_receipt() {
        let receipt: Receipt = serde_json::from_str(
            r#"{
                "status": "0x1",
                "gasUsed": "0x5208",
                "effectiveGasPrice": "0x3b9aca00",
                "contractAddress": null,
                "logs": [{"address": "0x55d398326f99059fF775485246999027B3197955", "topics": []}]
            }"#,
        )
        .unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.gas_used_u64(), 21_000);
        assert_eq!(receipt.gas_cost(), U256::from(21_000_000_000_000u64));
        assert_eq!(receipt.logs.len(), 1);
    }

    #[test]
    fn failed_status() {
        let receipt: Receipt = serde_json::from_str(r#"{"status": 0}"#).unwrap();
        assert!(!receipt.is_success());
        assert_eq!(receipt.gas_cost(), U256::ZERO);
    }
}
