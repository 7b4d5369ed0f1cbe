use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{
    deserializer::{deserialize_maybe_empty, deserialize_opt_u64, deserialize_quantity},
    QueryResult,
};

/// Transaction as submitted by the generated code.
///
/// Never constructed by the validators; every field may hold anything the model emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Destination, `None` for contract creation.
    #[serde(default, deserialize_with = "deserialize_maybe_empty")]
    pub to: Option<Address>,
    /// Sender, when the harness forwards it.
    #[serde(
        default,
        deserialize_with = "deserialize_maybe_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub from: Option<Address>,
    /// Native value in wei.
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub value: U256,
    /// Call data: selector followed by ABI encoded arguments.
    #[serde(default, alias = "input")]
    pub data: Bytes,
    /// Gas limit; ethers style `gasLimit` is accepted as well.
    #[serde(default, alias = "gasLimit", deserialize_with = "deserialize_opt_u64")]
    pub gas: Option<u64>,
    /// Read-only answer for query tasks.
    #[serde(
        default,
        rename = "query_result",
        alias = "queryResult",
        skip_serializing_if = "Option::is_none"
    )]
    pub query_result: Option<QueryResult>,
}

impl Transaction {
    /// First four bytes of call data.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).and_then(|s| s.try_into().ok())
    }

    /// Call data as it would be printed by a client, `0x` prefixed lower-case hex.
    pub fn data_hex(&self) -> String {
        format!("0x{}", alloy_primitives::hex::encode(&self.data))
    }

    /// Whether the transaction targets `address`.
    pub fn is_to(&self, address: &Address) -> bool {
        self.to.as_ref() == Some(address)
    }
}
