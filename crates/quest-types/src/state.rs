use alloy_primitives::{Address, U256};
use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::{borrow::Cow, collections::BTreeMap};

use crate::deserializer::{lower_hex, number_quantity, parse_address, parse_quantity};

/// Field names read by the state snapshot collaborator.
pub mod fields {
    /// Native balance of the agent.
    pub const BALANCE: &str = "balance";
    /// ERC20 allowance granted by the agent.
    pub const ALLOWANCE: &str = "allowance";
    /// Agent balance of the task token.
    pub const TOKEN_BALANCE: &str = "token_balance";
    /// Counterparty balance of the task token.
    pub const TARGET_TOKEN_BALANCE: &str = "target_token_balance";
    /// Native balance of the target address.
    pub const TARGET_BALANCE: &str = "target_balance";
    /// Code size at the destination.
    pub const CONTRACT_CODE_SIZE: &str = "contract_code_size";
    /// ERC721 owner of the task token id.
    pub const NFT_OWNER: &str = "nft_owner";
    /// ERC721 approved address of the task token id.
    pub const NFT_APPROVED: &str = "nft_approved";
    /// ERC721 operator approval flag.
    pub const IS_APPROVED_FOR_ALL: &str = "is_approved_for_all";
    /// ERC721 token count held by the queried owner.
    pub const NFT_BALANCE: &str = "nft_balance";
    /// ERC1155 balance of the agent.
    pub const ERC1155_BALANCE: &str = "erc1155_balance";
    /// ERC1155 balance of the recipient.
    pub const TARGET_ERC1155_BALANCE: &str = "target_erc1155_balance";
    /// `SimpleCounter.counter`.
    pub const COUNTER_VALUE: &str = "counter_value";
    /// `MessageBoard.message`.
    pub const MESSAGE_VALUE: &str = "message_value";
    /// Proxy storage slot written through delegate call.
    pub const PROXY_VALUE: &str = "proxy_value";
    /// Implementation storage slot that must stay untouched.
    pub const IMPLEMENTATION_VALUE: &str = "implementation_value";
    /// LP token balance of the agent.
    pub const LP_TOKEN_BALANCE: &str = "lp_token_balance";
    /// LP token allowance granted to the router or pool.
    pub const LP_ALLOWANCE: &str = "lp_allowance";
    /// Agent balance of the second pair token.
    pub const TOKEN_B_BALANCE: &str = "token_b_balance";
    /// Allowance of the second pair token.
    pub const TOKEN_B_ALLOWANCE: &str = "token_b_allowance";
    /// Amount staked in the pool.
    pub const STAKED_AMOUNT: &str = "staked_amount";
    /// Rewards claimable from the pool.
    pub const PENDING_REWARDS: &str = "pending_rewards";
    /// ERC20 total supply.
    pub const TOKEN_TOTAL_SUPPLY: &str = "token_total_supply";
    /// Nonce observed by the harness.
    pub const REFERENCE_NONCE: &str = "reference_nonce";
    /// Block height observed by the harness.
    pub const REFERENCE_BLOCK_NUMBER: &str = "reference_block_number";
    /// EIP-1559 fee cap observed by the harness.
    pub const REFERENCE_MAX_FEE_PER_GAS: &str = "reference_max_fee_per_gas";
    /// EIP-1559 tip observed by the harness.
    pub const REFERENCE_MAX_PRIORITY_FEE_PER_GAS: &str = "reference_max_priority_fee_per_gas";
    /// ERC721 approved address, as read for approval queries.
    pub const APPROVED_ADDRESS: &str = "approved_address";
    /// ERC721 `tokenURI` of the task token id.
    pub const TOKEN_URI: &str = "token_uri";
    /// ERC20 `name()`.
    pub const TOKEN_NAME: &str = "token_name";
    /// ERC20 `symbol()`.
    pub const TOKEN_SYMBOL: &str = "token_symbol";
    /// ERC20 `decimals()`.
    pub const TOKEN_DECIMALS: &str = "token_decimals";
    /// Pair `getReserves()` first reserve.
    pub const RESERVE0: &str = "reserve0";
    /// Pair `getReserves()` second reserve.
    pub const RESERVE1: &str = "reserve1";
    /// Pair `getReserves()` timestamp.
    pub const BLOCK_TIMESTAMP_LAST: &str = "blockTimestampLast";
    /// Router `getAmountsOut`/`getAmountsIn` result along the task path.
    pub const EXPECTED_AMOUNTS: &str = "expected_amounts";
}

/// Single observed on-chain quantity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValue {
    /// Balances, allowances, storage words.
    Uint(U256),
    /// Owners and approved operators.
    Address(Address),
    /// Approval flags.
    Bool(bool),
    /// String storage, kept verbatim.
    Text(String),
    /// Arrays such as router amount quotes.
    List(Vec<StateValue>),
}

impl StateValue {
    /// Numeric view; non numeric values read as zero.
    pub fn as_uint(&self) -> U256 {
        match self {
            Self::Uint(v) => *v,
            Self::Bool(b) => U256::from(*b as u8),
            Self::Text(s) => parse_quantity(s).unwrap_or_default(),
            Self::Address(_) | Self::List(_) => U256::ZERO,
        }
    }

    /// Address view; non address values read as the zero address.
    pub fn as_address(&self) -> Address {
        match self {
            Self::Address(a) => *a,
            Self::Text(s) => parse_address(s).unwrap_or_default(),
            Self::Uint(_) | Self::Bool(_) | Self::List(_) => Address::ZERO,
        }
    }

    /// Boolean view; a nonzero number counts as true.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Uint(v) => !v.is_zero(),
            Self::Text(s) => s.eq_ignore_ascii_case("true"),
            Self::Address(a) => !a.is_zero(),
            Self::List(items) => !items.is_empty(),
        }
    }

    /// Textual view.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Uint(v) => Cow::Owned(v.to_string()),
            Self::Address(a) => Cow::Owned(lower_hex(a)),
            Self::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::List(items) => Cow::Owned(format!(
                "[{}]",
                items.iter().map(|item| item.as_text().into_owned()).collect::<Vec<_>>().join(", ")
            )),
        }
    }

    /// Numeric view of every list item; a scalar reads as a one item list.
    pub fn as_uints(&self) -> Vec<U256> {
        match self {
            Self::List(items) => items.iter().map(Self::as_uint).collect(),
            other => vec![other.as_uint()],
        }
    }
}

impl From<U256> for StateValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for StateValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<Address> for StateValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<U256>> for StateValue {
    fn from(values: Vec<U256>) -> Self {
        Self::List(values.into_iter().map(Self::Uint).collect())
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Decimal strings keep 18 decimal balances exact in JSON.
            Self::Uint(v) => serializer.serialize_str(&v.to_string()),
            Self::Address(a) => serializer.serialize_str(&lower_hex(a)),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::from_number(&n),
            Value::String(s) => Self::Text(s),
            Value::Null => Self::Text(String::new()),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            other @ Value::Object(_) => Self::Text(other.to_string()),
        }
    }
}

impl StateValue {
    fn from_number(n: &Number) -> Self {
        match number_quantity(n) {
            Ok(v) => Self::Uint(v),
            // Negative readings are meaningless on chain.
            Err(_) if n.to_string().starts_with('-') => Self::Uint(U256::ZERO),
            Err(_) => Self::Text(n.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Mapping from semantic field name to observed value, captured either side of the transaction.
///
/// Absent keys read as zero, the zero address, `false` or the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot(pub BTreeMap<String, StateValue>);

impl StateSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style insert.
    pub fn with(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<StateValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Raw value, if observed.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.0.get(key)
    }

    /// Whether `key` was observed.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Numeric reading, zero when absent.
    pub fn uint(&self, key: &str) -> U256 {
        self.get(key).map(StateValue::as_uint).unwrap_or_default()
    }

    /// Address reading, zero address when absent.
    pub fn address(&self, key: &str) -> Address {
        self.get(key).map(StateValue::as_address).unwrap_or_default()
    }

    /// Flag reading, `false` when absent.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(StateValue::as_bool)
    }

    /// Numeric list reading, empty when absent.
    pub fn uints(&self, key: &str) -> Vec<U256> {
        self.get(key).map(StateValue::as_uints).unwrap_or_default()
    }

    /// Text reading, empty when absent.
    pub fn text(&self, key: &str) -> Cow<'_, str> {
        self.get(key).map(StateValue::as_text).unwrap_or_default()
    }

    /// Iterates observed keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<StateValue>> FromIterator<(K, V)> for StateSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
