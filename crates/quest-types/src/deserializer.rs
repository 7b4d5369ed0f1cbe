use crate::TypesError;
use alloy_primitives::{Address, U256};
use serde::{
    de::{self, Deserializer},
    Deserialize,
};
use serde_json::{Number, Value};

/// Largest integer a JSON float carries without losing precision.
const MAX_SAFE_FLOAT_INT: f64 = 9_007_199_254_740_991.0;

/// Parses a decimal or `0x` prefixed hex unsigned integer.
pub fn parse_quantity(value: &str) -> Result<U256, TypesError> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some("") => return Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None if trimmed.is_empty() => return Ok(U256::ZERO),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|_| TypesError::InvalidQuantity(value.to_string()))
}

/// Parses a hex address, ignoring checksum casing.
pub fn parse_address(value: &str) -> Result<Address, TypesError> {
    value
        .trim()
        .parse()
        .map_err(|_| TypesError::InvalidAddress(value.to_string()))
}

/// Lower-cased `0x` hex rendering used in messages and details.
pub fn lower_hex(address: &Address) -> String {
    format!("0x{}", alloy_primitives::hex::encode(address))
}

/// Integer held by a JSON number.
///
/// The number's own text is parsed first so integers wider than `u64` stay exact; integral
/// floats such as `21000.0` are accepted up to the largest exactly representable integer.
pub fn number_quantity(number: &Number) -> Result<U256, TypesError> {
    if let Ok(value) = parse_quantity(&number.to_string()) {
        return Ok(value);
    }
    match number.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= MAX_SAFE_FLOAT_INT => {
            Ok(U256::from(v as u64))
        }
        _ => Err(TypesError::InvalidQuantity(number.to_string())),
    }
}

/// Integer held by a JSON number, decimal string, hex string or boolean.
pub fn value_quantity(value: &Value) -> Result<U256, TypesError> {
    match value {
        Value::Number(n) => number_quantity(n),
        Value::String(s) => parse_quantity(s),
        Value::Bool(b) => Ok(U256::from(*b as u8)),
        other => Err(TypesError::InvalidQuantity(other.to_string())),
    }
}

/// Deserializes a [`U256`] from a JSON number, decimal string or hex string.
pub fn deserialize_quantity<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_quantity(&value).map_err(de::Error::custom)
}

fn narrow(value: U256) -> Result<u64, TypesError> {
    u64::try_from(value).map_err(|_| TypesError::QuantityOverflow(value.to_string()))
}

/// Same as [`deserialize_quantity`] but narrowed to `u64`.
pub fn deserialize_u64_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_quantity(deserializer)?;
    narrow(value).map_err(de::Error::custom)
}

/// Optional `u64` quantity; `null` and the empty string read as `None`.
pub fn deserialize_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => value_quantity(&value)
            .and_then(narrow)
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Optional address; `null` and the empty string (contract creation) read as `None`.
pub fn deserialize_maybe_empty<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let string: Option<String> = Deserialize::deserialize(deserializer)?;
    match string.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_address(s).map(Some).map_err(de::Error::custom),
    }
}
