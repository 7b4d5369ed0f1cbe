//! Typed access to generated task parameters.

use alloy_primitives::{Address, U256};
use quest_types::{number_quantity, parse_address, parse_quantity};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::{
    registry::TaskId,
    units::{parse_decimal, to_base_units},
    ValidatorError,
};

/// Generated parameters, keyword style.
pub type Params = Map<String, Value>;

/// Token decimals assumed when a task does not say.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Reads parameters for one task, turning absence into [`ValidatorError::MissingParam`].
#[derive(Clone, Copy, Debug)]
pub struct ParamReader<'a> {
    task: TaskId,
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    /// Reader over `params` on behalf of `task`.
    pub fn new(task: TaskId, params: &'a Params) -> Self {
        Self { task, params }
    }

    fn raw(&self, name: &'static str) -> Option<&'a Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    fn required(&self, name: &'static str) -> Result<&'a Value, ValidatorError> {
        self.raw(name).ok_or_else(|| ValidatorError::MissingParam {
            task: self.task.to_string(),
            param: name,
        })
    }

    fn invalid(&self, name: &str, reason: impl ToString) -> ValidatorError {
        ValidatorError::InvalidParam {
            task: self.task.to_string(),
            param: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether `name` was supplied.
    pub fn has(&self, name: &'static str) -> bool {
        self.raw(name).is_some()
    }

    /// Required address.
    pub fn address(&self, name: &'static str) -> Result<Address, ValidatorError> {
        self.parse_address(name, self.required(name)?)
    }

    /// Optional address.
    pub fn opt_address(&self, name: &'static str) -> Result<Option<Address>, ValidatorError> {
        self.raw(name).map(|v| self.parse_address(name, v)).transpose()
    }

    fn parse_address(&self, name: &str, value: &Value) -> Result<Address, ValidatorError> {
        let s = value
            .as_str()
            .ok_or_else(|| self.invalid(name, "expected an address string"))?;
        parse_address(s).map_err(|e| self.invalid(name, e))
    }

    /// Required human decimal, from a JSON number or string.
    pub fn decimal(&self, name: &'static str) -> Result<Decimal, ValidatorError> {
        self.parse_decimal(name, self.required(name)?)
    }

    /// Optional human decimal.
    pub fn opt_decimal(&self, name: &'static str) -> Result<Option<Decimal>, ValidatorError> {
        self.raw(name).map(|v| self.parse_decimal(name, v)).transpose()
    }

    fn parse_decimal(&self, name: &str, value: &Value) -> Result<Decimal, ValidatorError> {
        let text = match value {
            // `Number`'s display is the shortest round-trip form, so 0.1 stays "0.1".
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Err(self.invalid(name, "expected a number")),
        };
        parse_decimal(&text).map_err(|e| self.invalid(name, e))
    }

    /// Required human amount scaled to base units of a `decimals` token.
    pub fn amount(&self, name: &'static str, decimals: u8) -> Result<U256, ValidatorError> {
        let amount = self.decimal(name)?;
        to_base_units(amount, decimals).map_err(|e| self.invalid(name, e))
    }

    /// Token decimals, [`DEFAULT_DECIMALS`] when absent.
    pub fn decimals(&self, name: &'static str) -> Result<u8, ValidatorError> {
        let Some(value) = self.raw(name) else {
            return Ok(DEFAULT_DECIMALS);
        };
        let decimals = self.parse_uint(name, value)?;
        u8::try_from(decimals).map_err(|_| self.invalid(name, "decimals must fit in u8"))
    }

    /// Required unsigned integer such as a token id.
    pub fn uint(&self, name: &'static str) -> Result<U256, ValidatorError> {
        self.parse_uint(name, self.required(name)?)
    }

    fn parse_uint(&self, name: &str, value: &Value) -> Result<U256, ValidatorError> {
        match value {
            Value::Number(n) => {
                number_quantity(n).map_err(|_| self.invalid(name, "expected a non-negative integer"))
            }
            Value::String(s) => parse_quantity(s).map_err(|e| self.invalid(name, e)),
            _ => Err(self.invalid(name, "expected an integer")),
        }
    }

    /// Optional list of unsigned integers such as router amount quotes.
    pub fn opt_uints(&self, name: &'static str) -> Result<Option<Vec<U256>>, ValidatorError> {
        let Some(value) = self.raw(name) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(name, "expected a list of integers"))?;
        items
            .iter()
            .map(|item| self.parse_uint(name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Required string.
    pub fn string(&self, name: &'static str) -> Result<String, ValidatorError> {
        match self.required(name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(self.invalid(name, "expected a string")),
        }
    }

    /// Required flag; `"true"`/`"false"` strings are accepted.
    pub fn flag(&self, name: &'static str) -> Result<bool, ValidatorError> {
        match self.required(name)? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(self.invalid(name, "expected a boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reads_typed_values() {
        let p = params(json!({
            "token_address": "0x55D398326F99059FF775485246999027B3197955",
            "amount": 0.1,
            "token_decimals": 6,
            "token_id": "42",
            "approved": "true",
            "message": "gm"
        }));
        let r = ParamReader::new(TaskId::Erc20TransferFixed, &p);
        assert_eq!(
            r.address("token_address").unwrap(),
            "0x55d398326f99059ff775485246999027b3197955".parse::<Address>().unwrap()
        );
        assert_eq!(r.amount("amount", 18).unwrap(), U256::from(100_000_000_000_000_000u64));
        assert_eq!(r.decimals("token_decimals").unwrap(), 6);
        assert_eq!(r.decimals("token_in_decimals").unwrap(), DEFAULT_DECIMALS);
        assert_eq!(r.uint("token_id").unwrap(), U256::from(42u8));
        assert!(r.flag("approved").unwrap());
        assert_eq!(r.string("message").unwrap(), "gm");
        assert_eq!(r.opt_address("agent_address").unwrap(), None);
        assert_eq!(r.opt_uints("expected_amounts").unwrap(), None);
    }

    #[test]
    fn wide_integers_and_lists() {
        let p: Params = serde_json::from_str(
            r#"{"token_id": 25000000000000000000, "expected_amounts": [1000, "0x10", 25000000000000000000]}"#,
        )
        .unwrap();
        let r = ParamReader::new(TaskId::QuerySwapInputAmount, &p);
        let wide = U256::from(25_000_000_000_000_000_000u128);
        assert_eq!(r.uint("token_id").unwrap(), wide);
        assert_eq!(
            r.opt_uints("expected_amounts").unwrap(),
            Some(vec![U256::from(1000u64), U256::from(16u64), wide])
        );
    }

    #[test]
    fn missing_and_invalid() {
        let p = params(json!({"to_address": "not an address", "amount": null}));
        let r = ParamReader::new(TaskId::BnbTransferBasic, &p);
        assert_eq!(
            r.amount("amount", 18),
            Err(ValidatorError::MissingParam {
                task: "bnb_transfer_basic".into(),
                param: "amount"
            })
        );
        assert!(matches!(
            r.address("to_address"),
            Err(ValidatorError::InvalidParam { ref param, .. }) if param == "to_address"
        ));
    }
}
