//! Seeded parameter generation.

use alloy_primitives::Address;
use quest_types::{ContractKey, ContractRegistry};
use rand::{rngs::StdRng, seq::IndexedRandom, Rng, SeedableRng};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::{
    params::Params,
    registry::RequireContract,
    task::{GenerationRule, ParamSchema, ParamType, TaskSpec},
    units::parse_decimal,
    ValidatorError,
};

const DEFAULT_NUMBER_MIN: &str = "0.001";
const DEFAULT_NUMBER_MAX: &str = "1";
const DEFAULT_NUMBER_DECIMALS: u32 = 3;
const DEFAULT_INTEGER_MIN: i64 = 1;
const DEFAULT_INTEGER_MAX: i64 = 100;
const DEFAULT_STRING_LENGTH: usize = 10;

/// Resolution of the uniform fraction used for random numbers.
const FRACTION_SCALE: u32 = 9;

const ALPHA: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";

/// Draws task parameters from a seeded generator; equal seeds give equal parameters.
#[derive(Clone, Debug)]
pub struct ParameterGenerator {
    rng: StdRng,
}

impl ParameterGenerator {
    /// Deterministic generator.
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Values for every declared parameter, in name order.
    ///
    /// Without `env`, environment parameters get placeholder addresses.
    pub fn generate(
        &mut self,
        spec: &TaskSpec,
        env: Option<&ContractRegistry>,
    ) -> Result<Params, ValidatorError> {
        let mut params = Params::new();
        for (name, schema) in &spec.parameters {
            let value = self.value(name, schema, env)?;
            params.insert(name.clone(), value);
        }
        debug!(task = %spec.id, count = params.len(), "generated parameters");
        Ok(params)
    }

    /// Re-derives only the environment parameters, leaving every other value untouched.
    pub fn regenerate_env(
        &mut self,
        spec: &TaskSpec,
        params: &mut Params,
        env: &ContractRegistry,
    ) -> Result<(), ValidatorError> {
        for (name, schema) in spec.env_parameters() {
            let value = self.value(name, schema, Some(env))?;
            params.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Index of a uniformly chosen prompt template.
    pub fn pick_template(&mut self, spec: &TaskSpec) -> Result<usize, ValidatorError> {
        match spec.natural_language_templates.len() {
            0 => Err(ValidatorError::Generation {
                param: "natural_language_templates".into(),
                reason: format!("task {} defines no templates", spec.id),
            }),
            n => Ok(self.rng.random_range(0..n)),
        }
    }

    fn value(
        &mut self,
        name: &str,
        schema: &ParamSchema,
        env: Option<&ContractRegistry>,
    ) -> Result<Value, ValidatorError> {
        let fail = |reason: String| ValidatorError::Generation { param: name.to_string(), reason };
        match &schema.generation {
            GenerationRule::Fixed { value } => Ok(value.clone()),
            GenerationRule::FromList { values } => values
                .choose(&mut self.rng)
                .cloned()
                .ok_or_else(|| fail("from_list requires at least one value".into())),
            GenerationRule::FromEnv { env_key } => match env {
                Some(env) => Ok(checksummed(env.require(*env_key)?)),
                None => Ok(self.placeholder(name, *env_key)),
            },
            GenerationRule::AgentAddress => match env.and_then(|e| e.get(ContractKey::TestAddress)) {
                Some(address) => Ok(checksummed(address)),
                None => Ok(self.placeholder(name, ContractKey::TestAddress)),
            },
            GenerationRule::Random { min, max, decimals, length, charset, probability } => {
                match schema.kind {
                    ParamType::Address => Ok(checksummed(self.address())),
                    ParamType::Number => {
                        let min = bound(min.as_ref(), DEFAULT_NUMBER_MIN).map_err(|e| fail(e.to_string()))?;
                        let max = bound(max.as_ref(), DEFAULT_NUMBER_MAX).map_err(|e| fail(e.to_string()))?;
                        let decimals = decimals.unwrap_or(DEFAULT_NUMBER_DECIMALS);
                        self.number(min, max, decimals).map_err(fail)
                    }
                    ParamType::Integer => {
                        let min = integer_bound(min.as_ref(), DEFAULT_INTEGER_MIN).map_err(fail)?;
                        let max = integer_bound(max.as_ref(), DEFAULT_INTEGER_MAX).map_err(fail)?;
                        if min > max {
                            return Err(fail(format!("empty range {min}..={max}")));
                        }
                        Ok(Value::from(self.rng.random_range(min..=max)))
                    }
                    ParamType::String => {
                        let chars = charset_chars(charset.as_deref().unwrap_or("alphanumeric"));
                        if chars.is_empty() {
                            return Err(fail("empty charset".into()));
                        }
                        let text: String = (0..length.unwrap_or(DEFAULT_STRING_LENGTH))
                            .map(|_| chars[self.rng.random_range(0..chars.len())])
                            .collect();
                        Ok(Value::String(text))
                    }
                    ParamType::Boolean => {
                        let p = probability.unwrap_or(0.5);
                        if !(0.0..=1.0).contains(&p) {
                            return Err(fail(format!("probability {p} outside [0, 1]")));
                        }
                        Ok(Value::Bool(self.rng.random_bool(p)))
                    }
                }
            }
        }
    }

    fn address(&mut self) -> Address {
        Address::from(self.rng.random::<[u8; 20]>())
    }

    fn placeholder(&mut self, name: &str, key: ContractKey) -> Value {
        warn!(param = name, env_key = %key, "environment not ready, using placeholder address");
        checksummed(self.address())
    }

    /// `min + (max - min) * r`, rounded half-up to `decimals` places.
    fn number(&mut self, min: Decimal, max: Decimal, decimals: u32) -> Result<Value, String> {
        if min > max {
            return Err(format!("empty range {min}..={max}"));
        }
        let fraction = Decimal::new(self.rng.random_range(0..10i64.pow(FRACTION_SCALE)), FRACTION_SCALE);
        let drawn = (min + (max - min) * fraction)
            .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
        drawn
            .to_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{drawn} is not representable as a JSON number"))
    }
}

fn checksummed(address: Address) -> Value {
    Value::String(address.to_checksum(None))
}

fn bound(value: Option<&Value>, default: &str) -> Result<Decimal, ValidatorError> {
    match value {
        None => parse_decimal(default),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_decimal(s),
        Some(other) => Err(ValidatorError::InvalidAmount(other.to_string())),
    }
}

fn integer_bound(value: Option<&Value>, default: i64) -> Result<i64, String> {
    match value {
        None => Ok(default),
        Some(v) => v.as_i64().ok_or_else(|| format!("integer bound expected, got {v}")),
    }
}

fn charset_chars(charset: &str) -> Vec<char> {
    let chars = match charset {
        "alphanumeric" => format!("{ALPHA}{DIGITS}"),
        "alphanumeric_space" => format!("{ALPHA}{DIGITS} "),
        "alpha" => ALPHA.to_string(),
        "numeric" => DIGITS.to_string(),
        literal => literal.to_string(),
    };
    chars.chars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    fn spec() -> TaskSpec {
        serde_json::from_value(json!({
            "id": "contract_call_simple",
            "difficulty": "basic",
            "natural_language_templates": ["Increment the counter at {contract_address}"],
            "requires_contract": true,
            "parameters": {
                "amount": {
                    "type": "number",
                    "generation": {"method": "random", "min": 0.01, "max": 0.02, "decimals": 4}
                },
                "contract_address": {
                    "type": "address",
                    "generation": {"method": "from_env", "env_key": "simple_counter_address"}
                },
                "count": {"type": "integer", "generation": {"method": "random", "min": 3, "max": 5}},
                "label": {"type": "string", "generation": {"method": "random", "length": 6, "charset": "numeric"}},
                "symbol": {"type": "string", "generation": {"method": "from_list", "values": ["USDT", "BUSD"]}},
                "flag": {"type": "boolean", "generation": {"method": "fixed", "value": true}}
            }
        }))
        .unwrap()
    }

    const COUNTER: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

    #[test]
    fn same_seed_same_params() {
        let env = ContractRegistry::default().with(ContractKey::SimpleCounter, COUNTER);
        let a = ParameterGenerator::new(7).generate(&spec(), Some(&env)).unwrap();
        let b = ParameterGenerator::new(7).generate(&spec(), Some(&env)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn values_respect_rules() {
        let env = ContractRegistry::default().with(ContractKey::SimpleCounter, COUNTER);
        let params = ParameterGenerator::new(1).generate(&spec(), Some(&env)).unwrap();

        let amount = params["amount"].as_f64().unwrap();
        assert!((0.01..=0.02).contains(&amount), "{amount}");
        let digits = params["amount"].to_string();
        assert!(digits.split('.').nth(1).map_or(0, str::len) <= 4, "{digits}");

        let count = params["count"].as_i64().unwrap();
        assert!((3..=5).contains(&count));
        let label = params["label"].as_str().unwrap();
        assert_eq!(label.len(), 6);
        assert!(label.chars().all(|c| c.is_ascii_digit()));
        assert!(["USDT", "BUSD"].contains(&params["symbol"].as_str().unwrap()));
        assert_eq!(params["flag"], json!(true));
        assert_eq!(params["contract_address"], json!(COUNTER.to_checksum(None)));
    }

    #[test]
    fn missing_deployment_is_an_error() {
        let err = ParameterGenerator::new(1)
            .generate(&spec(), Some(&ContractRegistry::default()))
            .unwrap_err();
        assert_eq!(err, ValidatorError::MissingContract(ContractKey::SimpleCounter));
    }

    #[test]
    fn regenerate_env_only_touches_env_params() {
        let mut generator = ParameterGenerator::new(3);
        let mut params = generator.generate(&spec(), None).unwrap();
        let drawn = params.clone();
        assert_ne!(params["contract_address"], json!(COUNTER.to_checksum(None)));

        let env = ContractRegistry::default().with(ContractKey::SimpleCounter, COUNTER);
        generator.regenerate_env(&spec(), &mut params, &env).unwrap();
        assert_eq!(params["contract_address"], json!(COUNTER.to_checksum(None)));
        for key in ["amount", "count", "label", "symbol", "flag"] {
            assert_eq!(params[key], drawn[key], "{key}");
        }
    }

    #[test]
    fn bad_rules() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "id": "bnb_transfer_basic",
            "parameters": {
                "p": {"type": "boolean", "generation": {"method": "random", "probability": 2.0}}
            }
        }))
        .unwrap();
        let mut generator = ParameterGenerator::new(0);
        assert!(matches!(
            generator.generate(&spec, None),
            Err(ValidatorError::Generation { param, .. }) if param == "p"
        ));
        assert!(generator.pick_template(&spec).is_err());
    }
}
