//! Calls into the fixture contracts deployed with the environment.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;

use crate::{
    abi::{IDelegateProxy, IDonationBox, IMessageBoard, ISimpleCounter},
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{Tolerance, NATIVE_DECIMALS},
    ValidatorError,
};

/// `contract_call_simple`: `increment()` on the counter.
#[derive(Clone, Debug)]
pub struct ContractCallSimple {
    contract: Address,
}

impl ContractCallSimple {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.contract, "contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[ISimpleCounter::incrementCall::SELECTOR], "increment()", d)
    }

    fn incremented(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::COUNTER_VALUE);
        let (before, after) = ctx.uint_pair(fields::COUNTER_VALUE);
        Verdict::from_bool(
            before.checked_add(U256::from(1u8)) == Some(after),
            format!("Counter incremented from {before} to {after}"),
            format!("Expected counter {}, got {after}", before.saturating_add(U256::from(1u8))),
        )
    }
}

impl Rules for ContractCallSimple {
    const TASK: TaskId = TaskId::ContractCallSimple;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 40,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Counter Incremented", 20, Self::incremented),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            contract: p.address("contract_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_contract".into(), addr(&self.contract));
    }
}

/// `contract_call_with_value`: payable `donate()`.
#[derive(Clone, Debug)]
pub struct ContractCallWithValue {
    contract: Address,
    amount: U256,
}

impl ContractCallWithValue {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.contract, "contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[IDonationBox::donateCall::SELECTOR], "donate()", d)
    }

    fn value(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("actual_value".into(), uint(ctx.tx.value));
        palette::amount(ctx.tx.value, self.amount, Tolerance::wei(1), NATIVE_DECIMALS, "Value sent")
    }

    fn received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(ctx, fields::TARGET_BALANCE, self.amount, Tolerance::wei(1), NATIVE_DECIMALS, d)
    }
}

impl Rules for ContractCallWithValue {
    const TASK: TaskId = TaskId::ContractCallWithValue;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Value Sent", 15, Self::value),
            Rule::new("Contract Balance Increased", 15, Self::received),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            contract: p.address("contract_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_contract".into(), addr(&self.contract));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `contract_call_with_params`: `setMessage(string)`.
#[derive(Clone, Debug)]
pub struct ContractCallWithParams {
    contract: Address,
    message: String,
}

impl ContractCallWithParams {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.contract, "contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IMessageBoard::setMessageCall::SELECTOR], "setMessage(string)", d);
        if verdict.passed {
            match IMessageBoard::setMessageCall::abi_decode(&ctx.tx.data) {
                Ok(call) => {
                    d.insert("decoded_message".into(), call.message.into());
                }
                Err(e) => {
                    d.insert("decode_error".into(), e.to_string().into());
                }
            }
        }
        verdict
    }

    fn stored(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let before = ctx.before.text(fields::MESSAGE_VALUE);
        let after = ctx.after.text(fields::MESSAGE_VALUE);
        d.insert("message_before".into(), before.to_string().into());
        d.insert("message_after".into(), after.to_string().into());
        Verdict::from_bool(
            after == self.message.as_str(),
            format!("Message stored: {after:?}"),
            format!("Expected message {:?}, got {after:?}", self.message),
        )
    }
}

impl Rules for ContractCallWithParams {
    const TASK: TaskId = TaskId::ContractCallWithParams;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 40,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Message Stored", 20, Self::stored),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            contract: p.address("contract_address")?,
            message: p.string("message")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_contract".into(), addr(&self.contract));
        d.insert("expected_message".into(), self.message.clone().into());
    }
}

/// `contract_delegate_call`: the proxy's storage changes, the implementation's does not.
#[derive(Clone, Debug)]
pub struct ContractDelegateCall {
    proxy: Address,
    implementation: Address,
    value: U256,
}

impl ContractDelegateCall {
    fn proxy(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.proxy, "proxy contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IDelegateProxy::setValueCall::SELECTOR], "setValue(uint256)", d);
        if verdict.passed {
            palette::record_args(ctx, &[("value", Arg::Uint)], d);
        }
        verdict
    }

    fn proxy_storage(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::PROXY_VALUE);
        let (before, after) = ctx.uint_pair(fields::PROXY_VALUE);
        Verdict::from_bool(
            after == self.value && after != before,
            format!("Proxy storage updated to {after}"),
            format!("Expected proxy value {} (changed from {before}), got {after}", self.value),
        )
    }

    fn implementation_storage(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::unchanged(ctx, fields::IMPLEMENTATION_VALUE, d)
    }
}

impl Rules for ContractDelegateCall {
    const TASK: TaskId = TaskId::ContractDelegateCall;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Proxy Contract Address", 20, Self::proxy),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Proxy Storage Updated", 15, Self::proxy_storage),
            Rule::new("Implementation Storage Unchanged", 15, Self::implementation_storage),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            proxy: p.address("proxy_address")?,
            implementation: p.address("implementation_address")?,
            value: p.uint("value")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_proxy".into(), addr(&self.proxy));
        d.insert("implementation_address".into(), addr(&self.implementation));
        d.insert("expected_value".into(), uint(self.value));
    }
}

/// `contract_payable_fallback`: plain value transfer into a contract's `receive`.
#[derive(Clone, Debug)]
pub struct ContractPayableFallback {
    contract: Address,
    amount: U256,
}

impl ContractPayableFallback {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.contract, "contract", d)
    }

    fn value(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("actual_value".into(), uint(ctx.tx.value));
        palette::amount(ctx.tx.value, self.amount, Tolerance::wei(10), NATIVE_DECIMALS, "BNB amount")
    }

    fn empty_data(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("data".into(), ctx.tx.data_hex().into());
        Verdict::from_bool(
            ctx.tx.data.is_empty(),
            "Data field empty, fallback/receive triggered",
            format!("Data field should be empty, got {} bytes", ctx.tx.data.len()),
        )
    }

    fn received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(ctx, fields::TARGET_BALANCE, self.amount, Tolerance::wei(10), NATIVE_DECIMALS, d)
    }
}

impl Rules for ContractPayableFallback {
    const TASK: TaskId = TaskId::ContractPayableFallback;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("BNB Amount", 20, Self::value),
            Rule::new("Empty Data Field", 15, Self::empty_data),
            Rule::new("Contract Balance Increase", 15, Self::received),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            contract: p.address("contract_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_contract".into(), addr(&self.contract));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use serde_json::json;

    fn to_contract(data: Vec<u8>) -> Transaction {
        Transaction {
            to: Some(TOKEN),
            data: data.into(),
            ..Default::default()
        }
    }

    #[test]
    fn counter_increment() {
        let v = ContractCallSimple::from_params(&params(json!({"contract_address": TOKEN_STR}))).unwrap();
        let tx = to_contract(ISimpleCounter::incrementCall {}.abi_encode());
        let before = StateSnapshot::new().with(fields::COUNTER_VALUE, 4u64);
        let after = StateSnapshot::new().with(fields::COUNTER_VALUE, 5u64);
        assert!(v.validate(&tx, &Receipt::success(28_000, 1), &before, &after).passed);
        let twice = StateSnapshot::new().with(fields::COUNTER_VALUE, 6u64);
        let result = v.validate(&tx, &Receipt::success(28_000, 1), &before, &twice);
        assert_eq!(result.score, 80);
        assert!(!result.passed);
    }

    #[test]
    fn set_message_decodes_string() {
        let v = ContractCallWithParams::from_params(&params(json!({
            "contract_address": TOKEN_STR,
            "message": "Hello BSC"
        })))
        .unwrap();
        let tx = to_contract(
            IMessageBoard::setMessageCall {
                message: "Hello BSC".into(),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new().with(fields::MESSAGE_VALUE, "");
        let after = StateSnapshot::new().with(fields::MESSAGE_VALUE, "Hello BSC");
        let result = v.validate(&tx, &Receipt::success(50_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["decoded_message"], "Hello BSC");
    }

    #[test]
    fn set_message_keeps_numeric_looking_text() {
        for message in ["0042", "70997970c51812dc3a010c7d01b50e0d17dc79c8"] {
            let v = ContractCallWithParams::from_params(&params(json!({
                "contract_address": TOKEN_STR,
                "message": message
            })))
            .unwrap();
            let tx = to_contract(IMessageBoard::setMessageCall { message: message.into() }.abi_encode());
            let before: StateSnapshot = serde_json::from_value(json!({"message_value": ""})).unwrap();
            let after: StateSnapshot = serde_json::from_value(json!({"message_value": message})).unwrap();
            let result = v.validate(&tx, &Receipt::success(50_000, 1), &before, &after);
            assert_eq!(result.score, 100, "{message}: {}", result.feedback);
            assert_eq!(result.details["message_after"], message);
        }
    }

    #[test]
    fn delegate_call_storage() {
        let v = ContractDelegateCall::from_params(&params(json!({
            "proxy_address": TOKEN_STR,
            "implementation_address": BOB_STR,
            "value": 42
        })))
        .unwrap();
        let tx = to_contract(IDelegateProxy::setValueCall { value: U256::from(42u8) }.abi_encode());
        let before = StateSnapshot::new()
            .with(fields::PROXY_VALUE, 0u64)
            .with(fields::IMPLEMENTATION_VALUE, 0u64);
        let good = StateSnapshot::new()
            .with(fields::PROXY_VALUE, 42u64)
            .with(fields::IMPLEMENTATION_VALUE, 0u64);
        let wrong_storage = StateSnapshot::new()
            .with(fields::PROXY_VALUE, 0u64)
            .with(fields::IMPLEMENTATION_VALUE, 42u64);
        assert_eq!(v.validate(&tx, &Receipt::success(45_000, 1), &before, &good).score, 100);
        assert_eq!(v.validate(&tx, &Receipt::success(45_000, 1), &before, &wrong_storage).score, 70);
    }

    #[test]
    fn payable_fallback_requires_empty_data() {
        let v = ContractPayableFallback::from_params(&params(json!({
            "contract_address": TOKEN_STR,
            "amount": "0.01"
        })))
        .unwrap();
        let amount = 10_000_000_000_000_000u64;
        let before = StateSnapshot::new().with(fields::TARGET_BALANCE, 0u64);
        let after = StateSnapshot::new().with(fields::TARGET_BALANCE, amount);
        let plain = Transaction {
            to: Some(TOKEN),
            value: U256::from(amount),
            ..Default::default()
        };
        assert_eq!(v.validate(&plain, &Receipt::success(21_055, 1), &before, &after).score, 100);
        let with_data = Transaction {
            data: vec![0xde, 0xad].into(),
            ..plain
        };
        let result = v.validate(&with_data, &Receipt::success(21_055, 1), &before, &after);
        assert_eq!(result.score, 85);
        assert!(!result.passed);
    }
}
