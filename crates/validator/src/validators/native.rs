//! Native BNB transfers.

use alloy_primitives::{Address, U256};
use quest_types::{fields, lower_hex};
use rust_decimal::Decimal;
use serde_json::json;

use crate::{
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette,
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{abs_diff, format_units, percent_of, Tolerance, NATIVE_DECIMALS},
    ValidatorError,
};

/// Intrinsic gas of a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// Balance a "send everything" transfer may leave behind, 0.0001 BNB.
const DUST_WEI: u64 = 100_000_000_000_000;

/// Upper bound on the gas limit of a simple transfer.
#[derive(Clone, Copy, Debug)]
enum GasCeiling {
    Absolute(u64),
    TimesUsed(u64),
}

/// Gas used covers the intrinsic cost and the limit is neither short nor oversized.
fn gas_reasonable(ctx: &Ctx<'_>, ceiling: GasCeiling, details: &mut Details) -> Verdict {
    let used = ctx.receipt.gas_used_u64();
    let limit = ctx.tx.gas.unwrap_or(0);
    details.insert("gas_used".into(), used.into());
    details.insert("gas_limit".into(), limit.into());
    let max = match ceiling {
        GasCeiling::Absolute(max) => max,
        GasCeiling::TimesUsed(factor) => used.saturating_mul(factor),
    };
    Verdict::from_bool(
        used >= TRANSFER_GAS && limit >= used && limit <= max,
        format!("Gas Used: {used}, Gas Limit: {limit}"),
        format!("Gas Used: {used}, Gas Limit: {limit} (limit must be between {used} and {max})"),
    )
}

fn value_matches(ctx: &Ctx<'_>, expected: U256, tolerance: Tolerance, details: &mut Details) -> Verdict {
    details.insert("actual_amount".into(), uint(ctx.tx.value));
    palette::amount(ctx.tx.value, expected, tolerance, NATIVE_DECIMALS, "Transfer value")
}

/// `bnb_transfer_basic`: send a fixed amount of BNB.
#[derive(Clone, Debug)]
pub struct BnbTransfer {
    to: Address,
    amount: U256,
}

impl BnbTransfer {
    fn target(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.to, "recipient", d)
    }

    fn amount(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        value_matches(ctx, self.amount, Tolerance::TENTH_PERCENT, d)
    }

    fn gas(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        gas_reasonable(ctx, GasCeiling::Absolute(500_000), d)
    }

    fn balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::native_spent(ctx, Tolerance::ONE_PERCENT, d)
    }
}

impl Rules for BnbTransfer {
    const TASK: TaskId = TaskId::BnbTransferBasic;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Target Address Correct", 25, Self::target),
            Rule::new("Transfer Amount Correct", 25, Self::amount),
            Rule::new("Gas Settings Reasonable", 10, Self::gas),
            Rule::new("Balance Change Correct", 10, Self::balance),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            to: p.address("to_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `bnb_transfer_percentage`: send a share of the current balance.
#[derive(Clone, Debug)]
pub struct BnbTransferPercentage {
    to: Address,
    percentage: Decimal,
}

impl BnbTransferPercentage {
    fn expected_amount(&self, ctx: &Ctx<'_>) -> U256 {
        percent_of(ctx.before.uint(fields::BALANCE), self.percentage)
    }

    fn target(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.to, "recipient", d)
    }

    fn amount(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let expected = self.expected_amount(ctx);
        d.insert("expected_amount".into(), uint(expected));
        let verdict = value_matches(ctx, expected, Tolerance::TWO_PERCENT, d);
        Verdict {
            message: format!("{} [{}% of balance]", verdict.message, self.percentage),
            ..verdict
        }
    }

    fn gas(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        gas_reasonable(ctx, GasCeiling::TimesUsed(3), d)
    }

    fn balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::native_spent(ctx, Tolerance::TWO_PERCENT, d)
    }
}

impl Rules for BnbTransferPercentage {
    const TASK: TaskId = TaskId::BnbTransferPercentage;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Target Address Correct", 20, Self::target),
            Rule::new("Transfer Amount Correct", 30, Self::amount),
            Rule::new("Gas Settings Reasonable", 10, Self::gas),
            Rule::new("Balance Change Correct", 10, Self::balance),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            to: p.address("to_address")?,
            percentage: p.decimal("percentage")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("percentage".into(), self.percentage.to_string().into());
    }
}

/// `bnb_transfer_with_message`: value transfer carrying UTF-8 text as call data.
#[derive(Clone, Debug)]
pub struct BnbTransferWithMessage {
    to: Address,
    amount: U256,
    message: String,
}

impl BnbTransferWithMessage {
    fn recipient(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.to, "recipient", d)
    }

    fn amount(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        value_matches(ctx, self.amount, Tolerance::Exact, d)
    }

    fn message(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        if ctx.tx.data.is_empty() {
            d.insert("decoded_message".into(), serde_json::Value::Null);
            return Verdict::fail(format!(
                "No message found in transaction data. Expected: {:?}",
                self.message
            ));
        }
        let decoded = String::from_utf8_lossy(&ctx.tx.data);
        d.insert("decoded_message".into(), decoded.as_ref().into());
        d.insert("tx_data".into(), ctx.tx.data_hex().into());
        let found = decoded.contains(self.message.as_str())
            || decoded.trim() == self.message.trim();
        Verdict::from_bool(
            found,
            format!("Message correctly encoded: {:?}", self.message),
            format!(
                "Message found but not exact match. Expected: {:?}, Got: {decoded:?}",
                self.message
            ),
        )
    }

    fn balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let (before, after) = ctx.uint_pair(fields::BALANCE);
        let gas_cost = ctx.receipt.gas_cost();
        let expected = before.saturating_sub(self.amount.saturating_add(gas_cost));
        let diff = abs_diff(after, expected);
        ctx.record(d, fields::BALANCE);
        d.insert("gas_cost".into(), uint(gas_cost));
        d.insert("expected_balance".into(), uint(expected));
        Verdict::from_bool(
            Tolerance::wei(1_000).accepts(after, expected),
            "Balance decreased correctly (including gas)",
            format!("Balance mismatch. Expected: {expected}, Got: {after}, Diff: {diff}"),
        )
    }
}

impl Rules for BnbTransferWithMessage {
    const TASK: TaskId = TaskId::BnbTransferWithMessage;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 20,
        rules: &[
            Rule::new("Recipient Address", 20, Self::recipient),
            Rule::new("Transfer Amount", 20, Self::amount),
            Rule::new("Message in Data Field", 30, Self::message),
            Rule::new("Balance Change", 10, Self::balance),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            to: p.address("to_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
            message: p.string("message")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
        d.insert("expected_message".into(), self.message.clone().into());
    }
}

/// `bnb_transfer_max_amount`: drain the balance, keeping only the gas.
#[derive(Clone, Debug)]
pub struct BnbTransferMaxAmount {
    to: Address,
}

impl BnbTransferMaxAmount {
    fn recipient(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.to, "recipient", d)
    }

    fn maximum(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let before = ctx.before.uint(fields::BALANCE);
        let gas_cost = ctx.receipt.gas_cost();
        let expected = before.saturating_sub(gas_cost);
        let sent = ctx.tx.value;
        d.insert("balance_before".into(), uint(before));
        d.insert("gas_cost".into(), uint(gas_cost));
        d.insert("expected_max_transfer".into(), uint(expected));
        d.insert("actual_transferred".into(), uint(sent));
        let tolerance = Tolerance::RelativeOrAbsolute(10, U256::from(1_000u64));
        Verdict::from_bool(
            tolerance.accepts(sent, expected),
            format!(
                "Transferred max amount: {} BNB (balance: {} BNB, gas: {} BNB)",
                format_units(sent, NATIVE_DECIMALS),
                format_units(before, NATIVE_DECIMALS),
                format_units(gas_cost, NATIVE_DECIMALS)
            ),
            format!(
                "Expected: {} BNB, Transferred: {} BNB",
                format_units(expected, NATIVE_DECIMALS),
                format_units(sent, NATIVE_DECIMALS)
            ),
        )
    }

    fn minimal(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let after = ctx.after.uint(fields::BALANCE);
        let dust = U256::from(DUST_WEI);
        d.insert("balance_after".into(), uint(after));
        d.insert("max_remaining_allowed".into(), uint(dust));
        Verdict::from_bool(
            after <= dust,
            format!(
                "Sender balance minimal: {} BNB (<= 0.0001 BNB)",
                format_units(after, NATIVE_DECIMALS)
            ),
            format!(
                "Sender balance too high: {} BNB (should be <= 0.0001 BNB)",
                format_units(after, NATIVE_DECIMALS)
            ),
        )
    }
}

impl Rules for BnbTransferMaxAmount {
    const TASK: TaskId = TaskId::BnbTransferMaxAmount;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Recipient Address", 20, Self::recipient),
            Rule::new("Maximum Amount Transferred", 30, Self::maximum),
            Rule::new("Sender Balance Minimal", 20, Self::minimal),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            to: p.address("to_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_recipient".into(), addr(&self.to));
    }
}

/// `bnb_transfer_to_contract`: send BNB to a contract's receive function.
#[derive(Clone, Debug)]
pub struct BnbTransferToContract {
    contract: Address,
    amount: U256,
}

impl BnbTransferToContract {
    fn recipient(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let code_size = ctx.before.uint(fields::CONTRACT_CODE_SIZE);
        let is_contract = !code_size.is_zero();
        let actual = ctx.tx.to;
        d.insert("actual_to".into(), actual.as_ref().map_or(serde_json::Value::Null, addr));
        d.insert("is_contract".into(), is_contract.into());
        d.insert("contract_code_size".into(), uint(code_size));
        match (actual == Some(self.contract), is_contract) {
            (true, true) => Verdict::pass(format!(
                "Correct contract address: {} (code size: {code_size} bytes)",
                lower_hex(&self.contract)
            )),
            (true, false) => {
                Verdict::partial(10, "Address correct but target is not a contract (code size: 0)")
            }
            (false, _) => Verdict::fail(format!(
                "Expected contract: {}, Got: {}",
                lower_hex(&self.contract),
                actual.as_ref().map_or_else(String::new, lower_hex)
            )),
        }
    }

    fn amount(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        value_matches(ctx, self.amount, Tolerance::Exact, d)
    }

    fn contract_balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_BALANCE,
            self.amount,
            Tolerance::wei(100),
            NATIVE_DECIMALS,
            d,
        )
        .with_details(json!({ "expected_increase": self.amount.to_string() }))
    }
}

impl Rules for BnbTransferToContract {
    const TASK: TaskId = TaskId::BnbTransferToContract;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Recipient is Contract", 20, Self::recipient),
            Rule::new("Transfer Amount", 30, Self::amount),
            Rule::new("Contract Balance Change", 20, Self::contract_balance),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            contract: p.address("contract_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_to".into(), addr(&self.contract));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use serde_json::json;

    const ONE_BNB: u64 = 1_000_000_000_000_000_000;

    #[test]
    fn basic_transfer_passes() {
        let v = BnbTransfer::from_params(&params(json!({
            "to_address": ALICE_STR,
            "amount": "0.1"
        })))
        .unwrap();
        let tx = Transaction {
            to: Some(ALICE),
            value: U256::from(ONE_BNB / 10),
            gas: Some(21_000),
            ..Default::default()
        };
        let receipt = Receipt::success(21_000, 1_000_000_000);
        let spent = ONE_BNB / 10 + 21_000 * 1_000_000_000;
        let result = v.validate(
            &tx,
            &receipt,
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB - spent),
        );
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert!(result.passed);
        assert_eq!(result.details["expected_amount"], "100000000000000000");
    }

    #[test]
    fn oversized_gas_limit_fails_only_gas_check() {
        let v = BnbTransfer::from_params(&params(json!({"to_address": ALICE_STR, "amount": 1})))
            .unwrap();
        let tx = Transaction {
            to: Some(ALICE),
            value: U256::from(ONE_BNB),
            gas: Some(1_000_000),
            ..Default::default()
        };
        let result = v.validate(
            &tx,
            &Receipt::success(21_000, 0),
            &StateSnapshot::new().with(fields::BALANCE, 2 * ONE_BNB),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB),
        );
        assert_eq!(result.score, 90);
        assert!(!result.passed);
        assert!(!result.check("Gas Settings Reasonable").unwrap().passed);
    }

    #[test]
    fn percentage_tolerance() {
        let v = BnbTransferPercentage::from_params(&params(json!({
            "to_address": ALICE_STR,
            "percentage": 50
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::BALANCE, 10 * ONE_BNB);
        let run = |value: u64| {
            let tx = Transaction {
                to: Some(ALICE),
                value: U256::from(value),
                gas: Some(21_000),
                ..Default::default()
            };
            let after = StateSnapshot::new().with(fields::BALANCE, 10 * ONE_BNB - value);
            v.validate(&tx, &Receipt::success(21_000, 0), &before, &after)
        };
        // 50% of 10 BNB is 5 BNB; 2% slack is 0.1 BNB.
        assert!(run(5 * ONE_BNB + ONE_BNB / 10).passed);
        assert!(run(5 * ONE_BNB - ONE_BNB / 10).passed);
        let off = run(6 * ONE_BNB);
        assert!(!off.check("Transfer Amount Correct").unwrap().passed);
    }

    #[test]
    fn message_in_data() {
        let v = BnbTransferWithMessage::from_params(&params(json!({
            "to_address": ALICE_STR,
            "amount": 0.01,
            "message": "gm frens"
        })))
        .unwrap();
        let value = ONE_BNB / 100;
        let tx = Transaction {
            to: Some(ALICE),
            value: U256::from(value),
            data: b"gm frens".to_vec().into(),
            ..Default::default()
        };
        let result = v.validate(
            &tx,
            &Receipt::success(21_128, 2),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB - value - 21_128 * 2),
        );
        assert_eq!(result.score, 100, "{}", result.feedback);

        let empty = Transaction { data: Default::default(), ..tx };
        let result = v.validate(
            &empty,
            &Receipt::success(21_000, 0),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB - value),
        );
        assert_eq!(result.score, 70);
        assert!(!result.passed);
    }

    #[test]
    fn max_amount_leaves_dust() {
        let v = BnbTransferMaxAmount::from_params(&params(json!({"to_address": ALICE_STR})))
            .unwrap();
        let gas_cost = 21_000 * 3_000_000_000u64;
        let tx = Transaction {
            to: Some(ALICE),
            value: U256::from(ONE_BNB - gas_cost),
            ..Default::default()
        };
        let result = v.validate(
            &tx,
            &Receipt::success(21_000, 3_000_000_000),
            &StateSnapshot::new().with(fields::BALANCE, ONE_BNB),
            &StateSnapshot::new().with(fields::BALANCE, 0u64),
        );
        assert_eq!(result.score, 100, "{}", result.feedback);
    }

    #[test]
    fn contract_recipient_partial_credit() {
        let v = BnbTransferToContract::from_params(&params(json!({
            "contract_address": ALICE_STR,
            "amount": "0.5"
        })))
        .unwrap();
        let tx = Transaction {
            to: Some(ALICE),
            value: U256::from(ONE_BNB / 2),
            ..Default::default()
        };
        let before = StateSnapshot::new().with(fields::TARGET_BALANCE, 0u64);
        let after = StateSnapshot::new().with(fields::TARGET_BALANCE, ONE_BNB / 2);
        let eoa = v.validate(&tx, &Receipt::success(21_000, 0), &before, &after);
        let check = eoa.check("Recipient is Contract").unwrap();
        assert_eq!((check.passed, check.points, check.weight), (false, 10, 20));
        assert_eq!(eoa.score, 90);
        assert!(eoa.passed);

        let before = before.with(fields::CONTRACT_CODE_SIZE, 512u64);
        let contract = v.validate(&tx, &Receipt::success(21_000, 0), &before, &after);
        assert_eq!(contract.score, 100);
    }
}
