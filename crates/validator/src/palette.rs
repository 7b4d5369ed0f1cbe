//! Checks shared across validator families.
//!
//! Each helper evaluates one assertion, records the values it compared into the result
//! details and returns the [`Verdict`].

use alloy_primitives::{hex, Address, U256};
use quest_types::lower_hex;
use serde_json::Value;
use tracing::debug;

use crate::{
    engine::{addr, uint, Ctx, Details, Verdict},
    units::{format_units, Tolerance},
};

/// Static ABI type of a positional argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arg {
    /// `address`, low 20 bytes of the slot.
    Address,
    /// `uint256`.
    Uint,
    /// `bool`.
    Bool,
}

/// Decodes the leading static arguments into `decoded_{name}` details.
///
/// Decoding is informational: a short payload is recorded as `decode_error` and the
/// caller's verdict is unaffected.
pub fn record_args(ctx: &Ctx<'_>, args: &[(&str, Arg)], details: &mut Details) {
    let call = ctx.calldata();
    for (index, (name, kind)) in args.iter().enumerate() {
        let value = match kind {
            Arg::Address => call.address(index).map(|a| addr(&a)),
            Arg::Uint => call.uint(index).map(uint),
            Arg::Bool => call.flag(index).map(Value::Bool),
        };
        match value {
            Ok(value) => {
                details.insert(format!("decoded_{name}"), value);
            }
            Err(e) => {
                debug!(arg = *name, error = %e, "call data decode failed");
                details.insert("decode_error".into(), e.to_string().into());
                return;
            }
        }
    }
}

/// `tx.to` equals `expected`. Address equality is byte equality so casing never matters.
pub fn destination(ctx: &Ctx<'_>, expected: Address, what: &str, details: &mut Details) -> Verdict {
    let actual = ctx.tx.to;
    details.insert(
        "actual_to".into(),
        actual.as_ref().map_or(Value::Null, addr),
    );
    let shown = actual.as_ref().map_or_else(|| "<contract creation>".to_string(), lower_hex);
    Verdict::from_bool(
        actual == Some(expected),
        format!("Correct {what}: {}", lower_hex(&expected)),
        format!("Expected: {}, Got: {shown}", lower_hex(&expected)),
    )
}

/// Call data starts with one of `accepted`. Every member earns full credit.
pub fn selector(ctx: &Ctx<'_>, accepted: &[[u8; 4]], what: &str, details: &mut Details) -> Verdict {
    let expected = accepted
        .iter()
        .map(hex::encode_prefixed)
        .collect::<Vec<_>>()
        .join(" or ");
    match ctx.calldata().selector() {
        Ok(actual) => {
            details.insert("function_selector".into(), hex::encode_prefixed(actual).into());
            Verdict::from_bool(
                accepted.contains(&actual),
                format!("Correct {what} function signature"),
                format!("Expected: {expected}, Got: {}", hex::encode_prefixed(actual)),
            )
        }
        Err(e) => {
            details.insert("function_selector".into(), Value::Null);
            Verdict::fail(format!("No data field or too short ({e}), expected {expected}"))
        }
    }
}

/// `actual` within `tolerance` of `expected`, both in base units of a `decimals` token.
pub fn amount(actual: U256, expected: U256, tolerance: Tolerance, decimals: u8, what: &str) -> Verdict {
    let bound = tolerance.bound(expected);
    Verdict::from_bool(
        tolerance.accepts(actual, expected),
        format!("{what}: {actual} ({})", format_units(actual, decimals)),
        if bound.is_zero() {
            format!(
                "{what}: expected {expected} ({}), got {actual} ({})",
                format_units(expected, decimals),
                format_units(actual, decimals)
            )
        } else {
            format!(
                "{what}: expected {expected} ± {bound} ({}), got {actual} ({})",
                format_units(expected, decimals),
                format_units(actual, decimals)
            )
        },
    )
}

/// `key` grew by `expected`.
pub fn increased_by(
    ctx: &Ctx<'_>,
    key: &str,
    expected: U256,
    tolerance: Tolerance,
    decimals: u8,
    details: &mut Details,
) -> Verdict {
    ctx.record(details, key);
    if ctx.after.uint(key) < ctx.before.uint(key) {
        return Verdict::fail(format!(
            "{key} decreased by {} instead of increasing by {expected}",
            ctx.decrease(key)
        ));
    }
    amount(ctx.increase(key), expected, tolerance, decimals, &format!("{key} increase"))
}

/// `key` shrank by `expected`.
pub fn decreased_by(
    ctx: &Ctx<'_>,
    key: &str,
    expected: U256,
    tolerance: Tolerance,
    decimals: u8,
    details: &mut Details,
) -> Verdict {
    ctx.record(details, key);
    if ctx.after.uint(key) > ctx.before.uint(key) {
        return Verdict::fail(format!(
            "{key} increased by {} instead of decreasing by {expected}",
            ctx.increase(key)
        ));
    }
    amount(ctx.decrease(key), expected, tolerance, decimals, &format!("{key} decrease"))
}

/// `key` grew at all.
pub fn increased(ctx: &Ctx<'_>, key: &str, details: &mut Details) -> Verdict {
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    Verdict::from_bool(
        after > before,
        format!("{key} increased by {}", after - before.min(after)),
        format!("{key} did not increase (before: {before}, after: {after})"),
    )
}

/// `key` shrank at all.
pub fn decreased(ctx: &Ctx<'_>, key: &str, details: &mut Details) -> Verdict {
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    Verdict::from_bool(
        after < before,
        format!("{key} decreased by {}", before - after.min(before)),
        format!("{key} did not decrease (before: {before}, after: {after})"),
    )
}

/// `key` did not move.
pub fn unchanged(ctx: &Ctx<'_>, key: &str, details: &mut Details) -> Verdict {
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    Verdict::from_bool(
        before == after,
        format!("{key} unchanged ({before})"),
        format!("{key} changed from {before} to {after}"),
    )
}

/// Allowance granted to the router or pool before the tokens were pulled.
///
/// Passes when the allowance already covered `required`, or when the transaction itself
/// consumed about `required` of it.
pub fn allowance_covered(ctx: &Ctx<'_>, key: &str, required: U256, details: &mut Details) -> Verdict {
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    let consumed = before.saturating_sub(after);
    let ok = before >= required
        || after >= required
        || Tolerance::ONE_PERCENT.accepts(consumed, required);
    Verdict::from_bool(
        ok,
        format!("{key} sufficient ({before} before, {required} required)"),
        format!("{key} insufficient: had {before}, needed {required}"),
    )
}

/// Some allowance existed on either side of the transaction.
pub fn allowance_present(ctx: &Ctx<'_>, key: &str, details: &mut Details) -> Verdict {
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    Verdict::from_bool(
        !before.is_zero() || !after.is_zero(),
        format!("{key} granted ({before} before, {after} after)"),
        format!("No {key} granted"),
    )
}

/// Native balance gained with the gas cost added back, zero if it fell further than gas.
pub fn native_received(ctx: &Ctx<'_>, details: &mut Details) -> U256 {
    let key = quest_types::fields::BALANCE;
    ctx.record(details, key);
    let (before, after) = ctx.uint_pair(key);
    let gas_cost = ctx.receipt.gas_cost();
    let received = after.saturating_add(gas_cost).saturating_sub(before);
    details.insert("gas_cost".into(), uint(gas_cost));
    details.insert("bnb_received".into(), uint(received));
    received
}

/// Native balance dropped by exactly what was sent plus gas.
pub fn native_spent(ctx: &Ctx<'_>, tolerance: Tolerance, details: &mut Details) -> Verdict {
    let key = quest_types::fields::BALANCE;
    ctx.record(details, key);
    let gas_cost = ctx.receipt.gas_cost();
    let expected = ctx.tx.value.saturating_add(gas_cost);
    let actual = ctx.decrease(key);
    details.insert("gas_cost".into(), uint(gas_cost));
    details.insert("balance_change".into(), uint(actual));
    Verdict::from_bool(
        tolerance.accepts(actual, expected),
        format!(
            "Balance decrease: {actual} wei (transfer {} + gas {gas_cost})",
            ctx.tx.value
        ),
        format!(
            "Balance decrease {actual} wei does not match transfer {} + gas {gas_cost} = {expected}",
            ctx.tx.value
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use quest_types::{fields, Receipt, StateSnapshot, Transaction};

    const TOKEN: Address = address!("55d398326f99059ff775485246999027b3197955");

    fn ctx_parts() -> (Transaction, Receipt, StateSnapshot, StateSnapshot) {
        let tx = Transaction {
            to: Some(TOKEN),
            data: hex!("095ea7b3").to_vec().into(),
            ..Default::default()
        };
        (
            tx,
            Receipt::success(46_000, 1),
            StateSnapshot::new().with(fields::TOKEN_BALANCE, 1_000u64),
            StateSnapshot::new().with(fields::TOKEN_BALANCE, 750u64),
        )
    }

    #[test]
    fn destination_and_selector() {
        let (tx, receipt, before, after) = ctx_parts();
        let ctx = Ctx { tx: &tx, receipt: &receipt, before: &before, after: &after };
        let mut details = Details::new();
        assert!(destination(&ctx, TOKEN, "token contract", &mut details).passed);
        assert!(!destination(&ctx, Address::ZERO, "token contract", &mut details).passed);
        assert!(selector(&ctx, &[hex!("a9059cbb"), hex!("095ea7b3")], "approve", &mut details).passed);
        let v = selector(&ctx, &[hex!("a9059cbb")], "transfer", &mut details);
        assert_eq!(v.message, "Expected: 0xa9059cbb, Got: 0x095ea7b3");
        assert_eq!(details["function_selector"], "0x095ea7b3");
    }

    #[test]
    fn deltas() {
        let (tx, receipt, before, after) = ctx_parts();
        let ctx = Ctx { tx: &tx, receipt: &receipt, before: &before, after: &after };
        let mut details = Details::new();
        let key = fields::TOKEN_BALANCE;
        assert!(decreased_by(&ctx, key, U256::from(250u64), Tolerance::Exact, 0, &mut details).passed);
        assert!(!decreased_by(&ctx, key, U256::from(251u64), Tolerance::Exact, 0, &mut details).passed);
        assert!(!increased_by(&ctx, key, U256::from(250u64), Tolerance::Exact, 0, &mut details).passed);
        assert!(decreased(&ctx, key, &mut details).passed);
        assert!(!increased(&ctx, key, &mut details).passed);
        assert!(!unchanged(&ctx, key, &mut details).passed);
        assert_eq!(details["token_balance_before"], "1000");
        assert_eq!(details["token_balance_after"], "750");
    }

    #[test]
    fn received_adds_gas_back() {
        let tx = Transaction::default();
        let receipt = Receipt::success(100, 10);
        let before = StateSnapshot::new().with(fields::BALANCE, 5_000u64);
        // Swap paid out 500 but gas cost 1000.
        let after = StateSnapshot::new().with(fields::BALANCE, 4_500u64);
        let ctx = Ctx { tx: &tx, receipt: &receipt, before: &before, after: &after };
        let mut details = Details::new();
        assert_eq!(native_received(&ctx, &mut details), U256::from(500u64));
        assert_eq!(details["gas_cost"], "1000");
        assert!(!allowance_present(&ctx, fields::ALLOWANCE, &mut details).passed);
    }
}
