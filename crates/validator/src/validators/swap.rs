//! PancakeSwap router swaps.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;
use rust_decimal::Decimal;

use crate::{
    abi::IPancakeRouter,
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette,
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{format_units, Tolerance, NATIVE_DECIMALS},
    ValidatorError,
};

/// Rounding slack on router-computed token amounts, in base units.
const ROUNDING_UNITS: u64 = 10;

/// Slippage assumed when the task does not set one, in percent.
const DEFAULT_SLIPPAGE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

fn rounding() -> Tolerance {
    Tolerance::Absolute(U256::from(ROUNDING_UNITS))
}

/// Records the decoded swap path when the call data decodes.
fn record_path<C: SolCall>(ctx: &Ctx<'_>, path: impl FnOnce(C) -> Vec<Address>, d: &mut Details) {
    if let Ok(call) = C::abi_decode(&ctx.tx.data) {
        let path: Vec<_> = path(call).iter().map(addr).collect();
        d.insert("decoded_path".into(), path.into());
    }
}

/// `swap_exact_bnb_for_tokens`.
#[derive(Clone, Debug)]
pub struct SwapExactBnbForTokens {
    router: Address,
    token: Address,
    amount_in: U256,
    slippage: Decimal,
}

impl SwapExactBnbForTokens {
    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::swapExactETHForTokensCall::SELECTOR],
            "swapExactETHForTokens",
            d,
        );
        if verdict.passed {
            record_path(ctx, |c: IPancakeRouter::swapExactETHForTokensCall| c.path, d);
        }
        verdict
    }

    /// The value carried is what the swap spends; the balance diff is informational.
    fn bnb_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let spent = palette::native_spent(ctx, Tolerance::Exact, d);
        d.insert("balance_change_exact".into(), spent.passed.into());
        d.insert("actual_value".into(), uint(ctx.tx.value));
        palette::amount(ctx.tx.value, self.amount_in, Tolerance::Exact, NATIVE_DECIMALS, "BNB sent")
    }

    fn tokens_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TOKEN_BALANCE, d)
    }
}

impl Rules for SwapExactBnbForTokens {
    const TASK: TaskId = TaskId::SwapExactBnbForTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Router Contract", 15, Self::router),
            Rule::new("Function Selector", 15, Self::function),
            Rule::new("BNB Balance Decrease", 15, Self::bnb_spent),
            Rule::new("Token Balance Increase", 25, Self::tokens_received),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            router: p.address("router_address")?,
            token: p.address("token_address")?,
            amount_in: p.amount("amount_in", NATIVE_DECIMALS)?,
            slippage: p.opt_decimal("slippage")?.unwrap_or(DEFAULT_SLIPPAGE),
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("amount_in".into(), uint(self.amount_in));
        d.insert("slippage".into(), self.slippage.to_string().into());
    }
}

/// `swap_exact_tokens_for_bnb`.
#[derive(Clone, Debug)]
pub struct SwapExactTokensForBnb {
    router: Address,
    token: Address,
    amount_in: U256,
    decimals: u8,
}

impl SwapExactTokensForBnb {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_covered(ctx, fields::ALLOWANCE, self.amount_in, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::swapExactTokensForETHCall::SELECTOR],
            "swapExactTokensForETH",
            d,
        );
        if verdict.passed {
            record_path(ctx, |c: IPancakeRouter::swapExactTokensForETHCall| c.path, d);
        }
        verdict
    }

    fn tokens_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount_in, rounding(), self.decimals, d)
    }

    fn bnb_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let received = palette::native_received(ctx, d);
        Verdict::from_bool(
            !received.is_zero(),
            format!("Received {} BNB from swap", format_units(received, NATIVE_DECIMALS)),
            "No BNB received from swap (net of gas)",
        )
    }
}

impl Rules for SwapExactTokensForBnb {
    const TASK: TaskId = TaskId::SwapExactTokensForBnb;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Approval", 20, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("Token Balance Decrease", 20, Self::tokens_spent),
            Rule::new("BNB Balance Increase", 10, Self::bnb_received),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token: p.address("token_address")?,
            amount_in: p.amount("amount_in", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("amount_in".into(), uint(self.amount_in));
    }
}

/// `swap_exact_tokens_for_tokens`.
#[derive(Clone, Debug)]
pub struct SwapExactTokensForTokens {
    router: Address,
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    decimals: u8,
}

impl SwapExactTokensForTokens {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_covered(ctx, fields::ALLOWANCE, self.amount_in, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::swapExactTokensForTokensCall::SELECTOR],
            "swapExactTokensForTokens",
            d,
        );
        if verdict.passed {
            record_path(ctx, |c: IPancakeRouter::swapExactTokensForTokensCall| c.path, d);
        }
        verdict
    }

    fn input_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount_in, rounding(), self.decimals, d)
    }

    fn output_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TARGET_TOKEN_BALANCE, d)
    }
}

impl Rules for SwapExactTokensForTokens {
    const TASK: TaskId = TaskId::SwapExactTokensForTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Approval", 15, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("Input Token Balance Decrease", 20, Self::input_spent),
            Rule::new("Output Token Balance Increase", 15, Self::output_received),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_in_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token_in: p.address("token_in_address")?,
            token_out: p.address("token_out_address")?,
            amount_in: p.amount("amount_in", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_in_address".into(), addr(&self.token_in));
        d.insert("token_out_address".into(), addr(&self.token_out));
        d.insert("amount_in".into(), uint(self.amount_in));
    }
}

/// `swap_tokens_for_exact_tokens`: the output is fixed, the input floats.
#[derive(Clone, Debug)]
pub struct SwapTokensForExactTokens {
    router: Address,
    token_in: Address,
    token_out: Address,
    amount_out: U256,
    decimals: u8,
}

impl SwapTokensForExactTokens {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::swapTokensForExactTokensCall::SELECTOR],
            "swapTokensForExactTokens",
            d,
        );
        if verdict.passed {
            record_path(ctx, |c: IPancakeRouter::swapTokensForExactTokensCall| c.path, d);
        }
        verdict
    }

    fn exact_output(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_TOKEN_BALANCE,
            self.amount_out,
            rounding(),
            self.decimals,
            d,
        )
    }

    fn input_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased(ctx, fields::TOKEN_BALANCE, d)
    }
}

impl Rules for SwapTokensForExactTokens {
    const TASK: TaskId = TaskId::SwapTokensForExactTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Approval", 15, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("Output Token Balance EXACT Match", 25, Self::exact_output),
            Rule::new("Input Token Balance Decrease", 10, Self::input_spent),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_out_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token_in: p.address("token_in_address")?,
            token_out: p.address("token_out_address")?,
            amount_out: p.amount("amount_out", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_in_address".into(), addr(&self.token_in));
        d.insert("token_out_address".into(), addr(&self.token_out));
        d.insert("amount_out".into(), uint(self.amount_out));
    }
}

/// `swap_multihop_routing`: route through at least one intermediate token.
#[derive(Clone, Debug)]
pub struct SwapMultihopRouting {
    router: Address,
    token_start: Address,
    token_end: Address,
    amount_in: U256,
    decimals: u8,
}

impl SwapMultihopRouting {
    /// Distinct pairs a multi-hop swap touches at minimum.
    pub const MIN_HOPS: usize = 2;

    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::swapExactTokensForTokensCall::SELECTOR],
            "swapExactTokensForTokens",
            d,
        );
        if verdict.passed {
            record_path(ctx, |c: IPancakeRouter::swapExactTokensForTokensCall| c.path, d);
        }
        verdict
    }

    fn input_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount_in, Tolerance::Exact, self.decimals, d)
    }

    fn output_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TARGET_TOKEN_BALANCE, d)
    }

    /// Counts log emitters other than the two end tokens as intermediaries.
    fn path(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        if ctx.calldata().len() <= 4 {
            return Verdict::fail("No swap arguments in call data");
        }
        let intermediaries: BTreeSet<Address> = ctx
            .receipt
            .logs
            .iter()
            .map(|log| log.address)
            .filter(|a| *a != self.token_start && *a != self.token_end)
            .collect();
        d.insert("intermediary_count".into(), intermediaries.len().into());
        Verdict::from_bool(
            intermediaries.len() >= Self::MIN_HOPS,
            format!(
                "Multi-hop path detected: {} pairs/intermediaries involved",
                intermediaries.len()
            ),
            format!(
                "Insufficient hops detected. Only {} pairs/intermediaries found (expected >= {})",
                intermediaries.len(),
                Self::MIN_HOPS
            ),
        )
    }
}

impl Rules for SwapMultihopRouting {
    const TASK: TaskId = TaskId::SwapMultihopRouting;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 20,
        rules: &[
            Rule::new("Token Approval", 10, Self::approval),
            Rule::new("Correct Router", 10, Self::router),
            Rule::new("Correct Function", 10, Self::function),
            Rule::new("Input Token Decrease", 20, Self::input_spent),
            Rule::new("Output Token Increase", 20, Self::output_received),
            Rule::new("Multi-hop Path", 10, Self::path),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_start_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token_start: p.address("token_start_address")?,
            token_end: p.address("token_end_address")?,
            amount_in: p.amount("amount_in", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_start_address".into(), addr(&self.token_start));
        d.insert("token_end_address".into(), addr(&self.token_end));
        d.insert("amount_in".into(), uint(self.amount_in));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use alloy_primitives::address;
    use quest_types::{Log, Receipt, StateSnapshot, Transaction};
    use serde_json::json;

    const UNIT: u64 = 1_000_000_000_000_000_000;
    const WBNB: Address = address!("bb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c");
    const PAIR_A: Address = address!("16b9a82891338f9ba80e2d6970fdda79d1eb0dae");
    const PAIR_B: Address = address!("58f876857a02d6762e0101bb5c46a8c1ed44dc16");

    fn router_tx(value: u64, data: Vec<u8>) -> Transaction {
        Transaction {
            to: Some(ROUTER),
            value: U256::from(value),
            data: data.into(),
            ..Default::default()
        }
    }

    #[test]
    fn bnb_for_tokens() {
        let v = SwapExactBnbForTokens::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_address": TOKEN_STR,
            "amount_in": 0.1
        })))
        .unwrap();
        let data = IPancakeRouter::swapExactETHForTokensCall {
            amountOutMin: U256::ZERO,
            path: vec![WBNB, TOKEN],
            to: ALICE,
            deadline: U256::from(u64::MAX),
        }
        .abi_encode();
        let tx = router_tx(UNIT / 10, data);
        let before = StateSnapshot::new()
            .with(fields::BALANCE, UNIT)
            .with(fields::TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::BALANCE, UNIT - UNIT / 10 - 150_000)
            .with(fields::TOKEN_BALANCE, 31 * UNIT);
        let result = v.validate(&tx, &Receipt::success(150_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["decoded_path"][1], TOKEN_STR.to_lowercase());
        assert_eq!(result.details["slippage"], "5");
    }

    #[test]
    fn tokens_for_bnb_needs_allowance() {
        let v = SwapExactTokensForBnb::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_address": TOKEN_STR,
            "amount_in": 10
        })))
        .unwrap();
        let data = IPancakeRouter::swapExactTokensForETHCall {
            amountIn: U256::from(10 * UNIT),
            amountOutMin: U256::ZERO,
            path: vec![TOKEN, WBNB],
            to: ALICE,
            deadline: U256::from(u64::MAX),
        }
        .abi_encode();
        let tx = router_tx(0, data);
        let receipt = Receipt::success(120_000, 1);
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, 10 * UNIT)
            .with(fields::TOKEN_BALANCE, 50 * UNIT)
            .with(fields::BALANCE, UNIT);
        let after = StateSnapshot::new()
            .with(fields::ALLOWANCE, 0u64)
            .with(fields::TOKEN_BALANCE, 40 * UNIT)
            .with(fields::BALANCE, UNIT + UNIT / 20);
        assert_eq!(v.validate(&tx, &receipt, &before, &after).score, 100);

        let unapproved = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 50 * UNIT)
            .with(fields::BALANCE, UNIT);
        let result = v.validate(&tx, &receipt, &unapproved, &after);
        assert!(!result.check("Token Approval").unwrap().passed);
        assert!(!result.passed);
    }

    #[test]
    fn exact_output_tolerates_rounding() {
        let v = SwapTokensForExactTokens::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_in_address": TOKEN_STR,
            "token_out_address": BOB_STR,
            "amount_out": 5
        })))
        .unwrap();
        let tx = router_tx(
            0,
            IPancakeRouter::swapTokensForExactTokensCall {
                amountOut: U256::from(5 * UNIT),
                amountInMax: U256::from(7 * UNIT),
                path: vec![TOKEN, BOB],
                to: ALICE,
                deadline: U256::from(u64::MAX),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, 7 * UNIT)
            .with(fields::TOKEN_BALANCE, 10 * UNIT)
            .with(fields::TARGET_TOKEN_BALANCE, 0u64);
        let run = |out: u64| {
            let after = StateSnapshot::new()
                .with(fields::ALLOWANCE, UNIT)
                .with(fields::TOKEN_BALANCE, 4 * UNIT)
                .with(fields::TARGET_TOKEN_BALANCE, out);
            v.validate(&tx, &Receipt::success(130_000, 1), &before, &after)
        };
        assert!(run(5 * UNIT - 10).passed);
        assert_eq!(run(5 * UNIT - 11).score, 75);
    }

    #[test]
    fn multihop_counts_intermediaries() {
        let v = SwapMultihopRouting::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_start_address": TOKEN_STR,
            "token_end_address": BOB_STR,
            "amount_in": 1
        })))
        .unwrap();
        let tx = router_tx(
            0,
            IPancakeRouter::swapExactTokensForTokensCall {
                amountIn: U256::from(UNIT),
                amountOutMin: U256::ZERO,
                path: vec![TOKEN, WBNB, BOB],
                to: ALICE,
                deadline: U256::from(u64::MAX),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, UNIT)
            .with(fields::TOKEN_BALANCE, UNIT)
            .with(fields::TARGET_TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 0u64)
            .with(fields::TARGET_TOKEN_BALANCE, 3u64);
        let log = |address| Log { address, ..Default::default() };
        let mut receipt = Receipt::success(200_000, 1);
        receipt.logs = vec![log(TOKEN), log(PAIR_A), log(WBNB), log(PAIR_B), log(BOB)];
        let result = v.validate(&tx, &receipt, &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);

        receipt.logs = vec![log(TOKEN), log(PAIR_A), log(BOB)];
        let direct = v.validate(&tx, &receipt, &before, &after);
        assert_eq!(direct.score, 90);
        assert!(direct.passed);
    }
}
