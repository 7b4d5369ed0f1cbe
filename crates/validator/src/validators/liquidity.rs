//! Adding and removing PancakeSwap liquidity.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;
use rust_decimal::Decimal;

use crate::{
    abi::IPancakeRouter,
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{format_units, percent_of, Tolerance, NATIVE_DECIMALS},
    ValidatorError,
};

/// LP tokens are always 18 decimals on PancakeSwap V2.
const LP_DECIMALS: u8 = 18;

/// Accepted band for a token leg of `addLiquidity`, in percent of the desired amount.
const LEG_MIN_PERCENT: u64 = 50;
const LEG_MAX_PERCENT: u64 = 150;

/// Token leg of `addLiquidity` spent between half and one and a half times `desired`.
fn leg_spent(ctx: &Ctx<'_>, key: &str, desired: U256, decimals: u8, d: &mut Details) -> Verdict {
    ctx.record(d, key);
    let spent = ctx.decrease(key);
    let min = desired.saturating_mul(U256::from(LEG_MIN_PERCENT)) / U256::from(100u8);
    let max = desired.saturating_mul(U256::from(LEG_MAX_PERCENT)) / U256::from(100u8);
    Verdict::from_bool(
        (min..=max).contains(&spent),
        format!("{key} decreased by {}", format_units(spent, decimals)),
        format!(
            "{key} decreased by {}, expected between {} and {}",
            format_units(spent, decimals),
            format_units(min, decimals),
            format_units(max, decimals)
        ),
    )
}

/// LP balance fell by `percentage` of what was held, within 1%.
fn lp_burned(ctx: &Ctx<'_>, percentage: Decimal, d: &mut Details) -> Verdict {
    let expected = percent_of(ctx.before.uint(fields::LP_TOKEN_BALANCE), percentage);
    d.insert("expected_lp_decrease".into(), uint(expected));
    palette::decreased_by(
        ctx,
        fields::LP_TOKEN_BALANCE,
        expected,
        Tolerance::ONE_PERCENT,
        LP_DECIMALS,
        d,
    )
}

/// `add_liquidity_bnb_token`: `addLiquidityETH`.
#[derive(Clone, Debug)]
pub struct AddLiquidityBnbToken {
    router: Address,
    token: Address,
    amount_bnb: U256,
    amount_token: U256,
    decimals: u8,
}

impl AddLiquidityBnbToken {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::addLiquidityETHCall::SELECTOR],
            "addLiquidityETH",
            d,
        );
        if verdict.passed {
            palette::record_args(
                ctx,
                &[("token", Arg::Address), ("amount_token_desired", Arg::Uint)],
                d,
            );
        }
        verdict
    }

    fn bnb_sent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("actual_value".into(), uint(ctx.tx.value));
        palette::amount(ctx.tx.value, self.amount_bnb, Tolerance::ONE_PERCENT, NATIVE_DECIMALS, "BNB sent")
    }

    /// The router pulls whatever matches the pool ratio, so any decrease counts.
    fn tokens_spent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased(ctx, fields::TOKEN_BALANCE, d)
    }

    fn lp_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::LP_TOKEN_BALANCE, d)
    }
}

impl Rules for AddLiquidityBnbToken {
    const TASK: TaskId = TaskId::AddLiquidityBnbToken;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 20,
        rules: &[
            Rule::new("Token Approval", 15, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("BNB Balance Decrease", 20, Self::bnb_sent),
            Rule::new("Token Balance Decrease", 15, Self::tokens_spent),
            Rule::new("LP Token Received", 10, Self::lp_received),
        ],
        pass: PassRule::THRESHOLD_70,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token: p.address("token_address")?,
            amount_bnb: p.amount("amount_bnb", NATIVE_DECIMALS)?,
            amount_token: p.amount("amount_token", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("amount_bnb".into(), uint(self.amount_bnb));
        d.insert("amount_token".into(), uint(self.amount_token));
        d.insert("token_decimals".into(), self.decimals.into());
    }
}

/// `add_liquidity_tokens`: `addLiquidity` with two ERC20 legs.
#[derive(Clone, Debug)]
pub struct AddLiquidityTokens {
    router: Address,
    token_a: Address,
    token_b: Address,
    amount_a: U256,
    amount_b: U256,
    decimals_a: u8,
    decimals_b: u8,
}

impl AddLiquidityTokens {
    fn approval_a(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::ALLOWANCE, d)
    }

    fn approval_b(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::TOKEN_B_ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IPancakeRouter::addLiquidityCall::SELECTOR], "addLiquidity", d);
        if verdict.passed {
            palette::record_args(ctx, &[("token_a", Arg::Address), ("token_b", Arg::Address)], d);
        }
        verdict
    }

    fn spent_a(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        leg_spent(ctx, fields::TOKEN_BALANCE, self.amount_a, self.decimals_a, d)
    }

    fn spent_b(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        leg_spent(ctx, fields::TOKEN_B_BALANCE, self.amount_b, self.decimals_b, d)
    }

    fn lp_received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::LP_TOKEN_BALANCE, d)
    }
}

impl Rules for AddLiquidityTokens {
    const TASK: TaskId = TaskId::AddLiquidityTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token A Approval", 10, Self::approval_a),
            Rule::new("Token B Approval", 10, Self::approval_b),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 5, Self::function),
            Rule::new("Token A Balance Decrease", 15, Self::spent_a),
            Rule::new("Token B Balance Decrease", 15, Self::spent_b),
            Rule::new("LP Token Received", 5, Self::lp_received),
        ],
        pass: PassRule::THRESHOLD_70,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals_a = p.decimals("token_a_decimals")?;
        let decimals_b = p.decimals("token_b_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token_a: p.address("token_a_address")?,
            token_b: p.address("token_b_address")?,
            amount_a: p.amount("amount_token_a", decimals_a)?,
            amount_b: p.amount("amount_token_b", decimals_b)?,
            decimals_a,
            decimals_b,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_a_address".into(), addr(&self.token_a));
        d.insert("token_b_address".into(), addr(&self.token_b));
        d.insert("amount_token_a".into(), uint(self.amount_a));
        d.insert("amount_token_b".into(), uint(self.amount_b));
    }
}

/// `remove_liquidity_tokens`: burn a share of an ERC20/ERC20 position.
#[derive(Clone, Debug)]
pub struct RemoveLiquidityTokens {
    router: Address,
    token_a: Address,
    token_b: Address,
    percentage: Decimal,
}

impl RemoveLiquidityTokens {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::LP_ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IPancakeRouter::removeLiquidityCall::SELECTOR], "removeLiquidity", d);
        if verdict.passed {
            palette::record_args(
                ctx,
                &[("token_a", Arg::Address), ("token_b", Arg::Address), ("liquidity", Arg::Uint)],
                d,
            );
        }
        verdict
    }

    fn lp(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        lp_burned(ctx, self.percentage, d)
    }

    fn token_a(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TOKEN_BALANCE, d)
    }

    fn token_b(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TARGET_TOKEN_BALANCE, d)
    }
}

impl Rules for RemoveLiquidityTokens {
    const TASK: TaskId = TaskId::RemoveLiquidityTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("LP Token Approval", 10, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("LP Token Balance Decrease", 15, Self::lp),
            Rule::new("Token A Balance Increase", 10, Self::token_a),
            Rule::new("Token B Balance Increase", 15, Self::token_b),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            router: p.address("router_address")?,
            token_a: p.address("token_a_address")?,
            token_b: p.address("token_b_address")?,
            percentage: p.decimal("liquidity_percentage")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_a_address".into(), addr(&self.token_a));
        d.insert("token_b_address".into(), addr(&self.token_b));
        d.insert("liquidity_percentage".into(), self.percentage.to_string().into());
    }
}

/// `remove_liquidity_bnb_token`: `removeLiquidityETH`.
#[derive(Clone, Debug)]
pub struct RemoveLiquidityBnbToken {
    router: Address,
    token: Address,
    percentage: Decimal,
}

impl RemoveLiquidityBnbToken {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_present(ctx, fields::LP_ALLOWANCE, d)
    }

    fn router(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.router, "PancakeSwap Router", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IPancakeRouter::removeLiquidityETHCall::SELECTOR],
            "removeLiquidityETH",
            d,
        );
        if verdict.passed {
            palette::record_args(ctx, &[("token", Arg::Address), ("liquidity", Arg::Uint)], d);
        }
        verdict
    }

    fn lp(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        lp_burned(ctx, self.percentage, d)
    }

    fn tokens(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TOKEN_BALANCE, d)
    }

    fn bnb(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let received = palette::native_received(ctx, d);
        Verdict::from_bool(
            !received.is_zero(),
            format!("Received {} BNB", format_units(received, NATIVE_DECIMALS)),
            "No BNB received (net of gas)",
        )
    }
}

impl Rules for RemoveLiquidityBnbToken {
    const TASK: TaskId = TaskId::RemoveLiquidityBnbToken;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("LP Token Approval", 10, Self::approval),
            Rule::new("Router Contract", 10, Self::router),
            Rule::new("Function Selector", 10, Self::function),
            Rule::new("LP Token Balance Decrease", 15, Self::lp),
            Rule::new("Token Balance Increase", 10, Self::tokens),
            Rule::new("BNB Balance Increase", 15, Self::bnb),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            router: p.address("router_address")?,
            token: p.address("token_address")?,
            percentage: p.decimal("liquidity_percentage")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("liquidity_percentage".into(), self.percentage.to_string().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use serde_json::json;

    const UNIT: u64 = 1_000_000_000_000_000_000;

    #[test]
    fn add_tokens_band() {
        let v = AddLiquidityTokens::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_a_address": TOKEN_STR,
            "token_b_address": BOB_STR,
            "amount_token_a": 10,
            "amount_token_b": 20
        })))
        .unwrap();
        let tx = Transaction {
            to: Some(ROUTER),
            data: IPancakeRouter::addLiquidityCall {
                tokenA: TOKEN,
                tokenB: BOB,
                amountADesired: U256::from(10 * UNIT),
                amountBDesired: U256::from(20 * UNIT),
                amountAMin: U256::ZERO,
                amountBMin: U256::ZERO,
                to: ALICE,
                deadline: U256::from(u64::MAX),
            }
            .abi_encode()
            .into(),
            ..Default::default()
        };
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, 10 * UNIT)
            .with(fields::TOKEN_B_ALLOWANCE, 20 * UNIT)
            .with(fields::TOKEN_BALANCE, 100 * UNIT)
            .with(fields::TOKEN_B_BALANCE, 100 * UNIT)
            .with(fields::LP_TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::ALLOWANCE, 0u64)
            .with(fields::TOKEN_B_ALLOWANCE, 0u64)
            .with(fields::TOKEN_BALANCE, 90 * UNIT)
            // Pool ratio pulled only 15 of the 20 desired.
            .with(fields::TOKEN_B_BALANCE, 85 * UNIT)
            .with(fields::LP_TOKEN_BALANCE, 12 * UNIT);
        let result = v.validate(&tx, &Receipt::success(180_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);

        let lopsided = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 90 * UNIT)
            .with(fields::TOKEN_B_BALANCE, 95 * UNIT)
            .with(fields::LP_TOKEN_BALANCE, 12 * UNIT);
        let result = v.validate(&tx, &Receipt::success(180_000, 1), &before, &lopsided);
        assert_eq!(result.score, 85);
        assert!(result.passed);
    }

    #[test]
    fn remove_bnb_share() {
        let v = RemoveLiquidityBnbToken::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_address": TOKEN_STR,
            "liquidity_percentage": 50
        })))
        .unwrap();
        let tx = Transaction {
            to: Some(ROUTER),
            data: IPancakeRouter::removeLiquidityETHCall {
                token: TOKEN,
                liquidity: U256::from(5 * UNIT),
                amountTokenMin: U256::ZERO,
                amountETHMin: U256::ZERO,
                to: ALICE,
                deadline: U256::from(u64::MAX),
            }
            .abi_encode()
            .into(),
            ..Default::default()
        };
        let before = StateSnapshot::new()
            .with(fields::LP_ALLOWANCE, 5 * UNIT)
            .with(fields::LP_TOKEN_BALANCE, 10 * UNIT)
            .with(fields::TOKEN_BALANCE, 0u64)
            .with(fields::BALANCE, UNIT);
        let after = StateSnapshot::new()
            .with(fields::LP_ALLOWANCE, 0u64)
            .with(fields::LP_TOKEN_BALANCE, 5 * UNIT)
            .with(fields::TOKEN_BALANCE, 40 * UNIT)
            .with(fields::BALANCE, UNIT + UNIT / 10);
        let result = v.validate(&tx, &Receipt::success(160_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["decoded_liquidity"], (5 * UNIT).to_string());

        let everything = StateSnapshot::new()
            .with(fields::LP_TOKEN_BALANCE, 0u64)
            .with(fields::TOKEN_BALANCE, 80 * UNIT)
            .with(fields::BALANCE, UNIT + UNIT / 5);
        let result = v.validate(&tx, &Receipt::success(160_000, 1), &before, &everything);
        assert_eq!(result.score, 85);
        assert!(!result.passed);
    }
}
