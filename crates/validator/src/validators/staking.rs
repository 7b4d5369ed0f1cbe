//! Staking pool deposits, withdrawals and rewards.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;

use crate::{
    abi::IStakingPool,
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{abs_diff, format_units, Tolerance},
    ValidatorError,
};

const LP_DECIMALS: u8 = 18;

/// Reward movement tolerated during an emergency withdrawal, 0.001 tokens.
const REWARD_DUST: u64 = 1_000_000_000_000_000;

/// Amount named by `deposit(amount)` / `withdraw(amount)`, falling back to `expected`.
fn call_amount(ctx: &Ctx<'_>, expected: U256, d: &mut Details) -> U256 {
    palette::record_args(ctx, &[("amount", Arg::Uint)], d);
    ctx.calldata().uint(0).unwrap_or(expected)
}

/// Pool credited roughly what the wallet paid in.
fn credited(ctx: &Ctx<'_>, paid_key: &str, decimals: u8, d: &mut Details) -> Verdict {
    ctx.record(d, fields::STAKED_AMOUNT);
    let paid = ctx.decrease(paid_key);
    let staked = ctx.increase(fields::STAKED_AMOUNT);
    Verdict::from_bool(
        !staked.is_zero() && Tolerance::ONE_PERCENT.accepts(staked, paid),
        format!("Staked amount increased by {}", format_units(staked, decimals)),
        format!(
            "Staked amount increased by {}, wallet paid {}",
            format_units(staked, decimals),
            format_units(paid, decimals)
        ),
    )
}

/// `stake_single_token`.
#[derive(Clone, Debug)]
pub struct StakeSingleToken {
    pool: Address,
    token: Address,
    amount: U256,
    decimals: u8,
    user: Option<Address>,
}

impl StakeSingleToken {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::allowance_covered(ctx, fields::ALLOWANCE, self.amount, d)
    }

    fn paid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(
            ctx,
            fields::TOKEN_BALANCE,
            self.amount,
            Tolerance::TENTH_PERCENT,
            self.decimals,
            d,
        )
    }

    fn staked(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        credited(ctx, fields::TOKEN_BALANCE, self.decimals, d)
    }
}

impl Rules for StakeSingleToken {
    const TASK: TaskId = TaskId::StakeSingleToken;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 25,
        rules: &[
            Rule::new("Token Approval", 20, Self::approval),
            Rule::new("Token Balance Decrease", 25, Self::paid),
            Rule::new("Staking Balance Increase", 30, Self::staked),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            pool: p.address("pool_address")?,
            token: p.address("token_address")?,
            amount: p.amount("stake_amount", decimals)?,
            decimals,
            user: p.opt_address("user_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("expected_stake".into(), uint(self.amount));
        if let Some(user) = &self.user {
            d.insert("user_address".into(), addr(user));
        }
    }
}

/// `stake_lp_tokens`.
#[derive(Clone, Debug)]
pub struct StakeLpTokens {
    pool: Address,
    lp_token: Address,
    amount: U256,
    user: Option<Address>,
}

impl StakeLpTokens {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let required = if ctx.calldata().has_selector(&[IStakingPool::depositCall::SELECTOR]) {
            call_amount(ctx, self.amount, d)
        } else {
            self.amount
        };
        palette::allowance_covered(ctx, fields::LP_ALLOWANCE, required, d)
    }

    fn paid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased(ctx, fields::LP_TOKEN_BALANCE, d)
    }

    fn staked(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        credited(ctx, fields::LP_TOKEN_BALANCE, LP_DECIMALS, d)
    }
}

impl Rules for StakeLpTokens {
    const TASK: TaskId = TaskId::StakeLpTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 25,
        rules: &[
            Rule::new("LP Token Approval", 20, Self::approval),
            Rule::new("LP Token Balance Decrease", 25, Self::paid),
            Rule::new("Staking Balance Increase", 30, Self::staked),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            pool: p.address("pool_address")?,
            lp_token: p.address("lp_token_address")?,
            amount: p.amount("stake_amount", LP_DECIMALS)?,
            user: p.opt_address("user_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("lp_token_address".into(), addr(&self.lp_token));
        d.insert("expected_stake".into(), uint(self.amount));
        if let Some(user) = &self.user {
            d.insert("user_address".into(), addr(user));
        }
    }
}

/// `unstake_lp_tokens`: `withdraw(amount)` from the LP pool.
#[derive(Clone, Debug)]
pub struct UnstakeLpTokens {
    pool: Address,
    lp_token: Address,
    amount: U256,
    user: Option<Address>,
}

impl UnstakeLpTokens {
    fn withdrawn(&self, ctx: &Ctx<'_>, d: &mut Details) -> U256 {
        if ctx.calldata().has_selector(&[IStakingPool::withdrawCall::SELECTOR]) {
            call_amount(ctx, self.amount, d)
        } else {
            self.amount
        }
    }

    fn returned(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let amount = self.withdrawn(ctx, d);
        palette::increased_by(ctx, fields::LP_TOKEN_BALANCE, amount, Tolerance::ONE_PERCENT, LP_DECIMALS, d)
    }

    fn unstaked(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let amount = self.withdrawn(ctx, d);
        palette::decreased_by(ctx, fields::STAKED_AMOUNT, amount, Tolerance::ONE_PERCENT, LP_DECIMALS, d)
    }
}

impl Rules for UnstakeLpTokens {
    const TASK: TaskId = TaskId::UnstakeLpTokens;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("LP Token Balance Increase", 40, Self::returned),
            Rule::new("Staked Amount Decrease", 30, Self::unstaked),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            pool: p.address("pool_address")?,
            lp_token: p.address("lp_token_address")?,
            amount: p.amount("unstake_amount", LP_DECIMALS)?,
            user: p.opt_address("user_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("lp_token_address".into(), addr(&self.lp_token));
        d.insert("expected_unstake".into(), uint(self.amount));
        if let Some(user) = &self.user {
            d.insert("user_address".into(), addr(user));
        }
    }
}

/// `harvest_rewards`: claim pending rewards.
#[derive(Clone, Debug)]
pub struct HarvestRewards {
    pool: Address,
    reward_token: Address,
    user: Address,
}

impl HarvestRewards {
    fn rewarded(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased(ctx, fields::TOKEN_BALANCE, d)
    }
}

impl Rules for HarvestRewards {
    const TASK: TaskId = TaskId::HarvestRewards;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[Rule::new("Reward Token Balance Increase", 70, Self::rewarded)],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            pool: p.address("pool_address")?,
            reward_token: p.address("reward_token_address")?,
            user: p.address("user_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("reward_token_address".into(), addr(&self.reward_token));
        d.insert("user_address".into(), addr(&self.user));
    }
}

/// `emergency_withdraw`: take the whole stake back and forfeit rewards.
#[derive(Clone, Debug)]
pub struct EmergencyWithdraw {
    pool: Address,
    lp_token: Address,
    reward_token: Address,
    user: Address,
}

impl EmergencyWithdraw {
    fn full_return(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let staked = ctx.before.uint(fields::STAKED_AMOUNT);
        d.insert("staked_before".into(), uint(staked));
        palette::increased_by(ctx, fields::LP_TOKEN_BALANCE, staked, Tolerance::ONE_PERCENT, LP_DECIMALS, d)
    }

    fn cleared(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let after = ctx.after.uint(fields::STAKED_AMOUNT);
        d.insert("staked_after".into(), uint(after));
        Verdict::from_bool(
            after.is_zero(),
            "Staking record cleared",
            format!("Staked amount still {after}"),
        )
    }

    fn forfeited(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::TOKEN_BALANCE);
        let (before, after) = ctx.uint_pair(fields::TOKEN_BALANCE);
        let moved = abs_diff(before, after);
        Verdict::from_bool(
            moved < U256::from(REWARD_DUST),
            "Rewards forfeited as expected",
            format!(
                "Reward balance moved by {} tokens, emergency withdrawal should not claim",
                format_units(moved, 18)
            ),
        )
    }
}

impl Rules for EmergencyWithdraw {
    const TASK: TaskId = TaskId::EmergencyWithdraw;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("LP Token Full Return", 40, Self::full_return),
            Rule::new("Staking Record Cleared", 20, Self::cleared),
            Rule::new("Rewards Not Claimed", 10, Self::forfeited),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            pool: p.address("pool_address")?,
            lp_token: p.address("lp_token_address")?,
            reward_token: p.address("reward_token_address")?,
            user: p.address("user_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("lp_token_address".into(), addr(&self.lp_token));
        d.insert("reward_token_address".into(), addr(&self.reward_token));
        d.insert("user_address".into(), addr(&self.user));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use serde_json::json;

    const UNIT: u64 = 1_000_000_000_000_000_000;

    fn pool_tx(data: Vec<u8>) -> Transaction {
        Transaction {
            to: Some(POOL),
            data: data.into(),
            ..Default::default()
        }
    }

    #[test]
    fn stake_single_approval_redesign() {
        let v = StakeSingleToken::from_params(&params(json!({
            "pool_address": POOL_STR,
            "token_address": TOKEN_STR,
            "stake_amount": 100
        })))
        .unwrap();
        let tx = pool_tx(IStakingPool::depositCall { amount: U256::from(100 * UNIT) }.abi_encode());
        let after = StateSnapshot::new()
            .with(fields::ALLOWANCE, 0u64)
            .with(fields::TOKEN_BALANCE, 0u64)
            .with(fields::STAKED_AMOUNT, 100 * UNIT);
        let approved = StateSnapshot::new()
            .with(fields::ALLOWANCE, 100 * UNIT)
            .with(fields::TOKEN_BALANCE, 100 * UNIT)
            .with(fields::STAKED_AMOUNT, 0u64);
        let result = v.validate(&tx, &Receipt::success(90_000, 1), &approved, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);

        // Too small an allowance is no longer waved through.
        let short = approved.clone().with(fields::ALLOWANCE, 10 * UNIT);
        let result = v.validate(&tx, &Receipt::success(90_000, 1), &short, &after);
        assert_eq!(result.score, 80);
        assert!(!result.check("Token Approval").unwrap().passed);
    }

    #[test]
    fn unstake_uses_decoded_amount() {
        let v = UnstakeLpTokens::from_params(&params(json!({
            "pool_address": POOL_STR,
            "lp_token_address": TOKEN_STR,
            "unstake_amount": 5
        })))
        .unwrap();
        let tx = pool_tx(IStakingPool::withdrawCall { amount: U256::from(4 * UNIT) }.abi_encode());
        let before = StateSnapshot::new()
            .with(fields::LP_TOKEN_BALANCE, 0u64)
            .with(fields::STAKED_AMOUNT, 10 * UNIT);
        let after = StateSnapshot::new()
            .with(fields::LP_TOKEN_BALANCE, 4 * UNIT)
            .with(fields::STAKED_AMOUNT, 6 * UNIT);
        let result = v.validate(&tx, &Receipt::success(70_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["decoded_amount"], (4 * UNIT).to_string());
    }

    #[test]
    fn emergency_withdraw_forfeits_rewards() {
        let v = EmergencyWithdraw::from_params(&params(json!({
            "pool_address": POOL_STR,
            "lp_token_address": TOKEN_STR,
            "reward_token_address": BOB_STR,
            "user_address": ALICE_STR
        })))
        .unwrap();
        let tx = pool_tx(IStakingPool::emergencyWithdrawCall {}.abi_encode());
        let before = StateSnapshot::new()
            .with(fields::STAKED_AMOUNT, 8 * UNIT)
            .with(fields::LP_TOKEN_BALANCE, 0u64)
            .with(fields::TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::STAKED_AMOUNT, 0u64)
            .with(fields::LP_TOKEN_BALANCE, 8 * UNIT)
            .with(fields::TOKEN_BALANCE, 0u64);
        assert_eq!(v.validate(&tx, &Receipt::success(60_000, 1), &before, &after).score, 100);

        let harvested = after.clone().with(fields::TOKEN_BALANCE, UNIT);
        let result = v.validate(&tx, &Receipt::success(60_000, 1), &before, &harvested);
        assert_eq!(result.score, 90);
        assert!(!result.passed);
    }

    #[test]
    fn harvest() {
        let v = HarvestRewards::from_params(&params(json!({
            "pool_address": POOL_STR,
            "reward_token_address": TOKEN_STR,
            "user_address": ALICE_STR
        })))
        .unwrap();
        let tx = pool_tx(IStakingPool::depositCall { amount: U256::ZERO }.abi_encode());
        let before = StateSnapshot::new().with(fields::TOKEN_BALANCE, 1u64);
        let after = StateSnapshot::new().with(fields::TOKEN_BALANCE, 2u64);
        assert!(v.validate(&tx, &Receipt::success(60_000, 1), &before, &after).passed);
        assert!(!v.validate(&tx, &Receipt::success(60_000, 1), &before, &before).passed);
    }
}
