//! Wrapping and unwrapping BNB.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;

use crate::{
    abi::IWBNB,
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{abs_diff, format_units, Tolerance, NATIVE_DECIMALS},
    ValidatorError,
};

#[derive(Clone, Debug)]
struct Wrap {
    wbnb: Address,
    amount: U256,
}

impl Wrap {
    fn from_params(task: TaskId, params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(task, params);
        Ok(Self {
            wbnb: p.address("wbnb_address")?,
            amount: p.amount("amount", NATIVE_DECIMALS)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_contract".into(), addr(&self.wbnb));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `wbnb_deposit`: wrap BNB by paying `deposit()`.
#[derive(Clone, Debug)]
pub struct WbnbDeposit(Wrap);

impl WbnbDeposit {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.0.wbnb, "WBNB contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[IWBNB::depositCall::SELECTOR], "deposit()", d)
    }

    fn value(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("actual_value".into(), uint(ctx.tx.value));
        palette::amount(ctx.tx.value, self.0.amount, Tolerance::TENTH_PERCENT, NATIVE_DECIMALS, "Deposit amount")
    }

    fn wrapped(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TOKEN_BALANCE,
            self.0.amount,
            Tolerance::TENTH_PERCENT,
            NATIVE_DECIMALS,
            d,
        )
    }
}

impl Rules for WbnbDeposit {
    const TASK: TaskId = TaskId::WbnbDeposit;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Deposit Amount", 20, Self::value),
            Rule::new("WBNB Balance Increase", 10, Self::wrapped),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        Wrap::from_params(Self::TASK, params).map(Self)
    }

    fn expected(&self, d: &mut Details) {
        self.0.expected(d);
    }
}

/// `wbnb_withdraw`: unwrap with `withdraw(wad)`.
#[derive(Clone, Debug)]
pub struct WbnbWithdraw(Wrap);

impl WbnbWithdraw {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.0.wbnb, "WBNB contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IWBNB::withdrawCall::SELECTOR], "withdraw(uint256)", d);
        if verdict.passed {
            palette::record_args(ctx, &[("wad", Arg::Uint)], d);
        }
        verdict
    }

    fn unwrapped(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(
            ctx,
            fields::TOKEN_BALANCE,
            self.0.amount,
            Tolerance::TENTH_PERCENT,
            NATIVE_DECIMALS,
            d,
        )
    }

    /// BNB comes back minus what the call cost in gas.
    fn refunded(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::BALANCE);
        let (before, after) = ctx.uint_pair(fields::BALANCE);
        let gas_cost = ctx.receipt.gas_cost();
        let expected = before.saturating_add(self.0.amount).saturating_sub(gas_cost);
        let diff = abs_diff(after, expected);
        let bound = Tolerance::ONE_PERCENT.bound(self.0.amount);
        d.insert("gas_cost".into(), uint(gas_cost));
        d.insert("expected_balance_after".into(), uint(expected));
        Verdict::from_bool(
            diff <= bound,
            format!(
                "BNB balance increased by {} BNB net of gas",
                format_units(after.saturating_sub(before), NATIVE_DECIMALS)
            ),
            format!(
                "Expected BNB balance {} (before + amount - gas), got {} (off by {diff} wei)",
                format_units(expected, NATIVE_DECIMALS),
                format_units(after, NATIVE_DECIMALS)
            ),
        )
    }
}

impl Rules for WbnbWithdraw {
    const TASK: TaskId = TaskId::WbnbWithdraw;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("WBNB Balance Decrease", 15, Self::unwrapped),
            Rule::new("BNB Balance Increase", 15, Self::refunded),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        Wrap::from_params(Self::TASK, params).map(Self)
    }

    fn expected(&self, d: &mut Details) {
        self.0.expected(d);
    }
}
