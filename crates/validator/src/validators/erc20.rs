//! ERC20 transfers, approvals and the ERC1363/EIP-2612 extensions.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::fields;
use rust_decimal::Decimal;
use serde_json::json;

use crate::{
    abi::{IERC1363, IERC20, IFlashLoanReceiver},
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{format_units, percent_of, pow10, Tolerance},
    ValidatorError,
};

const TRANSFER: [u8; 4] = IERC20::transferCall::SELECTOR;
const APPROVE: [u8; 4] = IERC20::approveCall::SELECTOR;
const TRANSFER_ARGS: &[(&str, Arg)] = &[("recipient", Arg::Address), ("amount", Arg::Uint)];
const APPROVE_ARGS: &[(&str, Arg)] = &[("spender", Arg::Address), ("amount", Arg::Uint)];

/// Exact `-amount` on the sender and `+amount` on the receiver.
fn balances_moved(ctx: &Ctx<'_>, amount: U256, details: &mut Details) -> Verdict {
    ctx.record(details, fields::TOKEN_BALANCE);
    ctx.record(details, fields::TARGET_TOKEN_BALANCE);
    let (sent_before, sent_after) = ctx.uint_pair(fields::TOKEN_BALANCE);
    let (recv_before, recv_after) = ctx.uint_pair(fields::TARGET_TOKEN_BALANCE);
    let sender_ok = sent_before.checked_sub(amount) == Some(sent_after);
    let receiver_ok = recv_before.checked_add(amount) == Some(recv_after);
    if sender_ok && receiver_ok {
        return Verdict::pass(format!(
            "Correct token balance changes: -{amount} (sender), +{amount} (receiver)"
        ));
    }
    let mut errors = Vec::with_capacity(2);
    if !sender_ok {
        errors.push(format!(
            "Sender: expected -{amount}, got {}",
            signed(sent_before, sent_after)
        ));
    }
    if !receiver_ok {
        errors.push(format!(
            "Receiver: expected +{amount}, got {}",
            signed(recv_before, recv_after)
        ));
    }
    Verdict::fail(errors.join(" | "))
}

/// `after - before` rendered with its sign.
fn signed(before: U256, after: U256) -> String {
    if after >= before {
        format!("+{}", after - before)
    } else {
        format!("-{}", before - after)
    }
}

/// `erc20_transfer_fixed`: transfer a fixed token amount.
#[derive(Clone, Debug)]
pub struct Erc20Transfer {
    token: Address,
    to: Address,
    amount: U256,
}

impl Erc20Transfer {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[TRANSFER], "ERC20 transfer", d);
        if verdict.passed {
            palette::record_args(ctx, TRANSFER_ARGS, d);
        }
        verdict
    }

    fn balances(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        balances_moved(ctx, self.amount, d)
    }
}

impl Rules for Erc20Transfer {
    const TASK: TaskId = TaskId::Erc20TransferFixed;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Token Balance Changes", 30, Self::balances),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            to: p.address("to_address")?,
            amount: p.amount("amount", decimals)?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `erc20_transfer_percentage`: transfer a share of the token balance.
#[derive(Clone, Debug)]
pub struct Erc20TransferPercentage {
    token: Address,
    to: Address,
    percentage: Decimal,
    decimals: u8,
}

impl Erc20TransferPercentage {
    fn expected_amount(&self, ctx: &Ctx<'_>) -> U256 {
        percent_of(ctx.before.uint(fields::TOKEN_BALANCE), self.percentage)
    }

    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[TRANSFER], "ERC20 transfer", d);
        if verdict.passed {
            palette::record_args(ctx, TRANSFER_ARGS, d);
        }
        verdict
    }

    fn sent(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let expected = self.expected_amount(ctx);
        d.insert("expected_amount".into(), uint(expected));
        palette::decreased_by(
            ctx,
            fields::TOKEN_BALANCE,
            expected,
            Tolerance::TWO_PERCENT,
            self.decimals,
            d,
        )
    }

    fn received(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_TOKEN_BALANCE,
            self.expected_amount(ctx),
            Tolerance::TWO_PERCENT,
            self.decimals,
            d,
        )
    }
}

impl Rules for Erc20TransferPercentage {
    const TASK: TaskId = TaskId::Erc20TransferPercentage;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 10, Self::signature),
            Rule::new("Transfer Amount (Percentage)", 30, Self::sent),
            Rule::new("Receiver Balance Increase", 10, Self::received),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            to: p.address("to_address")?,
            percentage: p.decimal("percentage")?,
            decimals: p.decimals("token_decimals")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("percentage".into(), self.percentage.to_string().into());
    }
}

/// `erc20_approve`: grant a spender an allowance.
#[derive(Clone, Debug)]
pub struct Erc20Approve {
    token: Address,
    spender: Address,
    amount: U256,
    decimals: u8,
}

impl Erc20Approve {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[APPROVE], "ERC20 approve", d);
        if verdict.passed {
            palette::record_args(ctx, APPROVE_ARGS, d);
        }
        verdict
    }

    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let after = ctx.after.uint(fields::ALLOWANCE);
        d.insert("allowance_after".into(), uint(after));
        palette::amount(after, self.amount, Tolerance::TENTH_PERCENT, self.decimals, "Allowance")
    }
}

impl Rules for Erc20Approve {
    const TASK: TaskId = TaskId::Erc20Approve;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Allowance Set", 30, Self::allowance),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            spender: p.address("spender_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_spender".into(), addr(&self.spender));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// Expectations shared by `increaseAllowance` and `decreaseAllowance`.
#[derive(Clone, Debug)]
struct AllowanceAdjustment {
    token: Address,
    spender: Address,
    delta: U256,
    decimals: u8,
    agent: Option<Address>,
}

impl AllowanceAdjustment {
    fn from_params(task: TaskId, params: &Params, delta_param: &'static str) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(task, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            spender: p.address("spender_address")?,
            delta: p.amount(delta_param, decimals)?,
            decimals,
            agent: p.opt_address("agent_address")?,
        })
    }

    fn function(&self, ctx: &Ctx<'_>, selector: [u8; 4], name: &str, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[selector], name, d);
        if !verdict.passed {
            return verdict;
        }
        palette::record_args(ctx, &[("spender", Arg::Address), ("value", Arg::Uint)], d);
        let call = ctx.calldata();
        let mut mismatches = Vec::new();
        if let Ok(spender) = call.address(0) {
            if spender != self.spender {
                mismatches.push(format!("spender mismatch: got {}", quest_types::lower_hex(&spender)));
            }
        }
        if let Ok(value) = call.uint(1) {
            if !Tolerance::ONE_PERCENT.accepts(value, self.delta) {
                mismatches.push(format!("value mismatch: expected {}, got {value}", self.delta));
            }
        }
        d.insert("parameters_match".into(), mismatches.is_empty().into());
        if !mismatches.is_empty() {
            d.insert("parameter_mismatches".into(), json!(mismatches));
        }
        Verdict::pass(format!("Called {name}(address,uint256)"))
    }

    fn changed(&self, ctx: &Ctx<'_>, increase: bool, d: &mut Details) -> Verdict {
        if increase {
            palette::increased_by(ctx, fields::ALLOWANCE, self.delta, Tolerance::ONE_PERCENT, self.decimals, d)
        } else {
            palette::decreased_by(ctx, fields::ALLOWANCE, self.delta, Tolerance::ONE_PERCENT, self.decimals, d)
        }
    }

    fn no_transfer(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let (before, after) = ctx.uint_pair(fields::TOKEN_BALANCE);
        ctx.record(d, fields::TOKEN_BALANCE);
        Verdict::from_bool(
            before == after,
            "Token balance unchanged (allowance changes do not transfer)",
            format!(
                "Token balance changed unexpectedly. Before: {}, After: {}",
                format_units(before, self.decimals),
                format_units(after, self.decimals)
            ),
        )
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_spender".into(), addr(&self.spender));
        d.insert("expected_delta".into(), uint(self.delta));
        if let Some(agent) = &self.agent {
            d.insert("agent_address".into(), addr(agent));
        }
    }
}

/// `erc20_increase_allowance`.
#[derive(Clone, Debug)]
pub struct Erc20IncreaseAllowance(AllowanceAdjustment);

impl Erc20IncreaseAllowance {
    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.function(ctx, IERC20::increaseAllowanceCall::SELECTOR, "increaseAllowance", d)
    }

    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.changed(ctx, true, d)
    }

    fn no_transfer(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.no_transfer(ctx, d)
    }
}

impl Rules for Erc20IncreaseAllowance {
    const TASK: TaskId = TaskId::Erc20IncreaseAllowance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Correct Function Called", 20, Self::function),
            Rule::new("Allowance Increased Correctly", 40, Self::allowance),
            Rule::new("No Token Transfer", 10, Self::no_transfer),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        AllowanceAdjustment::from_params(Self::TASK, params, "added_value").map(Self)
    }

    fn expected(&self, d: &mut Details) {
        self.0.expected(d);
    }
}

/// `erc20_decrease_allowance`.
#[derive(Clone, Debug)]
pub struct Erc20DecreaseAllowance(AllowanceAdjustment);

impl Erc20DecreaseAllowance {
    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.function(ctx, IERC20::decreaseAllowanceCall::SELECTOR, "decreaseAllowance", d)
    }

    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.changed(ctx, false, d)
    }

    fn no_transfer(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.no_transfer(ctx, d)
    }
}

impl Rules for Erc20DecreaseAllowance {
    const TASK: TaskId = TaskId::Erc20DecreaseAllowance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Correct Function Called", 20, Self::function),
            Rule::new("Allowance Decreased Correctly", 40, Self::allowance),
            Rule::new("No Token Transfer", 10, Self::no_transfer),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        AllowanceAdjustment::from_params(Self::TASK, params, "subtracted_value").map(Self)
    }

    fn expected(&self, d: &mut Details) {
        self.0.expected(d);
    }
}

/// `erc20_burn`: destroy tokens by transferring them to the zero address.
#[derive(Clone, Debug)]
pub struct Erc20Burn {
    token: Address,
    amount: U256,
    decimals: u8,
}

impl Erc20Burn {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn zero_address(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[TRANSFER], "ERC20 transfer", d);
        if !verdict.passed {
            return verdict;
        }
        palette::record_args(ctx, TRANSFER_ARGS, d);
        match ctx.calldata().address(0) {
            Ok(to) if to.is_zero() => Verdict::pass("Correct transfer to zero address (burn)"),
            Ok(to) => Verdict::fail(format!(
                "Transfer to wrong address: {}, expected zero address",
                quest_types::lower_hex(&to)
            )),
            Err(e) => Verdict::fail(format!("Transaction data too short to decode: {e}")),
        }
    }

    fn burned(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        d.insert("expected_burn".into(), uint(self.amount));
        palette::decreased_by(
            ctx,
            fields::TOKEN_BALANCE,
            self.amount,
            Tolerance::RelativeOrAbsolute(10, U256::from(1u8)),
            self.decimals,
            d,
        )
    }
}

impl Rules for Erc20Burn {
    const TASK: TaskId = TaskId::Erc20Burn;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Contract", 20, Self::contract),
            Rule::new("Function Signature & Zero Address", 20, Self::zero_address),
            Rule::new("Token Balance Decrease", 30, Self::burned),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
    }
}

/// `erc20_revoke_approval`: set a spender's allowance back to zero.
#[derive(Clone, Debug)]
pub struct Erc20RevokeApproval {
    token: Address,
    spender: Address,
}

impl Erc20RevokeApproval {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[APPROVE], "ERC20 approve", d);
        if verdict.passed {
            palette::record_args(ctx, APPROVE_ARGS, d);
        }
        verdict
    }

    fn revoked(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let (before, after) = ctx.uint_pair(fields::ALLOWANCE);
        ctx.record(d, fields::ALLOWANCE);
        Verdict::from_bool(
            after.is_zero(),
            format!("Allowance successfully revoked (before: {before}, after: 0)"),
            format!("Allowance not revoked (expected: 0, got: {after})"),
        )
    }
}

impl Rules for Erc20RevokeApproval {
    const TASK: TaskId = TaskId::Erc20RevokeApproval;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Contract", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Allowance Revoked", 30, Self::revoked),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            spender: p.address("spender_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_spender".into(), addr(&self.spender));
    }
}

/// `erc20_transfer_max_amount`: transfer the entire token balance.
#[derive(Clone, Debug)]
pub struct Erc20TransferMaxAmount {
    token: Address,
    to: Address,
    decimals: u8,
}

impl Erc20TransferMaxAmount {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.token, "token contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[TRANSFER], "ERC20 transfer", d);
        if verdict.passed {
            palette::record_args(ctx, TRANSFER_ARGS, d);
            if let Ok(to) = ctx.calldata().address(0) {
                d.insert("recipient_address_correct".into(), (to == self.to).into());
            }
        }
        verdict
    }

    fn maximum(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let before = ctx.before.uint(fields::TOKEN_BALANCE);
        let sent = ctx.decrease(fields::TOKEN_BALANCE);
        d.insert("expected_max_transfer".into(), uint(before));
        d.insert("actual_transferred".into(), uint(sent));
        let tolerance = Tolerance::RelativeOrAbsolute(10, U256::from(1u8));
        Verdict::from_bool(
            tolerance.accepts(sent, before),
            format!(
                "Transferred entire balance: {} tokens",
                format_units(sent, self.decimals)
            ),
            format!(
                "Expected: {} tokens, Transferred: {} tokens",
                format_units(before, self.decimals),
                format_units(sent, self.decimals)
            ),
        )
    }

    fn minimal(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let after = ctx.after.uint(fields::TOKEN_BALANCE);
        let dust = pow10(u32::from(self.decimals.saturating_sub(2))).unwrap_or(U256::ZERO);
        d.insert("balance_after".into(), uint(after));
        d.insert("max_remaining_allowed".into(), uint(dust));
        Verdict::from_bool(
            after <= dust,
            format!(
                "Sender token balance minimal: {} tokens (<= 0.01)",
                format_units(after, self.decimals)
            ),
            format!(
                "Sender balance too high: {} tokens (should be <= 0.01)",
                format_units(after, self.decimals)
            ),
        )
    }
}

impl Rules for Erc20TransferMaxAmount {
    const TASK: TaskId = TaskId::Erc20TransferMaxAmount;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Token Contract", 20, Self::contract),
            Rule::new("Function Signature", 10, Self::signature),
            Rule::new("Maximum Amount Transferred", 20, Self::maximum),
            Rule::new("Sender Balance Minimal", 20, Self::minimal),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            to: p.address("to_address")?,
            decimals: p.decimals("token_decimals")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("expected_token".into(), addr(&self.token));
        d.insert("expected_recipient".into(), addr(&self.to));
    }
}

/// `erc20_transfer_with_callback_1363`: `transferAndCall` on an ERC1363 token.
#[derive(Clone, Debug)]
pub struct Erc1363TransferAndCall {
    token: Address,
    to: Address,
    amount: U256,
    decimals: u8,
}

impl Erc1363TransferAndCall {
    fn sender(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount, Tolerance::Exact, self.decimals, d)
    }

    fn receiver(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_TOKEN_BALANCE,
            self.amount,
            Tolerance::Exact,
            self.decimals,
            d,
        )
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[IERC1363::transferAndCallCall::SELECTOR], "transferAndCall", d)
    }
}

impl Rules for Erc1363TransferAndCall {
    const TASK: TaskId = TaskId::Erc20TransferWithCallback1363;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Sender Token Balance Decrease", 40, Self::sender),
            Rule::new("Receiver Token Balance Increase", 20, Self::receiver),
            Rule::new("Function Selector", 10, Self::function),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            to: p.address("to_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("to_address".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `erc20_approve_and_call_1363`: `approveAndCall` with or without a data payload.
#[derive(Clone, Debug)]
pub struct Erc1363ApproveAndCall {
    token: Address,
    spender: Address,
    amount: U256,
    decimals: u8,
}

impl Erc1363ApproveAndCall {
    /// Both overloads are acceptable.
    pub const SELECTORS: [[u8; 4]; 2] = [
        IERC1363::approveAndCall_0Call::SELECTOR,
        IERC1363::approveAndCall_1Call::SELECTOR,
    ];

    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::ALLOWANCE);
        let after = ctx.after.uint(fields::ALLOWANCE);
        palette::amount(after, self.amount, Tolerance::Exact, self.decimals, "Allowance")
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &Self::SELECTORS, "approveAndCall", d);
        if verdict.passed {
            let version = if ctx.calldata().has_selector(&Self::SELECTORS[..1]) {
                "2-parameter"
            } else {
                "3-parameter"
            };
            return Verdict::pass(format!("Correct approveAndCall selector ({version})"));
        }
        verdict
    }
}

impl Rules for Erc1363ApproveAndCall {
    const TASK: TaskId = TaskId::Erc20ApproveAndCall1363;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Allowance Set Correctly", 50, Self::allowance),
            Rule::new("Function Selector", 20, Self::function),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            spender: p.address("spender_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("spender_address".into(), addr(&self.spender));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `erc20_permit_and_transferfrom`: only the resulting balance movement is judged.
#[derive(Clone, Debug)]
pub struct Erc20PermitAndTransferFrom {
    token: Address,
    owner: Address,
    to: Address,
    amount: U256,
    decimals: u8,
}

impl Erc20PermitAndTransferFrom {
    fn owner(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount, Tolerance::Exact, self.decimals, d)
    }

    fn recipient(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_TOKEN_BALANCE,
            self.amount,
            Tolerance::Exact,
            self.decimals,
            d,
        )
    }
}

impl Rules for Erc20PermitAndTransferFrom {
    const TASK: TaskId = TaskId::Erc20PermitAndTransferfrom;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Owner Token Balance Decrease", 35, Self::owner),
            Rule::new("Recipient Token Balance Increase", 35, Self::recipient),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            owner: p.address("owner_address")?,
            to: p.address("to_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("owner_address".into(), addr(&self.owner));
        d.insert("to_address".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

/// `erc20_permit`: signature based approval.
#[derive(Clone, Debug)]
pub struct Erc20Permit {
    token: Address,
    owner: Address,
    spender: Address,
    value: U256,
    decimals: u8,
}

impl Erc20Permit {
    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        ctx.record(d, fields::ALLOWANCE);
        let after = ctx.after.uint(fields::ALLOWANCE);
        palette::amount(after, self.value, Tolerance::Exact, self.decimals, "Allowance")
            .with_details(json!({ "expected": self.value.to_string(), "actual": after.to_string() }))
    }
}

impl Rules for Erc20Permit {
    const TASK: TaskId = TaskId::Erc20Permit;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 40,
        rules: &[Rule::new("Allowance Set Correctly", 60, Self::allowance)],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            owner: p.address("owner_address")?,
            spender: p.address("spender_address")?,
            value: p.amount("value", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("owner_address".into(), addr(&self.owner));
        d.insert("spender_address".into(), addr(&self.spender));
        d.insert("expected_allowance".into(), uint(self.value));
    }
}

/// `erc20_flashloan`: borrow through the receiver fixture and repay with a fee.
#[derive(Clone, Debug)]
pub struct Erc20Flashloan {
    receiver: Address,
    token: Address,
    amount: U256,
    fee: U256,
    decimals: u8,
}

impl Erc20Flashloan {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.receiver, "flash loan contract", d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(
            ctx,
            &[IFlashLoanReceiver::executeFlashLoanCall::SELECTOR],
            "executeFlashLoan",
            d,
        );
        if verdict.passed {
            palette::record_args(ctx, &[("token", Arg::Address), ("amount", Arg::Uint)], d);
        }
        verdict
    }

    fn fee(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let tolerance = Tolerance::RelativeOrAbsolute(100, U256::from(1u8));
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.fee, tolerance, self.decimals, d)
    }
}

impl Rules for Erc20Flashloan {
    const TASK: TaskId = TaskId::Erc20Flashloan;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::function),
            Rule::new("Fee Payment", 30, Self::fee),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        let amount = p.amount("amount", decimals)?;
        Ok(Self {
            receiver: p.address("flashloan_contract_address")?,
            token: p.address("token_address")?,
            amount,
            fee: percent_of(amount, p.decimal("fee_percentage")?),
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("flashloan_contract".into(), addr(&self.receiver));
        d.insert("token_address".into(), addr(&self.token));
        d.insert("amount".into(), uint(self.amount));
        d.insert("expected_fee".into(), uint(self.fee));
    }
}

/// `erc20_transferfrom_basic`: spend an allowance granted by another holder.
#[derive(Clone, Debug)]
pub struct Erc20TransferFrom {
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
    decimals: u8,
}

impl Erc20TransferFrom {
    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IERC20::transferFromCall::SELECTOR], "transferFrom", d);
        if !verdict.passed {
            return verdict;
        }
        palette::record_args(
            ctx,
            &[("from", Arg::Address), ("to", Arg::Address), ("amount", Arg::Uint)],
            d,
        );
        let call = ctx.calldata();
        let matches = call.address(0).is_ok_and(|a| a == self.from)
            && call.address(1).is_ok_and(|a| a == self.to);
        d.insert("parameters_match".into(), matches.into());
        Verdict::pass("Called transferFrom function")
    }

    fn allowance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::ALLOWANCE, self.amount, Tolerance::ONE_PERCENT, self.decimals, d)
    }

    fn from_balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::decreased_by(ctx, fields::TOKEN_BALANCE, self.amount, Tolerance::ONE_PERCENT, self.decimals, d)
    }

    fn to_balance(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::increased_by(
            ctx,
            fields::TARGET_TOKEN_BALANCE,
            self.amount,
            Tolerance::ONE_PERCENT,
            self.decimals,
            d,
        )
    }
}

impl Rules for Erc20TransferFrom {
    const TASK: TaskId = TaskId::Erc20TransferfromBasic;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 20,
        rules: &[
            Rule::new("Correct Function Called", 20, Self::function),
            Rule::new("Allowance Decreased", 20, Self::allowance),
            Rule::new("From Balance Decreased", 20, Self::from_balance),
            Rule::new("To Balance Increased", 20, Self::to_balance),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        Ok(Self {
            token: p.address("token_address")?,
            from: p.address("from_address")?,
            to: p.address("to_address")?,
            amount: p.amount("amount", decimals)?,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("expected_from".into(), addr(&self.from));
        d.insert("expected_to".into(), addr(&self.to));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use rstest::rstest;

    const UNIT: u64 = 1_000_000_000_000_000_000;

    fn token_params(extra: serde_json::Value) -> Params {
        let mut p = params(json!({
            "token_address": TOKEN_STR,
            "to_address": ALICE_STR,
            "spender_address": BOB_STR,
            "token_decimals": 18
        }));
        p.extend(params(extra));
        p
    }

    fn call(data: Vec<u8>) -> Transaction {
        Transaction {
            to: Some(TOKEN),
            data: data.into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::exact(100 * UNIT, true)]
    #[case::one_wei_short(100 * UNIT - 1, false)]
    fn transfer_fixed_requires_exact_delta(#[case] moved: u64, #[case] full: bool) {
        let v = Erc20Transfer::from_params(&token_params(json!({"amount": "100"}))).unwrap();
        let tx = call(
            IERC20::transferCall {
                to: ALICE,
                amount: U256::from(moved),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 1_000 * UNIT)
            .with(fields::TARGET_TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 1_000 * UNIT - moved)
            .with(fields::TARGET_TOKEN_BALANCE, moved);
        let result = v.validate(&tx, &Receipt::success(52_000, 1), &before, &after);
        let check = result.check("Token Balance Changes").unwrap();
        assert_eq!(check.passed, full, "{}", check.message);
        assert_eq!(result.score, if full { 100 } else { 70 });
        assert_eq!(result.details["decoded_amount"], moved.to_string());
    }

    #[test]
    fn percentage_of_token_balance() {
        let v = Erc20TransferPercentage::from_params(&token_params(json!({"percentage": 25})))
            .unwrap();
        let before = StateSnapshot::new()
            .with(fields::TOKEN_BALANCE, 400u64)
            .with(fields::TARGET_TOKEN_BALANCE, 0u64);
        let run = |moved: u64| {
            let after = StateSnapshot::new()
                .with(fields::TOKEN_BALANCE, 400 - moved)
                .with(fields::TARGET_TOKEN_BALANCE, moved);
            let tx = call(IERC20::transferCall { to: ALICE, amount: U256::from(moved) }.abi_encode());
            v.validate(&tx, &Receipt::success(50_000, 1), &before, &after)
        };
        assert_eq!(run(100).score, 100);
        // 35% instead of 25%.
        let off = run(140);
        assert!(!off.check("Transfer Amount (Percentage)").unwrap().passed);
        assert!(!off.passed);
    }

    #[test]
    fn increase_allowance() {
        let v = Erc20IncreaseAllowance::from_params(&token_params(json!({"added_value": 50})))
            .unwrap();
        let tx = call(
            IERC20::increaseAllowanceCall {
                spender: BOB,
                addedValue: U256::from(50 * UNIT),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, 10 * UNIT)
            .with(fields::TOKEN_BALANCE, UNIT);
        let after = StateSnapshot::new()
            .with(fields::ALLOWANCE, 60 * UNIT)
            .with(fields::TOKEN_BALANCE, UNIT);
        let result = v.validate(&tx, &Receipt::success(30_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["parameters_match"], true);

        let approve = call(IERC20::approveCall { spender: BOB, amount: U256::from(60 * UNIT) }.abi_encode());
        let result = v.validate(&approve, &Receipt::success(30_000, 1), &before, &after);
        assert_eq!(result.score, 80);
        assert!(!result.passed);
    }

    #[test]
    fn decrease_allowance_direction() {
        let v = Erc20DecreaseAllowance::from_params(&token_params(json!({"subtracted_value": "5"})))
            .unwrap();
        let tx = call(
            IERC20::decreaseAllowanceCall {
                spender: BOB,
                subtractedValue: U256::from(5 * UNIT),
            }
            .abi_encode(),
        );
        let high = StateSnapshot::new().with(fields::ALLOWANCE, 10 * UNIT);
        let low = StateSnapshot::new().with(fields::ALLOWANCE, 5 * UNIT);
        assert!(v.validate(&tx, &Receipt::success(30_000, 1), &high, &low).passed);
        assert!(!v.validate(&tx, &Receipt::success(30_000, 1), &low, &high).passed);
    }

    #[test]
    fn burn_needs_zero_recipient() {
        let v = Erc20Burn::from_params(&token_params(json!({"amount": 3}))).unwrap();
        let before = StateSnapshot::new().with(fields::TOKEN_BALANCE, 10 * UNIT);
        let after = StateSnapshot::new().with(fields::TOKEN_BALANCE, 7 * UNIT);
        let burn = call(IERC20::transferCall { to: Address::ZERO, amount: U256::from(3 * UNIT) }.abi_encode());
        assert_eq!(v.validate(&burn, &Receipt::success(30_000, 1), &before, &after).score, 100);
        let misdirected = call(IERC20::transferCall { to: ALICE, amount: U256::from(3 * UNIT) }.abi_encode());
        let result = v.validate(&misdirected, &Receipt::success(30_000, 1), &before, &after);
        assert_eq!(result.score, 80);
        assert!(result.passed);
    }

    #[test]
    fn max_amount_drains_balance() {
        let v = Erc20TransferMaxAmount::from_params(&token_params(json!({}))).unwrap();
        let tx = call(IERC20::transferCall { to: ALICE, amount: U256::from(42 * UNIT) }.abi_encode());
        let before = StateSnapshot::new().with(fields::TOKEN_BALANCE, 42 * UNIT);
        let drained = StateSnapshot::new().with(fields::TOKEN_BALANCE, 0u64);
        let half = StateSnapshot::new().with(fields::TOKEN_BALANCE, 21 * UNIT);
        assert_eq!(v.validate(&tx, &Receipt::success(30_000, 1), &before, &drained).score, 100);
        assert_eq!(v.validate(&tx, &Receipt::success(30_000, 1), &before, &half).score, 60);
    }

    #[rstest]
    #[case::two_args(IERC1363::approveAndCall_0Call { spender: BOB, value: U256::from(7u8) }.abi_encode(), true)]
    #[case::with_data(
        IERC1363::approveAndCall_1Call { spender: BOB, value: U256::from(7u8), data: vec![1, 2, 3].into() }.abi_encode(),
        true
    )]
    #[case::plain_transfer(IERC20::transferCall { to: BOB, amount: U256::from(7u8) }.abi_encode(), false)]
    fn approve_and_call_selector_set(#[case] data: Vec<u8>, #[case] accepted: bool) {
        let v = Erc1363ApproveAndCall::from_params(&token_params(json!({
            "amount": 7,
            "token_decimals": 0
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::ALLOWANCE, 0u64);
        let after = StateSnapshot::new().with(fields::ALLOWANCE, 7u64);
        let result = v.validate(&call(data), &Receipt::success(60_000, 1), &before, &after);
        let check = result.check("Function Selector").unwrap();
        assert_eq!(check.passed, accepted, "{}", check.message);
        assert_eq!(check.points, if accepted { 20 } else { 0 });
    }

    #[test]
    fn flashloan_fee() {
        let v = Erc20Flashloan::from_params(&params(json!({
            "flashloan_contract_address": ALICE_STR,
            "token_address": TOKEN_STR,
            "amount": 1000,
            "token_decimals": 18,
            "fee_percentage": 0.09
        })))
        .unwrap();
        let tx = Transaction {
            to: Some(ALICE),
            data: IFlashLoanReceiver::executeFlashLoanCall {
                token: TOKEN,
                amount: U256::from(1000 * UNIT),
            }
            .abi_encode()
            .into(),
            ..Default::default()
        };
        // 0.09% of 1000 tokens is 0.9 tokens.
        let fee = 9 * UNIT / 10;
        let before = StateSnapshot::new().with(fields::TOKEN_BALANCE, 5 * UNIT);
        let after = StateSnapshot::new().with(fields::TOKEN_BALANCE, 5 * UNIT - fee);
        let result = v.validate(&tx, &Receipt::success(120_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["expected_fee"], "900000000000000000");
    }

    #[test]
    fn transfer_from_moves_allowance_and_balances() {
        let v = Erc20TransferFrom::from_params(&params(json!({
            "token_address": TOKEN_STR,
            "from_address": BOB_STR,
            "to_address": ALICE_STR,
            "amount": 2
        })))
        .unwrap();
        let tx = call(
            IERC20::transferFromCall {
                from: BOB,
                to: ALICE,
                amount: U256::from(2 * UNIT),
            }
            .abi_encode(),
        );
        let before = StateSnapshot::new()
            .with(fields::ALLOWANCE, 5 * UNIT)
            .with(fields::TOKEN_BALANCE, 5 * UNIT)
            .with(fields::TARGET_TOKEN_BALANCE, 0u64);
        let after = StateSnapshot::new()
            .with(fields::ALLOWANCE, 3 * UNIT)
            .with(fields::TOKEN_BALANCE, 3 * UNIT)
            .with(fields::TARGET_TOKEN_BALANCE, 2 * UNIT);
        let result = v.validate(&tx, &Receipt::success(60_000, 1), &before, &after);
        assert_eq!(result.score, 100, "{}", result.feedback);
        assert_eq!(result.details["parameters_match"], true);
    }

    #[test]
    fn permit_sets_allowance() {
        let v = Erc20Permit::from_params(&params(json!({
            "token_address": TOKEN_STR,
            "owner_address": BOB_STR,
            "spender_address": ALICE_STR,
            "value": "12.5"
        })))
        .unwrap();
        let tx = call(Vec::new());
        let before = StateSnapshot::new();
        let after = StateSnapshot::new().with(fields::ALLOWANCE, 12 * UNIT + UNIT / 2);
        assert_eq!(v.validate(&tx, &Receipt::success(80_000, 1), &before, &after).score, 100);
        let short = StateSnapshot::new().with(fields::ALLOWANCE, 12 * UNIT);
        let result = v.validate(&tx, &Receipt::success(80_000, 1), &before, &short);
        assert_eq!(result.score, 40);
    }
}
