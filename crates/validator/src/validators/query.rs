//! Read-only query tasks.
//!
//! The generated code does not send a transaction; its answer arrives as
//! [`Transaction::query_result`](quest_types::Transaction::query_result) and is compared with
//! what the harness read from the chain into `state_before`. Receipts are ignored.

use alloy_primitives::{Address, U256};
use quest_types::{fields, lower_hex, number_quantity, parse_address, parse_quantity};
use serde_json::{Map, Value};

use crate::{
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    units::{abs_diff, format_units, Tolerance},
    ValidatorError,
};

const FORMAT_CHECK: &str = "Return Format Correct";

/// Nonce distance from the reference that is reported, not penalised.
const NONCE_DRIFT: u64 = 10;

fn answer<'a>(ctx: &Ctx<'a>) -> Option<&'a Map<String, Value>> {
    ctx.tx.query_result.as_ref().map(|q| &q.data)
}

/// Every `required` field present in the answer.
fn format(ctx: &Ctx<'_>, required: &[&str], d: &mut Details) -> Verdict {
    let Some(data) = answer(ctx) else {
        return Verdict::fail("No query result returned");
    };
    d.insert(
        "returned_keys".into(),
        data.keys().cloned().map(Value::String).collect(),
    );
    let missing = ctx
        .tx
        .query_result
        .as_ref()
        .map(|q| q.missing_fields(required))
        .unwrap_or_default();
    Verdict::from_bool(
        missing.is_empty(),
        format!("All required fields present: {}", required.join(", ")),
        format!("Missing required fields: {}", missing.join(", ")),
    )
}

/// Integer answer; JSON numbers, decimal and `0x` strings are accepted.
fn returned_uint(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) if n.as_i64().is_some_and(|v| v < 0) => {
            Err(format!("must be non-negative, got {n}"))
        }
        Value::Number(n) => number_quantity(n).map_err(|_| format!("not an integer: {n}")),
        Value::String(s) => parse_quantity(s).map_err(|e| e.to_string()),
        other => Err(format!("unexpected value {other}")),
    }
}

/// Numeric field read from the answer, recorded as `returned_{field}`.
fn answered(ctx: &Ctx<'_>, field: &str, d: &mut Details) -> Result<U256, Verdict> {
    let value = answer(ctx)
        .and_then(|data| data.get(field))
        .ok_or_else(|| Verdict::fail(format!("Field {field:?} missing from query result")))?;
    let parsed =
        returned_uint(value).map_err(|e| Verdict::fail(format!("Failed to parse {field}: {e}")))?;
    d.insert(format!("returned_{field}"), uint(parsed));
    Ok(parsed)
}

/// Chain value for `key`, falling back to the value the task was generated with.
fn reference(ctx: &Ctx<'_>, key: &str, fallback: Option<U256>, d: &mut Details) -> Option<U256> {
    let value = if ctx.before.contains(key) {
        Some(ctx.before.uint(key))
    } else {
        fallback
    };
    if let Some(value) = value {
        d.insert(format!("expected_{key}"), uint(value));
    }
    value
}

/// How a numeric answer is scored against the reference.
#[derive(Clone, Copy, Debug)]
struct Grading {
    tolerance: Tolerance,
    /// Percent difference at which partial credit reaches zero; `None` means all or nothing.
    partial_span: Option<u32>,
    /// Points for the correctness check.
    weight: u32,
}

impl Grading {
    const EXACT: Self = Self { tolerance: Tolerance::Exact, partial_span: None, weight: 0 };

    fn grade(&self, actual: U256, expected: U256, decimals: u8, what: &str, d: &mut Details) -> Verdict {
        let diff_bps = difference_bps(actual, expected);
        d.insert("difference_bps".into(), uint(diff_bps));
        if self.tolerance.accepts(actual, expected) {
            return Verdict::pass(format!("{what}: {actual} ({})", format_units(actual, decimals)));
        }
        let message =
            format!("{what} mismatch - Expected: {expected}, Got: {actual} (diff: {})", percent(diff_bps));
        match self.partial_span {
            Some(span) => {
                let span_bps = u64::from(span) * 100;
                let diff_bps = u64::try_from(diff_bps).unwrap_or(u64::MAX).min(span_bps);
                let points = u64::from(self.weight) * (span_bps - diff_bps) / span_bps;
                Verdict::partial(points as u32, message)
            }
            None => Verdict::fail(message),
        }
    }
}

/// Numeric answer compared with `state_key`.
#[allow(clippy::too_many_arguments)]
fn numeric(
    ctx: &Ctx<'_>,
    field: &str,
    state_key: &str,
    fallback: Option<U256>,
    grading: Grading,
    decimals: u8,
    what: &str,
    d: &mut Details,
) -> Verdict {
    let actual = match answered(ctx, field, d) {
        Ok(actual) => actual,
        Err(verdict) => return verdict,
    };
    match reference(ctx, state_key, fallback, d) {
        Some(expected) => grading.grade(actual, expected, decimals, what, d),
        None => Verdict::fail(format!("No expected {what} available for comparison")),
    }
}

/// `query_bnb_balance`.
#[derive(Clone, Debug)]
pub struct QueryBnbBalance {
    query_address: Address,
}

impl QueryBnbBalance {
    const FIELDS: &'static [&'static str] = &["balance_wei"];

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, Self::FIELDS, d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(ctx, "balance_wei", fields::BALANCE, Some(U256::ZERO), Grading::EXACT, 18, "Balance", d)
    }
}

impl Rules for QueryBnbBalance {
    const TASK: TaskId = TaskId::QueryBnbBalance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Balance Correctness", 40, Self::correct),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self { query_address: p.address("query_address")? })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// `query_erc20_balance`.
#[derive(Clone, Debug)]
pub struct QueryErc20Balance {
    token: Address,
    query_address: Address,
    decimals: u8,
}

impl QueryErc20Balance {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["balance_raw"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "balance_raw",
            fields::TOKEN_BALANCE,
            Some(U256::ZERO),
            Grading::EXACT,
            self.decimals,
            "Balance",
            d,
        )
    }
}

impl Rules for QueryErc20Balance {
    const TASK: TaskId = TaskId::QueryErc20Balance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Balance Correctness", 40, Self::correct),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            query_address: p.address("query_address")?,
            decimals: p.decimals("token_decimals")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// `query_erc20_allowance`.
#[derive(Clone, Debug)]
pub struct QueryErc20Allowance {
    token: Address,
    owner: Address,
    spender: Address,
    decimals: u8,
}

impl QueryErc20Allowance {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["allowance_raw"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "allowance_raw",
            fields::ALLOWANCE,
            Some(U256::ZERO),
            Grading::EXACT,
            self.decimals,
            "Allowance",
            d,
        )
    }
}

impl Rules for QueryErc20Allowance {
    const TASK: TaskId = TaskId::QueryErc20Allowance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Allowance Correctness", 40, Self::correct),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            owner: p.address("owner_address")?,
            spender: p.address("spender_address")?,
            decimals: p.decimals("token_decimals")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("owner_address".into(), addr(&self.owner));
        d.insert("spender_address".into(), addr(&self.spender));
    }
}

/// `query_nft_owner`.
#[derive(Clone, Debug)]
pub struct QueryNftOwner {
    nft: Address,
    token_id: U256,
    expected_owner: Option<Address>,
}

impl QueryNftOwner {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["owner"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let expected = if ctx.before.contains(fields::NFT_OWNER) {
            Some(ctx.before.address(fields::NFT_OWNER))
        } else {
            self.expected_owner
        };
        let Some(expected) = expected else {
            return Verdict::fail("No expected owner available for comparison");
        };
        d.insert("expected_owner".into(), addr(&expected));
        let returned = answer(ctx)
            .and_then(|data| data.get("owner"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        match parse_address(returned) {
            Ok(owner) => {
                d.insert("returned_owner".into(), addr(&owner));
                Verdict::from_bool(
                    owner == expected,
                    format!("NFT owner correct: {}", lower_hex(&owner)),
                    format!(
                        "Owner mismatch - Expected: {}, Got: {}",
                        lower_hex(&expected),
                        lower_hex(&owner)
                    ),
                )
            }
            Err(e) => Verdict::fail(format!("Failed to parse owner address: {e}")),
        }
    }
}

impl Rules for QueryNftOwner {
    const TASK: TaskId = TaskId::QueryNftOwner;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Owner Address Correctness", 30, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            nft: p.address("nft_address")?,
            token_id: p.uint("token_id")?,
            expected_owner: p.opt_address("expected_owner")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("token_id".into(), uint(self.token_id));
    }
}

/// `query_nft_balance`.
#[derive(Clone, Debug)]
pub struct QueryNftBalance {
    nft: Address,
    query_address: Address,
    expected_balance: Option<U256>,
}

impl QueryNftBalance {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["balance"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "balance",
            fields::NFT_BALANCE,
            self.expected_balance,
            Grading::EXACT,
            0,
            "NFT balance",
            d,
        )
    }
}

impl Rules for QueryNftBalance {
    const TASK: TaskId = TaskId::QueryNftBalance;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Balance Correctness", 30, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            nft: p.address("nft_address")?,
            query_address: p.address("query_address")?,
            expected_balance: if p.has("expected_balance") {
                Some(p.uint("expected_balance")?)
            } else {
                None
            },
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// `query_token_total_supply`: 0.1% tolerance, partial credit up to a 10% miss.
#[derive(Clone, Debug)]
pub struct QueryTokenTotalSupply {
    token: Address,
    decimals: u8,
    symbol: Option<String>,
}

impl QueryTokenTotalSupply {
    const GRADING: Grading = Grading {
        tolerance: Tolerance::TENTH_PERCENT,
        partial_span: Some(10),
        weight: 30,
    };

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["totalSupply"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "totalSupply",
            fields::TOKEN_TOTAL_SUPPLY,
            None,
            Self::GRADING,
            self.decimals,
            "Total supply",
            d,
        )
    }
}

impl Rules for QueryTokenTotalSupply {
    const TASK: TaskId = TaskId::QueryTokenTotalSupply;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Total Supply Correctness", 30, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            decimals: p.decimals("token_decimals")?,
            symbol: if p.has("token_symbol") { Some(p.string("token_symbol")?) } else { None },
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        if let Some(symbol) = &self.symbol {
            d.insert("token_symbol".into(), symbol.clone().into());
        }
    }
}

/// `query_staked_amount`: 1% tolerance, partial credit up to a 10% miss.
#[derive(Clone, Debug)]
pub struct QueryStakedAmount {
    pool: Address,
    query_address: Address,
    expected_amount: Option<U256>,
    decimals: u8,
}

impl QueryStakedAmount {
    const GRADING: Grading = Grading {
        tolerance: Tolerance::ONE_PERCENT,
        partial_span: Some(10),
        weight: 40,
    };

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["staked_amount", "deposit_time"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "staked_amount",
            fields::STAKED_AMOUNT,
            self.expected_amount,
            Self::GRADING,
            self.decimals,
            "Staked amount",
            d,
        )
    }
}

impl Rules for QueryStakedAmount {
    const TASK: TaskId = TaskId::QueryStakedAmount;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Staked Amount Correctness", 40, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_decimals")?;
        let expected_amount = if p.has("expected_staked_amount") {
            Some(p.amount("expected_staked_amount", decimals)?)
        } else {
            None
        };
        Ok(Self {
            pool: p.address("pool_address")?,
            query_address: p.address("query_address")?,
            expected_amount,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// `query_pending_rewards`: rewards accrue per block, so 5% tolerance and a 20% partial span.
#[derive(Clone, Debug)]
pub struct QueryPendingRewards {
    pool: Address,
    query_address: Address,
    expected_rewards: Option<U256>,
    decimals: u8,
}

impl QueryPendingRewards {
    const GRADING: Grading = Grading {
        tolerance: Tolerance::FIVE_PERCENT,
        partial_span: Some(20),
        weight: 40,
    };

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["pending_rewards"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        numeric(
            ctx,
            "pending_rewards",
            fields::PENDING_REWARDS,
            self.expected_rewards,
            Self::GRADING,
            self.decimals,
            "Pending rewards",
            d,
        )
    }
}

impl Rules for QueryPendingRewards {
    const TASK: TaskId = TaskId::QueryPendingRewards;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Pending Rewards Correctness", 40, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("reward_token_decimals")?;
        let expected_rewards = if p.has("expected_pending_rewards") {
            Some(p.amount("expected_pending_rewards", decimals)?)
        } else {
            None
        };
        Ok(Self {
            pool: p.address("pool_address")?,
            query_address: p.address("query_address")?,
            expected_rewards,
            decimals,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pool_address".into(), addr(&self.pool));
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// `query_transaction_count_nonce`.
#[derive(Clone, Debug)]
pub struct QueryTransactionCountNonce {
    query_address: Address,
}

impl QueryTransactionCountNonce {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["nonce"], d)
    }

    fn valid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let nonce = match answered(ctx, "nonce", d) {
            Ok(nonce) => nonce,
            Err(verdict) => return verdict,
        };
        let mut notes = Vec::new();
        if ctx.before.contains(fields::REFERENCE_NONCE) {
            let reference = ctx.before.uint(fields::REFERENCE_NONCE);
            d.insert("reference_nonce".into(), uint(reference));
            let drift = abs_diff(nonce, reference);
            if drift > U256::from(NONCE_DRIFT) {
                notes.push(format!("differs from reference by {drift}"));
            }
            let data = answer(ctx);
            let pending = data.and_then(|m| m.get("nonce_pending")).map(returned_uint);
            let latest = data.and_then(|m| m.get("nonce_latest")).map(returned_uint);
            if let (Some(Ok(pending)), Some(Ok(latest))) = (pending, latest) {
                if pending < latest {
                    notes.push("pending nonce should be >= latest nonce".to_string());
                } else {
                    notes.push(format!("pending {pending} and latest {latest} provided"));
                }
            }
        }
        let mut message = format!("Nonce is valid: {nonce}");
        if !notes.is_empty() {
            message = format!("{message} ({})", notes.join("; "));
        }
        Verdict::pass(message)
    }
}

impl Rules for QueryTransactionCountNonce {
    const TASK: TaskId = TaskId::QueryTransactionCountNonce;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Nonce Validity", 30, Self::valid),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self { query_address: p.address("query_address")? })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("query_address".into(), addr(&self.query_address));
    }
}

/// Address answer; the shorthand `0x0` reads as the zero address.
fn returned_address(value: &str) -> Result<Address, String> {
    let trimmed = value.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(digits) if !digits.is_empty() && digits.len() < 40 && digits.bytes().all(|b| b == b'0') => {
            Ok(Address::ZERO)
        }
        _ => parse_address(trimmed).map_err(|e| e.to_string()),
    }
}

/// Integer list answer; a JSON encoded list in a string is accepted too.
fn returned_uints(value: &Value) -> Result<Vec<U256>, String> {
    match value {
        Value::Array(items) => items.iter().map(returned_uint).collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(list @ Value::Array(_)) => returned_uints(&list),
            _ => Err(format!("expected a list, got {s:?}")),
        },
        other => Err(format!("expected a list, got {other}")),
    }
}

/// Relative difference in basis points; any miss against a zero reference counts as 100%.
fn difference_bps(actual: U256, expected: U256) -> U256 {
    if expected.is_zero() {
        if actual.is_zero() { U256::ZERO } else { U256::from(10_000u64) }
    } else {
        abs_diff(actual, expected).saturating_mul(U256::from(10_000u64)) / expected
    }
}

fn percent(bps: U256) -> String {
    format!("{}.{:02}%", bps / U256::from(100u64), bps % U256::from(100u64))
}

fn clip(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Points kept when a quoted amount is only within tolerance of the chain value.
const WITHIN_TOLERANCE_POINTS: u32 = 35;

/// `query_nft_approval_status`.
#[derive(Clone, Debug)]
pub struct QueryNftApprovalStatus {
    nft: Address,
    symbol: Option<String>,
    token_id: U256,
    expected_approved: Address,
}

impl QueryNftApprovalStatus {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["approved_address"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let Some(returned) = answer(ctx).and_then(|data| data.get("approved_address")) else {
            return Verdict::fail("Field \"approved_address\" missing from query result");
        };
        let returned = match returned.as_str().map(returned_address) {
            Some(Ok(address)) => address,
            Some(Err(e)) => return Verdict::fail(format!("Failed to parse approved_address: {e}")),
            None => return Verdict::fail(format!("approved_address must be a string, got {returned}")),
        };
        let actual = ctx.before.address(fields::APPROVED_ADDRESS);
        d.insert("returned_approved_address".into(), addr(&returned));
        d.insert("actual_approved_address".into(), addr(&actual));
        Verdict::from_bool(
            returned == self.expected_approved && returned == actual,
            format!(
                "Expected: {}, Got: {}",
                lower_hex(&self.expected_approved),
                lower_hex(&returned)
            ),
            format!(
                "Expected: {}, Got: {}, Actual: {}",
                lower_hex(&self.expected_approved),
                lower_hex(&returned),
                lower_hex(&actual)
            ),
        )
    }
}

impl Rules for QueryNftApprovalStatus {
    const TASK: TaskId = TaskId::QueryNftApprovalStatus;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Approval Correctness", 40, Self::correct),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            nft: p.address("nft_address")?,
            symbol: if p.has("nft_symbol") { Some(p.string("nft_symbol")?) } else { None },
            token_id: p.uint("token_id")?,
            expected_approved: p.address("expected_approved_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("token_id".into(), uint(self.token_id));
        d.insert("expected_approved_address".into(), addr(&self.expected_approved));
        if let Some(symbol) = &self.symbol {
            d.insert("nft_symbol".into(), symbol.clone().into());
        }
    }
}

/// `query_pair_reserves`: exact reserves earn full credit, reserves within 1% still pass.
#[derive(Clone, Debug)]
pub struct QueryPairReserves {
    pair: Address,
    token0: Address,
    token1: Address,
}

impl QueryPairReserves {
    const FIELDS: &'static [&'static str] = &["reserve0", "reserve1", "blockTimestampLast"];

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, Self::FIELDS, d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let mut returned = [U256::ZERO; 3];
        for (slot, field) in returned.iter_mut().zip(Self::FIELDS) {
            match answered(ctx, field, d) {
                Ok(value) => *slot = value,
                Err(verdict) => return verdict,
            }
        }
        let actual = [
            ctx.before.uint(fields::RESERVE0),
            ctx.before.uint(fields::RESERVE1),
            ctx.before.uint(fields::BLOCK_TIMESTAMP_LAST),
        ];
        for (field, value) in Self::FIELDS.iter().zip(actual) {
            d.insert(format!("expected_{field}"), uint(value));
        }
        let [r0, r1, ts] = returned;
        let [a0, a1, ats] = actual;
        if returned == actual {
            return Verdict::pass(format!("Reserve0: {r0}, Reserve1: {r1}, Timestamp: {ts}"));
        }
        if Tolerance::ONE_PERCENT.accepts(r0, a0) && Tolerance::ONE_PERCENT.accepts(r1, a1) {
            return Verdict::reduced(
                WITHIN_TOLERANCE_POINTS,
                format!("Reserves are within tolerance. Expected: ({a0}, {a1}), Got: ({r0}, {r1})"),
            );
        }
        Verdict::fail(format!("Expected: ({a0}, {a1}, {ats}), Got: ({r0}, {r1}, {ts})"))
    }
}

impl Rules for QueryPairReserves {
    const TASK: TaskId = TaskId::QueryPairReserves;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Reserves Correctness", 40, Self::correct),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            pair: p.address("pair_address")?,
            token0: p.address("token0_address")?,
            token1: p.address("token1_address")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("pair_address".into(), addr(&self.pair));
        d.insert("token0_address".into(), addr(&self.token0));
        d.insert("token1_address".into(), addr(&self.token1));
    }
}

/// `query_swap_output_amount`: the last `getAmountsOut` entry against the router's quote.
#[derive(Clone, Debug)]
pub struct QuerySwapOutputAmount {
    router: Address,
    token_in: Address,
    token_out: Address,
    amount_in: U256,
}

impl QuerySwapOutputAmount {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["amounts"], d)
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let Some(value) = answer(ctx).and_then(|data| data.get("amounts")) else {
            return Verdict::fail("Field \"amounts\" missing from query result");
        };
        let returned = match returned_uints(value) {
            Ok(amounts) => amounts,
            Err(e) => return Verdict::fail(format!("Failed to parse amounts array: {e}")),
        };
        let expected = ctx.before.uints(fields::EXPECTED_AMOUNTS);
        d.insert("returned_amounts".into(), returned.iter().copied().map(uint).collect());
        d.insert("expected_amounts".into(), expected.iter().copied().map(uint).collect());
        if returned.len() != expected.len() {
            return Verdict::fail(format!(
                "Amounts array length mismatch. Expected {}, got {}",
                expected.len(),
                returned.len()
            ));
        }
        let (Some(&want), Some(&got)) = (expected.last(), returned.last()) else {
            return Verdict::fail("Could not verify output amount (no reference amounts available)");
        };
        if got == want {
            Verdict::pass(format!("Output amount: {got} (matches expected)"))
        } else if Tolerance::ONE_PERCENT.accepts(got, want) {
            Verdict::reduced(
                WITHIN_TOLERANCE_POINTS,
                format!("Output amount within tolerance. Expected: {want}, Got: {got}"),
            )
        } else {
            Verdict::fail(format!("Output amount mismatch - Expected: {want}, Got: {got}"))
        }
    }
}

impl Rules for QuerySwapOutputAmount {
    const TASK: TaskId = TaskId::QuerySwapOutputAmount;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Output Amount Correctness", 40, Self::correct),
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
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_in_address".into(), addr(&self.token_in));
        d.insert("token_out_address".into(), addr(&self.token_out));
        d.insert("amount_in".into(), uint(self.amount_in));
    }
}

/// `query_swap_input_amount`: both ends of `getAmountsIn` within 1%, partial credit up to a 10% miss.
#[derive(Clone, Debug)]
pub struct QuerySwapInputAmount {
    router: Address,
    token_in: Address,
    token_out: Address,
    amount_out: U256,
    expected_amounts: Option<Vec<U256>>,
}

impl QuerySwapInputAmount {
    const WEIGHT: u32 = 40;
    /// Percent difference, in basis points, at which partial credit reaches zero.
    const PARTIAL_SPAN_BPS: u64 = 1_000;

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["amounts", "amount_in", "amount_out"], d)
    }

    /// `(amount_in, amount_out)` from the amounts list, or from the scalar fields.
    fn returned(ctx: &Ctx<'_>) -> Result<(U256, U256), String> {
        let data = answer(ctx).ok_or("no query result")?;
        if let Some(amounts) = data.get("amounts").and_then(|v| returned_uints(v).ok()) {
            if let [first, .., last] = amounts[..] {
                return Ok((first, last));
            }
        }
        let scalar = |field: &str| data.get(field).map(returned_uint).unwrap_or(Ok(U256::ZERO));
        Ok((scalar("amount_in")?, scalar("amount_out")?))
    }

    fn correct(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let expected = if ctx.before.contains(fields::EXPECTED_AMOUNTS) {
            ctx.before.uints(fields::EXPECTED_AMOUNTS)
        } else {
            self.expected_amounts.clone().unwrap_or_default()
        };
        let (Some(&want_in), Some(&want_out)) = (expected.first(), expected.last()) else {
            return Verdict::fail("No expected amounts available for comparison");
        };
        let (got_in, got_out) = match Self::returned(ctx) {
            Ok(pair) => pair,
            Err(e) => return Verdict::fail(format!("Failed to parse amounts: {e}")),
        };
        d.insert("returned_amount_in".into(), uint(got_in));
        d.insert("returned_amount_out".into(), uint(got_out));
        d.insert("expected_amount_in".into(), uint(want_in));
        d.insert("expected_amount_out".into(), uint(want_out));

        // A zero reference is not compared.
        let bps = |got, want: U256| if want.is_zero() { U256::ZERO } else { difference_bps(got, want) };
        let in_bps = bps(got_in, want_in);
        let out_bps = bps(got_out, want_out);
        let one_percent = U256::from(100u64);
        if in_bps <= one_percent && out_bps <= one_percent {
            return Verdict::pass(format!("Input amount: {got_in}, Output amount: {got_out}"));
        }
        let message = format!(
            "Amount mismatch - Expected input: {want_in}, Got: {got_in} (diff: {}); \
             Expected output: {want_out}, Got: {got_out} (diff: {})",
            percent(in_bps),
            percent(out_bps)
        );
        let closest = u64::try_from(in_bps.min(out_bps)).unwrap_or(u64::MAX).min(Self::PARTIAL_SPAN_BPS);
        let points = u64::from(Self::WEIGHT) * (Self::PARTIAL_SPAN_BPS - closest) / Self::PARTIAL_SPAN_BPS;
        Verdict::partial(points as u32, message)
    }
}

impl Rules for QuerySwapInputAmount {
    const TASK: TaskId = TaskId::QuerySwapInputAmount;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 30,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Input Amount Correctness", Self::WEIGHT, Self::correct),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        let decimals = p.decimals("token_out_decimals")?;
        Ok(Self {
            router: p.address("router_address")?,
            token_in: p.address("token_in_address")?,
            token_out: p.address("token_out_address")?,
            amount_out: p.amount("amount_out", decimals)?,
            expected_amounts: p.opt_uints("expected_amounts")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("router_address".into(), addr(&self.router));
        d.insert("token_in_address".into(), addr(&self.token_in));
        d.insert("token_out_address".into(), addr(&self.token_out));
        d.insert("amount_out".into(), uint(self.amount_out));
    }
}

/// `query_token_metadata`: name, symbol and decimals scored separately.
#[derive(Clone, Debug)]
pub struct QueryTokenMetadata {
    token: Address,
    name: String,
    symbol: String,
    decimals: u8,
}

impl QueryTokenMetadata {
    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = format(ctx, &["name", "symbol", "decimals", "totalSupply"], d);
        // Total supply is reported, never scored.
        if ctx.before.contains(fields::TOKEN_TOTAL_SUPPLY) {
            let supply = answer(ctx).and_then(|data| data.get("totalSupply")).map(returned_uint);
            if let Some(Ok(supply)) = supply {
                let expected = ctx.before.uint(fields::TOKEN_TOTAL_SUPPLY);
                d.insert("returned_totalSupply".into(), uint(supply));
                d.insert("total_supply_matches".into(), (supply == expected).into());
            }
        }
        verdict
    }

    fn text_field(&self, ctx: &Ctx<'_>, field: &str, key: &str, fallback: &str, what: &str) -> Verdict {
        let expected = if ctx.before.contains(key) {
            ctx.before.text(key).into_owned()
        } else {
            fallback.to_string()
        };
        let returned = answer(ctx).and_then(|data| data.get(field));
        match returned.and_then(Value::as_str) {
            Some(got) if got == expected => Verdict::pass(format!("Token {what} correct: {got}")),
            Some(got) => Verdict::fail(format!("{what} mismatch - Expected: {expected}, Got: {got}")),
            None => Verdict::fail(format!(
                "{what} mismatch - Expected: {expected}, Got: {}",
                returned.map(Value::to_string).unwrap_or_default()
            )),
        }
    }

    fn name(&self, ctx: &Ctx<'_>, _: &mut Details) -> Verdict {
        self.text_field(ctx, "name", fields::TOKEN_NAME, &self.name, "name")
    }

    fn symbol(&self, ctx: &Ctx<'_>, _: &mut Details) -> Verdict {
        self.text_field(ctx, "symbol", fields::TOKEN_SYMBOL, &self.symbol, "symbol")
    }

    fn decimals(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let expected = if ctx.before.contains(fields::TOKEN_DECIMALS) {
            ctx.before.uint(fields::TOKEN_DECIMALS)
        } else {
            U256::from(self.decimals)
        };
        let returned = match answered(ctx, "decimals", d) {
            Ok(returned) => returned,
            Err(verdict) => return verdict,
        };
        Verdict::from_bool(
            returned == expected,
            format!("Token decimals correct: {returned}"),
            format!("Decimals mismatch - Expected: {expected}, Got: {returned}"),
        )
    }
}

impl Rules for QueryTokenMetadata {
    const TASK: TaskId = TaskId::QueryTokenMetadata;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 25,
        rules: &[
            Rule::new(FORMAT_CHECK, 25, Self::format),
            Rule::new("Name Correctness", 15, Self::name),
            Rule::new("Symbol Correctness", 15, Self::symbol),
            Rule::new("Decimals Correctness", 20, Self::decimals),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            token: p.address("token_address")?,
            name: p.string("expected_name")?,
            symbol: p.string("expected_symbol")?,
            decimals: p.decimals("expected_decimals")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("token_address".into(), addr(&self.token));
        d.insert("expected_name".into(), self.name.clone().into());
        d.insert("expected_symbol".into(), self.symbol.clone().into());
        d.insert("expected_decimals".into(), self.decimals.into());
    }
}

/// `query_nft_token_uri`: any non-empty URI passes unless the harness read the real one.
#[derive(Clone, Debug)]
pub struct QueryNftTokenUri {
    nft: Address,
    token_id: U256,
}

impl QueryNftTokenUri {
    const SHOWN_CHARS: usize = 100;

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["tokenURI"], d)
    }

    fn valid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let returned = answer(ctx).and_then(|data| data.get("tokenURI"));
        let uri = match returned.and_then(Value::as_str) {
            Some(uri) if !uri.is_empty() => uri,
            _ => {
                return Verdict::fail(format!(
                    "Token URI must be a non-empty string, got: {}",
                    returned.map(Value::to_string).unwrap_or_else(|| "nothing".into())
                ))
            }
        };
        d.insert("returned_token_uri".into(), uri.into());
        if !ctx.before.contains(fields::TOKEN_URI) {
            return Verdict::pass(format!(
                "Token URI is valid non-empty string: {}",
                clip(uri, Self::SHOWN_CHARS)
            ));
        }
        let expected = ctx.before.text(fields::TOKEN_URI);
        Verdict::from_bool(
            uri == expected,
            format!("Token URI correct: {}", clip(uri, Self::SHOWN_CHARS)),
            format!("Token URI mismatch - Expected: {}, Got: {}", clip(&expected, 50), clip(uri, 50)),
        )
    }
}

impl Rules for QueryNftTokenUri {
    const TASK: TaskId = TaskId::QueryNftTokenUri;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Token URI Format Validation", 30, Self::valid),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self { nft: p.address("nft_address")?, token_id: p.uint("token_id")? })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("token_id".into(), uint(self.token_id));
    }
}

/// `query_current_block_number`: positive and within 100 blocks of the harness reading.
#[derive(Clone, Copy, Debug)]
pub struct QueryCurrentBlockNumber;

impl QueryCurrentBlockNumber {
    const MAX_DRIFT: u64 = 100;

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, &["block_number"], d)
    }

    fn valid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let block = match answered(ctx, "block_number", d) {
            Ok(block) => block,
            Err(verdict) => return verdict,
        };
        let reference = ctx.before.uint(fields::REFERENCE_BLOCK_NUMBER);
        if block.is_zero() {
            return Verdict::fail(format!("Block number must be positive, got: {block}"));
        }
        if !reference.is_zero() {
            d.insert("reference_block_number".into(), uint(reference));
            if abs_diff(block, reference) > U256::from(Self::MAX_DRIFT) {
                return Verdict::fail(format!(
                    "Block number seems incorrect - Expected around {reference}, Got: {block}"
                ));
            }
        }
        Verdict::pass(format!("Block number is valid: {block}"))
    }
}

impl Rules for QueryCurrentBlockNumber {
    const TASK: TaskId = TaskId::QueryCurrentBlockNumber;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 50,
        rules: &[
            Rule::new(FORMAT_CHECK, 25, Self::format),
            Rule::new("Block Number Validity", 25, Self::valid),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(_: &Params) -> Result<Self, ValidatorError> {
        Ok(Self)
    }
}

/// `query_gas_price`: EIP-1559 fee cap and tip.
#[derive(Clone, Copy, Debug)]
pub struct QueryGasPrice;

impl QueryGasPrice {
    const FIELDS: &'static [&'static str] = &["maxFeePerGas", "maxPriorityFeePerGas"];
    const GWEI_DECIMALS: u8 = 9;

    fn format(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        format(ctx, Self::FIELDS, d)
    }

    fn valid(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        // Absent fields read as zero.
        let read = |field: &str| {
            answer(ctx)
                .and_then(|data| data.get(field))
                .map(returned_uint)
                .unwrap_or(Ok(U256::ZERO))
        };
        let (max_fee, tip) = match (read("maxFeePerGas"), read("maxPriorityFeePerGas")) {
            (Ok(max_fee), Ok(tip)) => (max_fee, tip),
            (Err(e), _) | (_, Err(e)) => return Verdict::fail(format!("Failed to parse gas prices: {e}")),
        };
        d.insert("returned_max_fee_per_gas".into(), uint(max_fee));
        d.insert("returned_max_priority_fee_per_gas".into(), uint(tip));

        let mut problems = Vec::new();
        if max_fee.is_zero() {
            problems.push("maxFeePerGas must be positive".to_string());
        }
        if max_fee < tip {
            problems.push("maxFeePerGas should be >= maxPriorityFeePerGas".to_string());
        }
        if !problems.is_empty() {
            return Verdict::fail(problems.join("; "));
        }

        let gwei = |v| format_units(v, Self::GWEI_DECIMALS);
        let mut notes = Vec::new();
        let one_gwei = U256::from(1_000_000_000u64);
        if max_fee < one_gwei || max_fee > one_gwei * U256::from(1_000u64) {
            notes.push(format!("maxFeePerGas seems unusual: {} Gwei", gwei(max_fee)));
        }
        let reference = ctx.before.uint(fields::REFERENCE_MAX_FEE_PER_GAS);
        if !reference.is_zero() {
            d.insert("reference_max_fee_per_gas".into(), uint(reference));
            let ten = U256::from(10u64);
            if max_fee > reference.saturating_mul(ten) || max_fee.saturating_mul(ten) < reference {
                notes.push("maxFeePerGas differs significantly from reference".to_string());
            }
        }
        let mut message = format!(
            "Gas prices are valid - maxFeePerGas: {} Gwei, maxPriorityFeePerGas: {} Gwei",
            gwei(max_fee),
            gwei(tip)
        );
        if !notes.is_empty() {
            message = format!("{message} ({})", notes.join("; "));
        }
        Verdict::pass(message)
    }
}

impl Rules for QueryGasPrice {
    const TASK: TaskId = TaskId::QueryGasPrice;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Query,
        gate_weight: 40,
        rules: &[
            Rule::new(FORMAT_CHECK, 30, Self::format),
            Rule::new("Gas Price Validity", 30, Self::valid),
        ],
        pass: PassRule::THRESHOLD_60,
    };

    fn from_params(_: &Params) -> Result<Self, ValidatorError> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Validator, test_utils::*};
    use quest_types::{QueryResult, Receipt, StateSnapshot, Transaction};
    use rstest::rstest;
    use serde_json::json;

    fn query(data: Value) -> Transaction {
        let Value::Object(data) = data else { panic!("object expected") };
        Transaction {
            query_result: Some(QueryResult::ok(data)),
            ..Default::default()
        }
    }

    #[test]
    fn failed_query_short_circuits() {
        let v = QueryBnbBalance::from_params(&params(json!({"query_address": ALICE_STR}))).unwrap();
        let tx = Transaction {
            query_result: Some(QueryResult {
                success: false,
                error: Some("rpc timeout".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = v.validate(&tx, &Receipt::default(), &StateSnapshot::new(), &StateSnapshot::new());
        assert_eq!(result.score, 0);
        assert_eq!(result.checks.len(), 1);
        assert!(result.checks[0].message.contains("rpc timeout"));
    }

    #[test]
    fn bnb_balance_exact() {
        let v = QueryBnbBalance::from_params(&params(json!({"query_address": ALICE_STR}))).unwrap();
        let before = StateSnapshot::new().with(fields::BALANCE, 1_500u64);
        let receipt = Receipt::default();
        let ok = v.validate(&query(json!({"balance_wei": "1500", "balance_bnb": "0.0"})), &receipt, &before, &before);
        assert_eq!(ok.score, 100);
        let hex = v.validate(&query(json!({"balance_wei": "0x5dc"})), &receipt, &before, &before);
        assert!(hex.passed);
        let off = v.validate(&query(json!({"balance_wei": 1_499})), &receipt, &before, &before);
        assert_eq!(off.score, 60);
        assert!(!off.passed);
    }

    #[rstest]
    #[case::within_tolerance("1000500", 100)]
    #[case::one_percent_off("1010000", 97)]
    #[case::five_percent_off("1050000", 85)]
    #[case::beyond_span("1200000", 70)]
    fn total_supply_partial_credit(#[case] returned: &str, #[case] score: u32) {
        let v = QueryTokenTotalSupply::from_params(&params(json!({"token_address": TOKEN_STR}))).unwrap();
        let before = StateSnapshot::new().with(fields::TOKEN_TOTAL_SUPPLY, 1_000_000u64);
        let result = v.validate(&query(json!({"totalSupply": returned})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert!(result.passed);
    }

    #[test]
    fn total_supply_without_reference_fails_check() {
        let v = QueryTokenTotalSupply::from_params(&params(json!({"token_address": TOKEN_STR}))).unwrap();
        let empty = StateSnapshot::new();
        let result = v.validate(&query(json!({"totalSupply": "1"})), &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, 70);
        assert!(!result.check("Total Supply Correctness").unwrap().passed);
    }

    #[test]
    fn pending_rewards_wider_span() {
        let v = QueryPendingRewards::from_params(&params(json!({
            "pool_address": ROUTER_STR,
            "query_address": ALICE_STR
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::PENDING_REWARDS, 1_000u64);
        let result = v.validate(&query(json!({"pending_rewards": "1040"})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, 100);
        // 10% off: half the span, half the points.
        let result = v.validate(&query(json!({"pending_rewards": "1100"})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, 80);
    }

    #[test]
    fn staked_amount_falls_back_to_param() {
        let v = QueryStakedAmount::from_params(&params(json!({
            "pool_address": ROUTER_STR,
            "query_address": ALICE_STR,
            "expected_staked_amount": "2.5"
        })))
        .unwrap();
        let empty = StateSnapshot::new();
        let tx = query(json!({"staked_amount": "2500000000000000000", "deposit_time": 0}));
        assert_eq!(v.validate(&tx, &Receipt::default(), &empty, &empty).score, 100);
        let tx = query(json!({"staked_amount": "2500000000000000000"}));
        let result = v.validate(&tx, &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, 70);
        assert!(result.passed);
    }

    #[test]
    fn nft_owner_ignores_case() {
        let v = QueryNftOwner::from_params(&params(json!({
            "nft_address": TOKEN_STR,
            "token_id": 7,
            "expected_owner": ALICE_STR
        })))
        .unwrap();
        let empty = StateSnapshot::new();
        let tx = query(json!({"owner": ALICE_STR.to_uppercase().replacen("0X", "0x", 1)}));
        assert_eq!(v.validate(&tx, &Receipt::default(), &empty, &empty).score, 100);
        let tx = query(json!({"owner": BOB_STR}));
        let result = v.validate(&tx, &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, 70);
        assert!(result.passed);
    }

    #[rstest]
    #[case::number(json!({"nonce": 12}), 100)]
    #[case::string(json!({"nonce": "12", "nonce_pending": 13, "nonce_latest": 12}), 100)]
    #[case::negative(json!({"nonce": -1}), 70)]
    #[case::garbage(json!({"nonce": "twelve"}), 70)]
    #[case::missing(json!({"count": 12}), 40)]
    fn nonce(#[case] data: Value, #[case] score: u32) {
        let v = QueryTransactionCountNonce::from_params(&params(json!({"query_address": ALICE_STR}))).unwrap();
        let before = StateSnapshot::new().with(fields::REFERENCE_NONCE, 12u64);
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
    }

    #[test]
    fn erc20_balance_beyond_u64() {
        let v = QueryErc20Balance::from_params(&params(json!({
            "token_address": TOKEN_STR,
            "query_address": ALICE_STR
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::TOKEN_BALANCE, U256::from(25_000_000_000_000_000_000u128));
        let data: Value = serde_json::from_str(r#"{"balance_raw": 25000000000000000000}"#).unwrap();
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, 100, "{}", result.feedback);
    }

    #[rstest]
    #[case::matches(BOB_STR, BOB_STR, 100)]
    #[case::wrong_operator(BOB_STR, ALICE_STR, 60)]
    #[case::zero_shorthand("0x0000000000000000000000000000000000000000", "0x0", 100)]
    fn nft_approval_status(#[case] approved: &str, #[case] returned: &str, #[case] score: u32) {
        let v = QueryNftApprovalStatus::from_params(&params(json!({
            "nft_address": TOKEN_STR,
            "token_id": 3,
            "expected_approved_address": approved
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::APPROVED_ADDRESS, parse_address(approved).unwrap());
        let result = v.validate(&query(json!({"approved_address": returned})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert_eq!(result.passed, score == 100);
    }

    #[rstest]
    #[case::exact("1000000", "2000000", 100)]
    #[case::within_one_percent("1005000", "1990000", 95)]
    #[case::stale("1100000", "2000000", 60)]
    fn pair_reserves(#[case] reserve0: &str, #[case] reserve1: &str, #[case] score: u32) {
        let v = QueryPairReserves::from_params(&params(json!({
            "pair_address": POOL_STR,
            "token0_address": TOKEN_STR,
            "token1_address": BOB_STR
        })))
        .unwrap();
        let before = StateSnapshot::new()
            .with(fields::RESERVE0, 1_000_000u64)
            .with(fields::RESERVE1, 2_000_000u64)
            .with(fields::BLOCK_TIMESTAMP_LAST, 1_700_000_000u64);
        let data = json!({"reserve0": reserve0, "reserve1": reserve1, "blockTimestampLast": 1_700_000_000u64});
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert_eq!(result.passed, score > 60);
    }

    #[rstest]
    #[case::exact(json!(["1000000000000000000", "2000"]), 100)]
    #[case::encoded_list(json!("[\"1000000000000000000\", 1990]"), 95)]
    #[case::short_list(json!(["2000"]), 60)]
    #[case::not_a_list(json!("2000"), 60)]
    fn swap_output_amount(#[case] amounts: Value, #[case] score: u32) {
        let v = QuerySwapOutputAmount::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_in_address": TOKEN_STR,
            "token_out_address": BOB_STR,
            "amount_in": "1"
        })))
        .unwrap();
        let before = StateSnapshot::new().with(
            fields::EXPECTED_AMOUNTS,
            vec![U256::from(1_000_000_000_000_000_000u64), U256::from(2_000u64)],
        );
        let result = v.validate(&query(json!({"amounts": amounts})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
    }

    #[test]
    fn swap_output_without_quote() {
        let v = QuerySwapOutputAmount::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_in_address": TOKEN_STR,
            "token_out_address": BOB_STR,
            "amount_in": "1"
        })))
        .unwrap();
        let empty = StateSnapshot::new();
        let result = v.validate(&query(json!({"amounts": []})), &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, 60);
        assert!(result.check("Output Amount Correctness").unwrap().message.contains("Could not verify"));
    }

    #[rstest]
    #[case::exact(json!([1000, 500]), 100)]
    #[case::five_percent_off(json!([1050, 550]), 80)]
    #[case::far_off(json!([2000, 1000]), 60)]
    fn swap_input_amount(#[case] amounts: Value, #[case] score: u32) {
        let v = QuerySwapInputAmount::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_in_address": TOKEN_STR,
            "token_out_address": BOB_STR,
            "amount_out": "0.0000000000000005",
            "expected_amounts": [1000, 500]
        })))
        .unwrap();
        let empty = StateSnapshot::new();
        let data = json!({"amounts": amounts, "amount_in": 0, "amount_out": 0});
        let result = v.validate(&query(data), &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert!(result.passed);
    }

    #[test]
    fn swap_input_scalar_fields_and_chain_quote() {
        let v = QuerySwapInputAmount::from_params(&params(json!({
            "router_address": ROUTER_STR,
            "token_in_address": TOKEN_STR,
            "token_out_address": BOB_STR,
            "amount_out": "1"
        })))
        .unwrap();
        let before = StateSnapshot::new().with(fields::EXPECTED_AMOUNTS, vec![U256::from(700u64), U256::from(300u64)]);
        let data = json!({"amounts": [], "amount_in": "700", "amount_out": "300"});
        assert_eq!(v.validate(&query(data.clone()), &Receipt::default(), &before, &before).score, 100);
        let empty = StateSnapshot::new();
        let result = v.validate(&query(data), &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, 60);
        assert!(result.check("Input Amount Correctness").unwrap().message.contains("No expected amounts"));
    }

    #[test]
    fn token_metadata() {
        let v = QueryTokenMetadata::from_params(&params(json!({
            "token_address": TOKEN_STR,
            "expected_name": "Tether USD",
            "expected_symbol": "USDT",
            "expected_decimals": 18
        })))
        .unwrap();
        let empty = StateSnapshot::new();
        let data = json!({"name": "Tether USD", "symbol": "USDT", "decimals": 18, "totalSupply": "1000"});
        assert_eq!(v.validate(&query(data.clone()), &Receipt::default(), &empty, &empty).score, 100);

        // The chain reading wins over generated parameters.
        let before = StateSnapshot::new()
            .with(fields::TOKEN_SYMBOL, "BSC-USD")
            .with(fields::TOKEN_TOTAL_SUPPLY, 999u64);
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, 85);
        assert!(result.passed);
        assert_eq!(result.details["total_supply_matches"], json!(false));

        let data = json!({"name": "Tether USD", "symbol": "USDT", "decimals": "6", "totalSupply": "1"});
        assert_eq!(v.validate(&query(data), &Receipt::default(), &empty, &empty).score, 80);
    }

    #[rstest]
    #[case::any_uri(None, json!("ipfs://bafy/7.json"), 100)]
    #[case::empty(None, json!(""), 70)]
    #[case::not_a_string(None, json!(7), 70)]
    #[case::matches_chain(Some("ipfs://bafy/7.json"), json!("ipfs://bafy/7.json"), 100)]
    #[case::differs_from_chain(Some("ipfs://bafy/8.json"), json!("ipfs://bafy/7.json"), 70)]
    fn nft_token_uri(#[case] chain: Option<&str>, #[case] returned: Value, #[case] score: u32) {
        let v = QueryNftTokenUri::from_params(&params(json!({"nft_address": TOKEN_STR, "token_id": "7"}))).unwrap();
        let mut before = StateSnapshot::new();
        if let Some(uri) = chain {
            before.insert(fields::TOKEN_URI, uri);
        }
        let result = v.validate(&query(json!({"tokenURI": returned})), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert!(result.passed);
    }

    #[test]
    fn long_token_uri_is_clipped_in_messages() {
        let uri = format!("data:application/json;base64,{}", "é".repeat(200));
        assert_eq!(clip(&uri, 100).chars().count(), 103);
        assert_eq!(clip("short", 100), "short");
    }

    #[rstest]
    #[case::fresh(json!({"block_number": 40_000_050}), 100, true)]
    #[case::hex(json!({"block_number": "0x2625a00"}), 100, true)]
    #[case::stale(json!({"block_number": "39000000"}), 75, true)]
    #[case::zero(json!({"block_number": 0}), 75, true)]
    #[case::missing(json!({"height": 40_000_000}), 50, false)]
    fn current_block_number(#[case] data: Value, #[case] score: u32, #[case] passed: bool) {
        let v = QueryCurrentBlockNumber::from_params(&Params::new()).unwrap();
        let before = StateSnapshot::new().with(fields::REFERENCE_BLOCK_NUMBER, 40_000_000u64);
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, score, "{}", result.feedback);
        assert_eq!(result.passed, passed);
    }

    #[rstest]
    #[case::typical(json!({"maxFeePerGas": "3000000000", "maxPriorityFeePerGas": "1000000000"}), 100)]
    #[case::tip_above_cap(json!({"maxFeePerGas": "1000000000", "maxPriorityFeePerGas": "3000000000"}), 70)]
    #[case::empty(json!({}), 40)]
    fn gas_price(#[case] data: Value, #[case] score: u32) {
        let v = QueryGasPrice::from_params(&Params::new()).unwrap();
        let empty = StateSnapshot::new();
        let result = v.validate(&query(data), &Receipt::default(), &empty, &empty);
        assert_eq!(result.score, score, "{}", result.feedback);
    }

    #[test]
    fn unusual_gas_price_is_only_noted() {
        let v = QueryGasPrice::from_params(&Params::new()).unwrap();
        let before = StateSnapshot::new().with(fields::REFERENCE_MAX_FEE_PER_GAS, 5_000_000_000u64);
        let data = json!({"maxFeePerGas": 100_000_000, "maxPriorityFeePerGas": 0});
        let result = v.validate(&query(data), &Receipt::default(), &before, &before);
        assert_eq!(result.score, 100);
        let message = &result.check("Gas Price Validity").unwrap().message;
        assert!(message.contains("0.1 Gwei"), "{message}");
        assert!(message.contains("unusual"), "{message}");
        assert!(message.contains("differs significantly"), "{message}");
    }
}
