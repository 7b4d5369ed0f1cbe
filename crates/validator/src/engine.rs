//! Weighted rule engine shared by every validator.
//!
//! A validator is a value holding its expected parameters plus a static [`RuleSet`]:
//! the gate check, then an ordered list of [`Rule`]s. [`run`] evaluates them, applies the
//! short-circuit on a failed gate and scores the result.

use alloy_primitives::U256;
use quest_types::{lower_hex, Receipt, StateSnapshot, Transaction};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, trace};

use crate::{
    calldata::CallData,
    params::Params,
    registry::TaskId,
    result::{Check, PassRule, ValidationResult},
    ValidatorError,
};

/// Raw values collected while evaluating, exposed as [`ValidationResult::details`].
pub type Details = Map<String, Value>;

/// Outcome of a single rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    /// Whether the assertion held.
    pub passed: bool,
    /// Partial credit awarded on failure.
    pub points: Option<u32>,
    /// Expected vs observed.
    pub message: String,
    /// Check scoped payload.
    pub details: Option<Value>,
}

impl Verdict {
    /// Full credit.
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            points: None,
            message: message.into(),
            details: None,
        }
    }

    /// No credit.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            points: None,
            message: message.into(),
            details: None,
        }
    }

    /// Picks the message matching `passed`.
    pub fn from_bool(passed: bool, on_pass: impl Into<String>, on_fail: impl Into<String>) -> Self {
        if passed {
            Self::pass(on_pass)
        } else {
            Self::fail(on_fail)
        }
    }

    /// Failed check that still earns `points`.
    pub fn partial(points: u32, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            points: Some(points),
            message: message.into(),
            details: None,
        }
    }

    /// Passed check that earns only `points`, for answers accepted within a tolerance.
    pub fn reduced(points: u32, message: impl Into<String>) -> Self {
        Self {
            passed: true,
            points: Some(points),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches a check scoped payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn into_check(self, name: &str, weight: u32) -> Check {
        let points = match (self.passed, self.points) {
            (true, None) => weight,
            (_, Some(points)) => points.min(weight),
            (false, None) => 0,
        };
        Check {
            name: name.to_string(),
            passed: self.passed,
            points,
            weight,
            message: self.message,
            details: self.details,
        }
    }
}

/// Everything the harness observed around one transaction.
#[derive(Clone, Copy, Debug)]
pub struct Ctx<'a> {
    /// Submitted transaction.
    pub tx: &'a Transaction,
    /// Its receipt.
    pub receipt: &'a Receipt,
    /// Snapshot before execution.
    pub before: &'a StateSnapshot,
    /// Snapshot after execution.
    pub after: &'a StateSnapshot,
}

impl<'a> Ctx<'a> {
    /// Call data view.
    pub fn calldata(&self) -> CallData<'a> {
        CallData::new(&self.tx.data)
    }

    /// `key` read from both snapshots.
    pub fn uint_pair(&self, key: &str) -> (U256, U256) {
        (self.before.uint(key), self.after.uint(key))
    }

    /// How much `key` grew, zero if it shrank.
    pub fn increase(&self, key: &str) -> U256 {
        let (before, after) = self.uint_pair(key);
        after.saturating_sub(before)
    }

    /// How much `key` shrank, zero if it grew.
    pub fn decrease(&self, key: &str) -> U256 {
        let (before, after) = self.uint_pair(key);
        before.saturating_sub(after)
    }

    /// Records `key` from both snapshots as `{key}_before` / `{key}_after`.
    pub fn record(&self, details: &mut Details, key: &str) {
        let (before, after) = self.uint_pair(key);
        details.insert(format!("{key}_before"), uint(before));
        details.insert(format!("{key}_after"), uint(after));
    }
}

/// Integer detail value, as a decimal string so 18 decimal amounts survive JSON.
pub fn uint(value: U256) -> Value {
    Value::String(value.to_string())
}

/// Address detail value, lower-case hex.
pub fn addr(value: &alloy_primitives::Address) -> Value {
    Value::String(lower_hex(value))
}

/// Rule body: reads the validator's expectations and the observed context.
pub type Eval<V> = fn(&V, &Ctx<'_>, &mut Details) -> Verdict;

/// One weighted check.
pub struct Rule<V> {
    /// Check name.
    pub name: &'static str,
    /// Points at stake.
    pub weight: u32,
    /// Evaluation function.
    pub eval: Eval<V>,
}

impl<V> Rule<V> {
    /// Creates a rule.
    pub const fn new(name: &'static str, weight: u32, eval: Eval<V>) -> Self {
        Self { name, weight, eval }
    }
}

impl<V> fmt::Debug for Rule<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// First check of every validator. When it fails nothing else is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Receipt status must be success.
    Receipt,
    /// Query answer must report success.
    Query,
}

impl Gate {
    /// Check name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Receipt => "Transaction Success",
            Self::Query => "Query Execution Success",
        }
    }

    fn evaluate(&self, ctx: &Ctx<'_>) -> Verdict {
        match self {
            Self::Receipt => Verdict::from_bool(
                ctx.receipt.is_success(),
                "Transaction executed successfully",
                format!("Transaction failed with status: {}", ctx.receipt.status),
            ),
            Self::Query => match &ctx.tx.query_result {
                Some(result) if result.success => Verdict::pass("Query executed successfully"),
                Some(result) => Verdict::fail(format!(
                    "Query failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                )),
                None => Verdict::fail("No query result returned"),
            },
        }
    }
}

/// Static description of a validator's checks.
pub struct RuleSet<V: 'static> {
    /// Gate check.
    pub gate: Gate,
    /// Points for the gate.
    pub gate_weight: u32,
    /// Remaining checks, in order.
    pub rules: &'static [Rule<V>],
    /// Pass flag convention.
    pub pass: PassRule,
}

impl<V: 'static> RuleSet<V> {
    /// `(name, weight)` of every check including the gate.
    pub fn weights(&self) -> Vec<(&'static str, u32)> {
        std::iter::once((self.gate.name(), self.gate_weight))
            .chain(self.rules.iter().map(|r| (r.name, r.weight)))
            .collect()
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> u32 {
        self.gate_weight + self.rules.iter().map(|r| r.weight).sum::<u32>()
    }
}

impl<V: 'static> fmt::Debug for RuleSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("gate", &self.gate)
            .field("gate_weight", &self.gate_weight)
            .field("rules", &self.rules)
            .field("pass", &self.pass)
            .finish()
    }
}

/// Implemented by every concrete validator.
pub trait Rules: Sized + Send + Sync + fmt::Debug + 'static {
    /// Task this validator judges.
    const TASK: TaskId;
    /// Its checks.
    const RULES: RuleSet<Self>;

    /// Builds the validator from generated parameters.
    fn from_params(params: &Params) -> Result<Self, ValidatorError>;

    /// Records the expected values in the result details.
    fn expected(&self, _details: &mut Details) {}
}

/// Object safe face of a validator, as handed out by the registry.
pub trait Validator: fmt::Debug + Send + Sync {
    /// Task this validator judges.
    fn task(&self) -> TaskId;

    /// Pass flag convention.
    fn pass_rule(&self) -> PassRule;

    /// `(name, weight)` of every check in order.
    fn weights(&self) -> Vec<(&'static str, u32)>;

    /// Scores one executed transaction. Never fails.
    fn validate(
        &self,
        tx: &Transaction,
        receipt: &Receipt,
        state_before: &StateSnapshot,
        state_after: &StateSnapshot,
    ) -> ValidationResult;
}

impl<V: Rules> Validator for V {
    fn task(&self) -> TaskId {
        V::TASK
    }

    fn pass_rule(&self) -> PassRule {
        V::RULES.pass
    }

    fn weights(&self) -> Vec<(&'static str, u32)> {
        V::RULES.weights()
    }

    fn validate(
        &self,
        tx: &Transaction,
        receipt: &Receipt,
        state_before: &StateSnapshot,
        state_after: &StateSnapshot,
    ) -> ValidationResult {
        run(
            self,
            &Ctx {
                tx,
                receipt,
                before: state_before,
                after: state_after,
            },
        )
    }
}

/// Evaluates `validator` against `ctx`.
pub fn run<V: Rules>(validator: &V, ctx: &Ctx<'_>) -> ValidationResult {
    let set = &V::RULES;
    let mut details = Details::new();
    let mut checks = Vec::with_capacity(set.rules.len() + 1);

    // Expected values are reported even when the gate stops evaluation.
    validator.expected(&mut details);

    let gate = set.gate.evaluate(ctx);
    let gate_passed = gate.passed;
    checks.push(gate.into_check(set.gate.name(), set.gate_weight));
    if !gate_passed {
        debug!(task = %V::TASK, gate = set.gate.name(), "gate failed, skipping remaining checks");
        return ValidationResult::short_circuit(checks, details);
    }

    for rule in set.rules {
        let verdict = (rule.eval)(validator, ctx, &mut details);
        if !verdict.passed {
            trace!(task = %V::TASK, check = rule.name, message = %verdict.message, "check failed");
        }
        checks.push(verdict.into_check(rule.name, rule.weight));
    }

    let result = ValidationResult::new(checks, details, set.pass);
    debug!(task = %V::TASK, score = result.score, passed = result.passed, "validated");
    result
}
