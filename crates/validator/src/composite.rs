//! Multi-step tasks scored from their atomic steps.

use quest_types::{fields, ValidationCase};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{registry::create_validator, result::ValidationResult};

/// Composite pass threshold, also the per-step success threshold.
pub const COMPOSITE_PASS_SCORE: f64 = 60.0;

/// Share of the composite score earned by the atomic steps; the rest is inter-operation.
const ATOMIC_SHARE: f64 = 0.9;

/// Composite task definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDefinition {
    /// Composite task id.
    pub id: String,
    /// Steps and extra checks.
    pub composite_structure: CompositeStructure,
}

/// Ordered steps of a composite task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeStructure {
    /// Atomic steps, in execution order.
    pub atomic_operations: Vec<AtomicOperation>,
    /// How step scores are combined.
    pub scoring_method: ScoringMethod,
    /// Consistency checks spanning several steps.
    pub inter_operation_checks: Vec<InterOperationCheck>,
}

/// One atomic step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicOperation {
    /// 1-based position.
    #[serde(default)]
    pub step: Option<u32>,
    /// Atomic task id.
    pub atomic_id: String,
    /// Name later steps refer to this one by.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Step score aggregation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Plain mean.
    #[default]
    Average,
    /// Accepted for compatibility; scored as the mean.
    Weighted,
}

/// Consistency check over the whole run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterOperationCheck {
    /// Check kind, e.g. `balance_decrease`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Step outcome class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Scored at least [`COMPOSITE_PASS_SCORE`].
    Success,
    /// Scored below it.
    Failed,
    /// No validator could be built, or no case was recorded.
    Error,
}

/// Result of one step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepOutcome {
    /// 1-based position.
    pub step: usize,
    /// Atomic task id.
    pub atomic_id: String,
    /// Step alias.
    pub alias: Option<String>,
    /// Points out of 100.
    pub score: u32,
    /// Outcome class.
    pub status: StepStatus,
    /// Full validation result when the step was validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
    /// Why the step could not be validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Score components.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Mean step score.
    pub atomic_average: f64,
    /// Inter-operation score.
    pub inter_operation: f64,
    /// Weighted final score.
    pub final_score: f64,
}

/// Result of a composite validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositeResult {
    /// Composite task id.
    pub composite_id: String,
    /// Final score out of 100.
    pub score: f64,
    /// Whether [`Self::score`] reached [`COMPOSITE_PASS_SCORE`].
    pub passed: bool,
    /// Per-step outcomes.
    pub steps: Vec<StepOutcome>,
    /// Score components.
    pub breakdown: ScoreBreakdown,
    /// Aggregation used.
    pub scoring_method: ScoringMethod,
}

impl CompositeResult {
    /// Steps with [`StepStatus::Success`].
    pub fn successful_operations(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Success).count()
    }
}

/// Scores a composite task by validating each step with its atomic validator.
#[derive(Clone, Debug)]
pub struct CompositeValidator {
    definition: CompositeDefinition,
}

impl CompositeValidator {
    /// Validator for `definition`.
    pub fn new(definition: CompositeDefinition) -> Self {
        Self { definition }
    }

    /// Scores `cases`, one per atomic operation in order.
    ///
    /// The step's task id comes from the definition; each case supplies parameters,
    /// transaction, receipt and snapshots. Missing cases score zero.
    pub fn validate(&self, cases: &[ValidationCase]) -> CompositeResult {
        let structure = &self.definition.composite_structure;
        let steps: Vec<StepOutcome> = structure
            .atomic_operations
            .iter()
            .enumerate()
            .map(|(index, op)| validate_step(index + 1, op, cases.get(index)))
            .collect();

        let atomic_average = if steps.is_empty() {
            0.0
        } else {
            steps.iter().map(|s| f64::from(s.score)).sum::<f64>() / steps.len() as f64
        };
        let inter_operation = self.inter_operation_score(cases);
        let final_score = atomic_average * ATOMIC_SHARE + inter_operation * (1.0 - ATOMIC_SHARE);
        let passed = final_score >= COMPOSITE_PASS_SCORE;
        debug!(
            composite = %self.definition.id,
            atomic_average,
            inter_operation,
            final_score,
            passed,
            "composite validated"
        );

        CompositeResult {
            composite_id: self.definition.id.clone(),
            score: final_score,
            passed,
            steps,
            breakdown: ScoreBreakdown { atomic_average, inter_operation, final_score },
            scoring_method: structure.scoring_method,
        }
    }

    fn inter_operation_score(&self, cases: &[ValidationCase]) -> f64 {
        let checks = &self.definition.composite_structure.inter_operation_checks;
        if checks.is_empty() {
            return 100.0;
        }
        let passed = checks.iter().filter(|check| inter_operation_check(check, cases)).count();
        passed as f64 / checks.len() as f64 * 100.0
    }
}

fn validate_step(step: usize, op: &AtomicOperation, case: Option<&ValidationCase>) -> StepOutcome {
    let outcome = |score, status, result, error| StepOutcome {
        step,
        atomic_id: op.atomic_id.clone(),
        alias: op.alias.clone(),
        score,
        status,
        result,
        error,
    };
    let Some(case) = case else {
        return outcome(0, StepStatus::Error, None, Some("no transaction recorded for step".into()));
    };
    match create_validator(&op.atomic_id, &case.params) {
        Ok(validator) => {
            let result = validator.validate(&case.tx, &case.receipt, &case.state_before, &case.state_after);
            let status = if f64::from(result.score) >= COMPOSITE_PASS_SCORE {
                StepStatus::Success
            } else {
                StepStatus::Failed
            };
            outcome(result.score, status, Some(result), None)
        }
        Err(e) => {
            warn!(step, task = %op.atomic_id, error = %e, "step validator unavailable");
            outcome(0, StepStatus::Error, None, Some(e.to_string()))
        }
    }
}

/// Evaluates one inter-operation check. Unknown kinds fail.
fn inter_operation_check(check: &InterOperationCheck, cases: &[ValidationCase]) -> bool {
    match check.kind.as_str() {
        // Native balance ends lower than it started.
        "balance_decrease" => match (cases.first(), cases.last()) {
            (Some(first), Some(last)) => {
                last.state_after.uint(fields::BALANCE) < first.state_before.uint(fields::BALANCE)
            }
            _ => false,
        },
        other => {
            warn!(kind = other, "unknown inter-operation check");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{abi::IERC20, test_utils::*};
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;
    use quest_types::{Receipt, StateSnapshot, Transaction};
    use serde_json::{json, Value};

    fn definition(checks: Value) -> CompositeDefinition {
        serde_json::from_value(json!({
            "id": "approve_then_revoke",
            "composite_structure": {
                "atomic_operations": [
                    {"step": 1, "atomic_id": "erc20_revoke_approval", "alias": "revoke"},
                    {"step": 2, "atomic_id": "no_such_task", "alias": "mystery"}
                ],
                "scoring_method": "average",
                "inter_operation_checks": checks
            }
        }))
        .unwrap()
    }

    fn revoke_case() -> ValidationCase {
        ValidationCase {
            info: None,
            task: "erc20_revoke_approval".into(),
            params: params(json!({"token_address": TOKEN_STR, "spender_address": BOB_STR})),
            tx: Transaction {
                to: Some(TOKEN),
                data: IERC20::approveCall { spender: BOB, amount: U256::ZERO }.abi_encode().into(),
                ..Default::default()
            },
            receipt: Receipt::success(46_000, 1),
            state_before: StateSnapshot::new().with(fields::ALLOWANCE, 500u64).with(fields::BALANCE, 10u64),
            state_after: StateSnapshot::new().with(fields::ALLOWANCE, 0u64).with(fields::BALANCE, 9u64),
            expect: None,
        }
    }

    #[test]
    fn averages_steps_and_scores_broken_step_zero() {
        let result = CompositeValidator::new(definition(json!([]))).validate(&[revoke_case(), revoke_case()]);
        assert_eq!(result.steps[0].score, 100);
        assert_eq!(result.steps[0].status, StepStatus::Success);
        assert_eq!(result.steps[1].status, StepStatus::Error);
        assert_eq!(result.steps[1].score, 0);
        assert_eq!(result.breakdown.atomic_average, 50.0);
        assert_eq!(result.breakdown.inter_operation, 100.0);
        assert!((result.score - 55.0).abs() < 1e-9);
        assert!(!result.passed);
        assert_eq!(result.successful_operations(), 1);
    }

    #[test]
    fn inter_operation_checks() {
        let checks = json!([
            {"type": "balance_decrease", "description": "gas was paid"},
            {"type": "teleport"}
        ]);
        let result = CompositeValidator::new(definition(checks)).validate(&[revoke_case()]);
        assert_eq!(result.breakdown.inter_operation, 50.0);
        assert_eq!(result.steps[1].error.as_deref(), Some("no transaction recorded for step"));
    }
}
