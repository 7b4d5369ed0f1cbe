use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Write};

/// Every validator scores out of this many points.
pub const MAX_SCORE: u32 = 100;

/// One weighted assertion and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Check {
    /// Display name, stable across runs.
    pub name: String,
    /// Whether the assertion held.
    pub passed: bool,
    /// Points awarded, `weight` when passed.
    pub points: u32,
    /// Points at stake.
    pub weight: u32,
    /// Expected vs observed, surfaced verbatim as feedback.
    pub message: String,
    /// Decoded values backing this check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// How a validator turns its checks into a pass flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "min")]
pub enum PassRule {
    /// Every check must pass.
    AllChecks,
    /// Score must reach the threshold.
    MinScore(u32),
}

impl PassRule {
    /// 80% of the maximum score.
    pub const THRESHOLD_80: Self = Self::MinScore(80);
    /// 70% of the maximum score.
    pub const THRESHOLD_70: Self = Self::MinScore(70);
    /// 60% of the maximum score.
    pub const THRESHOLD_60: Self = Self::MinScore(60);

    /// Applies the rule.
    pub fn decide(&self, score: u32, checks: &[Check]) -> bool {
        match *self {
            Self::AllChecks => checks.iter().all(|c| c.passed),
            Self::MinScore(min) => score >= min,
        }
    }
}

impl fmt::Display for PassRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllChecks => f.write_str("all checks"),
            Self::MinScore(min) => write!(f, "score >= {min}"),
        }
    }
}

/// Outcome of validating one transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Pass flag under the validator's [`PassRule`].
    pub passed: bool,
    /// Sum of awarded points.
    pub score: u32,
    /// Always [`MAX_SCORE`].
    pub max_score: u32,
    /// Checks in evaluation order.
    pub checks: Vec<Check>,
    /// Raw values used in comparisons.
    pub details: Map<String, Value>,
    /// Human readable summary of failed checks.
    pub feedback: String,
}

impl ValidationResult {
    /// Scores `checks` under `rule`.
    pub fn new(checks: Vec<Check>, details: Map<String, Value>, rule: PassRule) -> Self {
        let score = checks.iter().map(|c| c.points).sum();
        let passed = rule.decide(score, &checks);
        Self::assemble(passed, score, checks, details)
    }

    /// Zero score result of a transaction that never got to change state.
    pub fn short_circuit(checks: Vec<Check>, details: Map<String, Value>) -> Self {
        Self::assemble(false, 0, checks, details)
    }

    fn assemble(passed: bool, score: u32, checks: Vec<Check>, details: Map<String, Value>) -> Self {
        let feedback = render_feedback(passed, score, &checks);
        Self {
            passed,
            score,
            max_score: MAX_SCORE,
            checks,
            details,
            feedback,
        }
    }

    /// Check named `name`, if it ran.
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Checks that did not pass, in order.
    pub fn failed_checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Feedback text handed back to the model on the next attempt.
pub fn render_feedback(passed: bool, score: u32, checks: &[Check]) -> String {
    let mut out = String::new();
    if passed {
        out.push_str("All checks passed\n");
        let _ = write!(out, "Final Score: {score}/{MAX_SCORE}");
        return out;
    }
    out.push_str("Validation failed:\n");
    for check in checks.iter().filter(|c| !c.passed) {
        let _ = writeln!(out, "  - {}: {}", check.name, check.message);
    }
    let _ = write!(out, "Current Score: {score}/{MAX_SCORE}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, passed: bool, weight: u32) -> Check {
        Check {
            name: name.into(),
            passed,
            points: if passed { weight } else { 0 },
            weight,
            message: format!("{name} message"),
            details: None,
        }
    }

    #[test]
    fn threshold_and_all_checks_differ() {
        let checks = vec![
            check("Transaction Success", true, 30),
            check("Token Contract", true, 20),
            check("Function Signature", true, 20),
            check("Allowance Revoked", false, 30),
        ];
        let strict = ValidationResult::new(checks.clone(), Map::new(), PassRule::AllChecks);
        let lenient = ValidationResult::new(checks, Map::new(), PassRule::THRESHOLD_60);
        assert_eq!(strict.score, 70);
        assert!(!strict.passed);
        assert!(lenient.passed);
        assert!(!PassRule::THRESHOLD_80.decide(70, &[]));
    }

    #[test]
    fn feedback_lists_failures() {
        let result = ValidationResult::new(
            vec![check("Transaction Success", true, 40), check("Approval Check", false, 60)],
            Map::new(),
            PassRule::AllChecks,
        );
        assert_eq!(
            result.feedback,
            "Validation failed:\n  - Approval Check: Approval Check message\nCurrent Score: 40/100"
        );
        assert_eq!(result.failed_checks().count(), 1);
    }

    #[test]
    fn feedback_on_pass() {
        let result = ValidationResult::new(
            vec![check("Transaction Success", true, 100)],
            Map::new(),
            PassRule::AllChecks,
        );
        assert_eq!(result.feedback, "All checks passed\nFinal Score: 100/100");
    }

    #[test]
    fn short_circuit_scores_zero() {
        let result = ValidationResult::short_circuit(
            vec![check("Transaction Success", false, 30)],
            Map::new(),
        );
        assert_eq!((result.score, result.passed, result.max_score), (0, false, 100));
        assert_eq!(result.checks.len(), 1);
    }

    #[test]
    fn pass_rule_serde() {
        assert_eq!(
            serde_json::to_string(&PassRule::MinScore(80)).unwrap(),
            r#"{"rule":"min_score","min":80}"#
        );
        assert_eq!(
            serde_json::to_string(&PassRule::AllChecks).unwrap(),
            r#"{"rule":"all_checks"}"#
        );
    }
}
