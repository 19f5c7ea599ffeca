//! Step bookkeeping and verification results.

use lantern_core_types::StepId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use verify_gate::AssertOutcome;

/// What produced a verification result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Assert,
    AssertDone,
    Scroll,
    Captcha,
    Custom,
}

/// One verification outcome accumulated on a step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub label: String,
    pub required: bool,
    pub passed: bool,
    pub reason: String,
    #[serde(default)]
    pub details: Value,
    pub attempts: u32,
    pub kind: VerificationKind,
}

impl VerificationResult {
    pub fn from_outcome(
        label: impl Into<String>,
        required: bool,
        kind: VerificationKind,
        outcome: &AssertOutcome,
    ) -> Self {
        Self {
            label: label.into(),
            required,
            passed: outcome.passed,
            reason: outcome.reason.clone(),
            details: outcome.details.clone(),
            attempts: outcome.attempts,
            kind,
        }
    }

    /// Payload for the `verification` trace event.
    pub fn to_trace_data(&self) -> Value {
        json!({
            "label": self.label,
            "required": self.required,
            "passed": self.passed,
            "reason": self.reason,
            "kind": self.kind,
            "attempts": self.attempts,
            "details": self.details,
        })
    }
}

/// The runtime's single open step.
#[derive(Debug)]
pub(crate) struct OpenStep {
    pub id: StepId,
    pub goal: String,
    pub began_at: Instant,
    pub verifications: Vec<VerificationResult>,
    /// Set when an `assert_done` passes.
    pub done_signalled: bool,
    /// Auto-opened around an out-of-step assertion.
    pub synthetic: bool,
}

impl OpenStep {
    pub fn new(id: StepId, goal: impl Into<String>, synthetic: bool) -> Self {
        Self {
            id,
            goal: goal.into(),
            began_at: Instant::now(),
            verifications: Vec::new(),
            done_signalled: false,
            synthetic,
        }
    }

    pub fn record(&mut self, result: VerificationResult) {
        self.verifications.push(result);
    }

    /// True iff every required verification passed. A re-verify (vision
    /// fallback) supersedes an earlier result under the same label.
    pub fn ok(&self) -> bool {
        let mut last: std::collections::HashMap<&str, &VerificationResult> =
            std::collections::HashMap::new();
        for verification in &self.verifications {
            last.insert(verification.label.as_str(), verification);
        }
        last.values().all(|v| v.passed || !v.required)
    }
}

/// Closed-step summary returned by `end_step`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: StepId,
    pub goal: String,
    /// True iff every required verification passed.
    pub ok: bool,
    /// A passing `assert_done` marked the whole task finished.
    pub done_signalled: bool,
    pub verifications: Vec<VerificationResult>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Optional extras for `end_step`.
#[derive(Clone, Debug, Default)]
pub struct StepEndData {
    pub action: Option<Value>,
    pub error: Option<String>,
}

impl StepEndData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Value) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_failure_fails_the_step() {
        let mut step = OpenStep::new(StepId::new(), "goal", false);
        step.record(VerificationResult::from_outcome(
            "optional",
            false,
            VerificationKind::Assert,
            &AssertOutcome::fail("nope"),
        ));
        assert!(step.ok());

        step.record(VerificationResult::from_outcome(
            "required",
            true,
            VerificationKind::Assert,
            &AssertOutcome::fail("nope"),
        ));
        assert!(!step.ok());
    }

    #[test]
    fn re_verify_supersedes_earlier_result_for_the_same_label() {
        let mut step = OpenStep::new(StepId::new(), "goal", false);
        step.record(VerificationResult::from_outcome(
            "target-visible",
            true,
            VerificationKind::Assert,
            &AssertOutcome::fail("not yet"),
        ));
        assert!(!step.ok());

        step.record(VerificationResult::from_outcome(
            "target-visible",
            true,
            VerificationKind::Assert,
            &AssertOutcome::pass("after fallback"),
        ));
        assert!(step.ok());
    }

    #[test]
    fn trace_data_carries_the_wire_fields() {
        let result = VerificationResult::from_outcome(
            "url-check",
            true,
            VerificationKind::Scroll,
            &AssertOutcome::pass("moved 200 px").with_attempts(3),
        );
        let data = result.to_trace_data();
        assert_eq!(data["label"], "url-check");
        assert_eq!(data["kind"], "scroll");
        assert_eq!(data["attempts"], 3);
        assert_eq!(data["required"], true);
    }
}
