//! Step specifications and run results.

use agent_runtime::StepReport;
use page_snapshot::{CompactConfig, DEFAULT_SNAPSHOT_LIMIT};
use serde::{Deserialize, Serialize};
use verify_gate::{EventuallyConfig, Predicate};

use crate::action::Action;

/// One verification attached to a step.
pub struct StepVerification {
    pub predicate: Predicate,
    pub label: String,
    pub required: bool,
    /// Explicit retry budget; required verifications without one get the
    /// default budget.
    pub eventually: Option<EventuallyConfig>,
}

impl StepVerification {
    pub fn required(predicate: Predicate, label: impl Into<String>) -> Self {
        Self {
            predicate,
            label: label.into(),
            required: true,
            eventually: None,
        }
    }

    pub fn optional(predicate: Predicate, label: impl Into<String>) -> Self {
        Self {
            predicate,
            label: label.into(),
            required: false,
            eventually: None,
        }
    }

    pub fn with_eventually(mut self, config: EventuallyConfig) -> Self {
        self.eventually = Some(config);
        self
    }
}

/// Specification for one agent step.
pub struct StepSpec {
    pub goal: String,
    /// Snapshot element cap for the observe phase.
    pub snapshot_limit_base: u32,
    pub verifications: Vec<StepVerification>,
}

impl StepSpec {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            snapshot_limit_base: DEFAULT_SNAPSHOT_LIMIT,
            verifications: Vec::new(),
        }
    }

    pub fn with_snapshot_limit(mut self, limit: u32) -> Self {
        self.snapshot_limit_base = limit;
        self
    }

    pub fn verify(mut self, verification: StepVerification) -> Self {
        self.verifications.push(verification);
        self
    }
}

/// Loop configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Halt `run` on the first failing step.
    pub stop_on_failure: bool,
    /// Escalate to the vision executor when required verifications fail.
    pub vision_fallback: bool,
    /// Vision attempts per step.
    pub max_vision_attempts: u32,
    pub compact: CompactConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            stop_on_failure: true,
            vision_fallback: true,
            max_vision_attempts: 1,
            compact: CompactConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_vision(mut self) -> Self {
        self.vision_fallback = false;
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.stop_on_failure = false;
        self
    }
}

/// Outcome of one step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepOutcome {
    pub report: StepReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// The executor signalled terminal success (or `assert_done` passed).
    pub finished: bool,
    pub used_vision: bool,
}

impl StepOutcome {
    pub fn ok(&self) -> bool {
        self.report.ok
    }
}

/// Final status of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step passed (or the executor finished early).
    Completed,
    /// A step failed and `stop_on_failure` halted the run.
    Failed,
}

/// Summary of a whole run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub steps_taken: u32,
    pub outcomes: Vec<StepOutcome>,
    pub total_time_ms: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
