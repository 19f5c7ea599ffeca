//! The predicate type and its evaluation context.

use std::fmt;
use std::sync::Arc;

use lantern_core_types::StepId;
use page_snapshot::{DownloadRecord, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a predicate may look at.
#[derive(Clone, Debug, Default)]
pub struct AssertContext {
    pub snapshot: Option<Snapshot>,
    pub url: Option<String>,
    pub step_id: Option<StepId>,
    pub downloads: Vec<DownloadRecord>,
}

impl AssertContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.url = Some(snapshot.url.clone());
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_step_id(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_downloads(mut self, downloads: Vec<DownloadRecord>) -> Self {
        self.downloads = downloads;
        self
    }
}

/// Result of one predicate evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssertOutcome {
    pub passed: bool,
    pub reason: String,
    #[serde(default)]
    pub details: Value,
    /// Evaluation attempts consumed, ≥ 1 once a driver has run.
    #[serde(default = "one")]
    pub attempts: u32,
}

fn one() -> u32 {
    1
}

impl AssertOutcome {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            details: Value::Null,
            attempts: 1,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            details: Value::Null,
            attempts: 1,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Prefix the reason with a termination cause, keeping the original.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.reason = format!("{prefix}: {}", self.reason);
        self
    }
}

type EvalFn = dyn Fn(&AssertContext) -> AssertOutcome + Send + Sync;

/// A labeled, pure check over an [`AssertContext`].
///
/// Given the same context, a predicate must return the same outcome.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    eval: Arc<EvalFn>,
}

impl Predicate {
    pub fn new(
        label: impl Into<String>,
        eval: impl Fn(&AssertContext) -> AssertOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            eval: Arc::new(eval),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn evaluate(&self, context: &AssertContext) -> AssertOutcome {
        (self.eval)(context)
    }

    /// Shared failure shape for predicates that need a snapshot and have
    /// none.
    pub(crate) fn no_snapshot() -> AssertOutcome {
        AssertOutcome::fail("no snapshot in context")
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("label", &self.label)
            .finish()
    }
}
