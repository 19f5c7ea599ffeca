use backend_port::BackendError;
use lantern_core_types::StepId;
use page_snapshot::SnapshotError;
use thiserror::Error;

/// Errors surfaced by the agent runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Programmer error: `begin_step` while a real step is open.
    #[error("step {0} is already open")]
    StepAlreadyOpen(StepId),

    /// Programmer error: assertion with no open step and auto-step
    /// disabled.
    #[error("no open step for assertion '{0}'")]
    NoOpenStep(String),

    /// Interactive captcha under the abort policy.
    #[error("interactive captcha detected (confidence {confidence:.2})")]
    CaptchaAbort {
        confidence: f64,
        provider_hint: Option<String>,
    },

    /// Captcha callback never cleared the challenge.
    #[error("captcha wait timed out after {timeout_ms} ms")]
    CaptchaTimeout { timeout_ms: u64 },

    /// External abort signal.
    #[error("runtime operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RuntimeError {
    /// Stable wire-observable error name.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeError::StepAlreadyOpen(_) => "StepAlreadyOpen",
            RuntimeError::NoOpenStep(_) => "NoOpenStep",
            RuntimeError::CaptchaAbort { .. } => "CaptchaAbort",
            RuntimeError::CaptchaTimeout { .. } => "CaptchaTimeout",
            RuntimeError::Cancelled => "Cancelled",
            RuntimeError::Snapshot(err) => err.name(),
            RuntimeError::Backend(BackendError::Cancelled) => "Cancelled",
            RuntimeError::Backend(_) => "BackendError",
        }
    }

    /// Policy and cancellation errors escape predicate boundaries;
    /// transport/protocol errors are converted to failing outcomes there.
    pub fn escapes_predicates(&self) -> bool {
        matches!(
            self,
            RuntimeError::Cancelled
                | RuntimeError::CaptchaAbort { .. }
                | RuntimeError::CaptchaTimeout { .. }
                | RuntimeError::StepAlreadyOpen(_)
                | RuntimeError::NoOpenStep(_)
                | RuntimeError::Backend(BackendError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(
            RuntimeError::CaptchaAbort {
                confidence: 0.95,
                provider_hint: None
            }
            .name(),
            "CaptchaAbort"
        );
        assert_eq!(RuntimeError::Cancelled.name(), "Cancelled");
    }

    #[test]
    fn taxonomy_split() {
        assert!(RuntimeError::Cancelled.escapes_predicates());
        assert!(!RuntimeError::Backend(BackendError::transport("x")).escapes_predicates());
    }
}
