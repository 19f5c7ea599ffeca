//! Captcha detection policy.
//!
//! The SDK ships no solvers. Passive evidence (badge iframes, URL hits)
//! never gates progress regardless of confidence; interactive evidence
//! above the configured confidence applies the abort or callback policy.

use async_trait::async_trait;
use page_snapshot::CaptchaDiagnostics;
use serde::{Deserialize, Serialize};

/// Default confidence floor for gating.
pub const CAPTCHA_MIN_CONFIDENCE: f64 = 0.5;

/// Default callback poll interval, in ms.
pub const CAPTCHA_POLL_MS: u64 = 1_000;

/// Default callback wait budget, in ms.
pub const CAPTCHA_TIMEOUT_MS: u64 = 120_000;

/// How an interactive challenge gates the step.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaPolicy {
    /// Fail the step with a captcha error.
    Abort,
    /// Invoke a user-supplied handler and re-snapshot until clear or
    /// timeout.
    Callback,
}

/// Captcha gating configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CaptchaOptions {
    pub policy: CaptchaPolicy,
    /// Interactive evidence below this confidence is ignored. Hand-tuned;
    /// revisit once telemetry exists.
    pub min_confidence: f64,
    pub poll_ms: u64,
    pub timeout_ms: u64,
}

impl Default for CaptchaOptions {
    fn default() -> Self {
        Self {
            policy: CaptchaPolicy::Abort,
            min_confidence: CAPTCHA_MIN_CONFIDENCE,
            poll_ms: CAPTCHA_POLL_MS,
            timeout_ms: CAPTCHA_TIMEOUT_MS,
        }
    }
}

impl CaptchaOptions {
    pub fn abort() -> Self {
        Self::default()
    }

    pub fn callback() -> Self {
        Self {
            policy: CaptchaPolicy::Callback,
            ..Self::default()
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_poll(mut self, poll_ms: u64) -> Self {
        self.poll_ms = poll_ms;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Whether these diagnostics gate the step: detected, interactive
    /// evidence present, confidence at or above the floor.
    pub fn should_gate(&self, diagnostics: &CaptchaDiagnostics) -> bool {
        diagnostics.detected
            && diagnostics.has_interactive_evidence()
            && diagnostics.confidence >= self.min_confidence
    }
}

/// User-supplied challenge handler for the callback policy.
///
/// Called once per poll cycle while the challenge persists. Returning
/// `false` asks the runtime to stop waiting and abort.
#[async_trait]
pub trait CaptchaHandler: Send + Sync {
    async fn on_captcha(&self, diagnostics: &CaptchaDiagnostics) -> bool;
}

/// Outcome of one captcha inspection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaGateOutcome {
    /// No captcha evidence at all.
    Clear,
    /// Evidence present but passive; progress not gated.
    Suppressed,
    /// Callback handler ran and the challenge cleared.
    Resolved,
}
