//! Retry-with-refresh evaluation.
//!
//! Predicates stay pure; when one fails, this driver rebuilds the context
//! from a fresh snapshot and tries again, bounded by timeout and retry
//! budgets. Virtualized pages often need a larger capture to reveal
//! below-the-fold targets, so each refresh can grow the requested snapshot
//! limit instead of paying for a max-limit capture up front.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::VerifyError;
use crate::predicate::{AssertContext, AssertOutcome, Predicate};

/// Default retry budget, in ms.
pub const EVENTUALLY_TIMEOUT_MS: u64 = 10_000;

/// Default pause between attempts, in ms.
pub const EVENTUALLY_POLL_MS: u64 = 500;

/// Default attempt cap.
pub const EVENTUALLY_MAX_RETRIES: u32 = 20;

/// When the limit grows across refreshes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthApply {
    /// Grow only after a failing attempt: the first refresh re-captures at
    /// the start limit.
    OnlyOnFail,
    /// Grow on every refresh.
    All,
}

/// Adaptive snapshot-limit growth policy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SnapshotLimitGrowth {
    pub start_limit: u32,
    pub step: u32,
    pub max_limit: u32,
    pub apply_on: GrowthApply,
}

impl SnapshotLimitGrowth {
    /// Limit to request for the `refresh_index`-th refresh (1-based).
    pub fn limit_for_refresh(&self, refresh_index: u32) -> u32 {
        let growth_steps = match self.apply_on {
            GrowthApply::All => refresh_index,
            GrowthApply::OnlyOnFail => refresh_index.saturating_sub(1),
        };
        self.start_limit
            .saturating_add(self.step.saturating_mul(growth_steps))
            .min(self.max_limit)
    }
}

/// Budget for one eventually run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EventuallyConfig {
    pub timeout_ms: u64,
    pub poll_ms: u64,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_limit_growth: Option<SnapshotLimitGrowth>,
}

impl Default for EventuallyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: EVENTUALLY_TIMEOUT_MS,
            poll_ms: EVENTUALLY_POLL_MS,
            max_retries: EVENTUALLY_MAX_RETRIES,
            snapshot_limit_growth: None,
        }
    }
}

impl EventuallyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn poll(mut self, poll_ms: u64) -> Self {
        self.poll_ms = poll_ms;
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn limit_growth(mut self, growth: SnapshotLimitGrowth) -> Self {
        self.snapshot_limit_growth = Some(growth);
        self
    }
}

/// Failure while rebuilding the context.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Transport/protocol failure; converted to a failing attempt outcome.
    #[error("context refresh failed: {0}")]
    Failed(String),

    /// Abort signal; escapes the driver.
    #[error("context refresh cancelled")]
    Cancelled,
}

/// Rebuilds an [`AssertContext`] from a fresh snapshot.
#[async_trait]
pub trait ContextRefresh: Send + Sync {
    async fn refresh(&self, limit: Option<u32>) -> Result<AssertContext, RefreshError>;
}

type RefreshFn =
    dyn Fn(Option<u32>) -> BoxFuture<'static, Result<AssertContext, RefreshError>> + Send + Sync;

/// Closure adapter for [`ContextRefresh`].
pub struct FnRefresh {
    refresh: Box<RefreshFn>,
}

impl FnRefresh {
    pub fn new(
        refresh: impl Fn(Option<u32>) -> BoxFuture<'static, Result<AssertContext, RefreshError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            refresh: Box::new(refresh),
        }
    }
}

#[async_trait]
impl ContextRefresh for FnRefresh {
    async fn refresh(&self, limit: Option<u32>) -> Result<AssertContext, RefreshError> {
        (self.refresh)(limit).await
    }
}

/// Result of one eventually run: the final outcome plus every attempt's
/// outcome for trace emission.
#[derive(Clone, Debug)]
pub struct EventuallyReport {
    pub outcome: AssertOutcome,
    pub attempt_outcomes: Vec<AssertOutcome>,
}

impl EventuallyReport {
    pub fn attempts(&self) -> u32 {
        self.outcome.attempts
    }
}

/// Drive a predicate to a verdict.
///
/// Attempt 0 evaluates the caller's context as-is; each later attempt
/// refreshes first. Terminates on the first of pass, timeout, or retry
/// exhaustion; on a budget exhaustion the last outcome's reason is prefixed
/// with the termination cause. Refresh failures become failing attempt
/// outcomes; cancellation escapes as [`VerifyError::Cancelled`].
pub async fn eventually(
    predicate: &Predicate,
    initial: AssertContext,
    refresh: &dyn ContextRefresh,
    config: &EventuallyConfig,
    cancel: &CancellationToken,
) -> Result<EventuallyReport, VerifyError> {
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut context = initial;
    let mut attempts: u32 = 0;
    let mut refreshes: u32 = 0;
    let mut history: Vec<AssertOutcome> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }

        let outcome = if attempts == 0 {
            predicate.evaluate(&context)
        } else {
            refreshes += 1;
            let limit = config
                .snapshot_limit_growth
                .as_ref()
                .map(|growth| growth.limit_for_refresh(refreshes));
            debug!(
                target: "verify-gate",
                predicate = predicate.label(),
                attempt = attempts + 1,
                ?limit,
                "refreshing context"
            );
            match refresh.refresh(limit).await {
                Ok(fresh) => {
                    context = fresh;
                    predicate.evaluate(&context)
                }
                Err(RefreshError::Cancelled) => return Err(VerifyError::Cancelled),
                Err(RefreshError::Failed(message)) => {
                    AssertOutcome::fail(format!("snapshot refresh failed: {message}"))
                }
            }
        };

        attempts += 1;
        let outcome = outcome.with_attempts(attempts);
        history.push(outcome.clone());

        if outcome.passed {
            return Ok(EventuallyReport {
                outcome,
                attempt_outcomes: history,
            });
        }
        if attempts >= config.max_retries {
            let cause = format!("retries exhausted after {attempts} attempts");
            return Ok(EventuallyReport {
                outcome: outcome.prefixed(&cause),
                attempt_outcomes: history,
            });
        }
        if start.elapsed() >= timeout {
            let cause = format!("timeout after {} ms", config.timeout_ms);
            return Ok(EventuallyReport {
                outcome: outcome.prefixed(&cause),
                attempt_outcomes: history,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(VerifyError::Cancelled),
            _ = sleep(Duration::from_millis(config.poll_ms)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::url_contains;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StaticRefresh {
        url: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContextRefresh for StaticRefresh {
        async fn refresh(&self, _limit: Option<u32>) -> Result<AssertContext, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AssertContext::new().with_url(self.url.clone()))
        }
    }

    #[tokio::test]
    async fn passes_without_refresh_on_first_attempt() {
        let refresh = StaticRefresh {
            url: "unused".into(),
            calls: AtomicU32::new(0),
        };
        let report = eventually(
            &url_contains("example.com"),
            AssertContext::new().with_url("https://example.com"),
            &refresh,
            &EventuallyConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(report.outcome.passed);
        assert_eq!(report.attempts(), 1);
        assert_eq!(refresh.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refreshes_until_pass() {
        // Context flips to the target URL once refreshed.
        let refresh = StaticRefresh {
            url: "https://www.iana.org/domains".into(),
            calls: AtomicU32::new(0),
        };
        let config = EventuallyConfig::new().timeout(5_000).poll(10);
        let report = eventually(
            &url_contains("iana.org"),
            AssertContext::new().with_url("https://example.com"),
            &refresh,
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(report.outcome.passed);
        assert_eq!(report.attempts(), 2);
        assert_eq!(report.attempt_outcomes.len(), 2);
        assert!(!report.attempt_outcomes[0].passed);
    }

    #[tokio::test]
    async fn retry_exhaustion_prefixes_reason() {
        let refresh = StaticRefresh {
            url: "https://example.com".into(),
            calls: AtomicU32::new(0),
        };
        let config = EventuallyConfig::new().timeout(60_000).poll(5).retries(3);
        let report = eventually(
            &url_contains("never-there"),
            AssertContext::new().with_url("https://example.com"),
            &refresh,
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!report.outcome.passed);
        assert_eq!(report.attempts(), 3);
        assert!(report
            .outcome
            .reason
            .starts_with("retries exhausted after 3 attempts"));
    }

    #[tokio::test]
    async fn timeout_is_bounded_by_budget_plus_poll() {
        let refresh = StaticRefresh {
            url: "https://example.com".into(),
            calls: AtomicU32::new(0),
        };
        let config = EventuallyConfig::new().timeout(120).poll(40).retries(1_000);
        let started = Instant::now();
        let report = eventually(
            &url_contains("never-there"),
            AssertContext::new().with_url("https://example.com"),
            &refresh,
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!report.outcome.passed);
        assert!(report.outcome.reason.starts_with("timeout after 120 ms"));
        assert!(started.elapsed() < Duration::from_millis(120 + 40 + 200));
    }

    #[tokio::test]
    async fn cancellation_escapes() {
        let refresh = StaticRefresh {
            url: "https://example.com".into(),
            calls: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = eventually(
            &url_contains("x"),
            AssertContext::new(),
            &refresh,
            &EventuallyConfig::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VerifyError::Cancelled));
    }

    #[tokio::test]
    async fn refresh_failure_becomes_failing_attempt() {
        struct FailingRefresh;

        #[async_trait]
        impl ContextRefresh for FailingRefresh {
            async fn refresh(&self, _limit: Option<u32>) -> Result<AssertContext, RefreshError> {
                Err(RefreshError::Failed("extension bridge gone".into()))
            }
        }

        let config = EventuallyConfig::new().timeout(60_000).poll(5).retries(2);
        let report = eventually(
            &url_contains("x"),
            AssertContext::new().with_url("https://example.com"),
            &FailingRefresh,
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!report.outcome.passed);
        assert!(report.outcome.reason.contains("snapshot refresh failed"));
        assert_eq!(report.attempt_outcomes.len(), 2);
    }

    #[test]
    fn growth_limits_follow_policy() {
        let only_on_fail = SnapshotLimitGrowth {
            start_limit: 60,
            step: 40,
            max_limit: 220,
            apply_on: GrowthApply::OnlyOnFail,
        };
        let limits: Vec<u32> = (1..=6).map(|i| only_on_fail.limit_for_refresh(i)).collect();
        assert_eq!(limits, vec![60, 100, 140, 180, 220, 220]);

        let all = SnapshotLimitGrowth {
            apply_on: GrowthApply::All,
            ..only_on_fail
        };
        let limits: Vec<u32> = (1..=3).map(|i| all.limit_for_refresh(i)).collect();
        assert_eq!(limits, vec![100, 140, 180]);
    }

    #[tokio::test]
    async fn growth_limit_is_passed_to_refresh() {
        struct LimitRecorder {
            limits: std::sync::Mutex<Vec<Option<u32>>>,
        }

        #[async_trait]
        impl ContextRefresh for LimitRecorder {
            async fn refresh(&self, limit: Option<u32>) -> Result<AssertContext, RefreshError> {
                self.limits.lock().unwrap().push(limit);
                Ok(AssertContext::new().with_url("https://example.com"))
            }
        }

        let recorder = LimitRecorder {
            limits: std::sync::Mutex::new(Vec::new()),
        };
        let config = EventuallyConfig::new()
            .timeout(60_000)
            .poll(5)
            .retries(4)
            .limit_growth(SnapshotLimitGrowth {
                start_limit: 60,
                step: 40,
                max_limit: 220,
                apply_on: GrowthApply::OnlyOnFail,
            });
        let _ = eventually(
            &url_contains("never"),
            AssertContext::new().with_url("https://example.com"),
            &recorder,
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            *recorder.limits.lock().unwrap(),
            vec![Some(60), Some(100), Some(140)]
        );
    }
}
