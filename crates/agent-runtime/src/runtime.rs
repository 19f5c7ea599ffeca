//! The agent runtime: step lifecycle, assertions, scroll proof, captcha
//! gating.

use std::sync::Arc;

use async_trait::async_trait;
use backend_port::Backend;
use lantern_core_types::{RunId, StepId};
use page_snapshot::{
    CachedSnapshot, DownloadRecord, Snapshot, SnapshotOptions, SnapshotService,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use trace_store::{TraceEvent, Tracer};
use tracing::{debug, info, warn};
use verify_gate::{
    eventually, AssertContext, AssertOutcome, ContextRefresh, EventuallyConfig, Predicate,
    RefreshError, VerifyError,
};

use crate::captcha::{CaptchaGateOutcome, CaptchaHandler, CaptchaOptions, CaptchaPolicy};
use crate::errors::RuntimeError;
use crate::step::{OpenStep, StepEndData, StepReport, VerificationKind, VerificationResult};
use crate::tokens::{LlmRole, TokenLedger, TokenUsage};
use crate::vision::VisionExecutor;

/// Default snapshot staleness bound, in ms.
pub const SNAPSHOT_MAX_AGE_MS: u64 = 2_000;

/// Default scroll verification budget, in ms.
pub const SCROLL_VERIFY_TIMEOUT_MS: u64 = 5_000;

/// Runtime configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Snapshot cache staleness bound.
    pub snapshot_max_age_ms: u64,
    /// Auto-open a synthetic `verify:<label>` step for out-of-step
    /// assertions instead of raising.
    pub auto_step: bool,
    pub captcha: CaptchaOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            snapshot_max_age_ms: SNAPSHOT_MAX_AGE_MS,
            auto_step: true,
            captcha: CaptchaOptions::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            auto_step: false,
            ..Self::default()
        }
    }

    pub fn with_captcha(mut self, captcha: CaptchaOptions) -> Self {
        self.captcha = captcha;
        self
    }

    pub fn with_snapshot_max_age(mut self, max_age_ms: u64) -> Self {
        self.snapshot_max_age_ms = max_age_ms;
        self
    }
}

/// Options for a proof-of-scroll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrollOptions {
    /// Prove the scroll happened instead of assuming it.
    pub verify: bool,
    /// Minimum observed `scrollY` delta that counts as progress.
    pub min_delta_px: f64,
    pub timeout_ms: u64,
    pub poll_ms: u64,
    /// Dispatch a JS `scrollBy` and re-verify when the wheel was absorbed.
    pub js_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub required: bool,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            verify: true,
            min_delta_px: 50.0,
            timeout_ms: SCROLL_VERIFY_TIMEOUT_MS,
            poll_ms: 100,
            js_fallback: true,
            label: None,
            required: false,
        }
    }
}

/// The runtime instance. One open step at a time; the snapshot cache and
/// step state are owned exclusively, the backend may be shared with an
/// external orchestrator.
pub struct AgentRuntime {
    backend: Arc<dyn Backend>,
    tracer: Tracer,
    config: RuntimeConfig,
    cache: Mutex<CachedSnapshot>,
    current: Mutex<Option<OpenStep>>,
    downloads: parking_lot::Mutex<Vec<DownloadRecord>>,
    tokens: TokenLedger,
    captcha_handler: Option<Arc<dyn CaptchaHandler>>,
    vision: Option<Arc<dyn VisionExecutor>>,
    cancel: CancellationToken,
}

impl AgentRuntime {
    pub fn new(backend: Arc<dyn Backend>, tracer: Tracer, config: RuntimeConfig) -> Self {
        let cancel = CancellationToken::new();
        let service =
            SnapshotService::new(Arc::clone(&backend)).with_cancellation(cancel.clone());
        Self {
            cache: Mutex::new(CachedSnapshot::new(service, config.snapshot_max_age_ms)),
            backend,
            tracer,
            config,
            current: Mutex::new(None),
            downloads: parking_lot::Mutex::new(Vec::new()),
            tokens: TokenLedger::new(),
            captcha_handler: None,
            vision: None,
            cancel,
        }
    }

    pub fn with_captcha_handler(mut self, handler: Arc<dyn CaptchaHandler>) -> Self {
        self.captcha_handler = Some(handler);
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionExecutor>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel.clone();
        let service =
            SnapshotService::new(Arc::clone(&self.backend)).with_cancellation(cancel);
        self.cache = Mutex::new(CachedSnapshot::new(
            service,
            self.config.snapshot_max_age_ms,
        ));
        self
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn run_id(&self) -> &RunId {
        self.tracer.run_id()
    }

    pub fn tokens(&self) -> &TokenLedger {
        &self.tokens
    }

    pub fn vision(&self) -> Option<Arc<dyn VisionExecutor>> {
        self.vision.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn record_tokens(&self, role: LlmRole, usage: &TokenUsage) {
        self.tokens.record(role, usage);
    }

    /// Feed a download record into the verification context.
    pub fn record_download(&self, record: DownloadRecord) {
        self.downloads.lock().push(record);
    }

    pub fn set_downloads(&self, records: Vec<DownloadRecord>) {
        *self.downloads.lock() = records;
    }

    // ---- step lifecycle ----------------------------------------------

    /// Open a step. An auto-opened synthetic step is ended first; a real
    /// open step is a programmer error.
    pub async fn begin_step(
        &self,
        goal: &str,
        step_index: Option<u32>,
    ) -> Result<StepId, RuntimeError> {
        let mut current = self.current.lock().await;
        if let Some(open) = current.take() {
            if open.synthetic {
                self.finish_step(open, StepEndData::new());
            } else {
                let id = open.id.clone();
                *current = Some(open);
                return Err(RuntimeError::StepAlreadyOpen(id));
            }
        }

        let id = StepId::new();
        info!(target: "agent-runtime", step = %id, goal, "step start");
        self.tracer.emit(TraceEvent::step_start(
            self.run_id().clone(),
            id.clone(),
            goal,
            step_index,
        ));
        *current = Some(OpenStep::new(id.clone(), goal, false));
        Ok(id)
    }

    /// Close the current step. Idempotent: without an open step this is a
    /// no-op returning `None`.
    pub async fn end_step(&self, data: StepEndData) -> Option<StepReport> {
        let mut current = self.current.lock().await;
        current.take().map(|open| self.finish_step(open, data))
    }

    pub async fn current_step_id(&self) -> Option<StepId> {
        self.current.lock().await.as_ref().map(|s| s.id.clone())
    }

    fn finish_step(&self, open: OpenStep, data: StepEndData) -> StepReport {
        let report = StepReport {
            step_id: open.id.clone(),
            goal: open.goal.clone(),
            ok: open.ok() && data.error.is_none(),
            done_signalled: open.done_signalled,
            verifications: open.verifications.clone(),
            duration_ms: open.began_at.elapsed().as_millis() as u64,
            action: data.action.clone(),
            error: data.error.clone(),
        };
        self.tracer.emit(TraceEvent::step_end(
            self.run_id().clone(),
            open.id.clone(),
            json!({
                "goal": report.goal,
                "ok": report.ok,
                "done_signalled": report.done_signalled,
                "duration_ms": report.duration_ms,
                "action": report.action,
                "error": report.error,
                "verifications": report.verifications,
            }),
        ));
        info!(target: "agent-runtime", step = %report.step_id, ok = report.ok, "step end");
        report
    }

    // ---- snapshots ---------------------------------------------------

    /// Snapshot through the cache; an actual fetch emits a `snapshot`
    /// trace event.
    pub async fn snapshot(&self, options: &SnapshotOptions) -> Result<Snapshot, RuntimeError> {
        self.snapshot_with(options, false).await
    }

    /// Bypass the cache.
    pub async fn snapshot_fresh(
        &self,
        options: &SnapshotOptions,
    ) -> Result<Snapshot, RuntimeError> {
        self.snapshot_with(options, true).await
    }

    async fn snapshot_with(
        &self,
        options: &SnapshotOptions,
        force_refresh: bool,
    ) -> Result<Snapshot, RuntimeError> {
        let step_id = self.current_step_id().await;
        let mut cache = self.cache.lock().await;
        let fetching = force_refresh || !cache.is_fresh();
        let snapshot = cache.get(options, force_refresh).await.map_err(|err| {
            if err.is_cancelled() {
                RuntimeError::Cancelled
            } else {
                RuntimeError::Snapshot(err)
            }
        })?;
        if fetching {
            self.tracer.emit(TraceEvent::snapshot(
                self.run_id().clone(),
                step_id,
                &snapshot.url,
                snapshot.elements.len(),
            ));
        }
        Ok(snapshot)
    }

    /// Drop the cached snapshot; any mutating action must do this.
    pub async fn invalidate_snapshot(&self) {
        self.cache.lock().await.invalidate();
    }

    /// Current context: cached snapshot (no fetch), step id, downloads.
    pub async fn build_context(&self) -> AssertContext {
        let step_id = self.current_step_id().await;
        let cache = self.cache.lock().await;
        let mut context = AssertContext::new();
        if let Some(snapshot) = cache.peek() {
            context = context.with_snapshot(snapshot.clone());
        } else if let Some(url) = cache.cached_url() {
            context = context.with_url(url);
        }
        if let Some(step_id) = step_id {
            context = context.with_step_id(step_id);
        }
        context.with_downloads(self.downloads.lock().clone())
    }

    // ---- assertions --------------------------------------------------

    /// Evaluate against the current context and record the result. A
    /// failing required assertion marks the step failed; the call itself
    /// never errors for a plain verification failure.
    pub async fn assert(
        &self,
        predicate: &Predicate,
        label: &str,
        required: bool,
    ) -> Result<VerificationResult, RuntimeError> {
        self.assert_kind(predicate, label, required, VerificationKind::Assert)
            .await
    }

    /// Required assertion that also signals terminal task success on pass.
    pub async fn assert_done(
        &self,
        predicate: &Predicate,
        label: &str,
    ) -> Result<VerificationResult, RuntimeError> {
        let result = self
            .assert_kind(predicate, label, true, VerificationKind::AssertDone)
            .await?;
        if result.passed {
            if let Some(open) = self.current.lock().await.as_mut() {
                open.done_signalled = true;
            }
        }
        Ok(result)
    }

    async fn assert_kind(
        &self,
        predicate: &Predicate,
        label: &str,
        required: bool,
        kind: VerificationKind,
    ) -> Result<VerificationResult, RuntimeError> {
        self.ensure_step_for(label).await?;
        let context = self.build_context().await;
        let outcome = predicate.evaluate(&context);
        let result = VerificationResult::from_outcome(label, required, kind, &outcome);
        self.emit_verification(&result).await;
        self.record_on_step(result.clone()).await;
        Ok(result)
    }

    /// Deferred assertion handle: `.once()` or `.eventually(budget)`.
    pub fn check(&self, predicate: Predicate, label: &str, required: bool) -> AssertionHandle<'_> {
        AssertionHandle {
            runtime: self,
            predicate,
            label: label.to_string(),
            required,
        }
    }

    async fn ensure_step_for(&self, label: &str) -> Result<(), RuntimeError> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return Ok(());
        }
        if !self.config.auto_step {
            return Err(RuntimeError::NoOpenStep(label.to_string()));
        }
        let id = StepId::synthetic(label);
        debug!(target: "agent-runtime", step = %id, "auto-opening synthetic verify step");
        self.tracer.emit(TraceEvent::step_start(
            self.run_id().clone(),
            id.clone(),
            &format!("verify {label}"),
            None,
        ));
        *current = Some(OpenStep::new(id, format!("verify {label}"), true));
        Ok(())
    }

    async fn emit_verification(&self, result: &VerificationResult) {
        let step_id = self.current_step_id().await;
        self.tracer.emit(TraceEvent::verification(
            self.run_id().clone(),
            step_id,
            result.to_trace_data(),
        ));
    }

    async fn record_on_step(&self, result: VerificationResult) {
        if let Some(open) = self.current.lock().await.as_mut() {
            open.record(result);
        }
    }

    /// Emit an `error` trace event.
    pub async fn emit_error(&self, name: &str, message: &str) {
        let step_id = self.current_step_id().await;
        self.tracer.emit(TraceEvent::error(
            self.run_id().clone(),
            step_id,
            name,
            message,
        ));
    }

    /// Emit an `action` trace event.
    pub async fn emit_action(&self, data: serde_json::Value) {
        let step_id = self.current_step_id().await;
        self.tracer
            .emit(TraceEvent::action(self.run_id().clone(), step_id, data));
    }

    // ---- scroll proof ------------------------------------------------

    /// Wheel the page and, when asked, prove the scroll happened.
    ///
    /// Overlays and nested scrollers silently absorb wheel events, so
    /// progress is measured (`scrollY` before/after) rather than assumed.
    /// Returns whether the scroll was proven (or dispatched, when
    /// `verify` is off).
    pub async fn scroll_by(
        &self,
        delta_y: f64,
        options: &ScrollOptions,
    ) -> Result<bool, RuntimeError> {
        let before = self.read_scroll_y().await?;
        self.backend.wheel(delta_y, None).await?;

        if !options.verify {
            self.invalidate_snapshot().await;
            return Ok(true);
        }

        let wanted = options.min_delta_px;
        let mut observed =
            self.await_scroll_delta(before, wanted, options.timeout_ms, options.poll_ms)
                .await?;
        let mut via_fallback = false;
        if observed.abs() < wanted && options.js_fallback {
            via_fallback = true;
            debug!(target: "agent-runtime", delta_y, "wheel absorbed, trying JS scroll fallback");
            self.backend
                .eval(&format!("window.scrollBy(0, {delta_y})"))
                .await?;
            observed = self
                .await_scroll_delta(before, wanted, options.timeout_ms, options.poll_ms)
                .await?;
        }

        let passed = observed.abs() >= wanted;
        let label = options
            .label
            .clone()
            .unwrap_or_else(|| format!("scroll_by({delta_y})"));
        let outcome = if passed {
            AssertOutcome::pass(format!("scrolled {observed:.0} px (needed {wanted:.0})"))
        } else {
            AssertOutcome::fail(format!(
                "scroll not observed: moved {observed:.0} px of {wanted:.0} required"
            ))
        }
        .with_details(json!({
            "delta_y": delta_y,
            "observed_px": observed,
            "min_delta_px": wanted,
            "via_js_fallback": via_fallback,
        }));
        let result = VerificationResult::from_outcome(
            label,
            options.required,
            VerificationKind::Scroll,
            &outcome,
        );
        self.emit_verification(&result).await;
        self.record_on_step(result).await;

        self.invalidate_snapshot().await;
        Ok(passed)
    }

    async fn read_scroll_y(&self) -> Result<f64, RuntimeError> {
        let value = self
            .backend
            .eval("window.scrollY || document.documentElement.scrollTop || 0")
            .await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn await_scroll_delta(
        &self,
        before: f64,
        min_delta_px: f64,
        timeout_ms: u64,
        poll_ms: u64,
    ) -> Result<f64, RuntimeError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let observed = self.read_scroll_y().await? - before;
            if observed.abs() >= min_delta_px {
                return Ok(observed);
            }
            if Instant::now() >= deadline {
                return Ok(observed);
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RuntimeError::Cancelled),
                _ = sleep(Duration::from_millis(poll_ms)) => {}
            }
        }
    }

    // ---- captcha gate ------------------------------------------------

    /// Inspect a post-action snapshot's captcha diagnostics and apply the
    /// configured policy.
    pub async fn captcha_gate(
        &self,
        snapshot: &Snapshot,
    ) -> Result<CaptchaGateOutcome, RuntimeError> {
        let Some(diagnostics) = snapshot.captcha() else {
            return Ok(CaptchaGateOutcome::Clear);
        };
        if !self.config.captcha.should_gate(diagnostics) {
            if diagnostics.detected {
                debug!(
                    target: "agent-runtime",
                    confidence = diagnostics.confidence,
                    "passive captcha evidence suppressed"
                );
                return Ok(CaptchaGateOutcome::Suppressed);
            }
            return Ok(CaptchaGateOutcome::Clear);
        }

        match self.config.captcha.policy {
            CaptchaPolicy::Abort => {
                self.fail_captcha("interactive captcha detected", diagnostics)
                    .await;
                Err(RuntimeError::CaptchaAbort {
                    confidence: diagnostics.confidence,
                    provider_hint: diagnostics.provider_hint.clone(),
                })
            }
            CaptchaPolicy::Callback => self.await_captcha_cleared(diagnostics.clone()).await,
        }
    }

    async fn await_captcha_cleared(
        &self,
        mut diagnostics: page_snapshot::CaptchaDiagnostics,
    ) -> Result<CaptchaGateOutcome, RuntimeError> {
        let Some(handler) = self.captcha_handler.clone() else {
            warn!(target: "agent-runtime", "callback captcha policy without a handler, aborting");
            self.fail_captcha("captcha callback policy without handler", &diagnostics)
                .await;
            return Err(RuntimeError::CaptchaAbort {
                confidence: diagnostics.confidence,
                provider_hint: diagnostics.provider_hint.clone(),
            });
        };

        let timeout_ms = self.config.captcha.timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            if !handler.on_captcha(&diagnostics).await {
                self.fail_captcha("captcha handler gave up", &diagnostics)
                    .await;
                return Err(RuntimeError::CaptchaAbort {
                    confidence: diagnostics.confidence,
                    provider_hint: diagnostics.provider_hint.clone(),
                });
            }

            let fresh = self.snapshot_fresh(&SnapshotOptions::new()).await?;
            let still_gated = fresh
                .captcha()
                .map(|d| self.config.captcha.should_gate(d))
                .unwrap_or(false);
            if !still_gated {
                let outcome = AssertOutcome::pass("captcha cleared by handler");
                let result = VerificationResult::from_outcome(
                    "captcha",
                    true,
                    VerificationKind::Captcha,
                    &outcome,
                );
                self.emit_verification(&result).await;
                self.record_on_step(result).await;
                return Ok(CaptchaGateOutcome::Resolved);
            }
            if let Some(d) = fresh.captcha() {
                diagnostics = d.clone();
            }

            if Instant::now() >= deadline {
                self.fail_captcha("captcha wait timed out", &diagnostics)
                    .await;
                return Err(RuntimeError::CaptchaTimeout { timeout_ms });
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RuntimeError::Cancelled),
                _ = sleep(Duration::from_millis(self.config.captcha.poll_ms)) => {}
            }
        }
    }

    async fn fail_captcha(
        &self,
        reason: &str,
        diagnostics: &page_snapshot::CaptchaDiagnostics,
    ) {
        let outcome = AssertOutcome::fail(reason).with_details(json!({
            "confidence": diagnostics.confidence,
            "provider_hint": diagnostics.provider_hint,
            "evidence": diagnostics.evidence,
        }));
        let result =
            VerificationResult::from_outcome("captcha", true, VerificationKind::Captcha, &outcome);
        self.emit_verification(&result).await;
        self.record_on_step(result).await;
    }
}

/// Deferred assertion bound to a runtime.
pub struct AssertionHandle<'a> {
    runtime: &'a AgentRuntime,
    predicate: Predicate,
    label: String,
    required: bool,
}

impl AssertionHandle<'_> {
    /// Immediate one-shot evaluation.
    pub async fn once(self) -> Result<VerificationResult, RuntimeError> {
        self.runtime
            .assert(&self.predicate, &self.label, self.required)
            .await
    }

    /// Drive through the retry-with-refresh evaluator. Each attempt emits
    /// its own verification event; the final outcome is the one recorded
    /// on the step.
    pub async fn eventually(
        self,
        config: &EventuallyConfig,
    ) -> Result<VerificationResult, RuntimeError> {
        self.runtime.ensure_step_for(&self.label).await?;
        let initial = self.runtime.build_context().await;
        let refresh = RuntimeRefresh {
            runtime: self.runtime,
        };
        let report = eventually(
            &self.predicate,
            initial,
            &refresh,
            config,
            &self.runtime.cancel,
        )
        .await
        .map_err(|err| match err {
            VerifyError::Cancelled => RuntimeError::Cancelled,
            VerifyError::Parse(message) => {
                RuntimeError::Snapshot(page_snapshot::SnapshotError::Decode(message))
            }
        })?;

        let total = report.attempt_outcomes.len();
        for attempt in report.attempt_outcomes.iter().take(total.saturating_sub(1)) {
            let intermediate = VerificationResult::from_outcome(
                &self.label,
                self.required,
                VerificationKind::Assert,
                attempt,
            );
            self.runtime.emit_verification(&intermediate).await;
        }

        let result = VerificationResult::from_outcome(
            &self.label,
            self.required,
            VerificationKind::Assert,
            &report.outcome,
        );
        self.runtime.emit_verification(&result).await;
        self.runtime.record_on_step(result.clone()).await;
        Ok(result)
    }
}

struct RuntimeRefresh<'a> {
    runtime: &'a AgentRuntime,
}

#[async_trait]
impl ContextRefresh for RuntimeRefresh<'_> {
    async fn refresh(&self, limit: Option<u32>) -> Result<AssertContext, RefreshError> {
        let mut options = SnapshotOptions::new();
        if let Some(limit) = limit {
            options = options.with_limit(limit);
        }
        match self.runtime.snapshot_fresh(&options).await {
            Ok(_) => Ok(self.runtime.build_context().await),
            Err(RuntimeError::Cancelled) => Err(RefreshError::Cancelled),
            Err(err) => Err(RefreshError::Failed(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_port::MockBackend;
    use serde_json::json;
    use trace_store::{MemorySink, TraceEventType};
    use verify_gate::{exists, url_contains};

    fn runtime_with(
        backend: Arc<MockBackend>,
        config: RuntimeConfig,
    ) -> (AgentRuntime, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let tracer = Tracer::new(RunId("run-test".into()), vec![sink.clone()]);
        (AgentRuntime::new(backend, tracer, config), sink)
    }

    fn page_payload(url: &str) -> serde_json::Value {
        json!({
            "status": "success",
            "url": url,
            "viewport": { "width": 1280.0, "height": 720.0 },
            "elements": [{
                "id": 1,
                "role": "heading",
                "text": "Example Domain",
                "bbox": { "x": 0.0, "y": 0.0, "width": 100.0, "height": 30.0 },
            }]
        })
    }

    fn captcha_payload(url: &str, interactive: bool) -> serde_json::Value {
        let evidence = if interactive {
            json!({ "text_hits": ["I'm not a robot"] })
        } else {
            json!({ "iframe_src_hits": ["https://www.google.com/recaptcha/api2/anchor"] })
        };
        json!({
            "status": "success",
            "url": url,
            "viewport": { "width": 1280.0, "height": 720.0 },
            "elements": [],
            "diagnostics": { "captcha": {
                "detected": true,
                "confidence": 0.95,
                "evidence": evidence,
            }}
        })
    }

    #[tokio::test]
    async fn step_lifecycle_emits_start_and_end() {
        let backend = Arc::new(MockBackend::new());
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        let id = runtime.begin_step("visit example.com", Some(0)).await.unwrap();
        let report = runtime.end_step(StepEndData::new()).await.unwrap();
        assert_eq!(report.step_id, id);
        assert!(report.ok);

        let types: Vec<_> = sink.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![TraceEventType::StepStart, TraceEventType::StepEnd]
        );

        // second end is a no-op
        assert!(runtime.end_step(StepEndData::new()).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_begin_step_is_a_programmer_error() {
        let backend = Arc::new(MockBackend::new());
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("first", None).await.unwrap();
        let err = runtime.begin_step("second", None).await.unwrap_err();
        assert_eq!(err.name(), "StepAlreadyOpen");
    }

    #[tokio::test]
    async fn assert_records_and_emits() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(page_payload("https://example.com"));
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("check page", None).await.unwrap();
        runtime.snapshot(&SnapshotOptions::new()).await.unwrap();

        let ok = runtime
            .assert(&exists("role=heading"), "heading-present", true)
            .await
            .unwrap();
        assert!(ok.passed);

        let failed = runtime
            .assert(&exists("role=dialog"), "dialog-present", true)
            .await
            .unwrap();
        assert!(!failed.passed);

        let report = runtime.end_step(StepEndData::new()).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.verifications.len(), 2);

        let verifications = sink
            .events()
            .iter()
            .filter(|e| e.event_type == TraceEventType::Verification)
            .count();
        assert_eq!(verifications, 2);
    }

    #[tokio::test]
    async fn optional_failure_keeps_step_ok() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(page_payload("https://example.com"));
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("check page", None).await.unwrap();
        runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        runtime
            .assert(&exists("role=dialog"), "dialog-present", false)
            .await
            .unwrap();
        let report = runtime.end_step(StepEndData::new()).await.unwrap();
        assert!(report.ok);
    }

    #[tokio::test]
    async fn out_of_step_assert_auto_opens_synthetic_step() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(page_payload("https://example.com"));
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        runtime
            .assert(&url_contains("example.com"), "url-check", false)
            .await
            .unwrap();
        let id = runtime.current_step_id().await.unwrap();
        assert_eq!(id.0, "verify:url-check");

        // a real step ends the synthetic one first
        runtime.begin_step("real step", None).await.unwrap();
        let id = runtime.current_step_id().await.unwrap();
        assert!(id.0.starts_with("step-"));
    }

    #[tokio::test]
    async fn strict_mode_raises_instead_of_auto_stepping() {
        let backend = Arc::new(MockBackend::new());
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::strict());

        let err = runtime
            .assert(&url_contains("x"), "url-check", false)
            .await
            .unwrap_err();
        assert_eq!(err.name(), "NoOpenStep");
        // programmer errors are not recorded as verifications
        assert!(sink
            .events()
            .iter()
            .all(|e| e.event_type != TraceEventType::Verification));
    }

    #[tokio::test]
    async fn assert_done_signals_terminal_success() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(page_payload("https://example.com"));
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("finish", None).await.unwrap();
        runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        runtime
            .assert_done(&url_contains("example.com"), "done-check")
            .await
            .unwrap();
        let report = runtime.end_step(StepEndData::new()).await.unwrap();
        assert!(report.ok);
        assert!(report.done_signalled);
    }

    #[tokio::test]
    async fn scroll_proof_passes_on_real_movement() {
        let backend = Arc::new(MockBackend::new().with_page_height(3000.0));
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        let options = ScrollOptions {
            min_delta_px: 50.0,
            timeout_ms: 1_000,
            poll_ms: 10,
            js_fallback: false,
            ..Default::default()
        };
        assert!(runtime.scroll_by(200.0, &options).await.unwrap());

        let scroll_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.event_type == TraceEventType::Verification)
            .collect();
        assert_eq!(scroll_events.len(), 1);
        assert_eq!(scroll_events[0].data["kind"], json!("scroll"));
        assert_eq!(scroll_events[0].data["passed"], json!(true));
    }

    #[tokio::test]
    async fn absorbed_wheel_fails_the_proof() {
        let backend = Arc::new(
            MockBackend::new()
                .with_page_height(3000.0)
                .with_absorbed_wheel(),
        );
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        let options = ScrollOptions {
            min_delta_px: 50.0,
            timeout_ms: 200,
            poll_ms: 20,
            js_fallback: false,
            ..Default::default()
        };
        assert!(!runtime.scroll_by(200.0, &options).await.unwrap());

        let event = sink
            .events()
            .into_iter()
            .find(|e| e.event_type == TraceEventType::Verification)
            .unwrap();
        assert_eq!(event.data["kind"], json!("scroll"));
        assert_eq!(event.data["passed"], json!(false));
    }

    #[tokio::test]
    async fn js_fallback_rescues_absorbed_wheel() {
        // wheel events are swallowed but window.scrollBy still works
        let backend = Arc::new(
            MockBackend::new()
                .with_page_height(3000.0)
                .with_absorbed_wheel(),
        );
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        let options = ScrollOptions {
            min_delta_px: 50.0,
            timeout_ms: 200,
            poll_ms: 20,
            js_fallback: true,
            ..Default::default()
        };
        assert!(runtime.scroll_by(200.0, &options).await.unwrap());
    }

    #[tokio::test]
    async fn interactive_captcha_aborts_under_abort_policy() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(captcha_payload("https://example.com", true));
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("gated step", None).await.unwrap();
        let snapshot = runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        let err = runtime.captcha_gate(&snapshot).await.unwrap_err();
        assert_eq!(err.name(), "CaptchaAbort");

        let event = sink
            .events()
            .into_iter()
            .find(|e| e.event_type == TraceEventType::Verification)
            .unwrap();
        assert_eq!(event.data["kind"], json!("captcha"));
        assert_eq!(event.data["passed"], json!(false));
    }

    #[tokio::test]
    async fn passive_captcha_is_suppressed_regardless_of_confidence() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(captcha_payload("https://example.com", false));
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        let snapshot = runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        let outcome = runtime.captcha_gate(&snapshot).await.unwrap();
        assert_eq!(outcome, CaptchaGateOutcome::Suppressed);
    }

    #[tokio::test]
    async fn callback_policy_waits_for_handler() {
        struct SolveOnce;

        #[async_trait]
        impl CaptchaHandler for SolveOnce {
            async fn on_captcha(
                &self,
                _diagnostics: &page_snapshot::CaptchaDiagnostics,
            ) -> bool {
                true
            }
        }

        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(captcha_payload("https://example.com", true));
        // after the handler runs, the re-snapshot comes back clean
        backend.push_snapshot(page_payload("https://example.com"));

        let config = RuntimeConfig::default()
            .with_captcha(CaptchaOptions::callback().with_poll(10).with_timeout(2_000));
        let (runtime, _sink) = runtime_with(backend, config);
        let runtime = runtime.with_captcha_handler(Arc::new(SolveOnce));

        runtime.begin_step("gated step", None).await.unwrap();
        let snapshot = runtime.snapshot(&SnapshotOptions::new()).await.unwrap();
        let outcome = runtime.captcha_gate(&snapshot).await.unwrap();
        assert_eq!(outcome, CaptchaGateOutcome::Resolved);
    }

    #[tokio::test]
    async fn check_eventually_retries_with_fresh_snapshots() {
        let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
        backend.push_snapshot(page_payload("https://example.com"));
        backend.push_snapshot(json!({
            "status": "success",
            "url": "https://example.com",
            "viewport": { "width": 1280.0, "height": 720.0 },
            "elements": [{
                "id": 7,
                "role": "button",
                "text": "Loaded later",
                "bbox": { "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0 },
            }]
        }));
        let (runtime, sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.begin_step("wait for button", None).await.unwrap();
        runtime.snapshot(&SnapshotOptions::new()).await.unwrap();

        let config = EventuallyConfig::new().timeout(5_000).poll(10);
        let result = runtime
            .check(exists("role=button"), "button-appears", true)
            .eventually(&config)
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.attempts, 2);

        // one verification event per attempt
        let verification_events = sink
            .events()
            .iter()
            .filter(|e| e.event_type == TraceEventType::Verification)
            .count();
        assert_eq!(verification_events, 2);
    }

    #[tokio::test]
    async fn download_context_flows_into_predicates() {
        use page_snapshot::{DownloadRecord, DownloadStatus};
        use verify_gate::download_completed;

        let backend = Arc::new(MockBackend::new());
        let (runtime, _sink) = runtime_with(backend, RuntimeConfig::default());

        runtime.record_download(DownloadRecord {
            filename: "report.csv".into(),
            status: DownloadStatus::Completed,
            bytes: None,
        });

        runtime.begin_step("download gate", None).await.unwrap();
        let hit = runtime
            .assert(&download_completed(Some("report.csv")), "report-done", true)
            .await
            .unwrap();
        assert!(hit.passed);
        let miss = runtime
            .assert(&download_completed(Some("other")), "other-done", false)
            .await
            .unwrap();
        assert!(!miss.passed);
    }
}
