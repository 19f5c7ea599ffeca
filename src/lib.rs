//! Lantern: a verification-first runtime for agents that drive web
//! browsers.
//!
//! Agents propose actions; the runtime perceives the page as structured
//! semantic snapshots, executes actions against stable element ids, and
//! gates each step with deterministic predicate assertions whose results
//! land in a structured trace. The output is a reproducible, debuggable
//! record of agent behavior.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lantern::{Harness, MockBackend, MockExecutor, StepSpec, StepVerification};
//! use lantern::verify::url_contains;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let backend = Arc::new(MockBackend::new().with_url("https://example.com"));
//! let executor = Arc::new(MockExecutor::new());
//! let harness = Harness::builder()
//!     .backend(backend)
//!     .executor(executor)
//!     .jsonl_trace("run.jsonl")?
//!     .build();
//!
//! let spec = StepSpec::new("follow the More information link")
//!     .verify(StepVerification::required(url_contains("iana.org"), "navigated"));
//! let outcome = harness.step_loop().step("reach IANA", &spec).await?;
//! assert!(outcome.ok());
//! # Ok(())
//! # }
//! ```

pub mod harness;
pub mod telemetry;

pub use harness::{Harness, HarnessBuilder};

pub use agent_loop::{
    Action, DefaultPromptBuilder, Executor, ExecutorReply, ExecutorRequest, LoopConfig,
    LoopError, MockExecutor, PromptBuilder, PromptInput, RunStatus, RunSummary, StepLoop,
    StepOutcome, StepSpec, StepVerification,
};
pub use agent_runtime::{
    AgentRuntime, CaptchaGateOutcome, CaptchaHandler, CaptchaOptions, CaptchaPolicy, LlmRole,
    MockVisionExecutor, RuntimeConfig, RuntimeError, ScrollOptions, StepEndData, StepReport,
    TokenLedger, TokenReport, TokenUsage, VerificationKind, VerificationResult, VisionExecutor,
    VisionRequest,
};
pub use backend_port::{
    Backend, BackendError, LayoutMetrics, MockBackend, MouseButton, ReadyState, ViewportInfo,
};
pub use cdp_backend::{CdpBackend, CdpTransport, NoopTransport};
pub use lantern_core_types::{BBox, Point, RunId, StepId};
pub use page_snapshot::{
    compact_block, compact_lines, CachedSnapshot, CaptchaDiagnostics, CompactConfig,
    DownloadRecord, DownloadStatus, Element, Snapshot, SnapshotError, SnapshotOptions,
    SnapshotService,
};
pub use trace_store::{JsonlSink, MemorySink, NoopSink, TraceEvent, TraceEventType, TraceSink, Tracer};

/// The verification algebra, re-exported under one roof.
pub mod verify {
    pub use verify_gate::{
        all_of, any_of, custom, download_completed, element_count, eventually, exists, expect,
        expect_no_text, expect_text_present, is_checked, is_collapsed, is_disabled, is_enabled,
        is_expanded, is_unchecked, not, not_exists, parse_selector, url_contains, url_matches,
        value_contains, value_equals, AssertContext, AssertOutcome, ElementQuery,
        EventuallyConfig, GrowthApply, Predicate, SnapshotLimitGrowth,
    };
}
