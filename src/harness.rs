//! Convenience wiring: backend + tracer + runtime + step loop.

use std::path::Path;
use std::sync::Arc;

use agent_loop::{Executor, LoopConfig, MockExecutor, PromptBuilder, StepLoop};
use agent_runtime::{AgentRuntime, CaptchaHandler, RuntimeConfig, VisionExecutor};
use anyhow::Result;
use backend_port::Backend;
use lantern_core_types::RunId;
use tokio_util::sync::CancellationToken;
use trace_store::{JsonlSink, TraceSink, Tracer};

/// An assembled runtime + step loop sharing one trace stream.
pub struct Harness {
    runtime: Arc<AgentRuntime>,
    step_loop: StepLoop,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn runtime(&self) -> Arc<AgentRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn step_loop(&self) -> &StepLoop {
        &self.step_loop
    }

    /// Flush and close every sink. Call once the run is over.
    pub fn close(&self) {
        self.runtime.tracer().close();
    }
}

/// Builder for [`Harness`].
#[derive(Default)]
pub struct HarnessBuilder {
    backend: Option<Arc<dyn Backend>>,
    executor: Option<Arc<dyn Executor>>,
    sinks: Vec<Arc<dyn TraceSink>>,
    run_id: Option<RunId>,
    runtime_config: RuntimeConfig,
    loop_config: LoopConfig,
    prompt_builder: Option<Arc<dyn PromptBuilder>>,
    captcha_handler: Option<Arc<dyn CaptchaHandler>>,
    vision: Option<Arc<dyn VisionExecutor>>,
    cancel: Option<CancellationToken>,
}

impl HarnessBuilder {
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Append a JSONL trace sink writing to `path`.
    pub fn jsonl_trace(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.sinks.push(Arc::new(JsonlSink::create(path)?));
        Ok(self)
    }

    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    pub fn loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = config;
        self
    }

    pub fn prompt_builder(mut self, builder: Arc<dyn PromptBuilder>) -> Self {
        self.prompt_builder = Some(builder);
        self
    }

    pub fn captcha_handler(mut self, handler: Arc<dyn CaptchaHandler>) -> Self {
        self.captcha_handler = Some(handler);
        self
    }

    pub fn vision(mut self, vision: Arc<dyn VisionExecutor>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Assemble. Missing backend/executor fall back to the in-crate mocks
    /// so offline wiring stays one-liner simple.
    pub fn build(self) -> Harness {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(backend_port::MockBackend::new()));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(MockExecutor::new()));
        let tracer = Tracer::new(self.run_id.unwrap_or_default(), self.sinks);

        let mut runtime = AgentRuntime::new(backend, tracer, self.runtime_config);
        if let Some(handler) = self.captcha_handler {
            runtime = runtime.with_captcha_handler(handler);
        }
        if let Some(vision) = self.vision {
            runtime = runtime.with_vision(vision);
        }
        if let Some(cancel) = self.cancel {
            runtime = runtime.with_cancellation(cancel);
        }
        let runtime = Arc::new(runtime);

        let mut step_loop =
            StepLoop::new(Arc::clone(&runtime), executor).with_config(self.loop_config);
        if let Some(builder) = self.prompt_builder {
            step_loop = step_loop.with_prompt_builder(builder);
        }

        Harness { runtime, step_loop }
    }
}
