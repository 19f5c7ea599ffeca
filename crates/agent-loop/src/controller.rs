//! The step loop controller.

use std::sync::Arc;

use agent_runtime::{AgentRuntime, LlmRole, StepEndData, VisionRequest};
use backend_port::MouseButton;
use page_snapshot::{Snapshot, SnapshotOptions};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::errors::LoopError;
use crate::executor::{Executor, ExecutorRequest};
use crate::prompt::{DefaultPromptBuilder, PromptBuilder, PromptInput};
use crate::types::{LoopConfig, RunStatus, RunSummary, StepOutcome, StepSpec};

/// Drives steps against one runtime and one executor.
pub struct StepLoop {
    runtime: Arc<AgentRuntime>,
    executor: Arc<dyn Executor>,
    prompt_builder: Arc<dyn PromptBuilder>,
    config: LoopConfig,
}

impl StepLoop {
    pub fn new(runtime: Arc<AgentRuntime>, executor: Arc<dyn Executor>) -> Self {
        Self {
            runtime,
            executor,
            prompt_builder: Arc::new(DefaultPromptBuilder::new()),
            config: LoopConfig::default(),
        }
    }

    pub fn with_prompt_builder(mut self, builder: Arc<dyn PromptBuilder>) -> Self {
        self.prompt_builder = builder;
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn runtime(&self) -> Arc<AgentRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Drive one step end to end.
    pub async fn step(&self, task_goal: &str, spec: &StepSpec) -> Result<StepOutcome, LoopError> {
        self.step_indexed(task_goal, spec, None).await
    }

    async fn step_indexed(
        &self,
        task_goal: &str,
        spec: &StepSpec,
        index: Option<u32>,
    ) -> Result<StepOutcome, LoopError> {
        self.runtime.begin_step(&spec.goal, index).await?;

        match self.drive_step(task_goal, spec).await {
            Ok((action, used_vision)) => {
                let report = self
                    .runtime
                    .end_step(StepEndData::new().with_action(json!(action.canonical())))
                    .await
                    .expect("step opened by this loop is still open");
                let finished = action.is_terminal() || report.done_signalled;
                Ok(StepOutcome {
                    report,
                    action: Some(action),
                    finished,
                    used_vision,
                })
            }
            Err(err) => {
                self.runtime.emit_error(err.name(), &err.to_string()).await;
                let report = self
                    .runtime
                    .end_step(StepEndData::new().with_error(err.to_string()))
                    .await
                    .expect("step opened by this loop is still open");
                if err.escapes_step() {
                    return Err(err);
                }
                warn!(target: "agent-loop", error = %err, "step failed");
                Ok(StepOutcome {
                    report,
                    action: None,
                    finished: false,
                    used_vision: false,
                })
            }
        }
    }

    async fn drive_step(
        &self,
        task_goal: &str,
        spec: &StepSpec,
    ) -> Result<(Action, bool), LoopError> {
        // observe
        let options = SnapshotOptions::new().with_limit(spec.snapshot_limit_base);
        let snapshot = self.runtime.snapshot_fresh(&options).await?;
        self.runtime.captcha_gate(&snapshot).await?;

        // decide
        let dom_context = DefaultPromptBuilder::dom_context(&snapshot, &self.config.compact);
        let (system_prompt, user_prompt) = self.prompt_builder.build(&PromptInput {
            task_goal,
            step_goal: &spec.goal,
            dom_context: &dom_context,
            snapshot: &snapshot,
            history_summary: None,
        });
        let reply = self
            .executor
            .decide(&ExecutorRequest {
                system_prompt,
                user_prompt,
            })
            .await?;
        if let Some(usage) = &reply.usage {
            self.runtime.record_tokens(LlmRole::Executor, usage);
        }
        let action = Action::parse(&reply.action)?;
        debug!(target: "agent-loop", action = %action.canonical(), "executor decided");

        // act
        self.execute(&action, &snapshot).await?;
        if action.is_terminal() {
            return Ok((action, false));
        }

        // gate the post-action page state
        let post = self.runtime.snapshot_fresh(&options).await?;
        self.runtime.captcha_gate(&post).await?;

        // verify
        let mut failing = self.run_verifications(spec).await?;

        // escalate
        let mut used_vision = false;
        if !failing.is_empty() && self.config.vision_fallback {
            if let Some(vision) = self.runtime.vision() {
                for attempt in 0..self.config.max_vision_attempts {
                    used_vision = true;
                    info!(
                        target: "agent-loop",
                        attempt,
                        failing = failing.join(", "),
                        "escalating to vision fallback"
                    );
                    let screenshot = self
                        .runtime
                        .backend()
                        .screenshot_png()
                        .await
                        .map_err(agent_runtime::RuntimeError::from)?;
                    let raw = vision
                        .decide(&VisionRequest {
                            screenshot_base64: screenshot,
                            task_goal: task_goal.to_string(),
                            step_goal: spec.goal.clone(),
                            failure_reason: format!(
                                "required verifications failed: {}",
                                failing.join(", ")
                            ),
                            url: self.runtime.backend().url().await.ok(),
                        })
                        .await?;
                    let fallback = Action::parse(&raw)?;
                    self.execute(&fallback, &snapshot).await?;
                    failing = self.run_verifications(spec).await?;
                    if failing.is_empty() {
                        break;
                    }
                }
            }
        }

        Ok((action, used_vision))
    }

    /// Execute one action against the backend, emit its `action` event and
    /// invalidate the snapshot cache.
    async fn execute(&self, action: &Action, snapshot: &Snapshot) -> Result<(), LoopError> {
        let backend = self.runtime.backend();
        let mut event = json!({ "action": action.canonical() });

        match action {
            Action::Click { id } => {
                let element = snapshot
                    .element_by_id(*id)
                    .ok_or(LoopError::ElementNotFound(*id))?;
                let center = element.bbox.center();
                backend.mouse_move(center.x, center.y).await.map_err(to_loop)?;
                backend
                    .mouse_click(center.x, center.y, MouseButton::Left, 1)
                    .await
                    .map_err(to_loop)?;
                event["element_id"] = json!(id);
                event["x"] = json!(center.x);
                event["y"] = json!(center.y);
            }
            Action::Type { id, text } => {
                let element = snapshot
                    .element_by_id(*id)
                    .ok_or(LoopError::ElementNotFound(*id))?;
                let center = element.bbox.center();
                backend
                    .mouse_click(center.x, center.y, MouseButton::Left, 1)
                    .await
                    .map_err(to_loop)?;
                backend.type_text(text).await.map_err(to_loop)?;
                event["element_id"] = json!(id);
            }
            Action::Press { key } => {
                backend.press_key(key).await.map_err(to_loop)?;
            }
            Action::ClickXy { x, y } => {
                backend.mouse_move(*x, *y).await.map_err(to_loop)?;
                backend
                    .mouse_click(*x, *y, MouseButton::Left, 1)
                    .await
                    .map_err(to_loop)?;
            }
            Action::ClickRect {
                x,
                y,
                width,
                height,
            } => {
                let (cx, cy) = (x + width / 2.0, y + height / 2.0);
                backend.mouse_move(cx, cy).await.map_err(to_loop)?;
                backend
                    .mouse_click(cx, cy, MouseButton::Left, 1)
                    .await
                    .map_err(to_loop)?;
            }
            Action::Finish => {}
        }

        self.runtime.emit_action(event).await;
        self.runtime.invalidate_snapshot().await;
        Ok(())
    }

    /// Evaluate the step's verifications; required ones run under their
    /// eventually budget. Returns the labels of failing required checks.
    async fn run_verifications(&self, spec: &StepSpec) -> Result<Vec<String>, LoopError> {
        let mut failing = Vec::new();
        for verification in &spec.verifications {
            let result = if verification.eventually.is_some() || verification.required {
                let config = verification.eventually.unwrap_or_default();
                self.runtime
                    .check(
                        verification.predicate.clone(),
                        &verification.label,
                        verification.required,
                    )
                    .eventually(&config)
                    .await?
            } else {
                self.runtime
                    .assert(
                        &verification.predicate,
                        &verification.label,
                        verification.required,
                    )
                    .await?
            };
            if verification.required && !result.passed {
                failing.push(verification.label.clone());
            }
        }
        Ok(failing)
    }

    /// Drive a sequence of steps.
    pub async fn run(
        &self,
        task_goal: &str,
        steps: &[StepSpec],
    ) -> Result<RunSummary, LoopError> {
        let started = Instant::now();
        let mut outcomes: Vec<StepOutcome> = Vec::new();
        let mut status = RunStatus::Completed;

        for (index, spec) in steps.iter().enumerate() {
            let outcome = self
                .step_indexed(task_goal, spec, Some(index as u32))
                .await?;
            let ok = outcome.ok();
            let finished = outcome.finished;
            outcomes.push(outcome);
            if !ok {
                status = RunStatus::Failed;
                if self.config.stop_on_failure {
                    break;
                }
            }
            if finished {
                break;
            }
        }

        Ok(RunSummary {
            status,
            steps_taken: outcomes.len() as u32,
            outcomes,
            total_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn to_loop(err: backend_port::BackendError) -> LoopError {
    LoopError::Runtime(err.into())
}
