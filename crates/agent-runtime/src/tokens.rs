//! Token-usage accounting for provider-wrapping layers.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Usage numbers from one LLM call. Missing fields count as zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            model_name: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Total, falling back to prompt + completion when the provider omits
    /// it.
    pub fn effective_total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// Which port issued the call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
    Executor,
    VisionExecutor,
    VisionVerifier,
}

impl LlmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRole::Executor => "executor",
            LlmRole::VisionExecutor => "vision_executor",
            LlmRole::VisionVerifier => "vision_verifier",
        }
    }
}

/// Aggregated counters for one role or model.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenTally {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenTally {
    fn add(&mut self, usage: &TokenUsage) {
        self.calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.effective_total();
    }
}

/// Thread-safe usage ledger, aggregated by role and by model.
#[derive(Default)]
pub struct TokenLedger {
    by_role: DashMap<&'static str, TokenTally>,
    by_model: DashMap<String, TokenTally>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, role: LlmRole, usage: &TokenUsage) {
        self.by_role.entry(role.as_str()).or_default().add(usage);
        if let Some(model) = &usage.model_name {
            self.by_model.entry(model.clone()).or_default().add(usage);
        }
    }

    /// Serializable end-of-run report.
    pub fn report(&self) -> TokenReport {
        TokenReport {
            by_role: self
                .by_role
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
            by_model: self
                .by_model
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.by_role
            .iter()
            .map(|entry| entry.value().total_tokens)
            .sum()
    }
}

/// Snapshot of the ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenReport {
    pub by_role: BTreeMap<String, TokenTally>,
    pub by_model: BTreeMap<String, TokenTally>,
}
