//! The executor port: whatever decides the next action.

use std::collections::VecDeque;

use agent_runtime::TokenUsage;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::LoopError;

/// Prompt pair handed to the executor.
#[derive(Clone, Debug)]
pub struct ExecutorRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Executor reply: one action string plus optional usage numbers.
#[derive(Clone, Debug, Default)]
pub struct ExecutorReply {
    pub action: String,
    pub usage: Option<TokenUsage>,
}

impl ExecutorReply {
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Abstraction over LLM-backed deciders so multiple vendors can plug into
/// the loop.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn decide(&self, request: &ExecutorRequest) -> Result<ExecutorReply, LoopError>;
}

/// Deterministic executor used for tests and offline development. Pops
/// scripted replies in order; once drained it answers `FINISH()`.
#[derive(Default)]
pub struct MockExecutor {
    replies: Mutex<VecDeque<ExecutorReply>>,
    requests: Mutex<Vec<ExecutorRequest>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_action(&self, action: impl Into<String>) {
        self.replies.lock().push_back(ExecutorReply::action(action));
    }

    pub fn push_reply(&self, reply: ExecutorReply) {
        self.replies.lock().push_back(reply);
    }

    /// Prompts seen so far, for test assertions.
    pub fn requests(&self) -> Vec<ExecutorRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn decide(&self, request: &ExecutorRequest) -> Result<ExecutorReply, LoopError> {
        self.requests.lock().push(request.clone());
        Ok(self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| ExecutorReply::action("FINISH()")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_pops_in_order_then_finishes() {
        let executor = MockExecutor::new();
        executor.push_action("CLICK(1)");

        let request = ExecutorRequest {
            system_prompt: "sys".into(),
            user_prompt: "user".into(),
        };
        assert_eq!(executor.decide(&request).await.unwrap().action, "CLICK(1)");
        assert_eq!(executor.decide(&request).await.unwrap().action, "FINISH()");
        assert_eq!(executor.requests().len(), 2);
    }
}
