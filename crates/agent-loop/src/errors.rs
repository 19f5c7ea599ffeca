use agent_runtime::RuntimeError;
use thiserror::Error;

/// Errors surfaced by the step loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The executor's reply did not match the action grammar.
    #[error("failed to parse action: {0}")]
    ActionParse(String),

    /// An element id from the executor is absent from the current
    /// snapshot.
    #[error("element {0} not found in current snapshot")]
    ElementNotFound(i64),

    /// The executor port itself failed.
    #[error("executor failed: {0}")]
    Executor(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl LoopError {
    /// Stable wire-observable error name.
    pub fn name(&self) -> &'static str {
        match self {
            LoopError::ActionParse(_) => "ActionParseError",
            LoopError::ElementNotFound(_) => "ElementNotFound",
            LoopError::Executor(_) => "ExecutorError",
            LoopError::Runtime(err) => err.name(),
        }
    }

    /// Policy, cancellation and programmer errors escape the step loop;
    /// everything else fails the step in place.
    pub fn escapes_step(&self) -> bool {
        match self {
            LoopError::Runtime(err) => err.escapes_predicates(),
            _ => false,
        }
    }
}
