use thiserror::Error;

/// Errors surfaced by browser backends.
///
/// Each variant maps to a stable `reason_code` so failures stay comparable
/// across the CDP and Playwright drivers.
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    /// Transport-level failure talking to the browser process.
    #[error("backend transport failure: {0}")]
    Transport(String),

    /// The evaluated page script threw.
    #[error("page evaluation threw: {0}")]
    Eval(String),

    /// A bounded wait expired.
    #[error("timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// The backend has no rendering surface yet (e.g. screenshot before
    /// first paint).
    #[error("no rendering surface available")]
    NoRenderSurface,

    /// The backend cannot provide the requested capability.
    #[error("capability not supported by this backend: {0}")]
    Unsupported(String),

    /// An external abort signal fired mid-wait.
    #[error("backend operation cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }

    pub fn timeout(what: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms,
        }
    }

    /// Stable wire-observable code for this failure.
    pub fn reason_code(&self) -> &'static str {
        match self {
            BackendError::Transport(_) => "transport",
            BackendError::Eval(_) => "eval",
            BackendError::Timeout { .. } => "timeout",
            BackendError::NoRenderSurface => "no_render_surface",
            BackendError::Unsupported(_) => "unsupported",
            BackendError::Cancelled => "cancelled",
        }
    }

    /// Transport and timeout failures are worth retrying with a fresh
    /// snapshot; the rest are terminal for the current action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Transport(_) | BackendError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(BackendError::eval("boom").reason_code(), "eval");
        assert_eq!(BackendError::timeout("readyState", 15_000).reason_code(), "timeout");
        assert_eq!(BackendError::NoRenderSurface.reason_code(), "no_render_surface");
    }

    #[test]
    fn transient_classification() {
        assert!(BackendError::transport("ws closed").is_transient());
        assert!(!BackendError::eval("ReferenceError").is_transient());
    }
}
