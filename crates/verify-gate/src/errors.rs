use thiserror::Error;

/// Errors raised by the verification layer.
#[derive(Debug, Error, Clone)]
pub enum VerifyError {
    /// A semantic selector failed to parse.
    #[error("selector parse error: {0}")]
    Parse(String),

    /// An external abort signal fired mid-wait.
    #[error("verification cancelled")]
    Cancelled,
}
