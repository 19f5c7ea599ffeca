use thiserror::Error;

/// Errors raised by trace sinks.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("trace sink already closed")]
    Closed,

    #[error("failed to serialize trace event: {0}")]
    Serialize(String),
}
