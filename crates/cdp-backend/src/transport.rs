//! The raw CDP command port.

use async_trait::async_trait;
use backend_port::BackendError;
use serde_json::Value;

/// One attached page session's command channel.
///
/// Implementations wrap a live DevTools WebSocket (or a driver library that
/// owns one) and resolve each command to its protocol result object.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Establish the connection / attach to the target.
    async fn start(&self) -> Result<(), BackendError>;

    /// Send one protocol command and await its result payload.
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, BackendError>;
}

/// Transport stub for wiring tests and offline construction.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn send_command(&self, method: &str, _params: Value) -> Result<Value, BackendError> {
        Err(BackendError::transport(format!(
            "transport not available for method {method}"
        )))
    }
}
