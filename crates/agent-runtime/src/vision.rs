//! Vision-fallback port.
//!
//! When snapshot-based verification keeps failing, the step loop can hand
//! a screenshot to a coordinate-capable model. Only the contract lives
//! here; providers are external.

use async_trait::async_trait;

use crate::errors::RuntimeError;

/// What the vision executor gets to look at.
#[derive(Clone, Debug)]
pub struct VisionRequest {
    pub screenshot_base64: String,
    pub task_goal: String,
    pub step_goal: String,
    /// Why the snapshot path gave up.
    pub failure_reason: String,
    pub url: Option<String>,
}

/// Coordinate-based fallback executor.
///
/// Returns a raw action string in the vision grammar
/// (`CLICK_XY(x,y)` / `CLICK_RECT(x,y,w,h)` / `FINISH()`).
#[async_trait]
pub trait VisionExecutor: Send + Sync {
    async fn decide(&self, request: &VisionRequest) -> Result<String, RuntimeError>;
}

/// Deterministic vision executor for tests and offline development.
pub struct MockVisionExecutor {
    action: String,
}

impl MockVisionExecutor {
    pub fn returning(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

#[async_trait]
impl VisionExecutor for MockVisionExecutor {
    async fn decide(&self, _request: &VisionRequest) -> Result<String, RuntimeError> {
        Ok(self.action.clone())
    }
}
