//! The browser-control capability interface.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::BackendError;
use crate::types::{LayoutMetrics, MouseButton, ReadyState, ViewportInfo};

/// Gap between press and release when a click is decomposed, in ms.
pub const CLICK_PRESS_RELEASE_GAP_MS: u64 = 50;

/// Delay between per-character key events during typing, in ms.
pub const TYPE_INTER_CHAR_DELAY_MS: u64 = 10;

/// Default ready-state wait budget, in ms.
pub const READY_STATE_TIMEOUT_MS: u64 = 15_000;

/// Minimal browser-control surface consumed by the runtime.
///
/// Every method may fail; failures translate to [`BackendError`]. The
/// backend may be shared with an external orchestrator, so implementations
/// must not assume exclusive control of the page.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Cheap, idempotent viewport refresh. Populates the cache used by
    /// default-centered wheel events.
    async fn refresh_page_info(&self) -> Result<ViewportInfo, BackendError>;

    /// Execute a JS expression in the page's main frame, awaiting any
    /// promise result. The returned value is JSON-round-trippable;
    /// `undefined` normalizes to `null`. A thrown exception fails with
    /// [`BackendError::Eval`].
    async fn eval(&self, expression: &str) -> Result<Value, BackendError>;

    /// Same contract as [`Backend::eval`], but arguments are passed by
    /// value to a function expression, avoiding string-concat injection.
    /// Implementations without an object handle fall back to `eval`.
    async fn call(&self, function_declaration: &str, args: Vec<Value>)
        -> Result<Value, BackendError>;

    /// Viewport origin, content size and device-pixel ratio.
    async fn layout_metrics(&self) -> Result<LayoutMetrics, BackendError>;

    /// Viewport-only PNG capture, base64-encoded. Fails with
    /// [`BackendError::NoRenderSurface`] before the first paint.
    async fn screenshot_png(&self) -> Result<String, BackendError>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BackendError>;

    /// Click at viewport coordinates. Decomposed into press + release with
    /// a [`CLICK_PRESS_RELEASE_GAP_MS`] gap.
    async fn mouse_click(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), BackendError>;

    /// Dispatch a wheel event. When `at` is omitted the event lands on the
    /// cached viewport center.
    async fn wheel(&self, delta_y: f64, at: Option<(f64, f64)>) -> Result<(), BackendError>;

    /// Dispatch per-character keyDown/char/keyUp with a small
    /// inter-character delay. Non-ASCII passes through via the `text`
    /// field.
    async fn type_text(&self, text: &str) -> Result<(), BackendError>;

    /// Press a single key (Enter, Escape, Tab, or a printable character).
    async fn press_key(&self, key: &str) -> Result<(), BackendError>;

    /// Poll `document.readyState` until it satisfies `state`; fails with
    /// [`BackendError::Timeout`] on expiry.
    async fn wait_ready_state(&self, state: ReadyState, timeout_ms: u64)
        -> Result<(), BackendError>;

    /// Current `window.location.href`.
    async fn url(&self) -> Result<String, BackendError>;
}
