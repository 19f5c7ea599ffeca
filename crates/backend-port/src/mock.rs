//! Deterministic backend used for tests and offline development.
//!
//! The mock serves a scripted page: a URL, a scrollable document, an
//! optional queue of extension snapshot payloads, and recorders for every
//! input event the runtime dispatches. Wheel events can be configured to be
//! silently absorbed, which is how overlay/nested-scroller pages behave and
//! what the scroll-proof path exists to catch.

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::backend::Backend;
use crate::errors::BackendError;
use crate::types::{LayoutMetrics, MouseButton, ReadyState, ViewportInfo};

/// Smallest valid PNG, used as the mock screenshot payload.
const STUB_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Scripted page state behind [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockPageState {
    pub url: String,
    pub ready_state: String,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub page_height: f64,
    pub scroll_y: f64,
    /// When set, wheel events are recorded but do not move the page.
    pub absorb_wheel: bool,
    /// Whether the extension bridge reports itself as injected.
    pub extension_loaded: bool,
    pub has_render_surface: bool,
    pub typed: String,
    pub keys: Vec<String>,
    pub clicks: Vec<(f64, f64, MouseButton, u32)>,
    pub moves: Vec<(f64, f64)>,
    pub wheels: Vec<f64>,
}

impl Default for MockPageState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            ready_state: "complete".to_string(),
            viewport_width: 1280.0,
            viewport_height: 720.0,
            page_height: 720.0,
            scroll_y: 0.0,
            absorb_wheel: false,
            extension_loaded: true,
            has_render_surface: true,
            typed: String::new(),
            keys: Vec::new(),
            clicks: Vec::new(),
            moves: Vec::new(),
            wheels: Vec::new(),
        }
    }
}

/// Scripted [`Backend`] implementation.
pub struct MockBackend {
    state: Mutex<MockPageState>,
    snapshots: Mutex<VecDeque<Value>>,
    last_snapshot: Mutex<Option<Value>>,
    /// URLs applied one per click, front first. Lets a test script a
    /// navigation that a click is expected to cause.
    click_navigations: Mutex<VecDeque<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockPageState::default()),
            snapshots: Mutex::new(VecDeque::new()),
            last_snapshot: Mutex::new(None),
            click_navigations: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state.lock().url = url.into();
        self
    }

    pub fn with_page_height(self, height: f64) -> Self {
        self.state.lock().page_height = height;
        self
    }

    pub fn with_absorbed_wheel(self) -> Self {
        self.state.lock().absorb_wheel = true;
        self
    }

    pub fn with_extension_missing(self) -> Self {
        self.state.lock().extension_loaded = false;
        self
    }

    /// Queue a raw extension snapshot payload; each acquire pops one, and
    /// the last payload repeats once the queue drains.
    pub fn push_snapshot(&self, payload: Value) {
        self.snapshots.lock().push_back(payload);
    }

    /// Script the next click to navigate to `url`.
    pub fn push_click_navigation(&self, url: impl Into<String>) {
        self.click_navigations.lock().push_back(url.into());
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    pub fn set_ready_state(&self, state: impl Into<String>) {
        self.state.lock().ready_state = state.into();
    }

    pub fn set_absorb_wheel(&self, absorb: bool) {
        self.state.lock().absorb_wheel = absorb;
    }

    pub fn scroll_y(&self) -> f64 {
        self.state.lock().scroll_y
    }

    /// Copy of the scripted state for test assertions.
    pub fn page_state(&self) -> MockPageState {
        self.state.lock().clone()
    }

    fn max_scroll(state: &MockPageState) -> f64 {
        (state.page_height - state.viewport_height).max(0.0)
    }

    fn next_snapshot(&self) -> Value {
        let mut queue = self.snapshots.lock();
        if let Some(payload) = queue.pop_front() {
            *self.last_snapshot.lock() = Some(payload.clone());
            return payload;
        }
        self.last_snapshot.lock().clone().unwrap_or(Value::Null)
    }

    fn apply_scroll_by(&self, delta_y: f64) {
        let mut state = self.state.lock();
        let max = Self::max_scroll(&state);
        state.scroll_y = (state.scroll_y + delta_y).clamp(0.0, max);
    }

    /// Naive extraction of the deltaY argument from a `scrollBy(x, y)`
    /// expression; scripted pages only ever see the runtime's own fallback
    /// call shape.
    fn parse_scroll_by(expression: &str) -> Option<f64> {
        let start = expression.find("scrollBy(")? + "scrollBy(".len();
        let rest = &expression[start..];
        let end = rest.find(')')?;
        let args = &rest[..end];
        let delta = args.split(',').nth(1)?.trim();
        delta.parse::<f64>().ok()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn refresh_page_info(&self) -> Result<ViewportInfo, BackendError> {
        let state = self.state.lock();
        Ok(ViewportInfo {
            width: state.viewport_width,
            height: state.viewport_height,
            scroll_x: 0.0,
            scroll_y: state.scroll_y,
            content_width: Some(state.viewport_width),
            content_height: Some(state.page_height),
        })
    }

    async fn eval(&self, expression: &str) -> Result<Value, BackendError> {
        debug!(target: "mock-backend", expression, "eval");
        if expression.contains("snapshot_available") {
            let state = self.state.lock();
            return Ok(json!({
                "defined": state.extension_loaded,
                "snapshot_available": state.extension_loaded,
                "url": state.url,
                "extension_id": if state.extension_loaded { json!("mock-extension") } else { Value::Null },
            }));
        }
        if expression.contains("__lantern") && expression.contains("typeof") {
            return Ok(Value::Bool(self.state.lock().extension_loaded));
        }
        if expression.contains("scrollBy") {
            if let Some(delta) = Self::parse_scroll_by(expression) {
                self.apply_scroll_by(delta);
            }
            return Ok(Value::Null);
        }
        if expression.contains("location.href") {
            return Ok(Value::String(self.state.lock().url.clone()));
        }
        if expression.contains("readyState") {
            return Ok(Value::String(self.state.lock().ready_state.clone()));
        }
        if expression.contains("scrollY") || expression.contains("scrollTop") {
            return Ok(json!(self.state.lock().scroll_y));
        }
        Ok(Value::Null)
    }

    async fn call(
        &self,
        function_declaration: &str,
        _args: Vec<Value>,
    ) -> Result<Value, BackendError> {
        debug!(target: "mock-backend", function_declaration, "call");
        if function_declaration.contains("snapshot") {
            if !self.state.lock().extension_loaded {
                return Err(BackendError::eval("__lantern is not defined"));
            }
            return Ok(self.next_snapshot());
        }
        if function_declaration.contains("showOverlay")
            || function_declaration.contains("showGrid")
        {
            return Ok(Value::Null);
        }
        Ok(Value::Null)
    }

    async fn layout_metrics(&self) -> Result<LayoutMetrics, BackendError> {
        let state = self.state.lock();
        Ok(LayoutMetrics {
            viewport_x: 0.0,
            viewport_y: state.scroll_y,
            content_width: state.viewport_width,
            content_height: state.page_height,
            device_pixel_ratio: 1.0,
        })
    }

    async fn screenshot_png(&self) -> Result<String, BackendError> {
        if !self.state.lock().has_render_surface {
            return Err(BackendError::NoRenderSurface);
        }
        Ok(BASE64.encode(STUB_PNG))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.state.lock().moves.push((x, y));
        Ok(())
    }

    async fn mouse_click(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), BackendError> {
        self.state.lock().clicks.push((x, y, button, click_count));
        if let Some(url) = self.click_navigations.lock().pop_front() {
            self.state.lock().url = url;
        }
        Ok(())
    }

    async fn wheel(&self, delta_y: f64, _at: Option<(f64, f64)>) -> Result<(), BackendError> {
        let absorbed = {
            let mut state = self.state.lock();
            state.wheels.push(delta_y);
            state.absorb_wheel
        };
        if !absorbed {
            self.apply_scroll_by(delta_y);
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        self.state.lock().typed.push_str(text);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), BackendError> {
        self.state.lock().keys.push(key.to_string());
        Ok(())
    }

    async fn wait_ready_state(
        &self,
        state: ReadyState,
        timeout_ms: u64,
    ) -> Result<(), BackendError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if state.accepts(&self.state.lock().ready_state) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::timeout("document.readyState", timeout_ms));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    async fn url(&self) -> Result<String, BackendError> {
        Ok(self.state.lock().url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wheel_moves_scripted_page() {
        let backend = MockBackend::new().with_page_height(3000.0);
        backend.wheel(400.0, None).await.unwrap();
        assert_eq!(backend.scroll_y(), 400.0);
    }

    #[tokio::test]
    async fn absorbed_wheel_leaves_scroll_untouched() {
        let backend = MockBackend::new()
            .with_page_height(3000.0)
            .with_absorbed_wheel();
        backend.wheel(400.0, None).await.unwrap();
        assert_eq!(backend.scroll_y(), 0.0);
        assert_eq!(backend.page_state().wheels, vec![400.0]);
    }

    #[tokio::test]
    async fn scroll_clamps_to_document_bounds() {
        let backend = MockBackend::new().with_page_height(1000.0);
        backend.wheel(10_000.0, None).await.unwrap();
        assert_eq!(backend.scroll_y(), 280.0);
        backend.wheel(-10_000.0, None).await.unwrap();
        assert_eq!(backend.scroll_y(), 0.0);
    }

    #[tokio::test]
    async fn js_scroll_fallback_is_parsed() {
        let backend = MockBackend::new().with_page_height(2000.0);
        backend
            .eval("window.scrollBy(0, 250)")
            .await
            .unwrap();
        assert_eq!(backend.scroll_y(), 250.0);
    }

    #[tokio::test]
    async fn snapshot_queue_repeats_last_payload() {
        let backend = MockBackend::new();
        backend.push_snapshot(json!({"status": "success", "elements": []}));
        let first = backend.call("(o) => window.__lantern.snapshot(o)", vec![]).await.unwrap();
        let second = backend.call("(o) => window.__lantern.snapshot(o)", vec![]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ready_state_wait_times_out() {
        let backend = MockBackend::new();
        backend.set_ready_state("loading");
        let err = backend
            .wait_ready_state(ReadyState::Complete, 120)
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "timeout");
    }

    #[tokio::test]
    async fn click_navigation_script() {
        let backend = MockBackend::new().with_url("https://example.com");
        backend.push_click_navigation("https://www.iana.org/domains");
        backend
            .mouse_click(10.0, 10.0, MouseButton::Left, 1)
            .await
            .unwrap();
        assert_eq!(backend.url().await.unwrap(), "https://www.iana.org/domains");
    }
}
