//! Backend port implementation over a raw CDP transport.

use std::sync::Arc;

use async_trait::async_trait;
use backend_port::{
    Backend, BackendError, LayoutMetrics, MouseButton, ReadyState, ViewportInfo,
    CLICK_PRESS_RELEASE_GAP_MS, TYPE_INTER_CHAR_DELAY_MS,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::keys::KeyDescriptor;
use crate::transport::CdpTransport;

/// Poll interval for `document.readyState`, in ms.
const READY_STATE_POLL_MS: u64 = 100;

/// [`Backend`] implementation speaking raw CDP methods.
pub struct CdpBackend {
    transport: Arc<dyn CdpTransport>,
    /// Last observed viewport, backing default-centered wheel events.
    page_info: Mutex<Option<ViewportInfo>>,
    /// Remote handle for `window`, resolved lazily for `callFunctionOn`.
    window_object_id: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl CdpBackend {
    pub fn new(transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            transport,
            page_info: Mutex::new(None),
            window_object_id: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Plumb an external abort signal through the backend's wait loops.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> Arc<dyn CdpTransport> {
        Arc::clone(&self.transport)
    }

    /// Unwrap a `Runtime.evaluate`/`Runtime.callFunctionOn` response,
    /// surfacing page exceptions as [`BackendError::Eval`] and normalizing
    /// `undefined` to `null`.
    fn extract_remote_value(response: Value) -> Result<Value, BackendError> {
        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            return Err(BackendError::eval(text));
        }
        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn resolve_window_handle(&self) -> Option<String> {
        if let Some(id) = self.window_object_id.lock().clone() {
            return Some(id);
        }
        let response = self
            .transport
            .send_command("Runtime.evaluate", json!({ "expression": "window" }))
            .await
            .ok()?;
        let id = response
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(Value::as_str)
            .map(str::to_string)?;
        *self.window_object_id.lock() = Some(id.clone());
        Some(id)
    }

    async fn dispatch_key_event(
        &self,
        event_type: &str,
        descriptor: &KeyDescriptor,
    ) -> Result<(), BackendError> {
        let mut params = json!({
            "type": event_type,
            "key": descriptor.key,
            "code": descriptor.code,
            "windowsVirtualKeyCode": descriptor.windows_virtual_key_code,
            "nativeVirtualKeyCode": descriptor.windows_virtual_key_code,
        });
        if let Some(text) = &descriptor.text {
            params["text"] = json!(text);
        }
        self.transport
            .send_command("Input.dispatchKeyEvent", params)
            .await?;
        Ok(())
    }

    /// keyDown → char → keyUp, the per-character sequence typed text uses.
    async fn dispatch_key_sequence(&self, descriptor: &KeyDescriptor) -> Result<(), BackendError> {
        self.dispatch_key_event("keyDown", descriptor).await?;
        if descriptor.text.is_some() {
            self.dispatch_key_event("char", descriptor).await?;
        }
        self.dispatch_key_event("keyUp", descriptor).await?;
        Ok(())
    }

    async fn wheel_anchor(&self) -> (f64, f64) {
        if let Some(info) = *self.page_info.lock() {
            return info.center();
        }
        match self.refresh_page_info().await {
            Ok(info) => info.center(),
            Err(err) => {
                warn!(target: "cdp-backend", ?err, "viewport probe failed, centering wheel on origin");
                (0.0, 0.0)
            }
        }
    }
}

#[async_trait]
impl Backend for CdpBackend {
    async fn refresh_page_info(&self) -> Result<ViewportInfo, BackendError> {
        let value = self
            .eval(
                "({ width: window.innerWidth, height: window.innerHeight, \
                 scrollX: window.scrollX, scrollY: window.scrollY, \
                 contentWidth: document.documentElement.scrollWidth, \
                 contentHeight: document.documentElement.scrollHeight })",
            )
            .await?;
        let info = ViewportInfo {
            width: value.get("width").and_then(Value::as_f64).unwrap_or(0.0),
            height: value.get("height").and_then(Value::as_f64).unwrap_or(0.0),
            scroll_x: value.get("scrollX").and_then(Value::as_f64).unwrap_or(0.0),
            scroll_y: value.get("scrollY").and_then(Value::as_f64).unwrap_or(0.0),
            content_width: value.get("contentWidth").and_then(Value::as_f64),
            content_height: value.get("contentHeight").and_then(Value::as_f64),
        };
        *self.page_info.lock() = Some(info);
        Ok(info)
    }

    async fn eval(&self, expression: &str) -> Result<Value, BackendError> {
        let response = self
            .transport
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        Self::extract_remote_value(response)
    }

    async fn call(
        &self,
        function_declaration: &str,
        args: Vec<Value>,
    ) -> Result<Value, BackendError> {
        if let Some(object_id) = self.resolve_window_handle().await {
            let arguments: Vec<Value> = args.iter().map(|v| json!({ "value": v })).collect();
            let response = self
                .transport
                .send_command(
                    "Runtime.callFunctionOn",
                    json!({
                        "functionDeclaration": function_declaration,
                        "objectId": object_id,
                        "arguments": arguments,
                        "returnByValue": true,
                        "awaitPromise": true,
                    }),
                )
                .await?;
            return Self::extract_remote_value(response);
        }

        // No object handle: splice the arguments in as one JSON literal.
        debug!(target: "cdp-backend", "no window handle, falling back to eval apply");
        let args_json = serde_json::to_string(&args)
            .map_err(|err| BackendError::eval(format!("unserializable call args: {err}")))?;
        self.eval(&format!(
            "({function_declaration}).apply(null, {args_json})"
        ))
        .await
    }

    async fn layout_metrics(&self) -> Result<LayoutMetrics, BackendError> {
        let response = self
            .transport
            .send_command("Page.getLayoutMetrics", json!({}))
            .await?;
        let viewport = response
            .get("cssLayoutViewport")
            .or_else(|| response.get("layoutViewport"))
            .cloned()
            .unwrap_or(Value::Null);
        let content = response
            .get("cssContentSize")
            .or_else(|| response.get("contentSize"))
            .cloned()
            .unwrap_or(Value::Null);
        let dpr = self
            .eval("window.devicePixelRatio")
            .await
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        Ok(LayoutMetrics {
            viewport_x: viewport.get("pageX").and_then(Value::as_f64).unwrap_or(0.0),
            viewport_y: viewport.get("pageY").and_then(Value::as_f64).unwrap_or(0.0),
            content_width: content.get("width").and_then(Value::as_f64).unwrap_or(0.0),
            content_height: content.get("height").and_then(Value::as_f64).unwrap_or(0.0),
            device_pixel_ratio: dpr,
        })
    }

    async fn screenshot_png(&self) -> Result<String, BackendError> {
        let response = self
            .transport
            .send_command(
                "Page.captureScreenshot",
                json!({ "format": "png", "captureBeyondViewport": false }),
            )
            .await?;
        response
            .get("data")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(BackendError::NoRenderSurface)
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.transport
            .send_command(
                "Input.dispatchMouseEvent",
                json!({ "type": "mouseMoved", "x": x, "y": y }),
            )
            .await?;
        Ok(())
    }

    async fn mouse_click(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), BackendError> {
        self.transport
            .send_command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": "mousePressed",
                    "x": x,
                    "y": y,
                    "button": button.protocol_name(),
                    "clickCount": click_count,
                }),
            )
            .await?;
        sleep(Duration::from_millis(CLICK_PRESS_RELEASE_GAP_MS)).await;
        self.transport
            .send_command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": "mouseReleased",
                    "x": x,
                    "y": y,
                    "button": button.protocol_name(),
                    "clickCount": click_count,
                }),
            )
            .await?;
        Ok(())
    }

    async fn wheel(&self, delta_y: f64, at: Option<(f64, f64)>) -> Result<(), BackendError> {
        let (x, y) = match at {
            Some(point) => point,
            None => self.wheel_anchor().await,
        };
        self.transport
            .send_command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": "mouseWheel",
                    "x": x,
                    "y": y,
                    "deltaX": 0.0,
                    "deltaY": delta_y,
                }),
            )
            .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        for ch in text.chars() {
            let descriptor = KeyDescriptor::for_char(ch);
            self.dispatch_key_sequence(&descriptor).await?;
            sleep(Duration::from_millis(TYPE_INTER_CHAR_DELAY_MS)).await;
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), BackendError> {
        let descriptor = KeyDescriptor::resolve(key)
            .ok_or_else(|| BackendError::Unsupported(format!("unknown key: {key}")))?;
        self.dispatch_key_sequence(&descriptor).await
    }

    async fn wait_ready_state(
        &self,
        state: ReadyState,
        timeout_ms: u64,
    ) -> Result<(), BackendError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let observed = self
                .eval("document.readyState")
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if state.accepts(&observed) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::timeout(
                    format!("document.readyState >= {}", state.as_str()),
                    timeout_ms,
                ));
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(BackendError::Cancelled),
                _ = sleep(Duration::from_millis(READY_STATE_POLL_MS)) => {}
            }
        }
    }

    async fn url(&self) -> Result<String, BackendError> {
        let value = self.eval("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::eval("location.href was not a string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CdpTransport;
    use std::collections::VecDeque;

    /// Transport that records commands and replays scripted responses.
    #[derive(Default)]
    struct RecordingTransport {
        log: Mutex<Vec<(String, Value)>>,
        responses: Mutex<VecDeque<Value>>,
    }

    impl RecordingTransport {
        fn push_response(&self, value: Value) {
            self.responses.lock().push_back(value);
        }

        fn commands(&self) -> Vec<(String, Value)> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl CdpTransport for RecordingTransport {
        async fn start(&self) -> Result<(), BackendError> {
            Ok(())
        }

        async fn send_command(&self, method: &str, params: Value) -> Result<Value, BackendError> {
            self.log.lock().push((method.to_string(), params));
            Ok(self.responses.lock().pop_front().unwrap_or(json!({})))
        }
    }

    fn backend_with(transport: Arc<RecordingTransport>) -> CdpBackend {
        CdpBackend::new(transport)
    }

    #[tokio::test]
    async fn eval_uses_return_by_value_and_await_promise() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({ "result": { "type": "number", "value": 42 } }));
        let backend = backend_with(Arc::clone(&transport));

        let value = backend.eval("6 * 7").await.unwrap();
        assert_eq!(value, json!(42));

        let (method, params) = &transport.commands()[0];
        assert_eq!(method, "Runtime.evaluate");
        assert_eq!(params["returnByValue"], json!(true));
        assert_eq!(params["awaitPromise"], json!(true));
    }

    #[tokio::test]
    async fn eval_surfaces_page_exception() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "ReferenceError: nope is not defined" }
            }
        }));
        let backend = backend_with(transport);

        let err = backend.eval("nope()").await.unwrap_err();
        assert_eq!(err.reason_code(), "eval");
        assert!(err.to_string().contains("ReferenceError"));
    }

    #[tokio::test]
    async fn eval_normalizes_undefined_to_null() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({ "result": { "type": "undefined" } }));
        let backend = backend_with(transport);

        assert_eq!(backend.eval("void 0").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn click_decomposes_into_press_and_release() {
        let transport = Arc::new(RecordingTransport::default());
        let backend = backend_with(Arc::clone(&transport));

        backend
            .mouse_click(100.0, 200.0, MouseButton::Left, 1)
            .await
            .unwrap();

        let commands = transport.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].1["type"], json!("mousePressed"));
        assert_eq!(commands[1].1["type"], json!("mouseReleased"));
        assert_eq!(commands[0].1["clickCount"], json!(1));
        assert_eq!(commands[0].1["button"], json!("left"));
    }

    #[tokio::test]
    async fn type_text_emits_key_down_char_key_up_per_character() {
        let transport = Arc::new(RecordingTransport::default());
        let backend = backend_with(Arc::clone(&transport));

        backend.type_text("hi").await.unwrap();

        let commands = transport.commands();
        assert_eq!(commands.len(), 6);
        let types: Vec<_> = commands
            .iter()
            .map(|(_, p)| p["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["keyDown", "char", "keyUp", "keyDown", "char", "keyUp"]
        );
        assert_eq!(commands[1].1["text"], json!("h"));
        assert_eq!(commands[4].1["text"], json!("i"));
    }

    #[tokio::test]
    async fn screenshot_requests_png_without_beyond_viewport() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({ "data": "aGVsbG8=" }));
        let backend = backend_with(Arc::clone(&transport));

        let data = backend.screenshot_png().await.unwrap();
        assert_eq!(data, "aGVsbG8=");

        let (method, params) = &transport.commands()[0];
        assert_eq!(method, "Page.captureScreenshot");
        assert_eq!(params["format"], json!("png"));
        assert_eq!(params["captureBeyondViewport"], json!(false));
    }

    #[tokio::test]
    async fn screenshot_without_surface_fails() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({}));
        let backend = backend_with(transport);

        let err = backend.screenshot_png().await.unwrap_err();
        assert_eq!(err.reason_code(), "no_render_surface");
    }

    #[tokio::test]
    async fn ready_state_wait_polls_until_accepted() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({ "result": { "value": "loading" } }));
        transport.push_response(json!({ "result": { "value": "interactive" } }));
        let backend = backend_with(transport);

        backend
            .wait_ready_state(ReadyState::Interactive, 2_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn call_prefers_function_on_window_handle() {
        let transport = Arc::new(RecordingTransport::default());
        // window handle resolution, then the actual call
        transport.push_response(json!({ "result": { "objectId": "obj-1" } }));
        transport.push_response(json!({ "result": { "value": { "ok": true } } }));
        let backend = backend_with(Arc::clone(&transport));

        let value = backend
            .call("(x) => ({ ok: x })", vec![json!(true)])
            .await
            .unwrap();
        assert_eq!(value, json!({ "ok": true }));

        let commands = transport.commands();
        assert_eq!(commands[1].0, "Runtime.callFunctionOn");
        assert_eq!(commands[1].1["objectId"], json!("obj-1"));
        assert_eq!(commands[1].1["arguments"], json!([{ "value": true }]));
    }

    #[tokio::test]
    async fn wheel_defaults_to_cached_viewport_center() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_response(json!({ "result": { "value": {
            "width": 1000.0, "height": 600.0, "scrollX": 0.0, "scrollY": 0.0,
            "contentWidth": 1000.0, "contentHeight": 4000.0,
        } } }));
        let backend = backend_with(Arc::clone(&transport));

        backend.refresh_page_info().await.unwrap();
        backend.wheel(120.0, None).await.unwrap();

        let commands = transport.commands();
        let wheel = &commands.last().unwrap().1;
        assert_eq!(wheel["type"], json!("mouseWheel"));
        assert_eq!(wheel["x"], json!(500.0));
        assert_eq!(wheel["y"], json!(300.0));
        assert_eq!(wheel["deltaY"], json!(120.0));
    }
}
