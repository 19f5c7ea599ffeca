//! Extension bridge: snapshot acquisition over the backend port.

use std::sync::Arc;

use backend_port::Backend;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::SnapshotError;
use crate::model::Snapshot;
use crate::options::SnapshotOptions;

/// How long to wait for the extension to inject its capture function.
pub const EXTENSION_READY_TIMEOUT_MS: u64 = 5_000;

/// Poll interval for the extension-ready wait.
pub const EXTENSION_READY_POLL_MS: u64 = 100;

const READY_EXPR: &str =
    "typeof window.__lantern === 'object' && typeof window.__lantern.snapshot === 'function'";

const PROBE_EXPR: &str = "(() => ({ \
     defined: typeof window.__lantern !== 'undefined', \
     snapshot_available: !!(window.__lantern && typeof window.__lantern.snapshot === 'function'), \
     url: window.location.href, \
     extension_id: (window.__lantern && window.__lantern.extension_id) || null }))()";

const SNAPSHOT_FN: &str = "(options) => window.__lantern.snapshot(options)";
const OVERLAY_FN: &str = "(options) => window.__lantern.showOverlay(options)";
const GRID_FN: &str = "(gridId) => window.__lantern.showGrid(gridId)";

/// Acquires semantic snapshots through the extension bridge.
pub struct SnapshotService {
    backend: Arc<dyn Backend>,
    cancel: CancellationToken,
}

impl SnapshotService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    /// Plumb an external abort signal through the acquisition loops.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// Acquire one snapshot: wait for the bridge, call the extension with
    /// the compacted options, decode, then run any overlay helpers the
    /// caller asked for.
    pub async fn acquire(&self, options: &SnapshotOptions) -> Result<Snapshot, SnapshotError> {
        self.wait_extension_ready(EXTENSION_READY_TIMEOUT_MS).await?;

        let payload = options.to_extension_payload();
        let raw = self
            .backend
            .call(SNAPSHOT_FN, vec![payload])
            .await?;

        if raw.is_null() {
            let url = self.backend.url().await.ok();
            return Err(SnapshotError::Empty { url });
        }

        let snapshot: Snapshot =
            serde_json::from_value(raw).map_err(|err| SnapshotError::Decode(err.to_string()))?;
        debug!(
            target: "page-snapshot",
            url = %snapshot.url,
            elements = snapshot.elements.len(),
            "snapshot acquired"
        );

        self.run_overlay_helpers(options).await;
        Ok(snapshot)
    }

    /// Poll until the extension has injected `snapshot()`; on expiry raise
    /// [`SnapshotError::ExtensionNotLoaded`] with probe diagnostics.
    pub async fn wait_extension_ready(&self, timeout_ms: u64) -> Result<(), SnapshotError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            match self.backend.eval(READY_EXPR).await {
                Ok(Value::Bool(true)) => return Ok(()),
                Ok(_) => {}
                Err(err) => {
                    debug!(target: "page-snapshot", ?err, "extension readiness probe failed");
                }
            }
            if Instant::now() >= deadline {
                let diagnostics = self
                    .backend
                    .eval(PROBE_EXPR)
                    .await
                    .unwrap_or_else(|err| json!({ "probe_error": err.to_string() }));
                return Err(SnapshotError::ExtensionNotLoaded { diagnostics });
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SnapshotError::Cancelled),
                _ = sleep(Duration::from_millis(EXTENSION_READY_POLL_MS)) => {}
            }
        }
    }

    /// Overlay rendering is debug-only; failures are logged, never fatal.
    async fn run_overlay_helpers(&self, options: &SnapshotOptions) {
        if options.show_overlay == Some(true) {
            if let Err(err) = self.backend.call(OVERLAY_FN, vec![json!({})]).await {
                warn!(target: "page-snapshot", ?err, "overlay helper failed");
            }
        }
        if options.show_grid == Some(true) {
            let grid_id = json!(options.grid_id);
            if let Err(err) = self.backend.call(GRID_FN, vec![grid_id]).await {
                warn!(target: "page-snapshot", ?err, "grid helper failed");
            }
        }
    }
}
