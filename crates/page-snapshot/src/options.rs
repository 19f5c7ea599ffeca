//! Capture options passed through to the extension.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default element cap for a semantic snapshot.
pub const DEFAULT_SNAPSHOT_LIMIT: u32 = 50;

/// Options accepted by the snapshot service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Max elements returned in the semantic snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Extension-side pre-filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<SnapshotFilter>,

    /// Attach a base64 screenshot to the snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotOption>,

    /// Render visual element boxes in-page (debug).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_overlay: Option<bool>,

    /// Render the detected grid overlay (debug).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_grid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_id: Option<u32>,
}

impl SnapshotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, filter: SnapshotFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_screenshot(mut self, screenshot: ScreenshotOption) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn with_overlay(mut self) -> Self {
        self.show_overlay = Some(true);
        self
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT)
    }

    /// Compacted payload for the extension call: only the keys that were
    /// actually set, overlay keys excluded (those go through the dedicated
    /// overlay helpers after acquisition).
    pub fn to_extension_payload(&self) -> Value {
        let mut payload = json!({});
        if let Some(limit) = self.limit {
            payload["limit"] = json!(limit);
        }
        if let Some(filter) = &self.filter {
            payload["filter"] = serde_json::to_value(filter).unwrap_or(Value::Null);
        }
        if let Some(screenshot) = &self.screenshot {
            payload["screenshot"] = screenshot.to_payload();
        }
        payload
    }
}

/// Extension-side element pre-filters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clickable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_viewport: Option<bool>,
}

/// Screenshot request: a plain flag or format + quality.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScreenshotOption {
    Enabled(bool),
    Configured { format: String, quality: u8 },
}

impl ScreenshotOption {
    fn to_payload(&self) -> Value {
        match self {
            ScreenshotOption::Enabled(flag) => json!(flag),
            ScreenshotOption::Configured { format, quality } => {
                json!({ "format": format, "quality": quality })
            }
        }
    }
}
