//! Wire types shared by all backend implementations.

use serde::{Deserialize, Serialize};

/// Viewport geometry and scroll offsets, derived from JS evaluation and
/// cached per step. Default-centered wheel events read from this cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportInfo {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_height: Option<f64>,
}

impl ViewportInfo {
    /// Viewport center, the fallback coordinate for wheel dispatch.
    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Layout metrics used for screenshot-region math and scroll bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetrics {
    /// Viewport origin in page coordinates.
    pub viewport_x: f64,
    pub viewport_y: f64,
    /// Full content size.
    pub content_width: f64,
    pub content_height: f64,
    pub device_pixel_ratio: f64,
}

/// Mouse button for click dispatch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Protocol name as used by `Input.dispatchMouseEvent`.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}

/// Document ready states the backend can wait for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Interactive,
    Complete,
}

impl ReadyState {
    /// Whether an observed `document.readyState` satisfies this wait.
    ///
    /// `interactive` accepts {interactive, complete}; `complete` accepts
    /// only {complete}.
    pub fn accepts(&self, observed: &str) -> bool {
        match self {
            ReadyState::Interactive => observed == "interactive" || observed == "complete",
            ReadyState::Complete => observed == "complete",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Interactive => "interactive",
            ReadyState::Complete => "complete",
        }
    }
}
