//! The semantic page model produced by one extension call.
//!
//! A snapshot is a value, not a graph: elements never reference each other,
//! and any grouping relation lives in `group_key`. Element ids are unique
//! within one snapshot only; nothing may assume stability across snapshots.

use lantern_core_types::BBox;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome reported by the extension for one capture.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Success,
    Error,
}

/// Point-in-time structured view of the page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: SnapshotStatus,
    pub url: String,
    /// Capture time, epoch milliseconds as stamped by the extension.
    #[serde(default)]
    pub timestamp: u64,
    pub viewport: ViewportSize,
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Group key with the most members and highest aggregate importance;
    /// its elements form the ordinal list (1st result, 2nd row, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_group_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<SnapshotDiagnostics>,
    /// Base64 screenshot when the capture asked for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl Snapshot {
    pub fn is_success(&self) -> bool {
        self.status == SnapshotStatus::Success
    }

    pub fn element_by_id(&self, id: i64) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Members of the dominant group, in document order.
    pub fn dominant_group(&self) -> Vec<&Element> {
        let Some(key) = &self.dominant_group_key else {
            return Vec::new();
        };
        self.elements
            .iter()
            .filter(|e| e.group_key.as_deref() == Some(key.as_str()))
            .collect()
    }

    pub fn captcha(&self) -> Option<&CaptchaDiagnostics> {
        self.diagnostics.as_ref().and_then(|d| d.captcha.as_ref())
    }
}

/// Viewport dimensions at capture time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

/// One ranked interactive element.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Element {
    /// Unique within this snapshot, never across snapshots.
    pub id: i64,
    /// ARIA-like role.
    pub role: String,
    /// Normalized text content.
    #[serde(default)]
    pub text: String,
    /// Actionability score, higher is more actionable.
    #[serde(default)]
    pub importance: i64,
    pub bbox: BBox,
    #[serde(default)]
    pub visual_cues: VisualCues,
    #[serde(default)]
    pub in_viewport: bool,
    #[serde(default)]
    pub is_occluded: bool,
    #[serde(default)]
    pub z_index: i64,
    /// Page-absolute y, present when the extension could compute it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    /// 0-based document order within the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_dominant_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Element {
    /// Page-absolute y with the viewport y as fallback, the sort key used
    /// everywhere position matters.
    pub fn document_y(&self) -> f64 {
        self.doc_y.unwrap_or(self.bbox.y)
    }

    pub fn is_in_dominant_group(&self) -> bool {
        self.in_dominant_group.unwrap_or(false)
    }
}

/// Visual hints the extension derives from computed styles.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VisualCues {
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color_name: Option<String>,
    #[serde(default)]
    pub is_clickable: bool,
}

/// Extension-side diagnostics attached to a capture.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotDiagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<CaptchaDiagnostics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Captcha detection evidence.
///
/// Passive hits (a recaptcha badge iframe) are not interactive and must not
/// gate progress; interactive hits (text or selector challenges) must.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CaptchaDiagnostics {
    #[serde(default)]
    pub detected: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_hint: Option<String>,
    #[serde(default)]
    pub evidence: CaptchaEvidence,
}

impl CaptchaDiagnostics {
    /// Evidence that actually blocks the user: challenge text or challenge
    /// selectors. Badge iframes and URL hits alone are passive.
    pub fn has_interactive_evidence(&self) -> bool {
        !self.evidence.text_hits.is_empty() || !self.evidence.selector_hits.is_empty()
    }
}

/// Raw evidence buckets from the detector.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CaptchaEvidence {
    #[serde(default)]
    pub iframe_src_hits: Vec<String>,
    #[serde(default)]
    pub selector_hits: Vec<String>,
    #[serde(default)]
    pub text_hits: Vec<String>,
    #[serde(default)]
    pub url_hits: Vec<String>,
}

/// Completed-download record the verification layer inspects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub filename: String,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    InProgress,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_extension_payload() {
        let payload = json!({
            "status": "success",
            "url": "https://example.com",
            "timestamp": 1722470400000u64,
            "viewport": { "width": 1280.0, "height": 720.0 },
            "dominant_group_key": "results",
            "elements": [{
                "id": 3,
                "role": "link",
                "text": "More information...",
                "importance": 80,
                "bbox": { "x": 10.0, "y": 40.0, "width": 200.0, "height": 20.0 },
                "visual_cues": { "is_primary": false, "is_clickable": true },
                "in_viewport": true,
                "is_occluded": false,
                "z_index": 0,
                "doc_y": 40.0,
                "group_key": "results",
                "group_index": 0,
                "in_dominant_group": true,
                "href": "https://www.iana.org/domains/example"
            }]
        });

        let snapshot: Snapshot = serde_json::from_value(payload).unwrap();
        assert!(snapshot.is_success());
        assert_eq!(snapshot.elements.len(), 1);
        let element = snapshot.element_by_id(3).unwrap();
        assert!(element.is_in_dominant_group());
        assert_eq!(snapshot.dominant_group().len(), 1);
    }

    #[test]
    fn interactive_captcha_evidence() {
        let passive = CaptchaDiagnostics {
            detected: true,
            confidence: 0.99,
            provider_hint: Some("recaptcha".into()),
            evidence: CaptchaEvidence {
                iframe_src_hits: vec!["https://www.google.com/recaptcha/api2/anchor".into()],
                ..Default::default()
            },
        };
        assert!(!passive.has_interactive_evidence());

        let interactive = CaptchaDiagnostics {
            detected: true,
            confidence: 0.95,
            provider_hint: None,
            evidence: CaptchaEvidence {
                text_hits: vec!["I'm not a robot".into()],
                ..Default::default()
            },
        };
        assert!(interactive.has_interactive_evidence());
    }

    #[test]
    fn document_y_falls_back_to_bbox() {
        let mut element: Element = serde_json::from_value(json!({
            "id": 1,
            "role": "button",
            "bbox": { "x": 0.0, "y": 55.0, "width": 10.0, "height": 10.0 },
        }))
        .unwrap();
        assert_eq!(element.document_y(), 55.0);
        element.doc_y = Some(900.0);
        assert_eq!(element.document_y(), 900.0);
    }
}
