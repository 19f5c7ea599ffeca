use backend_port::BackendError;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while acquiring a semantic snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The extension never injected its capture function. Carries the
    /// diagnostics map harvested by the probe script.
    #[error("extension bridge not loaded: {diagnostics}")]
    ExtensionNotLoaded { diagnostics: Value },

    /// The extension returned null for the capture.
    #[error("extension returned an empty snapshot{}", url_suffix(.url))]
    Empty { url: Option<String> },

    /// The capture payload did not match the snapshot schema.
    #[error("malformed snapshot payload: {0}")]
    Decode(String),

    #[error("snapshot acquisition cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn url_suffix(url: &Option<String>) -> String {
    match url {
        Some(url) => format!(" at {url}"),
        None => String::new(),
    }
}

impl SnapshotError {
    /// Stable wire-observable error name.
    pub fn name(&self) -> &'static str {
        match self {
            SnapshotError::ExtensionNotLoaded { .. } => "ExtensionNotLoadedError",
            SnapshotError::Empty { .. } | SnapshotError::Decode(_) => "SnapshotError",
            SnapshotError::Cancelled => "Cancelled",
            SnapshotError::Backend(BackendError::Cancelled) => "Cancelled",
            SnapshotError::Backend(_) => "BackendError",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            SnapshotError::Cancelled | SnapshotError::Backend(BackendError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_are_stable() {
        let err = SnapshotError::ExtensionNotLoaded {
            diagnostics: json!({ "defined": false }),
        };
        assert_eq!(err.name(), "ExtensionNotLoadedError");
        assert_eq!(
            SnapshotError::Empty { url: None }.name(),
            "SnapshotError"
        );
    }

    #[test]
    fn empty_error_mentions_url() {
        let err = SnapshotError::Empty {
            url: Some("https://example.com".into()),
        };
        assert!(err.to_string().contains("https://example.com"));
    }
}
