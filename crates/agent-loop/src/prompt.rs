//! Compact prompt construction.

use page_snapshot::{compact_block, CompactConfig, Snapshot};

/// Everything the builder may draw on.
#[derive(Clone, Debug)]
pub struct PromptInput<'a> {
    pub task_goal: &'a str,
    pub step_goal: &'a str,
    /// Pre-rendered compact element lines.
    pub dom_context: &'a str,
    pub snapshot: &'a Snapshot,
    pub history_summary: Option<&'a str>,
}

/// Hook for callers who want to own the prompt shape.
pub trait PromptBuilder: Send + Sync {
    /// Returns `(system_prompt, user_prompt)`.
    fn build(&self, input: &PromptInput<'_>) -> (String, String);
}

/// Default builder: enumerates the compact element lines and asks for one
/// action in the strict grammar.
#[derive(Clone, Debug, Default)]
pub struct DefaultPromptBuilder;

impl DefaultPromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Render the element block for a snapshot.
    pub fn dom_context(snapshot: &Snapshot, compact: &CompactConfig) -> String {
        compact_block(snapshot, compact)
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, input: &PromptInput<'_>) -> (String, String) {
        let system = "\
You control a web browser through numbered page elements.
Reply with exactly one action and nothing else:
  CLICK(<id>)            click element by id
  TYPE(<id>,\"<text>\")    focus element by id, then type text
  PRESS(\"<key>\")         press a key (Enter, Escape, Tab, a single character)
  FINISH()               the task is complete
Element lines are `id|role|text|importance|is_primary|docYq|ord|DG|href`."
            .to_string();

        let mut user = String::new();
        user.push_str(&format!("Task: {}\n", input.task_goal));
        user.push_str(&format!("Current step: {}\n", input.step_goal));
        user.push_str(&format!("URL: {}\n", input.snapshot.url));
        if let Some(history) = input.history_summary {
            if !history.is_empty() {
                user.push_str(&format!("Previous steps:\n{history}\n"));
            }
        }
        user.push_str("Interactive elements:\n");
        user.push_str(input.dom_context);
        user.push_str("\n\nNext action:");
        (system, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        serde_json::from_value(json!({
            "status": "success",
            "url": "https://example.com",
            "viewport": { "width": 1280.0, "height": 720.0 },
            "elements": [{
                "id": 4,
                "role": "link",
                "text": "More information...",
                "importance": 80,
                "bbox": { "x": 10.0, "y": 40.0, "width": 200.0, "height": 20.0 },
                "href": "https://www.iana.org/domains/example"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn default_builder_enumerates_elements() {
        let snapshot = snapshot();
        let dom = DefaultPromptBuilder::dom_context(&snapshot, &CompactConfig::default());
        let (system, user) = DefaultPromptBuilder::new().build(&PromptInput {
            task_goal: "find the IANA page",
            step_goal: "click the More information link",
            dom_context: &dom,
            snapshot: &snapshot,
            history_summary: None,
        });

        assert!(system.contains("CLICK(<id>)"));
        assert!(user.contains("Task: find the IANA page"));
        assert!(user.contains("4|link|More information...|80|0|0|-|0|iana.org"));
        assert!(user.ends_with("Next action:"));
    }
}
