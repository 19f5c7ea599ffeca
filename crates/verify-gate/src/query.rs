//! Element queries and the semantic selector DSL.

use std::cmp::Ordering;

use page_snapshot::{Element, Snapshot};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::VerifyError;

/// Declarative filter over snapshot elements.
///
/// Matching is pure; results sort by `doc_y` ascending so "first match"
/// semantics are stable across evaluations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ElementQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Exact accessible-name match (the element text, verbatim).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exact text match after trimming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Case-insensitive substring on text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_contains: Option<String>,
    /// Case-insensitive substring on href.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_viewport: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occluded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_dominant_group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_index: Option<u32>,
}

impl ElementQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn text_contains(mut self, needle: impl Into<String>) -> Self {
        self.text_contains = Some(needle.into());
        self
    }

    pub fn href_contains(mut self, needle: impl Into<String>) -> Self {
        self.href_contains = Some(needle.into());
        self
    }

    pub fn in_viewport(mut self, flag: bool) -> Self {
        self.in_viewport = Some(flag);
        self
    }

    pub fn occluded(mut self, flag: bool) -> Self {
        self.occluded = Some(flag);
        self
    }

    pub fn group(mut self, key: impl Into<String>) -> Self {
        self.group = Some(key.into());
        self
    }

    pub fn in_dominant_group(mut self, flag: bool) -> Self {
        self.in_dominant_group = Some(flag);
        self
    }

    pub fn group_index(mut self, index: u32) -> Self {
        self.group_index = Some(index);
        self
    }

    pub fn matches(&self, element: &Element) -> bool {
        if let Some(role) = &self.role {
            if !element.role.eq_ignore_ascii_case(role) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if element.text != *name {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if element.text.trim() != text.trim() {
                return false;
            }
        }
        if let Some(needle) = &self.text_contains {
            if !contains_ci(&element.text, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.href_contains {
            let Some(href) = &element.href else {
                return false;
            };
            if !contains_ci(href, needle) {
                return false;
            }
        }
        if let Some(flag) = self.in_viewport {
            if element.in_viewport != flag {
                return false;
            }
        }
        if let Some(flag) = self.occluded {
            if element.is_occluded != flag {
                return false;
            }
        }
        if let Some(key) = &self.group {
            if element.group_key.as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        if let Some(flag) = self.in_dominant_group {
            if element.is_in_dominant_group() != flag {
                return false;
            }
        }
        if let Some(index) = self.group_index {
            if element.group_index != Some(index) {
                return false;
            }
        }
        true
    }

    /// All matches, sorted by document position.
    pub fn find_all<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a Element> {
        let mut matches: Vec<&Element> = snapshot
            .elements
            .iter()
            .filter(|e| self.matches(e))
            .collect();
        matches.sort_by(|a, b| {
            a.document_y()
                .partial_cmp(&b.document_y())
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        matches
    }

    pub fn find_first<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a Element> {
        self.find_all(snapshot).into_iter().next()
    }

    /// Human-readable form, used in failure reasons.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(role) = &self.role {
            parts.push(format!("role={role}"));
        }
        if let Some(text) = &self.text_contains {
            parts.push(format!("text~'{text}'"));
        }
        if let Some(href) = &self.href_contains {
            parts.push(format!("href~{href}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name='{name}'"));
        }
        if parts.is_empty() {
            parts.push("<any>".to_string());
        }
        parts.join(" ")
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Parse the selector DSL: whitespace-separated conjunctions of
/// `role=X`, `text~'Y'` and `href~Z`.
pub fn parse_selector(selector: &str) -> Result<ElementQuery, VerifyError> {
    let token_re = Regex::new(r"^(\w+)\s*([=~])\s*(?:'([^']*)'|(\S+))$")
        .expect("selector token pattern is valid");
    let mut query = ElementQuery::new();

    for token in split_tokens(selector) {
        let captures = token_re
            .captures(&token)
            .ok_or_else(|| VerifyError::Parse(format!("bad selector token: {token}")))?;
        let field = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let op = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let value = captures
            .get(3)
            .or_else(|| captures.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        match (field, op) {
            ("role", "=") => query.role = Some(value),
            ("text", "~") => query.text_contains = Some(value),
            ("href", "~") => query.href_contains = Some(value),
            ("name", "=") => query.name = Some(value),
            _ => {
                return Err(VerifyError::Parse(format!(
                    "unsupported selector clause: {field}{op}"
                )))
            }
        }
    }

    Ok(query)
}

/// Split on whitespace while keeping quoted values intact.
fn split_tokens(selector: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for ch in selector.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
