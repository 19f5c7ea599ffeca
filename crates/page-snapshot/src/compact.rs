//! Pipe-delimited snapshot compaction for LLM prompts.
//!
//! The raw element list is too large for a prompt. Selection is a 3-way
//! de-duplicating merge that preserves the high-signal actions (by
//! importance), ordinal tasks ("click the 3rd result" needs the dominant
//! group in rank order), and above-the-fold scanning (by position).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{Element, Snapshot};
use crate::rank::dominant_rank_map;

/// Max rendered text length per line (27 chars + `...`).
pub const COMPACT_TEXT_MAX: usize = 30;

/// Max rendered href length per line.
pub const COMPACT_HREF_MAX: usize = 10;

/// Document-y quantization bucket, in px.
const DOC_Y_BUCKET_PX: f64 = 200.0;

/// Roles that participate in compaction.
static INTERACTIVE_ROLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "button", "link", "textbox", "searchbox", "combobox", "checkbox", "radio", "slider",
        "tab", "menuitem", "option", "switch", "cell", "a", "input", "select", "textarea",
    ]
    .into_iter()
    .collect()
});

/// Cardinalities for the 3-way selection merge.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CompactConfig {
    /// Top-N by importance, descending.
    pub by_importance: usize,
    /// Top-N dominant-group members by `group_index`.
    pub from_dominant_group: usize,
    /// Top-N by position (lowest `doc_y`, importance-desc tiebreak).
    pub by_position: usize,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            by_importance: 60,
            from_dominant_group: 15,
            by_position: 10,
        }
    }
}

impl CompactConfig {
    pub fn new(by_importance: usize, from_dominant_group: usize, by_position: usize) -> Self {
        Self {
            by_importance,
            from_dominant_group,
            by_position,
        }
    }
}

pub fn is_interactive_role(role: &str) -> bool {
    INTERACTIVE_ROLES.contains(role)
}

fn in_dominant_group(snapshot: &Snapshot, element: &Element) -> bool {
    match (&snapshot.dominant_group_key, &element.group_key) {
        (Some(dominant), Some(group)) => dominant == group,
        _ => element.is_in_dominant_group(),
    }
}

/// 3-way merge with de-duplication, in this order: by importance, from the
/// dominant group, by position.
pub fn select_elements<'a>(snapshot: &'a Snapshot, config: &CompactConfig) -> Vec<&'a Element> {
    let interactive: Vec<&Element> = snapshot
        .elements
        .iter()
        .filter(|e| is_interactive_role(&e.role))
        .collect();

    let mut by_importance = interactive.clone();
    by_importance.sort_by(|a, b| b.importance.cmp(&a.importance).then(a.id.cmp(&b.id)));

    let mut from_group: Vec<&Element> = interactive
        .iter()
        .copied()
        .filter(|e| in_dominant_group(snapshot, e))
        .collect();
    from_group.sort_by_key(|e| (e.group_index.unwrap_or(u32::MAX), e.id));

    let mut by_position = interactive;
    by_position.sort_by(|a, b| {
        a.document_y()
            .partial_cmp(&b.document_y())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.importance.cmp(&a.importance))
            .then(a.id.cmp(&b.id))
    });

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut push = |element: &'a Element| {
        if seen.insert(element.id) {
            selected.push(element);
        }
    };
    for element in by_importance.into_iter().take(config.by_importance) {
        push(element);
    }
    for element in from_group.into_iter().take(config.from_dominant_group) {
        push(element);
    }
    for element in by_position.into_iter().take(config.by_position) {
        push(element);
    }
    selected
}

/// One line per selected element:
/// `id|role|text|importance|is_primary|docYq|ord|DG|href`.
pub fn compact_lines(snapshot: &Snapshot, config: &CompactConfig) -> Vec<String> {
    // Ordinals come from the full dominant-group population so they stay
    // stable across selection cardinalities.
    let ranks = dominant_rank_map(snapshot);
    select_elements(snapshot, config)
        .into_iter()
        .map(|element| {
            let ord = ranks
                .get(&element.id)
                .map(|rank| rank.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}|{}|{}|{}|{}|{}|{}|{}|{}",
                element.id,
                element.role,
                compact_text(&element.text),
                element.importance,
                u8::from(element.visual_cues.is_primary),
                (element.document_y() / DOC_Y_BUCKET_PX).round() as i64,
                ord,
                u8::from(in_dominant_group(snapshot, element)),
                compact_href(element.href.as_deref()),
            )
        })
        .collect()
}

/// The full prompt block, one element per line.
pub fn compact_block(snapshot: &Snapshot, config: &CompactConfig) -> String {
    compact_lines(snapshot, config).join("\n")
}

/// Whitespace-normalize, strip the field separator, truncate to
/// [`COMPACT_TEXT_MAX`] as 27 chars + `...`.
pub fn compact_text(text: &str) -> String {
    let normalized: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "/");
    if normalized.chars().count() <= COMPACT_TEXT_MAX {
        return normalized;
    }
    let head: String = normalized.chars().take(COMPACT_TEXT_MAX - 3).collect();
    format!("{head}...")
}

/// Second-level domain, or the last path segment for relative hrefs,
/// truncated to [`COMPACT_HREF_MAX`] chars. `-` when absent.
pub fn compact_href(href: Option<&str>) -> String {
    let Some(href) = href else {
        return "-".to_string();
    };
    let rendered = match Url::parse(href) {
        Ok(url) => match url.host_str() {
            Some(host) => second_level_domain(host),
            None => last_path_segment(url.path()),
        },
        Err(_) => last_path_segment(href),
    };
    if rendered.is_empty() {
        return "-".to_string();
    }
    rendered.chars().take(COMPACT_HREF_MAX).collect()
}

fn second_level_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

fn last_path_segment(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
        .to_string()
}
