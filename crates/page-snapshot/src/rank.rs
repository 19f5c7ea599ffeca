//! Dominant-group ordinal ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{Element, Snapshot};

/// Reading-order comparison for dominant-group members:
/// `(doc_y, bbox.y, bbox.x, -importance)`.
fn reading_order(a: &Element, b: &Element) -> Ordering {
    a.document_y()
        .partial_cmp(&b.document_y())
        .unwrap_or(Ordering::Equal)
        .then(
            a.bbox
                .y
                .partial_cmp(&b.bbox.y)
                .unwrap_or(Ordering::Equal),
        )
        .then(
            a.bbox
                .x
                .partial_cmp(&b.bbox.x)
                .unwrap_or(Ordering::Equal),
        )
        .then(b.importance.cmp(&a.importance))
}

/// Rank of every dominant-group member, keyed by element id.
///
/// Computed over the full dominant-group population, not a selected
/// subset, so ordinals ("the 3rd result") stay stable however many
/// elements a prompt ends up rendering.
pub fn dominant_rank_map(snapshot: &Snapshot) -> HashMap<i64, usize> {
    let mut members = snapshot.dominant_group();
    members.sort_by(|a, b| reading_order(a, b));
    members
        .iter()
        .enumerate()
        .map(|(rank, element)| (element.id, rank))
        .collect()
}

/// Dominant-group members in ordinal order.
pub fn ordinal_list(snapshot: &Snapshot) -> Vec<&Element> {
    let mut members = snapshot.dominant_group();
    members.sort_by(|a, b| reading_order(a, b));
    members
}
