//! Primitive predicates over snapshot, URL and download state.

use page_snapshot::DownloadStatus;
use regex::Regex;
use serde_json::json;

use crate::predicate::{AssertContext, AssertOutcome, Predicate};
use crate::query::{parse_selector, ElementQuery};

/// URL matches a regular expression.
pub fn url_matches(pattern: &str) -> Predicate {
    let compiled = Regex::new(pattern).map_err(|err| err.to_string());
    let pattern = pattern.to_string();
    Predicate::new(format!("url_matches({pattern})"), move |ctx| {
        let regex = match &compiled {
            Ok(regex) => regex,
            Err(err) => return AssertOutcome::fail(format!("invalid pattern: {err}")),
        };
        match &ctx.url {
            Some(url) if regex.is_match(url) => {
                AssertOutcome::pass(format!("url {url} matches {pattern}"))
            }
            Some(url) => AssertOutcome::fail(format!("url {url} does not match {pattern}")),
            None => AssertOutcome::fail("no url in context"),
        }
    })
}

/// URL contains a substring (case-sensitive, URLs are).
pub fn url_contains(needle: &str) -> Predicate {
    let needle = needle.to_string();
    Predicate::new(format!("url_contains({needle})"), move |ctx| match &ctx.url {
        Some(url) if url.contains(&needle) => {
            AssertOutcome::pass(format!("url {url} contains {needle}"))
        }
        Some(url) => AssertOutcome::fail(format!("url {url} does not contain {needle}")),
        None => AssertOutcome::fail("no url in context"),
    })
}

fn with_query(
    label: String,
    selector: &str,
    check: impl Fn(&AssertContext, &ElementQuery) -> AssertOutcome + Send + Sync + 'static,
) -> Predicate {
    let parsed = parse_selector(selector).map_err(|err| err.to_string());
    Predicate::new(label, move |ctx| match &parsed {
        Ok(query) => check(ctx, query),
        Err(err) => AssertOutcome::fail(err.clone()),
    })
}

/// At least one element matches the selector.
pub fn exists(selector: &str) -> Predicate {
    with_query(format!("exists({selector})"), selector, |ctx, query| {
        let Some(snapshot) = &ctx.snapshot else {
            return Predicate::no_snapshot();
        };
        let matches = query.find_all(snapshot);
        if matches.is_empty() {
            AssertOutcome::fail(format!("no element matches {}", query.describe()))
        } else {
            AssertOutcome::pass(format!(
                "{} element(s) match {}",
                matches.len(),
                query.describe()
            ))
            .with_details(json!({ "count": matches.len(), "first_id": matches[0].id }))
        }
    })
}

/// No element matches the selector.
pub fn not_exists(selector: &str) -> Predicate {
    with_query(format!("not_exists({selector})"), selector, |ctx, query| {
        let Some(snapshot) = &ctx.snapshot else {
            return Predicate::no_snapshot();
        };
        let count = query.find_all(snapshot).len();
        if count == 0 {
            AssertOutcome::pass(format!("no element matches {}", query.describe()))
        } else {
            AssertOutcome::fail(format!(
                "{count} element(s) unexpectedly match {}",
                query.describe()
            ))
        }
    })
}

/// Match count within `[min, max]` (either bound optional).
pub fn element_count(selector: &str, min: Option<usize>, max: Option<usize>) -> Predicate {
    with_query(
        format!("element_count({selector})"),
        selector,
        move |ctx, query| {
            let Some(snapshot) = &ctx.snapshot else {
                return Predicate::no_snapshot();
            };
            let count = query.find_all(snapshot).len();
            let below = min.map(|m| count < m).unwrap_or(false);
            let above = max.map(|m| count > m).unwrap_or(false);
            if below || above {
                AssertOutcome::fail(format!(
                    "count {count} outside [{}, {}] for {}",
                    min.map(|m| m.to_string()).unwrap_or_else(|| "0".into()),
                    max.map(|m| m.to_string()).unwrap_or_else(|| "∞".into()),
                    query.describe()
                ))
                .with_details(json!({ "count": count }))
            } else {
                AssertOutcome::pass(format!("count {count} in range")).with_details(json!({
                    "count": count
                }))
            }
        },
    )
}

fn element_state(
    label: String,
    selector: &str,
    field: &'static str,
    check: impl Fn(&page_snapshot::Element) -> Result<bool, String> + Send + Sync + 'static,
) -> Predicate {
    with_query(label, selector, move |ctx, query| {
        let Some(snapshot) = &ctx.snapshot else {
            return Predicate::no_snapshot();
        };
        let Some(element) = query.find_first(snapshot) else {
            return AssertOutcome::fail(format!("no element matches {}", query.describe()));
        };
        match check(element) {
            Ok(true) => AssertOutcome::pass(format!("element {} {field}", element.id)),
            Ok(false) => AssertOutcome::fail(format!("element {} not {field}", element.id)),
            Err(reason) => AssertOutcome::fail(reason),
        }
    })
}

pub fn is_enabled(selector: &str) -> Predicate {
    element_state(
        format!("is_enabled({selector})"),
        selector,
        "enabled",
        |element| Ok(!element.disabled.unwrap_or(false)),
    )
}

pub fn is_disabled(selector: &str) -> Predicate {
    element_state(
        format!("is_disabled({selector})"),
        selector,
        "disabled",
        |element| match element.disabled {
            Some(disabled) => Ok(disabled),
            None => Err("element carries no disabled state".into()),
        },
    )
}

pub fn is_checked(selector: &str) -> Predicate {
    element_state(
        format!("is_checked({selector})"),
        selector,
        "checked",
        |element| match element.checked {
            Some(checked) => Ok(checked),
            None => Err("element carries no checked state".into()),
        },
    )
}

pub fn is_unchecked(selector: &str) -> Predicate {
    element_state(
        format!("is_unchecked({selector})"),
        selector,
        "unchecked",
        |element| match element.checked {
            Some(checked) => Ok(!checked),
            None => Err("element carries no checked state".into()),
        },
    )
}

pub fn is_expanded(selector: &str) -> Predicate {
    element_state(
        format!("is_expanded({selector})"),
        selector,
        "expanded",
        |element| match element.expanded {
            Some(expanded) => Ok(expanded),
            None => Err("element carries no expanded state".into()),
        },
    )
}

pub fn is_collapsed(selector: &str) -> Predicate {
    element_state(
        format!("is_collapsed({selector})"),
        selector,
        "collapsed",
        |element| match element.expanded {
            Some(expanded) => Ok(!expanded),
            None => Err("element carries no expanded state".into()),
        },
    )
}

pub fn value_equals(selector: &str, expected: &str) -> Predicate {
    let expected = expected.to_string();
    element_state(
        format!("value_equals({selector}, {expected})"),
        selector,
        "value-equal",
        move |element| match &element.value {
            Some(value) => Ok(value == &expected),
            None => Err("element carries no value".into()),
        },
    )
}

pub fn value_contains(selector: &str, needle: &str) -> Predicate {
    let needle = needle.to_lowercase();
    element_state(
        format!("value_contains({selector}, {needle})"),
        selector,
        "value-contains",
        move |element| match &element.value {
            Some(value) => Ok(value.to_lowercase().contains(&needle)),
            None => Err("element carries no value".into()),
        },
    )
}

/// A download finished, optionally with a filename substring.
pub fn download_completed(filename_contains: Option<&str>) -> Predicate {
    let needle = filename_contains.map(str::to_string);
    let label = match &needle {
        Some(n) => format!("download_completed({n})"),
        None => "download_completed".to_string(),
    };
    Predicate::new(label, move |ctx| {
        let hit = ctx.downloads.iter().find(|d| {
            d.status == DownloadStatus::Completed
                && needle
                    .as_ref()
                    .map(|n| d.filename.contains(n.as_str()))
                    .unwrap_or(true)
        });
        match hit {
            Some(download) => AssertOutcome::pass(format!("download {} completed", download.filename))
                .with_details(json!({ "filename": download.filename })),
            None => AssertOutcome::fail(match &needle {
                Some(n) => format!("no completed download matching {n}"),
                None => "no completed download".to_string(),
            }),
        }
    })
}
