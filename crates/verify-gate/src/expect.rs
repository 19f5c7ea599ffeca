//! Fluent expectation layer compiling down to plain predicates.

use serde_json::json;

use crate::predicate::{AssertOutcome, Predicate};
use crate::query::ElementQuery;

/// Entry point: `expect(query).to_exist()`.
pub fn expect(query: ElementQuery) -> ExpectBuilder {
    ExpectBuilder { query }
}

/// Builds predicates for one element query.
pub struct ExpectBuilder {
    query: ElementQuery,
}

impl ExpectBuilder {
    pub fn to_exist(self) -> Predicate {
        let query = self.query;
        let label = format!("expect({}).to_exist", query.describe());
        Predicate::new(label, move |ctx| {
            let Some(snapshot) = &ctx.snapshot else {
                return Predicate::no_snapshot();
            };
            match query.find_first(snapshot) {
                Some(element) => AssertOutcome::pass(format!("element {} exists", element.id))
                    .with_details(json!({ "id": element.id })),
                None => AssertOutcome::fail(format!("no element matches {}", query.describe())),
            }
        })
    }

    pub fn not_to_exist(self) -> Predicate {
        let query = self.query;
        let label = format!("expect({}).not_to_exist", query.describe());
        Predicate::new(label, move |ctx| {
            let Some(snapshot) = &ctx.snapshot else {
                return Predicate::no_snapshot();
            };
            match query.find_first(snapshot) {
                Some(element) => AssertOutcome::fail(format!(
                    "element {} unexpectedly matches {}",
                    element.id,
                    query.describe()
                )),
                None => AssertOutcome::pass(format!("nothing matches {}", query.describe())),
            }
        })
    }

    /// Exists, is inside the viewport, and is not occluded.
    pub fn to_be_visible(self) -> Predicate {
        let query = self.query;
        let label = format!("expect({}).to_be_visible", query.describe());
        Predicate::new(label, move |ctx| {
            let Some(snapshot) = &ctx.snapshot else {
                return Predicate::no_snapshot();
            };
            let Some(element) = query.find_first(snapshot) else {
                return AssertOutcome::fail(format!("no element matches {}", query.describe()));
            };
            if !element.in_viewport {
                return AssertOutcome::fail(format!("element {} outside viewport", element.id));
            }
            if element.is_occluded {
                return AssertOutcome::fail(format!("element {} is occluded", element.id));
            }
            AssertOutcome::pass(format!("element {} visible", element.id))
        })
    }

    pub fn to_have_text_contains(self, needle: impl Into<String>) -> Predicate {
        let query = self.query;
        let needle = needle.into();
        let label = format!(
            "expect({}).to_have_text_contains({needle})",
            query.describe()
        );
        Predicate::new(label, move |ctx| {
            let Some(snapshot) = &ctx.snapshot else {
                return Predicate::no_snapshot();
            };
            let Some(element) = query.find_first(snapshot) else {
                return AssertOutcome::fail(format!("no element matches {}", query.describe()));
            };
            if element.text.to_lowercase().contains(&needle.to_lowercase()) {
                AssertOutcome::pass(format!("element {} text contains '{needle}'", element.id))
            } else {
                AssertOutcome::fail(format!(
                    "element {} text {:?} lacks '{needle}'",
                    element.id, element.text
                ))
            }
        })
    }
}

/// Some element on the page carries the text (case-insensitive).
pub fn expect_text_present(needle: impl Into<String>) -> Predicate {
    let needle = needle.into();
    let label = format!("expect_text_present({needle})");
    Predicate::new(label, move |ctx| {
        let Some(snapshot) = &ctx.snapshot else {
            return Predicate::no_snapshot();
        };
        let lowered = needle.to_lowercase();
        match snapshot
            .elements
            .iter()
            .find(|e| e.text.to_lowercase().contains(&lowered))
        {
            Some(element) => {
                AssertOutcome::pass(format!("element {} carries '{needle}'", element.id))
            }
            None => AssertOutcome::fail(format!("text '{needle}' not found on page")),
        }
    })
}

/// No element on the page carries the text (case-insensitive).
pub fn expect_no_text(needle: impl Into<String>) -> Predicate {
    let needle = needle.into();
    let label = format!("expect_no_text({needle})");
    Predicate::new(label, move |ctx| {
        let Some(snapshot) = &ctx.snapshot else {
            return Predicate::no_snapshot();
        };
        let lowered = needle.to_lowercase();
        match snapshot
            .elements
            .iter()
            .find(|e| e.text.to_lowercase().contains(&lowered))
        {
            Some(element) => AssertOutcome::fail(format!(
                "text '{needle}' unexpectedly present on element {}",
                element.id
            )),
            None => AssertOutcome::pass(format!("text '{needle}' absent")),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::AssertContext;
    use page_snapshot::Snapshot;
    use serde_json::json;

    fn ctx() -> AssertContext {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "status": "success",
            "url": "https://example.com",
            "viewport": { "width": 1280.0, "height": 720.0 },
            "elements": [
                {
                    "id": 1,
                    "role": "button",
                    "text": "Submit order",
                    "bbox": { "x": 0.0, "y": 10.0, "width": 10.0, "height": 10.0 },
                    "in_viewport": true,
                    "is_occluded": false,
                },
                {
                    "id": 2,
                    "role": "link",
                    "text": "Hidden promo",
                    "bbox": { "x": 0.0, "y": 900.0, "width": 10.0, "height": 10.0 },
                    "in_viewport": false,
                    "is_occluded": true,
                }
            ]
        }))
        .unwrap();
        AssertContext::new().with_snapshot(snapshot)
    }

    #[test]
    fn exist_and_not_exist() {
        assert!(expect(ElementQuery::new().role("button"))
            .to_exist()
            .evaluate(&ctx())
            .passed);
        assert!(expect(ElementQuery::new().role("dialog"))
            .not_to_exist()
            .evaluate(&ctx())
            .passed);
    }

    #[test]
    fn visibility_requires_viewport_and_no_occlusion() {
        assert!(expect(ElementQuery::new().role("button"))
            .to_be_visible()
            .evaluate(&ctx())
            .passed);
        let outcome = expect(ElementQuery::new().role("link"))
            .to_be_visible()
            .evaluate(&ctx());
        assert!(!outcome.passed);
        assert!(outcome.reason.contains("outside viewport"));
    }

    #[test]
    fn text_contains_is_case_insensitive() {
        assert!(expect(ElementQuery::new().role("button"))
            .to_have_text_contains("SUBMIT")
            .evaluate(&ctx())
            .passed);
    }

    #[test]
    fn global_text_scans() {
        assert!(expect_text_present("hidden PROMO").evaluate(&ctx()).passed);
        assert!(expect_no_text("checkout").evaluate(&ctx()).passed);
        assert!(!expect_no_text("Submit").evaluate(&ctx()).passed);
    }
}
