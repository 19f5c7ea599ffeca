//! Predicate composition.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::json;

use crate::predicate::{AssertContext, AssertOutcome, Predicate};

/// AND: collects every sub-outcome and lists the failing reasons.
pub fn all_of(predicates: Vec<Predicate>) -> Predicate {
    Predicate::new("all_of", move |ctx| {
        let outcomes: Vec<(String, AssertOutcome)> = predicates
            .iter()
            .map(|p| (p.label().to_string(), p.evaluate(ctx)))
            .collect();
        let failures: Vec<String> = outcomes
            .iter()
            .filter(|(_, o)| !o.passed)
            .map(|(label, o)| format!("{label}: {}", o.reason))
            .collect();
        let details = json!({
            "outcomes": outcomes
                .iter()
                .map(|(label, o)| json!({ "label": label, "passed": o.passed, "reason": o.reason }))
                .collect::<Vec<_>>()
        });
        if failures.is_empty() {
            AssertOutcome::pass(format!("all {} checks passed", outcomes.len())).with_details(details)
        } else {
            AssertOutcome::fail(failures.join("; ")).with_details(details)
        }
    })
}

/// OR: returns on the first pass, otherwise lists every failure reason.
pub fn any_of(predicates: Vec<Predicate>) -> Predicate {
    Predicate::new("any_of", move |ctx| {
        let mut failures = Vec::new();
        for predicate in &predicates {
            let outcome = predicate.evaluate(ctx);
            if outcome.passed {
                return AssertOutcome::pass(format!(
                    "{} passed: {}",
                    predicate.label(),
                    outcome.reason
                ));
            }
            failures.push(format!("{}: {}", predicate.label(), outcome.reason));
        }
        if failures.is_empty() {
            AssertOutcome::fail("any_of over zero predicates")
        } else {
            AssertOutcome::fail(failures.join("; "))
        }
    })
}

/// NOT: inverts pass/fail, keeping the inner reason visible.
pub fn not(predicate: Predicate) -> Predicate {
    let label = format!("not({})", predicate.label());
    Predicate::new(label, move |ctx| {
        let outcome = predicate.evaluate(ctx);
        if outcome.passed {
            AssertOutcome::fail(format!("inner predicate passed: {}", outcome.reason))
        } else {
            AssertOutcome::pass(format!("inner predicate failed: {}", outcome.reason))
        }
    })
}

/// Wrap an arbitrary check; a panic inside becomes a failing outcome
/// instead of unwinding through the step loop.
pub fn custom(
    label: impl Into<String>,
    check: impl Fn(&AssertContext) -> AssertOutcome + Send + Sync + 'static,
) -> Predicate {
    let label = label.into();
    let failure_label = label.clone();
    Predicate::new(label, move |ctx| {
        match catch_unwind(AssertUnwindSafe(|| check(ctx))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                AssertOutcome::fail(format!("custom check {failure_label} panicked: {message}"))
            }
        }
    })
}
