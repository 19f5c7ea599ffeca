//! Trace event envelope.

use chrono::{DateTime, Utc};
use lantern_core_types::{RunId, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event categories the runtime emits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    StepStart,
    StepEnd,
    Snapshot,
    Action,
    Verification,
    Error,
}

/// One line of the trace stream.
///
/// The payload is flattened into the envelope, so a `verification` event
/// carries `{label, required, passed, reason, kind, attempts, details}` at
/// the top level of its JSON object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "type")]
    pub event_type: TraceEventType,
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Value,
}

impl TraceEvent {
    pub fn new(
        event_type: TraceEventType,
        run_id: RunId,
        step_id: Option<StepId>,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            run_id,
            step_id,
            ts: Utc::now(),
            data,
        }
    }

    pub fn step_start(run_id: RunId, step_id: StepId, goal: &str, step_index: Option<u32>) -> Self {
        Self::new(
            TraceEventType::StepStart,
            run_id,
            Some(step_id),
            json!({ "goal": goal, "step_index": step_index }),
        )
    }

    pub fn step_end(run_id: RunId, step_id: StepId, data: Value) -> Self {
        Self::new(TraceEventType::StepEnd, run_id, Some(step_id), data)
    }

    pub fn snapshot(run_id: RunId, step_id: Option<StepId>, url: &str, elements: usize) -> Self {
        Self::new(
            TraceEventType::Snapshot,
            run_id,
            step_id,
            json!({ "url": url, "element_count": elements }),
        )
    }

    pub fn action(run_id: RunId, step_id: Option<StepId>, data: Value) -> Self {
        Self::new(TraceEventType::Action, run_id, step_id, data)
    }

    pub fn verification(run_id: RunId, step_id: Option<StepId>, data: Value) -> Self {
        Self::new(TraceEventType::Verification, run_id, step_id, data)
    }

    pub fn error(run_id: RunId, step_id: Option<StepId>, name: &str, message: &str) -> Self {
        Self::new(
            TraceEventType::Error,
            run_id,
            step_id,
            json!({ "name": name, "message": message }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_flattens_into_envelope() {
        let event = TraceEvent::verification(
            RunId("run-1".into()),
            Some(StepId("step-1".into())),
            json!({ "label": "url-check", "passed": true }),
        );
        let line = serde_json::to_value(&event).unwrap();
        assert_eq!(line["type"], json!("verification"));
        assert_eq!(line["run_id"], json!("run-1"));
        assert_eq!(line["label"], json!("url-check"));
        assert_eq!(line["passed"], json!(true));
    }

    #[test]
    fn step_id_is_omitted_when_absent() {
        let event = TraceEvent::error(RunId("run-1".into()), None, "SnapshotError", "null capture");
        let line = serde_json::to_value(&event).unwrap();
        assert!(line.get("step_id").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let event = TraceEvent::snapshot(
            RunId("run-1".into()),
            Some(StepId("step-2".into())),
            "https://example.com",
            12,
        );
        let line = serde_json::to_string(&event).unwrap();
        let back: TraceEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back.event_type, TraceEventType::Snapshot);
        assert_eq!(back.data["element_count"], json!(12));
    }
}
