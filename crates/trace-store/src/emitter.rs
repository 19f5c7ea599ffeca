//! The runtime's event emitter.

use std::sync::Arc;

use lantern_core_types::{RunId, StepId};
use serde_json::Value;
use tracing::warn;

use crate::model::{TraceEvent, TraceEventType};
use crate::sink::TraceSink;

/// Fans trace events out to the configured sinks, in program order.
///
/// Sink failures are logged and do not disturb the run; the event still
/// reaches every remaining sink.
#[derive(Clone)]
pub struct Tracer {
    run_id: RunId,
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl Tracer {
    pub fn new(run_id: RunId, sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        Self { run_id, sinks }
    }

    /// Tracer that discards everything.
    pub fn disabled() -> Self {
        Self {
            run_id: RunId::new(),
            sinks: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn emit(&self, event: TraceEvent) {
        for sink in &self.sinks {
            if let Err(err) = sink.emit(&event) {
                warn!(target: "trace-store", ?err, event_type = ?event.event_type, "sink emit failed");
            }
        }
    }

    pub fn emit_typed(&self, event_type: TraceEventType, step_id: Option<StepId>, data: Value) {
        self.emit(TraceEvent::new(
            event_type,
            self.run_id.clone(),
            step_id,
            data,
        ));
    }

    pub fn close(&self) {
        for sink in &self.sinks {
            if let Err(err) = sink.close() {
                warn!(target: "trace-store", ?err, "sink close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    #[test]
    fn fans_out_to_all_sinks_in_order() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let tracer = Tracer::new(
            RunId("run-1".into()),
            vec![first.clone(), second.clone()],
        );

        tracer.emit_typed(TraceEventType::Action, None, json!({ "seq": 1 }));
        tracer.emit_typed(TraceEventType::Action, None, json!({ "seq": 2 }));

        for sink in [&first, &second] {
            let events = sink.events();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].data["seq"], json!(1));
            assert_eq!(events[1].data["seq"], json!(2));
        }
    }

    #[test]
    fn events_carry_the_tracer_run_id() {
        let sink = Arc::new(MemorySink::new());
        let tracer = Tracer::new(RunId("run-9".into()), vec![sink.clone()]);
        tracer.emit_typed(TraceEventType::Error, None, json!({ "name": "X" }));
        assert_eq!(sink.events()[0].run_id.0, "run-9");
    }
}
