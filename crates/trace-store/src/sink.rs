//! Trace sinks.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread;

use parking_lot::Mutex;
use tracing::warn;

use crate::errors::TraceError;
use crate::model::TraceEvent;

/// Destination for trace events. Implementations must accept concurrent
/// `emit` calls; the runtime never buffers or drops on their behalf.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError>;
    fn close(&self) -> Result<(), TraceError>;
}

/// Discards everything.
#[derive(Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn emit(&self, _event: &TraceEvent) -> Result<(), TraceError> {
        Ok(())
    }

    fn close(&self) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Collects events in memory, for tests and inspection.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), TraceError> {
        Ok(())
    }
}

enum Command {
    Append(String),
    Flush(mpsc::Sender<io::Result<()>>),
    Shutdown,
}

/// Newline-delimited JSON file sink.
///
/// Writes happen on a dedicated thread fed through a channel; every event is
/// flushed individually so a crashed run still leaves a replayable
/// transcript.
pub struct JsonlSink {
    tx: Sender<Command>,
}

impl JsonlSink {
    /// Open (or create) `path` in append mode and start the writer thread.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("trace-jsonl-writer".into())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        Command::Append(line) => {
                            if let Err(err) = write_line(&mut file, &line) {
                                warn!(target: "trace-store", ?err, "jsonl append failed");
                            }
                        }
                        Command::Flush(reply) => {
                            let _ = reply.send(file.flush());
                        }
                        Command::Shutdown => {
                            let _ = file.flush();
                            break;
                        }
                    }
                }
            })
            .map_err(TraceError::Io)?;
        Ok(Self { tx })
    }

    /// Block until everything queued so far has hit the file.
    pub fn flush(&self) -> Result<(), TraceError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| TraceError::Closed)?;
        reply_rx
            .recv()
            .map_err(|_| TraceError::Closed)?
            .map_err(TraceError::Io)
    }
}

fn write_line(file: &mut std::fs::File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}

impl TraceSink for JsonlSink {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError> {
        let line = serde_json::to_string(event)
            .map_err(|err| TraceError::Serialize(err.to_string()))?;
        self.tx
            .send(Command::Append(line))
            .map_err(|_| TraceError::Closed)
    }

    fn close(&self) -> Result<(), TraceError> {
        self.flush()?;
        self.tx
            .send(Command::Shutdown)
            .map_err(|_| TraceError::Closed)
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}
