//! Structured event stream for `retrodrive`.
//!
//! Discrete, typed events emitted by the phase engine and the generation
//! proxy.  Events are serialized as newline-delimited JSON (JSONL) and
//! include a monotonically increasing sequence number for ordering.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during `retrodrive` operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The engine began polling its first phase.
    EngineStarted {
        /// When the run started.
        timestamp: DateTime<Utc>,
        /// Identifier of this run.
        run_id: String,
        /// Phase the run started from.
        phase: String,
    },

    /// A phase began polling.
    PhaseEntered {
        /// When polling started.
        timestamp: DateTime<Utc>,
        /// Name of the phase.
        phase_name: String,
        /// Zero-based index of the phase in the workflow.
        phase_index: usize,
    },

    /// Generated text was written into the page.
    TextInjected {
        /// When the text landed.
        timestamp: DateTime<Utc>,
        /// Number of characters written.
        chars: usize,
        /// Kind of element that received the text.
        target: String,
    },

    /// A phase exceeded its tick budget.
    PhaseStalled {
        /// When the stall was detected.
        timestamp: DateTime<Utc>,
        /// Name of the stalled phase.
        phase_name: String,
        /// Ticks executed before giving up.
        ticks: u32,
    },

    /// The engine stopped polling for good.
    EngineTerminated {
        /// When the engine stopped.
        timestamp: DateTime<Utc>,
        /// Identifier of this run.
        run_id: String,
        /// Human-readable reason (`"finished"`, `"stalled"`, `"stopped"`).
        reason: String,
    },

    /// The proxy is accepting requests.
    ProxyStarted {
        /// When the proxy started.
        timestamp: DateTime<Utc>,
        /// Bound socket address.
        bind_addr: String,
        /// Configured backend.
        backend: String,
    },

    /// The proxy stopped.
    ProxyStopped {
        /// When the proxy stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
    },

    /// A generation request was answered.
    GenerationServed {
        /// When the answer was produced.
        timestamp: DateTime<Utc>,
        /// Backend that was asked.
        backend: String,
        /// Whether the static fallback text was used.
        used_fallback: bool,
        /// Total time spent in milliseconds.
        duration_ms: u64,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer.  Serialization or I/O failures are silently dropped.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Creates a file emitter when `path` is given, otherwise a no-op emitter.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_optional_file(path: Option<&Path>) -> std::io::Result<Self> {
        path.map_or_else(|| Ok(Self::noop()), Self::from_file)
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample_event() -> Event {
        Event::PhaseEntered {
            timestamp: DateTime::parse_from_rfc3339("2026-03-04T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc),
            phase_name: "phase3".to_owned(),
            phase_index: 2,
        }
    }

    #[test]
    fn emitter_writes_flat_jsonl_with_sequence() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(sample_event());
        emitter.emit(Event::EngineTerminated {
            timestamp: Utc::now(),
            run_id: "r-1".to_owned(),
            reason: "finished".to_owned(),
        });

        assert_eq!(emitter.event_count(), 2);

        let lines: Vec<serde_json::Value> = tw
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[0]["type"], "PhaseEntered");
        assert_eq!(lines[0]["phase_name"], "phase3");
        assert!(lines[0].get("event").is_none(), "event should be flattened");
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["reason"], "finished");
    }

    #[test]
    fn noop_emitter_counts_but_discards() {
        let emitter = EventEmitter::noop();
        emitter.emit(sample_event());
        assert_eq!(emitter.event_count(), 1);
    }

    #[test]
    fn file_emitter_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let emitter = EventEmitter::from_optional_file(Some(&path)).unwrap();
        emitter.emit(Event::GenerationServed {
            timestamp: Utc::now(),
            backend: "gemini".to_owned(),
            used_fallback: true,
            duration_ms: 12,
        });
        drop(emitter);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"used_fallback\":true"));
    }
}
