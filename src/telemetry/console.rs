//! Console capture: log events buffered for `CONSOLE_BATCH`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::{TelemetrySource, MAX_BATCH};
use crate::protocol::PushKind;

/// One console line as the server stores it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    /// `ERROR`, `WARN`, `INFO` or `CHAT`
    pub log_level: String,
    pub message: String,
    pub source: String,
    /// Unix millis
    pub recorded_at: i64,
}

impl ConsoleEntry {
    pub fn new(level: &Level, message: impl Into<String>, source: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            log_level: classify(level, &message).to_string(),
            message,
            source: source.into(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

fn classify(level: &Level, message: &str) -> &'static str {
    if message.starts_with('<') || message.contains("issued server command") {
        "CHAT"
    } else if *level == Level::ERROR {
        "ERROR"
    } else if *level == Level::WARN {
        "WARN"
    } else {
        "INFO"
    }
}

struct Ring {
    entries: VecDeque<ConsoleEntry>,
    capacity: usize,
}

impl Ring {
    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

/// Bounded buffer; the oldest entries go first when full.
#[derive(Clone)]
pub struct ConsoleBuffer {
    ring: Arc<Mutex<Ring>>,
}

impl ConsoleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(Ring {
                entries: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    /// Change the bound; excess entries are dropped oldest first.
    pub fn set_capacity(&self, capacity: usize) {
        let mut ring = self.ring.lock();
        ring.capacity = capacity.max(1);
        ring.trim();
    }

    pub fn push(&self, entry: ConsoleEntry) {
        let mut ring = self.ring.lock();
        ring.entries.push_back(entry);
        ring.trim();
    }

    /// Take up to `max` of the oldest entries.
    pub fn drain(&self, max: usize) -> Vec<ConsoleEntry> {
        let mut ring = self.ring.lock();
        let n = ring.entries.len().min(max);
        ring.entries.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().entries.is_empty()
    }
}

/// `tracing` layer that copies INFO and above into a [`ConsoleBuffer`].
pub struct ConsoleCapture {
    buffer: ConsoleBuffer,
}

impl ConsoleCapture {
    pub fn new(buffer: ConsoleBuffer) -> Self {
        Self { buffer }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for ConsoleCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }
        self.buffer
            .push(ConsoleEntry::new(metadata.level(), visitor.message, metadata.target()));
    }
}

/// `CONSOLE_BATCH` producer over a shared buffer.
pub struct ConsoleSource {
    buffer: ConsoleBuffer,
}

impl ConsoleSource {
    pub fn new(buffer: ConsoleBuffer) -> Self {
        Self { buffer }
    }
}

impl TelemetrySource for ConsoleSource {
    fn kind(&self) -> PushKind {
        PushKind::Console
    }

    fn sample(&mut self) -> Option<Value> {
        let entries = self.buffer.drain(MAX_BATCH);
        if entries.is_empty() {
            return None;
        }
        Some(json!({ "entries": entries }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_buffer_drops_oldest() {
        let buffer = ConsoleBuffer::new(3);
        for i in 0..5 {
            buffer.push(ConsoleEntry::new(&Level::INFO, format!("line {}", i), "test"));
        }
        let drained = buffer.drain(10);
        let messages: Vec<_> = drained.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
        assert!(buffer.is_empty());

        for i in 0..3 {
            buffer.push(ConsoleEntry::new(&Level::INFO, format!("line {}", i), "test"));
        }
        buffer.set_capacity(1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.drain(10)[0].message, "line 2");
    }

    #[test]
    fn test_batch_is_capped() {
        let buffer = ConsoleBuffer::new(1000);
        for i in 0..450 {
            buffer.push(ConsoleEntry::new(&Level::INFO, format!("{}", i), "test"));
        }
        let mut source = ConsoleSource::new(buffer.clone());

        let first = source.sample().unwrap();
        assert_eq!(first["entries"].as_array().unwrap().len(), MAX_BATCH);
        assert_eq!(first["entries"][0]["message"], "0");
        source.sample().unwrap();
        let last = source.sample().unwrap();
        assert_eq!(last["entries"].as_array().unwrap().len(), 50);
        assert!(source.sample().is_none());
    }

    #[test]
    fn test_levels_classified() {
        assert_eq!(classify(&Level::ERROR, "boom"), "ERROR");
        assert_eq!(classify(&Level::WARN, "careful"), "WARN");
        assert_eq!(classify(&Level::INFO, "started"), "INFO");
        assert_eq!(classify(&Level::INFO, "<Steve> hi"), "CHAT");
        assert_eq!(classify(&Level::INFO, "Alex issued server command: /spawn"), "CHAT");
    }

    #[test]
    fn test_layer_captures_info_and_above() {
        let buffer = ConsoleBuffer::new(10);
        let subscriber = tracing_subscriber::registry().with(ConsoleCapture::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("not captured");
            tracing::info!("[supervisor] Connected");
            tracing::warn!(code = 1006, "Connection closed");
        });

        let entries = buffer.drain(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "[supervisor] Connected");
        assert_eq!(entries[0].log_level, "INFO");
        assert_eq!(entries[1].log_level, "WARN");
        assert_eq!(entries[1].message, "Connection closed");
    }
}
