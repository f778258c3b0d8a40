//! Analytics event sinks.
//!
//! A sink receives every event under its analytics name with flat properties.
//! Emission is fire-and-forget: a sink must not block and cannot fail the tracker.

use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};

/// Destination for analytics events
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, name: &str, properties: &Map<String, Value>);
}

impl<F> EventSink for F
where
    F: Fn(&str, &Map<String, Value>) + Send + Sync,
{
    fn emit(&self, name: &str, properties: &Map<String, Value>) {
        self(name, properties)
    }
}

/// Sink that writes every event to the `tracing` log at info level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, name: &str, properties: &Map<String, Value>) {
        let properties = Value::Object(properties.clone());
        tracing::info!(event = name, properties = %properties, "analytics event");
    }
}

/// Sink that keeps every event in memory
///
/// Useful for hosts that batch events themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far, oldest first
    pub fn events(&self) -> Vec<(String, Map<String, Value>)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the events received so far, oldest first
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of events received with the given name
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, name: &str, properties: &Map<String, Value>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), properties.clone()));
    }
}
