#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;
use stagecast_core::{BroadcastSink, SinkError};
use tokio::time::Instant;

/// One call the queue made into the sink.
#[derive(Debug, Clone)]
pub struct Emission {
    pub event: String,
    pub payload: Value,
    pub scope: Option<String>,
    pub at: Instant,
}

impl Emission {
    pub fn id(&self) -> &str {
        self.payload["id"].as_str().unwrap_or_default()
    }
}

/// Sink that records every emission with its (virtual) time.
#[derive(Default)]
pub struct RecordingSink {
    log: Mutex<Vec<Emission>>,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records, then reports failure for emissions named `event`.
    pub fn failing_on(event: &'static str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(event),
            ..Self::default()
        })
    }

    /// Records, then panics for emissions named `event`.
    pub fn panicking_on(event: &'static str) -> Arc<Self> {
        Arc::new(Self {
            panic_on: Some(event),
            ..Self::default()
        })
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.log.lock().unwrap().clone()
    }

    pub fn named(&self, event: &str) -> Vec<Emission> {
        self.emissions()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }

    pub fn ids_of(&self, event: &str) -> Vec<String> {
        self.named(event).iter().map(|e| e.id().to_string()).collect()
    }
}

impl BroadcastSink for RecordingSink {
    fn emit(&self, event: &str, payload: Value, scope: Option<&str>) -> Result<(), SinkError> {
        self.log.lock().unwrap().push(Emission {
            event: event.to_string(),
            payload,
            scope: scope.map(str::to_string),
            at: Instant::now(),
        });
        if self.panic_on == Some(event) {
            panic!("sink exploded on {event}");
        }
        if self.fail_on == Some(event) {
            return Err(SinkError::Unavailable(format!("refusing {event}")));
        }
        Ok(())
    }
}

pub fn payload(value: Value) -> stagecast_core::Metadata {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}
