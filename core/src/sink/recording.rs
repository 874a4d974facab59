use serde::Serialize;
use std::sync::Mutex;

use super::{EventSink, Properties};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
    pub event: String,
    pub properties: Properties,
}

/// Keeps every tracked event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TrackedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        self.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.event.clone()).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.lock().iter().filter(|e| e.event == event).count()
    }

    pub fn last(&self, event: &str) -> Option<TrackedEvent> {
        self.lock().iter().rev().find(|e| e.event == event).cloned()
    }

    pub fn take(&self) -> Vec<TrackedEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TrackedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for RecordingSink {
    fn track(&self, event: &str, properties: Properties) {
        self.lock().push(TrackedEvent {
            event: event.to_string(),
            properties,
        });
    }
}
