//! Analytics event sink seam.
//!
//! The trackers hand every event to an [`EventSink`] and move on; delivery,
//! batching and retries belong to the sink implementation.

pub mod names;
pub mod recording;

use serde_json::{Map, Value};
use std::sync::Arc;

pub use recording::{RecordingSink, TrackedEvent};

pub type Properties = Map<String, Value>;

pub trait EventSink: Send + Sync {
    /// Fire-and-forget. Implementations must not block.
    fn track(&self, event: &str, properties: Properties);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Converts a `json!({...})` object into a property bag. Anything other than
/// an object yields an empty bag.
pub fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Copies caller-supplied extras into `base` without overwriting keys the
/// tracker already set.
pub fn merge_extra(base: &mut Properties, extra: Option<Properties>) {
    if let Some(extra) = extra {
        for (k, v) in extra {
            base.entry(k).or_insert(v);
        }
    }
}

/// Logs every event through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn track(&self, event: &str, properties: Properties) {
        let properties = Value::Object(properties);
        tracing::info!(target: "tether.events", event, properties = %properties);
    }
}

/// Forwards each event to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn track(&self, event: &str, properties: Properties) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.track(event, properties.clone());
            }
            last.track(event, properties);
        }
    }
}
