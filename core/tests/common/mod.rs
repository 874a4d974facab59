#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use tether_core::api::{
    BroadcastLifecycle, ManualClock, MemoryStore, RecordingSink, Services, TrackerConfig,
    TrackerContext,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap()
}

/// One simulated device: clock, storage and analytics that outlive any
/// single process run.
pub struct Device {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub signal: BroadcastLifecycle,
}

impl Device {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(t0())),
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(RecordingSink::new()),
            signal: BroadcastLifecycle::default(),
        }
    }

    /// A fresh "process": new managers over the same device state.
    pub fn launch(&self, cfg: TrackerConfig) -> TrackerContext {
        let services = Services::new(self.clock.clone(), self.store.clone(), self.sink.clone());
        TrackerContext::new(cfg, services)
    }

    pub fn advance_mins(&self, mins: u64) {
        self.clock.advance(Duration::from_secs(mins * 60));
    }

    pub fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub async fn wait_for_subscribers(&self, n: usize) {
        for _ in 0..200 {
            if self.signal.subscriber_count() == n {
                return;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(self.signal.subscriber_count(), n);
    }
}

/// Lets spawned lifecycle handlers run to completion.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
