use anyhow::{Context, Result};
use std::sync::Arc;

use tether_core::api::{
    start_events_out, EventsOutTx, FanoutSink, MemoryStore, SharedSink, SharedStore,
    StoreProvider, TrackerConfig, TracingSink,
};

use crate::store::FileStore;

pub async fn build_store(cfg: &TrackerConfig) -> Result<SharedStore> {
    match cfg.store.provider {
        StoreProvider::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreProvider::File => {
            let dir = cfg
                .store
                .directory
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .context("store.directory is required for the file store")?;
            let store = FileStore::open(dir).await?;
            tracing::debug!(target: "tether.store", dir = %store.dir().display(), "file store opened");
            Ok(Arc::new(store))
        }
    }
}

/// Tracing sink, plus the JSONL writer when `events_out` is enabled.
pub async fn build_sink(cfg: &TrackerConfig) -> Result<(SharedSink, Option<EventsOutTx>)> {
    let events_out = start_events_out(&cfg.events_out)
        .await
        .map_err(anyhow::Error::msg)?;

    let sink: SharedSink = match events_out.clone() {
        Some(tx) => Arc::new(FanoutSink::new(vec![Arc::new(TracingSink), Arc::new(tx)])),
        None => Arc::new(TracingSink),
    };
    Ok((sink, events_out))
}
