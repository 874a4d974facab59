//! In-order snapshot persistence

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TrackerError;
use crate::store::{PersistentStore, SharedStore};

enum WriteOp {
    Set { key: String, value: String },
    Remove { key: String },
    Flush(oneshot::Sender<()>),
}

/// Single-writer queue in front of a [`PersistentStore`].
///
/// Every write enqueued through one writer reaches the store in enqueue
/// order, so two mutations fired in the same tick cannot race each other.
/// Store failures are logged and counted; they never reach the caller.
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
    failed: Arc<AtomicU64>,
}

impl SnapshotWriter {
    /// Starts the drain task. Must be called from inside a tokio runtime.
    pub fn spawn(store: SharedStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        let failed = Arc::new(AtomicU64::new(0));
        let failed_clone = failed.clone();

        let task = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let (op_name, key, res) = match op {
                    WriteOp::Set { key, value } => {
                        let res = store.set(&key, value).await;
                        ("set", key, res)
                    }
                    WriteOp::Remove { key } => {
                        let res = store.remove(&key).await;
                        ("remove", key, res)
                    }
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                if let Err(source) = res {
                    failed_clone.fetch_add(1, Ordering::Relaxed);
                    let err = TrackerError::StoreUnavailable {
                        op: op_name,
                        key,
                        source,
                    };
                    tracing::warn!(
                        target: "tether.store",
                        store = store.name(),
                        error.kind = err.kind(),
                        error.message = %err,
                        "store write failed, continuing in memory"
                    );
                }
            }
        });

        (Self { tx, failed }, task)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, json),
            Err(source) => {
                let err = TrackerError::Encode {
                    key: key.to_string(),
                    source,
                };
                tracing::error!(
                    target: "tether.store",
                    key,
                    error.kind = err.kind(),
                    error.message = %err,
                    "snapshot encode failed"
                );
            }
        }
    }

    pub fn set_raw(&self, key: &str, value: String) {
        self.enqueue(WriteOp::Set {
            key: key.to_string(),
            value,
        });
    }

    pub fn remove(&self, key: &str) {
        self.enqueue(WriteOp::Remove {
            key: key.to_string(),
        });
    }

    /// Resolves once every write enqueued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Number of store operations that failed since the writer started.
    pub fn failed_writes(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Logs how many writes were lost, if any. Called on teardown.
    pub fn report_failures(&self, owner: &'static str) {
        let failed = self.failed_writes();
        if failed > 0 {
            tracing::warn!(
                target: "tether.store",
                owner,
                failed,
                "snapshot writes failed during this run"
            );
        }
    }

    fn enqueue(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!(target: "tether.store", "snapshot writer closed, dropping write");
        }
    }
}

/// Reads and decodes a snapshot.
///
/// A value that does not decode is removed from the store before the
/// [`TrackerError::CorruptSnapshot`] is returned, so the caller can start
/// fresh without tripping over it again.
pub async fn load_snapshot<T: DeserializeOwned>(
    store: &dyn PersistentStore,
    key: &str,
) -> Result<Option<T>, TrackerError> {
    let raw = store
        .get(key)
        .await
        .map_err(|source| TrackerError::StoreUnavailable {
            op: "get",
            key: key.to_string(),
            source,
        })?;

    let Some(raw) = raw else {
        return Ok(None);
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            if let Err(e) = store.remove(key).await {
                tracing::warn!(
                    target: "tether.store",
                    key,
                    error.message = %e,
                    "failed to discard corrupt snapshot"
                );
            }
            Err(TrackerError::CorruptSnapshot {
                key: key.to_string(),
                source,
            })
        }
    }
}
