//! Foreground/background signal from the host platform.
//!
//! Each platform (OS notification center, browser visibility API, test
//! harness) implements [`AppLifecycleSignal`]. Managers bind to it with a
//! [`LifecycleSubscription`], which is cancelled on drop.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycleState {
    Active,
    Background,
}

pub trait AppLifecycleSignal: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<AppLifecycleState>;
}

/// In-process signal backed by a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastLifecycle {
    tx: broadcast::Sender<AppLifecycleState>,
}

impl BroadcastLifecycle {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a transition. Returns how many subscribers saw it.
    pub fn emit(&self, state: AppLifecycleState) -> usize {
        self.tx.send(state).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastLifecycle {
    fn default() -> Self {
        Self::new(16)
    }
}

impl AppLifecycleSignal for BroadcastLifecycle {
    fn subscribe(&self) -> broadcast::Receiver<AppLifecycleState> {
        self.tx.subscribe()
    }
}

/// A running lifecycle listener. Dropping it unsubscribes.
pub struct LifecycleSubscription {
    task: JoinHandle<()>,
}

impl LifecycleSubscription {
    /// Feeds every transition to `handler` in order. The listener stops when
    /// the handler returns `false` or the signal closes.
    pub fn spawn<F, Fut>(mut rx: broadcast::Receiver<AppLifecycleState>, handler: F) -> Self
    where
        F: Fn(AppLifecycleState) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => {
                        if !handler(state).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "tether.lifecycle",
                            skipped,
                            "lifecycle listener lagged, transitions dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn unsubscribe(self) {
        // Drop aborts the task.
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
