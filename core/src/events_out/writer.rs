use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EventsOutConfig;
use crate::sink::{EventSink, Properties};

fn audit_preview(s: &str) -> String {
    const MAX: usize = 120;
    if s.len() <= MAX {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .take_while(|(i, _)| *i < MAX)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let mut out = s[..end].to_string();
    out.push('…');
    out
}

/// Sending half of the JSONL event writer. Cheap to clone.
#[derive(Clone)]
pub struct EventsOutTx {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventsOutTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drops this sender and waits up to `grace` for the writer to drain.
    ///
    /// The writer only finishes once every clone is gone, so callers drop
    /// the sinks holding clones first.
    pub async fn close(self, grace: Duration) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let dropped = self.dropped_count();
        drop(self);
        let Some(task) = task else {
            return;
        };
        match tokio::time::timeout(grace, task).await {
            Ok(_) => {
                tracing::debug!(target: "tether.events_out", dropped, "events_out drained");
            }
            Err(_) => {
                tracing::warn!(
                    target: "tether.events_out",
                    grace_ms = grace.as_millis() as u64,
                    "events_out still has senders, giving up on drain"
                );
            }
        }
    }

    pub fn send_line(&self, line: String) {
        if self.tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl EventSink for EventsOutTx {
    fn track(&self, event: &str, properties: Properties) {
        let line = json!({
            "ts": Utc::now().to_rfc3339(),
            "event": event,
            "properties": properties,
        });
        self.send_line(line.to_string());
    }
}

/// Starts the JSONL writer described by `cfg`.
///
/// `path = "stdout:"` writes to standard output. Lines that do not fit in the
/// channel are dropped and counted, since `track` must never block.
pub async fn start_events_out(cfg: &EventsOutConfig) -> Result<Option<EventsOutTx>, String> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }
    if cfg.channel_capacity == 0 {
        return Err("events_out.channel_capacity must be greater than zero".to_string());
    }

    let (tx, mut rx) = mpsc::channel::<String>(cfg.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let path = cfg.path.clone();

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("open events_out {path} failed: {e}"))?;
        Box::new(file)
    };

    let task = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            tracing::trace!(
                target: "tether.events_out",
                bytes = line.len(),
                preview = %audit_preview(line.trim_end())
            );
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::warn!(
                    target: "tether.events_out",
                    bytes = line.len(),
                    error.message = %e,
                    "events_out write failed"
                );
                return;
            }
            let _ = writer.flush().await;
        }
    });

    Ok(Some(EventsOutTx {
        tx,
        dropped,
        task: Arc::new(Mutex::new(Some(task))),
    }))
}
