use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Periodic task owned by the engagement manager.
///
/// The task is aborted when the heartbeat is cancelled or dropped. Each
/// heartbeat carries the generation it was armed with so a tick that was
/// already in flight when it got cancelled can recognise itself as stale.
pub struct Heartbeat {
    generation: u64,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Calls `on_tick(generation)` every `period`, first after one full
    /// period. The loop ends when `on_tick` returns `false`.
    pub fn arm<F, Fut>(generation: u64, period: Duration, on_tick: F) -> Self
    where
        F: Fn(u64) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                if !on_tick(generation).await {
                    break;
                }
            }
        });
        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
