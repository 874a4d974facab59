//! `tether simulate`: drive both trackers from a script on a manual clock.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use tether_core::api::{
    Clock, FanoutSink, ManualClock, RecordingSink, Services, SessionMetrics, SharedSink,
    SharedStore, TrackerConfig, TrackerContext, Trackers,
};

use super::script::ScriptStep;
use crate::error::CliError;

pub struct Simulation {
    clock: Arc<ManualClock>,
    recorder: Arc<RecordingSink>,
    trackers: Trackers,
}

impl Simulation {
    /// Builds both trackers over `store`. Events go to an in-memory recorder
    /// and, when given, to `forward` as well.
    pub async fn new(
        cfg: TrackerConfig,
        store: SharedStore,
        forward: Option<SharedSink>,
        start: DateTime<Utc>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let recorder = Arc::new(RecordingSink::new());
        let sink: SharedSink = match forward {
            Some(forward) => Arc::new(FanoutSink::new(vec![
                recorder.clone() as SharedSink,
                forward,
            ])),
            None => recorder.clone(),
        };
        let services = Services::new(clock.clone(), store, sink);
        let trackers = TrackerContext::new(cfg, services).build_trackers().await;
        Self {
            clock,
            recorder,
            trackers,
        }
    }

    /// Applies `step` and returns the output records it produced.
    pub async fn apply(&self, step: &ScriptStep) -> Vec<Value> {
        let engagement = &self.trackers.engagement;
        let onboarding = &self.trackers.onboarding;
        let mut out = Vec::new();

        match step {
            ScriptStep::At(ts) => self.clock.set(*ts),
            ScriptStep::Advance(by) => self.clock.advance(*by),
            ScriptStep::Start { kind, source } => engagement.start_session(*kind, *source).await,
            ScriptStep::Identify(user) => engagement.identify(user.as_str()).await,
            ScriptStep::FeatureStart(name) => engagement.start_feature_usage(name).await,
            ScriptStep::FeatureEnd(name) => engagement.end_feature_usage(name, None).await,
            ScriptStep::Background => {
                engagement.handle_background().await;
                onboarding.handle_background().await;
            }
            ScriptStep::Foreground => {
                engagement.handle_foreground().await;
                onboarding.handle_foreground().await;
            }
            ScriptStep::End(reason) => engagement.end_session(*reason).await,
            ScriptStep::OnboardingStart => onboarding.start_onboarding_session().await,
            ScriptStep::OnboardingComplete => {
                onboarding.complete_onboarding_session(None).await;
            }
            ScriptStep::OnboardingAbort(reason) => {
                onboarding.abort_onboarding_session(reason, None).await;
            }
            ScriptStep::Milestone(m) => onboarding.record_milestone(m.clone(), None).await,
            ScriptStep::Metrics => {
                let engagement_metrics = engagement.session_metrics().await;
                let progress = onboarding.progress().await;
                out.push(json!({
                    "at": self.clock.now().to_rfc3339(),
                    "metrics": {
                        "engagement": engagement_metrics.as_ref().map(metrics_json),
                        "engagement_phase": engagement.phase().await.to_string(),
                        "onboarding": progress.map(|p| Value::Object(p.to_properties())),
                        "onboarding_phase": onboarding.phase().await.to_string(),
                    }
                }));
            }
        }

        let at = self.clock.now().to_rfc3339();
        let events = self.recorder.take().into_iter().map(|e| {
            json!({
                "at": at,
                "event": e.event,
                "properties": e.properties,
            })
        });
        let mut records: Vec<Value> = events.collect();
        records.append(&mut out);
        records
    }

    pub async fn shutdown(&self) {
        self.trackers.shutdown().await;
    }
}

fn metrics_json(m: &SessionMetrics) -> Value {
    json!({
        "total_duration_ms": m.total_duration.as_millis() as u64,
        "active_duration_ms": m.active_duration.as_millis() as u64,
        "background_duration_ms": m.background_duration.as_millis() as u64,
        "features_used": m.features_used,
        "app_open_count": m.app_open_count,
        "session_quality": m.session_quality,
        "engagement_score": m.engagement_score(),
    })
}

/// Runs every step and returns all output records in order.
pub async fn run_steps(
    cfg: TrackerConfig,
    store: SharedStore,
    forward: Option<SharedSink>,
    steps: &[ScriptStep],
) -> Result<Vec<Value>, CliError> {
    let sim = Simulation::new(cfg, store, forward, Utc::now()).await;
    let mut records = Vec::new();
    for step in steps {
        tracing::debug!(target: "tether.simulate", ?step, "applying step");
        records.extend(sim.apply(step).await);
    }
    sim.shutdown().await;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::script::parse_script;
    use pretty_assertions::assert_eq;
    use tether_core::api::{keys, MemoryStore, PersistentStore};

    fn names(records: &[Value]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| r["event"].as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_engagement_script() {
        let steps = parse_script(
            "at 2024-06-01T20:00:00Z\n\
             start new push\n\
             feature start chat\n\
             feature start discover\n\
             feature start profile\n\
             advance 6m\n\
             end app_close\n",
        )
        .unwrap();
        let store: SharedStore = Arc::new(MemoryStore::new());
        let records = run_steps(TrackerConfig::default(), store.clone(), None, &steps)
            .await
            .unwrap();

        assert_eq!(
            names(&records),
            vec![
                "AppOpened",
                "SessionStarted",
                "FeatureUsed",
                "FeatureUsed",
                "FeatureUsed",
                "SessionEnded",
            ]
        );
        let ended = records.last().unwrap();
        assert_eq!(ended["properties"]["session_quality"], json!("excellent"));
        assert_eq!(ended["at"], json!("2024-06-01T20:06:00+00:00"));
        assert!(store.get(keys::USER_SESSION).await.unwrap().is_none());
        assert!(store.get(keys::LAST_SESSION_END).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_onboarding_and_metrics_script() {
        let steps = parse_script(
            "at 2024-06-01T20:00:00Z\n\
             onboarding start\n\
             advance 20s\n\
             milestone signup_started\n\
             metrics\n\
             background\n\
             advance 10m\n\
             foreground\n",
        )
        .unwrap();
        let records = run_steps(
            TrackerConfig::default(),
            Arc::new(MemoryStore::new()),
            None,
            &steps,
        )
        .await
        .unwrap();

        let metrics = records
            .iter()
            .find(|r| r.get("metrics").is_some())
            .unwrap();
        assert_eq!(metrics["metrics"]["onboarding"]["completion_rate"], json!(40));
        assert_eq!(metrics["metrics"]["engagement"], Value::Null);

        let abandoned = records
            .iter()
            .find(|r| r["event"] == json!("SignupAbandoned"))
            .unwrap();
        assert_eq!(
            abandoned["properties"]["drop_off_reason"],
            json!("background_timeout")
        );
    }
}
