//! Walks both trackers through a short app visit on a manual clock and
//! prints every tracked event.
//!
//! Run with `cargo run -p tether-core --example session_lifecycle`.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tether_core::api::{
    AppLifecycleState, BroadcastLifecycle, EndReason, FanoutSink, ManualClock, MemoryStore,
    Milestone, OpenSource, RecordingSink, Services, SessionKind, SharedSink, TrackerConfig,
    TrackerContext, TracingSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let recorder = Arc::new(RecordingSink::new());
    let sink = Arc::new(FanoutSink::new(vec![
        recorder.clone() as SharedSink,
        Arc::new(TracingSink),
    ]));
    let services = Services::new(clock.clone(), Arc::new(MemoryStore::new()), sink);

    let trackers = TrackerContext::new(TrackerConfig::default(), services)
        .build_trackers()
        .await;
    let signal = BroadcastLifecycle::default();
    trackers.engagement.attach_lifecycle(&signal);
    trackers.onboarding.attach_lifecycle(&signal);

    trackers
        .engagement
        .start_session(SessionKind::New, OpenSource::Push)
        .await;
    trackers.onboarding.start_onboarding_session().await;

    clock.advance(Duration::from_secs(25));
    trackers
        .onboarding
        .record_milestone(Milestone::SignupStarted, None)
        .await;
    trackers.engagement.start_feature_usage("discover").await;

    signal.emit(AppLifecycleState::Background);
    tokio::time::sleep(Duration::from_millis(20)).await;
    clock.advance(Duration::from_secs(90));
    signal.emit(AppLifecycleState::Active);
    tokio::time::sleep(Duration::from_millis(20)).await;

    clock.advance(Duration::from_secs(40));
    trackers.engagement.end_feature_usage("discover", None).await;
    if let Some(result) = trackers
        .onboarding
        .abort_onboarding_session("closed_signup", None)
        .await
    {
        println!(
            "onboarding: {}% complete, drop-offs {:?}",
            result.completion_rate, result.drop_off_points
        );
    }
    if let Some(metrics) = trackers.engagement.session_metrics().await {
        println!(
            "engagement: quality {:?}, score {}",
            metrics.session_quality,
            metrics.engagement_score()
        );
    }
    trackers.engagement.end_session(EndReason::AppClose).await;
    trackers.shutdown().await;

    for event in recorder.events() {
        println!("{} {}", event.event, serde_json::Value::Object(event.properties));
    }
    Ok(())
}
