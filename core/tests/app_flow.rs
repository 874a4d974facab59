mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{settle, Device};
use tether_core::api::{
    keys, names, AppLifecycleState, EndKind, EndReason, Milestone, OpenSource, PersistentStore,
    SessionKind, SessionPhase, SignupUserData, TrackerConfig,
};

#[tokio::test]
async fn first_launch_through_signup_and_logout() {
    let device = Device::new();
    let trackers = device.launch(TrackerConfig::default()).build_trackers().await;
    trackers.engagement.attach_lifecycle(&device.signal);
    trackers.onboarding.attach_lifecycle(&device.signal);
    device.wait_for_subscribers(2).await;

    trackers
        .engagement
        .start_session(SessionKind::New, OpenSource::Direct)
        .await;
    trackers.onboarding.start_onboarding_session().await;

    device.advance_secs(20);
    trackers
        .onboarding
        .record_milestone(Milestone::SignupStarted, None)
        .await;
    device.advance_secs(40);
    trackers
        .onboarding
        .record_milestone(Milestone::ProfileImageUploaded, None)
        .await;

    // Quick trip to the photo picker.
    device.signal.emit(AppLifecycleState::Background);
    settle().await;
    device.advance_secs(30);
    device.signal.emit(AppLifecycleState::Active);
    settle().await;
    assert_eq!(trackers.engagement.phase().await, SessionPhase::Active);
    assert_eq!(trackers.onboarding.phase().await, SessionPhase::Active);

    trackers
        .onboarding
        .record_milestone(Milestone::InterestSelected, None)
        .await;
    device.advance_secs(10);
    trackers
        .onboarding
        .record_milestone(Milestone::SignupCompleted, None)
        .await;
    let result = trackers
        .onboarding
        .complete_onboarding_session(Some(SignupUserData {
            photo_count: 1,
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(result.completion_rate, 100);
    assert!(result.drop_off_points.is_empty());

    trackers.engagement.identify("u-42").await;
    device.advance_mins(3);
    trackers.engagement.end_session(EndReason::ManualLogout).await;
    trackers.shutdown().await;

    let names_seen = device.sink.names();
    assert_eq!(
        names_seen,
        vec![
            names::APP_OPENED,
            names::SESSION_STARTED,
            names::ONBOARDING_STARTED,
            names::SIGNUP_STARTED,
            names::SIGNUP_PROFILE_IMAGE_UPLOADED,
            names::APP_BACKGROUNDED,
            names::SIGNUP_INTEREST_SELECTED,
            names::SIGNUP_COMPLETED,
            names::SIGNUP_COMPLETED,
            names::SESSION_ENDED,
        ]
    );

    let ended = device.sink.last(names::SESSION_ENDED).unwrap();
    assert_eq!(ended.properties["reason"], json!("manual_logout"));
    assert_eq!(ended.properties["user_id"], json!("u-42"));
    assert_eq!(ended.properties["background_duration_ms"], json!(30_000));

    assert!(device.store.get(keys::USER_SESSION).await.unwrap().is_none());
    assert!(device.store.get(keys::SIGNUP_SESSION).await.unwrap().is_none());
    assert!(device.store.get(keys::LAST_SESSION_END).await.unwrap().is_some());
    device.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn long_background_rolls_engagement_and_abandons_signup() {
    let device = Device::new();
    let trackers = device.launch(TrackerConfig::default()).build_trackers().await;
    trackers.engagement.attach_lifecycle(&device.signal);
    trackers.onboarding.attach_lifecycle(&device.signal);
    device.wait_for_subscribers(2).await;

    trackers
        .engagement
        .start_session(SessionKind::New, OpenSource::Push)
        .await;
    let first_id = trackers
        .engagement
        .current_session()
        .await
        .unwrap()
        .session_id;
    trackers
        .onboarding
        .record_milestone(Milestone::SignupStarted, None)
        .await;

    device.signal.emit(AppLifecycleState::Background);
    settle().await;
    device.advance_mins(45);
    device.signal.emit(AppLifecycleState::Active);
    settle().await;

    let second = trackers.engagement.current_session().await.unwrap();
    assert_ne!(second.session_id, first_id);
    assert_eq!(second.session_type, SessionKind::BackgroundReturn);
    assert_eq!(
        trackers.onboarding.phase().await,
        SessionPhase::Ended(EndKind::TimedOut)
    );

    let ended = device.sink.last(names::SESSION_ENDED).unwrap();
    assert_eq!(ended.properties["reason"], json!("background_timeout"));
    let abandoned = device.sink.last(names::SIGNUP_ABANDONED).unwrap();
    assert_eq!(abandoned.properties["last_milestone"], json!("signup_started"));
    trackers.shutdown().await;
}

#[tokio::test]
async fn thresholds_are_configured_independently() {
    let device = Device::new();
    let mut cfg = TrackerConfig::default();
    cfg.engagement.background_timeout_secs = 60;
    cfg.onboarding.background_threshold_secs = 3600;
    let trackers = device.launch(cfg).build_trackers().await;

    trackers
        .engagement
        .start_session(SessionKind::New, OpenSource::Direct)
        .await;
    trackers.onboarding.start_onboarding_session().await;
    let first = trackers.engagement.current_session().await.unwrap();

    trackers.engagement.handle_background().await;
    trackers.onboarding.handle_background().await;
    device.advance_mins(10);
    trackers.engagement.handle_foreground().await;
    trackers.onboarding.handle_foreground().await;

    // Ten minutes is past the background timeout but well inside the
    // session gap; the timed-out session must still not be reopened.
    assert_eq!(device.sink.count(names::SESSION_ENDED), 1);
    assert_eq!(device.sink.count(names::SESSION_STARTED), 2);
    let second = trackers.engagement.current_session().await.unwrap();
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.session_type, SessionKind::BackgroundReturn);
    assert_eq!(device.sink.count(names::SIGNUP_ABANDONED), 0);
    assert_eq!(trackers.onboarding.phase().await, SessionPhase::Active);
    trackers.shutdown().await;
}
