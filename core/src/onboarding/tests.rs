use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::clock::Clock;
use crate::config::{MilestonePolicy, OnboardingConfig};
use crate::lifecycle::{AppLifecycleState, BroadcastLifecycle};
use crate::sink::{names, props};
use crate::state::{EndKind, SessionPhase};
use crate::store::{keys, MemoryStore, PersistentStore};
use crate::test_support::{t0, Harness};

async fn manager(h: &Harness) -> OnboardingSessionManager {
    OnboardingSessionManager::new(OnboardingConfig::default(), &h.services()).await
}

async fn manager_with(h: &Harness, policy: MilestonePolicy) -> OnboardingSessionManager {
    let cfg = OnboardingConfig {
        milestone_policy: policy,
        ..Default::default()
    };
    OnboardingSessionManager::new(cfg, &h.services()).await
}

async fn stored_session(h: &Harness) -> Option<OnboardingSession> {
    h.store
        .get(keys::SIGNUP_SESSION)
        .await
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

#[tokio::test]
async fn test_start_records_app_launch_and_persists() {
    let h = Harness::new();
    let m = manager(&h).await;

    m.start_onboarding_session().await;
    m.flush().await;

    assert_eq!(h.sink.names(), vec![names::ONBOARDING_STARTED]);
    assert_eq!(m.phase().await, SessionPhase::Active);
    let stored = stored_session(&h).await.unwrap();
    assert_eq!(stored.start_time, t0());
    assert_eq!(stored.milestone_at(&Milestone::AppLaunch), Some(t0()));
    assert!(stored.is_anonymous);
    m.shutdown().await;
}

#[tokio::test]
async fn test_repeated_milestone_keeps_first_timestamp() {
    let h = Harness::new();
    let m = manager_with(&h, MilestonePolicy::FirstWriteWins).await;
    m.start_onboarding_session().await;

    h.advance_secs(10);
    m.record_milestone(Milestone::SignupStarted, None).await;
    h.advance_secs(10);
    m.record_milestone("signup_started", None).await;

    let session = m.current_session().await.unwrap();
    assert_eq!(
        session.milestone_at(&Milestone::SignupStarted),
        Some(t0() + ChronoDuration::seconds(10))
    );
    assert_eq!(h.sink.count(names::SIGNUP_STARTED), 1);
    // Both calls are still visible as interactions.
    assert_eq!(session.interactions.len(), 2);
    m.shutdown().await;
}

#[tokio::test]
async fn test_repeated_milestone_last_write_wins() {
    let h = Harness::new();
    let m = manager_with(&h, MilestonePolicy::LastWriteWins).await;
    m.start_onboarding_session().await;

    h.advance_secs(10);
    m.record_milestone(Milestone::SignupStarted, None).await;
    h.advance_secs(10);
    m.record_milestone(Milestone::SignupStarted, None).await;

    let session = m.current_session().await.unwrap();
    assert_eq!(
        session.milestone_at(&Milestone::SignupStarted),
        Some(t0() + ChronoDuration::seconds(20))
    );
    assert_eq!(h.sink.count(names::SIGNUP_STARTED), 2);
    m.shutdown().await;
}

#[tokio::test]
async fn test_milestone_timestamps_are_monotonic() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;

    let steps = [
        Milestone::SignupStarted,
        Milestone::ProfileImageUploaded,
        Milestone::InterestSelected,
        Milestone::SignupCompleted,
    ];
    let mut called_at = Vec::new();
    for step in steps.iter().cloned() {
        h.advance_secs(7);
        called_at.push(h.clock.now());
        m.record_milestone(step, None).await;
    }

    let session = m.current_session().await.unwrap();
    let mut previous = t0();
    for (step, call_time) in steps.iter().zip(called_at) {
        let at = session.milestone_at(step).unwrap();
        assert!(at >= call_time);
        assert!(at >= previous);
        previous = at;
    }
    m.shutdown().await;
}

#[tokio::test]
async fn test_funnel_events_carry_timings() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;

    h.advance_secs(42);
    m.record_milestone(
        Milestone::ProfileImageUploaded,
        Some(props(json!({ "photo_source": "camera" }))),
    )
    .await;

    let event = h.sink.last(names::SIGNUP_PROFILE_IMAGE_UPLOADED).unwrap();
    assert_eq!(event.properties["time_from_app_launch_ms"], json!(42_000));
    assert_eq!(event.properties["session_duration_ms"], json!(42_000));
    assert_eq!(event.properties["milestone"], json!("profile_image_uploaded"));
    assert_eq!(event.properties["photo_source"], json!("camera"));
    m.shutdown().await;
}

#[tokio::test]
async fn test_custom_milestone_records_without_event() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    h.sink.take();

    m.record_milestone("viewed_terms", None).await;

    assert!(h.sink.events().is_empty());
    let session = m.current_session().await.unwrap();
    assert!(session.has_milestone(&Milestone::Other("viewed_terms".into())));
    m.shutdown().await;
}

#[tokio::test]
async fn test_milestone_without_session_starts_one() {
    let h = Harness::new();
    let m = manager(&h).await;

    m.record_milestone(Milestone::SignupStarted, None).await;

    assert_eq!(
        h.sink.names(),
        vec![names::ONBOARDING_STARTED, names::SIGNUP_STARTED]
    );
    let session = m.current_session().await.unwrap();
    assert!(session.has_milestone(&Milestone::AppLaunch));
    assert!(session.has_milestone(&Milestone::SignupStarted));
    m.shutdown().await;
}

#[tokio::test]
async fn test_signup_completed_milestone_clears_anonymity() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    m.record_milestone(Milestone::SignupCompleted, None).await;
    assert!(!m.current_session().await.unwrap().is_anonymous);
    m.shutdown().await;
}

#[tokio::test]
async fn test_complete_with_gap_in_funnel() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    h.advance_secs(20);
    m.record_milestone(Milestone::SignupStarted, None).await;
    h.advance_secs(70);
    m.record_milestone(Milestone::SignupCompleted, None).await;
    h.advance_secs(10);

    let data = SignupUserData {
        photo_count: 2,
        interests: vec!["climbing".into()],
        bio: Some("hi".into()),
        ..Default::default()
    };
    let result = m.complete_onboarding_session(Some(data)).await.unwrap();
    m.flush().await;

    assert_eq!(result.completion_rate, 60);
    assert_eq!(
        result.drop_off_points,
        vec![
            Milestone::ProfileImageUploaded,
            Milestone::InterestSelected,
            Milestone::SignupCompleted,
        ]
    );
    assert_eq!(result.total_time.as_secs(), 100);

    let event = h.sink.last(names::SIGNUP_COMPLETED).unwrap();
    assert_eq!(event.properties["stage"], json!("final"));
    assert_eq!(event.properties["completion_rate"], json!(60));
    assert_eq!(event.properties["has_photos"], json!(true));
    assert_eq!(event.properties["has_bio"], json!(true));
    assert_eq!(event.properties["time_per_milestone"]["signup_completed"], json!(70_000));
    // One SignupCompleted from the milestone, one final.
    assert_eq!(h.sink.count(names::SIGNUP_COMPLETED), 2);

    assert_eq!(m.phase().await, SessionPhase::Ended(EndKind::Completed));
    assert!(m.current_session().await.is_none());
    assert!(stored_session(&h).await.is_none());
    m.shutdown().await;
}

#[tokio::test]
async fn test_abort_reports_reason_and_latest_milestone() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    h.advance_secs(5);
    m.record_milestone(Milestone::SignupStarted, None).await;
    h.advance_secs(5);
    m.record_milestone(Milestone::InterestSelected, None).await;

    let result = m
        .abort_onboarding_session("user_closed_signup", None)
        .await
        .unwrap();
    m.flush().await;

    assert_eq!(result.completion_rate, 60);
    let event = h.sink.last(names::SIGNUP_ABANDONED).unwrap();
    assert_eq!(event.properties["drop_off_reason"], json!("user_closed_signup"));
    assert_eq!(event.properties["last_milestone"], json!("interest_selected"));
    assert_eq!(m.phase().await, SessionPhase::Ended(EndKind::Abandoned));
    assert!(stored_session(&h).await.is_none());
    m.shutdown().await;
}

#[tokio::test]
async fn test_abort_with_explicit_milestone() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    m.abort_onboarding_session("skipped", Some(Milestone::SignupStarted))
        .await;

    let event = h.sink.last(names::SIGNUP_ABANDONED).unwrap();
    assert_eq!(event.properties["last_milestone"], json!("signup_started"));
    m.shutdown().await;
}

#[tokio::test]
async fn test_end_operations_require_a_session() {
    let h = Harness::new();
    let m = manager(&h).await;

    assert!(m.complete_onboarding_session(None).await.is_none());
    assert!(m.abort_onboarding_session("gone", None).await.is_none());
    m.handle_foreground().await;
    assert!(h.sink.events().is_empty());

    m.start_onboarding_session().await;
    m.complete_onboarding_session(None).await;
    // Already ended.
    assert!(m.abort_onboarding_session("late", None).await.is_none());
    assert_eq!(h.sink.count(names::SIGNUP_ABANDONED), 0);

    // A new start opens a fresh funnel.
    h.advance_secs(30);
    m.start_onboarding_session().await;
    assert_eq!(m.phase().await, SessionPhase::Active);
    assert_eq!(
        m.current_session().await.unwrap().start_time,
        t0() + ChronoDuration::seconds(30)
    );
    m.shutdown().await;
}

#[tokio::test]
async fn test_short_background_keeps_funnel() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;

    m.handle_background().await;
    assert_eq!(m.phase().await, SessionPhase::Backgrounded);
    h.advance_mins(4);
    m.handle_foreground().await;

    assert_eq!(m.phase().await, SessionPhase::Active);
    assert_eq!(h.sink.count(names::SIGNUP_ABANDONED), 0);
    m.shutdown().await;
}

#[tokio::test]
async fn test_long_background_abandons_funnel() {
    let h = Harness::new();
    let m = manager(&h).await;
    m.start_onboarding_session().await;
    h.advance_secs(30);
    m.record_milestone(Milestone::SignupStarted, None).await;

    m.handle_background().await;
    h.advance_mins(6);
    m.handle_foreground().await;
    m.flush().await;

    let event = h.sink.last(names::SIGNUP_ABANDONED).unwrap();
    assert_eq!(event.properties["drop_off_reason"], json!(BACKGROUND_TIMEOUT_REASON));
    // Measured up to the moment the app left the foreground.
    assert_eq!(event.properties["total_time_ms"], json!(30_000));
    assert_eq!(m.phase().await, SessionPhase::Ended(EndKind::TimedOut));
    assert!(stored_session(&h).await.is_none());
    m.shutdown().await;
}

#[tokio::test]
async fn test_rehydrates_unfinished_funnel() {
    let h = Harness::new();
    {
        let m = manager(&h).await;
        m.start_onboarding_session().await;
        h.advance_secs(15);
        m.record_milestone(Milestone::SignupStarted, None).await;
        m.shutdown().await;
    }

    h.advance_secs(15);
    let m = manager(&h).await;
    assert_eq!(m.phase().await, SessionPhase::Active);
    m.record_milestone(Milestone::ProfileImageUploaded, None).await;

    let event = h.sink.last(names::SIGNUP_PROFILE_IMAGE_UPLOADED).unwrap();
    assert_eq!(event.properties["time_from_app_launch_ms"], json!(30_000));
    let progress = m.progress().await.unwrap();
    assert_eq!(progress.completion_rate, 60);
    m.shutdown().await;
}

#[tokio::test]
async fn test_corrupt_snapshot_is_discarded() {
    let h = Harness::with_store(MemoryStore::with_entries([(
        keys::SIGNUP_SESSION,
        "not json",
    )]));
    let m = manager(&h).await;
    assert_eq!(m.phase().await, SessionPhase::NotStarted);
    assert!(h.store.get(keys::SIGNUP_SESSION).await.unwrap().is_none());
    m.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle_signal_abandons_after_threshold() {
    let h = Harness::new();
    let m = manager(&h).await;
    let signal = BroadcastLifecycle::default();
    m.attach_lifecycle(&signal);
    wait_for_subscribers(&signal, 1).await;

    m.start_onboarding_session().await;
    signal.emit(AppLifecycleState::Background);
    wait_for_phase(&m, SessionPhase::Backgrounded).await;

    h.advance_mins(10);
    signal.emit(AppLifecycleState::Active);
    wait_for_phase(&m, SessionPhase::Ended(EndKind::TimedOut)).await;

    m.shutdown().await;
    wait_for_subscribers(&signal, 0).await;
}

async fn wait_for_subscribers(signal: &BroadcastLifecycle, n: usize) {
    for _ in 0..100 {
        if signal.subscriber_count() == n {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(signal.subscriber_count(), n);
}

async fn wait_for_phase(m: &OnboardingSessionManager, phase: SessionPhase) {
    for _ in 0..100 {
        if m.phase().await == phase {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("phase never became {phase}");
}
