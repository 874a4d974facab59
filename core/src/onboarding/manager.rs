//! Onboarding session manager

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use super::funnel::{OnboardingResult, SignupUserData};
use super::session::{Milestone, OnboardingSession};
use crate::clock::{elapsed, millis, SharedClock};
use crate::config::OnboardingConfig;
use crate::context::Services;
use crate::error::TrackerError;
use crate::lifecycle::{AppLifecycleSignal, AppLifecycleState, LifecycleSubscription};
use crate::sink::{merge_extra, names, props, Properties, SharedSink};
use crate::state::{
    load_snapshot, EndKind, LifecycleAction, SessionPhase, SnapshotWriter, StateTransition,
};
use crate::store::keys;

pub const BACKGROUND_TIMEOUT_REASON: &str = "background_timeout";

/// Owns the signup funnel session.
///
/// Same handle semantics as [`crate::engagement::UserSessionManager`]: clones
/// share one session, store failures never surface to the caller.
#[derive(Clone)]
pub struct OnboardingSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: OnboardingConfig,
    clock: SharedClock,
    sink: SharedSink,
    writer: SnapshotWriter,
    state: Mutex<OnboardingState>,
    lifecycle: StdMutex<Option<LifecycleSubscription>>,
}

#[derive(Default)]
struct OnboardingState {
    session: Option<OnboardingSession>,
    /// How the last session in this process ended.
    last_outcome: Option<EndKind>,
}

impl OnboardingState {
    fn phase(&self) -> SessionPhase {
        match (&self.session, self.last_outcome) {
            (Some(session), _) => session.phase(),
            (None, Some(kind)) => SessionPhase::Ended(kind),
            (None, None) => SessionPhase::NotStarted,
        }
    }
}

impl OnboardingSessionManager {
    /// Builds the manager and rehydrates an unfinished funnel, if any.
    pub async fn new(cfg: OnboardingConfig, services: &Services) -> Self {
        let session =
            match load_snapshot::<OnboardingSession>(services.store.as_ref(), keys::SIGNUP_SESSION)
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        target: "tether.session",
                        key = keys::SIGNUP_SESSION,
                        error.kind = e.kind(),
                        error.message = %e,
                        "onboarding snapshot unusable, starting fresh"
                    );
                    None
                }
            };

        if let Some(s) = session.as_ref() {
            tracing::info!(
                target: "tether.session",
                milestones = s.milestones.len(),
                phase = %s.phase(),
                "rehydrated onboarding session"
            );
        }

        let (writer, _task) = SnapshotWriter::spawn(services.store.clone());
        Self {
            inner: Arc::new(Inner {
                cfg,
                clock: services.clock.clone(),
                sink: services.sink.clone(),
                writer,
                state: Mutex::new(OnboardingState {
                    session,
                    last_outcome: None,
                }),
                lifecycle: StdMutex::new(None),
            }),
        }
    }

    /// Begins a fresh funnel. An unfinished one is discarded.
    pub async fn start_onboarding_session(&self) {
        let mut state = self.inner.state.lock().await;
        self.start_locked(&mut state);
    }

    /// Records `milestone`, starting a session first when none exists.
    pub async fn record_milestone(&self, milestone: impl Into<Milestone>, extra: Option<Properties>) {
        let milestone = milestone.into();
        let mut state = self.inner.state.lock().await;
        if state.session.is_none() {
            tracing::debug!(
                target: "tether.session",
                milestone = %milestone,
                "milestone without onboarding session, starting one"
            );
            self.start_locked(&mut state);
        }
        let now = self.inner.clock.now();
        let Some(session) = state.session.as_mut() else {
            return;
        };

        let written = session.record_milestone(&milestone, now, self.inner.cfg.milestone_policy);
        session.push_interaction(milestone.as_str(), now);
        session.total_time_ms = millis(elapsed(session.start_time, now));

        if written {
            if milestone == Milestone::SignupCompleted {
                session.is_anonymous = false;
            }
            if let Some(event) = milestone.funnel_event() {
                let mut properties = props(json!({
                    "milestone": milestone,
                    "time_from_app_launch_ms": millis(elapsed(session.launch_time(), now)),
                    "session_duration_ms": millis(elapsed(session.start_time, now)),
                    "timestamp": now.to_rfc3339(),
                }));
                merge_extra(&mut properties, extra);
                self.inner.sink.track(event, properties);
            }
        } else {
            tracing::debug!(
                target: "tether.session",
                milestone = %milestone,
                "milestone already recorded"
            );
        }
        self.persist(session);
    }

    /// Closes the funnel as completed and returns its metrics.
    pub async fn complete_onboarding_session(
        &self,
        user_data: Option<SignupUserData>,
    ) -> Option<OnboardingResult> {
        let mut state = self.inner.state.lock().await;
        if let Err(e) =
            StateTransition::validate(state.phase(), LifecycleAction::End(EndKind::Completed))
        {
            self.reject("complete_onboarding_session", e.into());
            return None;
        }
        let now = self.inner.clock.now();
        let session = state.session.take()?;
        let result = OnboardingResult::compute(&session, now);

        let mut properties = result.to_properties();
        properties.insert("stage".into(), json!("final"));
        properties.insert("is_anonymous".into(), json!(session.is_anonymous));
        properties.insert("milestones_reached".into(), json!(session.milestones.len()));
        properties.insert("timestamp".into(), json!(now.to_rfc3339()));
        if let Some(data) = user_data.as_ref() {
            merge_extra(&mut properties, Some(data.flags()));
        }

        tracing::info!(
            target: "tether.session",
            completion_rate = result.completion_rate,
            total_secs = result.total_time.as_secs(),
            "onboarding completed"
        );
        self.inner.sink.track(names::SIGNUP_COMPLETED, properties);
        self.finish_locked(&mut state, EndKind::Completed);
        Some(result)
    }

    /// Closes the funnel as abandoned. `last_milestone` defaults to the most
    /// recently reached one.
    pub async fn abort_onboarding_session(
        &self,
        reason: &str,
        last_milestone: Option<Milestone>,
    ) -> Option<OnboardingResult> {
        let mut state = self.inner.state.lock().await;
        if let Err(e) =
            StateTransition::validate(state.phase(), LifecycleAction::End(EndKind::Abandoned))
        {
            self.reject("abort_onboarding_session", e.into());
            return None;
        }
        let now = self.inner.clock.now();
        self.abort_locked(&mut state, reason, last_milestone, EndKind::Abandoned, now)
    }

    pub async fn handle_background(&self) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) = StateTransition::validate(state.phase(), LifecycleAction::Background) {
            self.reject("handle_background", e.into());
            return;
        }
        let now = self.inner.clock.now();
        if let Some(session) = state.session.as_mut() {
            session.background_started_at = Some(now);
            self.persist(session);
        }
    }

    /// Resumes the funnel, or abandons it when the app stayed in the
    /// background past the configured threshold.
    pub async fn handle_foreground(&self) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) = StateTransition::validate(state.phase(), LifecycleAction::Foreground) {
            self.reject("handle_foreground", e.into());
            return;
        }
        let now = self.inner.clock.now();
        let Some(background_start) = state.session.as_ref().and_then(|s| s.background_started_at)
        else {
            return;
        };

        let away = elapsed(background_start, now);
        if away > self.inner.cfg.background_threshold() {
            tracing::info!(
                target: "tether.session",
                away_secs = away.as_secs(),
                "onboarding abandoned in background"
            );
            self.abort_locked(
                &mut state,
                BACKGROUND_TIMEOUT_REASON,
                None,
                EndKind::TimedOut,
                background_start,
            );
            return;
        }

        if let Some(session) = state.session.as_mut() {
            session.background_started_at = None;
            self.persist(session);
        }
    }

    pub async fn current_session(&self) -> Option<OnboardingSession> {
        self.inner.state.lock().await.session.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase()
    }

    /// Funnel metrics for the open session as of now, without ending it.
    pub async fn progress(&self) -> Option<OnboardingResult> {
        let state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        state
            .session
            .as_ref()
            .map(|s| OnboardingResult::compute(s, now))
    }

    pub fn attach_lifecycle(&self, signal: &dyn AppLifecycleSignal) {
        let weak = Arc::downgrade(&self.inner);
        let sub = LifecycleSubscription::spawn(signal.subscribe(), move |app_state| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                let manager = OnboardingSessionManager { inner };
                match app_state {
                    AppLifecycleState::Active => manager.handle_foreground().await,
                    AppLifecycleState::Background => manager.handle_background().await,
                }
                true
            }
        });
        let previous = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(sub);
        drop(previous);
    }

    pub async fn flush(&self) {
        self.inner.writer.flush().await;
    }

    pub async fn shutdown(&self) {
        let sub = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sub);
        self.inner.writer.flush().await;
        self.inner.writer.report_failures("onboarding");
    }

    fn start_locked(&self, state: &mut OnboardingState) {
        let now = self.inner.clock.now();
        if let Some(previous) = state.session.as_ref() {
            tracing::info!(
                target: "tether.session",
                milestones = previous.milestones.len(),
                "discarding unfinished onboarding session"
            );
        }
        let session = OnboardingSession::new(now);

        tracing::info!(target: "tether.session", "onboarding session started");
        self.inner.sink.track(
            names::ONBOARDING_STARTED,
            props(json!({
                "is_anonymous": session.is_anonymous,
                "timestamp": now.to_rfc3339(),
            })),
        );
        self.persist(&session);
        state.session = Some(session);
    }

    fn abort_locked(
        &self,
        state: &mut OnboardingState,
        reason: &str,
        last_milestone: Option<Milestone>,
        kind: EndKind,
        end: DateTime<Utc>,
    ) -> Option<OnboardingResult> {
        let session = state.session.take()?;
        let result = OnboardingResult::compute(&session, end);
        let last_milestone =
            last_milestone.or_else(|| session.latest_milestone().map(|m| m.name.clone()));

        let mut properties = result.to_properties();
        properties.insert("drop_off_reason".into(), json!(reason));
        properties.insert("last_milestone".into(), json!(last_milestone));
        properties.insert("is_anonymous".into(), json!(session.is_anonymous));
        properties.insert("milestones_reached".into(), json!(session.milestones.len()));
        properties.insert("timestamp".into(), json!(end.to_rfc3339()));

        tracing::info!(
            target: "tether.session",
            reason,
            completion_rate = result.completion_rate,
            "onboarding abandoned"
        );
        self.inner.sink.track(names::SIGNUP_ABANDONED, properties);
        self.finish_locked(state, kind);
        Some(result)
    }

    fn finish_locked(&self, state: &mut OnboardingState, kind: EndKind) {
        state.session = None;
        state.last_outcome = Some(kind);
        self.inner.writer.remove(keys::SIGNUP_SESSION);
    }

    fn persist(&self, session: &OnboardingSession) {
        self.inner.writer.set_json(keys::SIGNUP_SESSION, session);
    }

    fn reject(&self, op: &'static str, err: TrackerError) {
        tracing::debug!(
            target: "tether.session",
            op,
            error.kind = err.kind(),
            error.message = %err,
            "operation ignored"
        );
    }
}
