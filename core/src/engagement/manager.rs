//! Engagement session manager

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use super::heartbeat::Heartbeat;
use super::metrics::SessionMetrics;
use super::session::{EndReason, EngagementSession, OpenSource, SessionKind};
use crate::clock::{elapsed, millis, SharedClock};
use crate::config::EngagementConfig;
use crate::context::Services;
use crate::error::TrackerError;
use crate::lifecycle::{AppLifecycleSignal, AppLifecycleState, LifecycleSubscription};
use crate::sink::{merge_extra, names, props, Properties, SharedSink};
use crate::state::{load_snapshot, LifecycleAction, SessionPhase, SnapshotWriter, StateTransition};
use crate::store::keys;

/// Owns the app-engagement session.
///
/// Cloning yields another handle to the same session. Every operation is
/// fail-open: store problems are logged and the in-memory session keeps
/// working, and operations that make no sense in the current phase are
/// logged and ignored.
#[derive(Clone)]
pub struct UserSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: EngagementConfig,
    clock: SharedClock,
    sink: SharedSink,
    writer: SnapshotWriter,
    state: Mutex<EngagementState>,
    lifecycle: StdMutex<Option<LifecycleSubscription>>,
}

#[derive(Default)]
struct EngagementState {
    session: Option<EngagementSession>,
    /// End of the last session as persisted under `last_session_end`.
    last_session_end: Option<DateTime<Utc>>,
    user_id: Option<String>,
    heartbeat: Option<Heartbeat>,
    next_generation: u64,
}

impl EngagementState {
    fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map(EngagementSession::phase)
            .unwrap_or(SessionPhase::NotStarted)
    }
}

impl UserSessionManager {
    /// Builds the manager and rehydrates any persisted session.
    pub async fn new(cfg: EngagementConfig, services: &Services) -> Self {
        let store = services.store.as_ref();

        let session = match load_snapshot::<EngagementSession>(store, keys::USER_SESSION).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    target: "tether.session",
                    key = keys::USER_SESSION,
                    error.kind = e.kind(),
                    error.message = %e,
                    "engagement snapshot unusable, starting fresh"
                );
                None
            }
        };
        let last_session_end =
            match load_snapshot::<DateTime<Utc>>(store, keys::LAST_SESSION_END).await {
                Ok(end) => end,
                Err(e) => {
                    tracing::warn!(
                        target: "tether.session",
                        key = keys::LAST_SESSION_END,
                        error.kind = e.kind(),
                        error.message = %e,
                        "last session end unusable"
                    );
                    None
                }
            };

        if let Some(s) = session.as_ref() {
            tracing::info!(
                target: "tether.session",
                session_id = %s.session_id,
                phase = %s.phase(),
                "rehydrated engagement session"
            );
        }

        let (writer, _task) = SnapshotWriter::spawn(services.store.clone());
        let state = EngagementState {
            user_id: session.as_ref().and_then(|s| s.user_id.clone()),
            session,
            last_session_end,
            ..Default::default()
        };

        Self {
            inner: Arc::new(Inner {
                cfg,
                clock: services.clock.clone(),
                sink: services.sink.clone(),
                writer,
                state: Mutex::new(state),
                lifecycle: StdMutex::new(None),
            }),
        }
    }

    pub async fn start_session(&self, kind: SessionKind, source: OpenSource) {
        let mut state = self.inner.state.lock().await;
        self.start_locked(&mut state, kind, source, false);
    }

    pub async fn end_session(&self, reason: EndReason) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) =
            StateTransition::validate(state.phase(), LifecycleAction::End(reason.end_kind()))
        {
            self.reject("end_session", e.into());
            return;
        }
        let now = self.inner.clock.now();
        self.end_locked(&mut state, reason, now);
    }

    pub async fn handle_background(&self) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) = StateTransition::validate(state.phase(), LifecycleAction::Background) {
            self.reject("handle_background", e.into());
            return;
        }
        let now = self.inner.clock.now();
        state.heartbeat = None;

        let Some(session) = state.session.as_mut() else {
            return;
        };
        session.is_active = false;
        session.background_started_at = Some(now);

        self.inner.sink.track(
            names::APP_BACKGROUNDED,
            props(json!({
                "session_id": session.session_id,
                "session_duration_ms": millis(elapsed(session.start_time, now)),
                "timestamp": now.to_rfc3339(),
            })),
        );
        self.persist(session);
    }

    pub async fn handle_foreground(&self) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) = StateTransition::validate(state.phase(), LifecycleAction::Foreground) {
            self.reject("handle_foreground", e.into());
            return;
        }
        let now = self.inner.clock.now();

        let background_start = state
            .session
            .as_ref()
            .and_then(|s| s.background_started_at)
            .unwrap_or(now);
        let away = elapsed(background_start, now);

        if away > self.inner.cfg.background_timeout() {
            tracing::info!(
                target: "tether.session",
                away_secs = away.as_secs(),
                "background timeout exceeded, rolling session"
            );
            // The user left when the app went to the background.
            self.end_locked(&mut state, EndReason::BackgroundTimeout, background_start);
            self.start_locked(
                &mut state,
                SessionKind::BackgroundReturn,
                OpenSource::Direct,
                true,
            );
            return;
        }

        if let Some(session) = state.session.as_mut() {
            session.resume(now);
            self.persist(session);
        }
        self.arm_heartbeat(&mut state);
    }

    pub async fn start_feature_usage(&self, feature: &str) {
        self.feature_usage(feature, FeaturePhase::Start, None).await;
    }

    pub async fn end_feature_usage(&self, feature: &str, extra: Option<Properties>) {
        self.feature_usage(feature, FeaturePhase::End, extra).await;
    }

    /// Binds a user identity to the current and all following sessions.
    ///
    /// An ended session is left as it was; the identity applies from the
    /// next start.
    pub async fn identify(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let mut state = self.inner.state.lock().await;
        state.user_id = Some(user_id.clone());
        if let Some(session) = state.session.as_mut().filter(|s| s.phase().is_open()) {
            session.user_id = Some(user_id);
            self.persist(session);
        }
    }

    pub async fn current_session(&self) -> Option<EngagementSession> {
        self.inner.state.lock().await.session.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase()
    }

    pub async fn session_metrics(&self) -> Option<SessionMetrics> {
        let state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        state.session.as_ref().map(|s| s.metrics(now))
    }

    /// Drives background/foreground handling from `signal`. Replaces any
    /// earlier subscription held by this manager.
    pub fn attach_lifecycle(&self, signal: &dyn AppLifecycleSignal) {
        let weak = Arc::downgrade(&self.inner);
        let sub = LifecycleSubscription::spawn(signal.subscribe(), move |app_state| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                let manager = UserSessionManager { inner };
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

    /// Teardown: unsubscribes from the lifecycle signal, cancels the
    /// heartbeat and waits for pending writes.
    pub async fn shutdown(&self) {
        let sub = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sub);
        self.inner.state.lock().await.heartbeat = None;
        self.inner.writer.flush().await;
        self.inner.writer.report_failures("engagement");
    }

    /// `force_new` opens a fresh session even when the previous one ended
    /// within the gap.
    fn start_locked(
        &self,
        state: &mut EngagementState,
        kind: SessionKind,
        source: OpenSource,
        force_new: bool,
    ) {
        if let Err(e) = StateTransition::validate(state.phase(), LifecycleAction::Start) {
            self.reject("start_session", e.into());
            return;
        }
        let now = self.inner.clock.now();

        let previous_end = match state.session.as_ref() {
            Some(s) => Some(s.effective_end()),
            None => state.last_session_end,
        };
        let gap = previous_end.map(|end| elapsed(end, now));
        let within_gap = gap.is_some_and(|g| g <= self.inner.cfg.session_gap());
        // A logged-out session is never resumed under the next identity.
        let logged_out = state
            .session
            .as_ref()
            .is_some_and(|s| s.end_reason == Some(EndReason::ManualLogout));
        let is_new = force_new || logged_out || !(within_gap && state.session.is_some());
        let app_open_count = state
            .session
            .as_ref()
            .map_or(0, |s| s.app_open_count)
            .saturating_add(1);

        if is_new {
            // A session that was never ended (process died) closes at its
            // last sign of life.
            if state.session.as_ref().is_some_and(|s| !s.is_ended()) {
                let end = state
                    .session
                    .as_ref()
                    .map_or(now, EngagementSession::last_seen);
                self.end_locked(state, EndReason::AppClose, end);
            }
            let previous_session_end = state
                .session
                .as_ref()
                .and_then(|s| s.previous_session_end)
                .or(state.last_session_end);
            state.session = Some(EngagementSession::new(
                kind,
                source,
                now,
                app_open_count,
                previous_session_end,
                state.user_id.clone(),
            ));
        } else if let Some(session) = state.session.as_mut() {
            session.reopen();
            session.resume(now);
            session.session_type = SessionKind::BackgroundReturn;
            session.source = source;
            session.app_open_count = app_open_count;
        }

        let Some(session) = state.session.as_ref() else {
            return;
        };

        self.inner.sink.track(
            names::APP_OPENED,
            props(json!({
                "session_id": session.session_id,
                "session_type": session.session_type,
                "source": source,
                "is_new_session": is_new,
                "app_open_count": session.app_open_count,
                "user_id": session.user_id,
                "timestamp": now.to_rfc3339(),
            })),
        );
        if is_new {
            tracing::info!(
                target: "tether.session",
                session_id = %session.session_id,
                kind = %session.session_type,
                source = %source,
                "engagement session started"
            );
            self.inner.sink.track(
                names::SESSION_STARTED,
                props(json!({
                    "session_id": session.session_id,
                    "session_type": session.session_type,
                    "source": source,
                    "user_id": session.user_id,
                    "previous_session_gap_ms": gap.map(millis),
                    "timestamp": now.to_rfc3339(),
                })),
            );
        }
        self.persist(session);
        self.arm_heartbeat(state);
    }

    fn end_locked(&self, state: &mut EngagementState, reason: EndReason, end: DateTime<Utc>) {
        state.heartbeat = None;

        let Some(session) = state.session.as_mut() else {
            return;
        };
        session.finish(reason, end);
        let metrics = session.metrics(end);

        tracing::info!(
            target: "tether.session",
            session_id = %session.session_id,
            reason = %reason,
            duration_secs = metrics.total_duration.as_secs(),
            "engagement session ended"
        );
        self.inner.sink.track(
            names::SESSION_ENDED,
            props(json!({
                "session_id": session.session_id,
                "reason": reason,
                "duration_ms": millis(metrics.total_duration),
                "active_duration_ms": millis(metrics.active_duration),
                "background_duration_ms": millis(metrics.background_duration),
                "features_used": metrics.features_used,
                "features": session.features_used,
                "app_open_count": metrics.app_open_count,
                "session_quality": metrics.session_quality,
                "engagement_score": metrics.engagement_score(),
                "user_id": session.user_id,
                "timestamp": end.to_rfc3339(),
            })),
        );

        if reason == EndReason::ManualLogout {
            state.user_id = None;
        }
        state.last_session_end = Some(end);
        self.inner.writer.remove(keys::USER_SESSION);
        self.inner.writer.set_json(keys::LAST_SESSION_END, &end);
    }

    async fn feature_usage(&self, feature: &str, phase: FeaturePhase, extra: Option<Properties>) {
        let mut state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        let Some(session) = state.session.as_mut().filter(|s| s.phase().is_open()) else {
            tracing::debug!(
                target: "tether.session",
                feature,
                "feature usage outside an open session ignored"
            );
            return;
        };

        session.features_used.insert(feature.to_string());
        session.last_active_time = now;

        let mut properties = props(json!({
            "feature": feature,
            "phase": phase.as_str(),
            "session_id": session.session_id,
            "time_in_session_ms": millis(elapsed(session.start_time, now)),
            "timestamp": now.to_rfc3339(),
        }));
        match phase {
            FeaturePhase::Start => {
                session.feature_started_at.insert(feature.to_string(), now);
            }
            FeaturePhase::End => {
                if let Some(started) = session.feature_started_at.remove(feature) {
                    properties.insert(
                        "feature_duration_ms".to_string(),
                        json!(millis(elapsed(started, now))),
                    );
                }
            }
        }
        merge_extra(&mut properties, extra);

        self.inner.sink.track(names::FEATURE_USED, properties);
        self.persist(session);
    }

    fn arm_heartbeat(&self, state: &mut EngagementState) {
        state.heartbeat = None;
        state.next_generation += 1;
        let weak = Arc::downgrade(&self.inner);
        state.heartbeat = Some(Heartbeat::arm(
            state.next_generation,
            self.inner.cfg.heartbeat_interval(),
            move |generation| {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return false;
                    };
                    UserSessionManager { inner }.on_heartbeat(generation).await
                }
            },
        ));
    }

    async fn on_heartbeat(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.heartbeat.as_ref().map(Heartbeat::generation) != Some(generation) {
            return false;
        }
        let now = self.inner.clock.now();
        match state.session.as_mut() {
            Some(session) if session.phase() == SessionPhase::Active => {
                session.last_active_time = now;
                self.persist(session);
                true
            }
            _ => false,
        }
    }

    fn persist(&self, session: &EngagementSession) {
        self.inner.writer.set_json(keys::USER_SESSION, session);
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

#[derive(Debug, Clone, Copy)]
enum FeaturePhase {
    Start,
    End,
}

impl FeaturePhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}
