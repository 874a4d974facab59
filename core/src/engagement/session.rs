//! Engagement session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use super::metrics::{SessionMetrics, SessionQuality};
use crate::clock::{elapsed, millis};
use crate::state::{EndKind, SessionPhase};

/// How the current engagement session came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    New,
    Returning,
    BackgroundReturn,
}

/// What opened the app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenSource {
    #[default]
    Direct,
    Push,
    Deeplink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    AppClose,
    BackgroundTimeout,
    ManualLogout,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Returning => "returning",
            Self::BackgroundReturn => "background_return",
        }
    }
}

impl OpenSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Push => "push",
            Self::Deeplink => "deeplink",
        }
    }
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppClose => "app_close",
            Self::BackgroundTimeout => "background_timeout",
            Self::ManualLogout => "manual_logout",
        }
    }

    pub fn end_kind(self) -> EndKind {
        match self {
            Self::AppClose | Self::ManualLogout => EndKind::Completed,
            Self::BackgroundTimeout => EndKind::TimedOut,
        }
    }
}

macro_rules! impl_display_via_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_via_as_str!(SessionKind, OpenSource, EndReason);

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "returning" => Ok(Self::Returning),
            "background_return" => Ok(Self::BackgroundReturn),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

impl std::str::FromStr for OpenSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "push" => Ok(Self::Push),
            "deeplink" => Ok(Self::Deeplink),
            other => Err(format!("unknown open source: {other}")),
        }
    }
}

impl std::str::FromStr for EndReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app_close" => Ok(Self::AppClose),
            "background_timeout" => Ok(Self::BackgroundTimeout),
            "manual_logout" => Ok(Self::ManualLogout),
            other => Err(format!("unknown end reason: {other}")),
        }
    }
}

/// Persisted engagement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSession {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_active_time: DateTime<Utc>,
    /// Frozen when the session ends.
    #[serde(default)]
    pub total_session_time_ms: Option<u64>,
    pub is_active: bool,
    pub app_open_count: u32,
    #[serde(default)]
    pub features_used: BTreeSet<String>,
    pub session_type: SessionKind,
    #[serde(default)]
    pub previous_session_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: OpenSource,
    #[serde(default)]
    pub background_started_at: Option<DateTime<Utc>>,
    /// Background time already closed out by a foreground return.
    #[serde(default)]
    pub background_ms: u64,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    /// Features whose usage span is currently open.
    #[serde(default)]
    pub feature_started_at: BTreeMap<String, DateTime<Utc>>,
}

impl EngagementSession {
    pub fn new(
        kind: SessionKind,
        source: OpenSource,
        now: DateTime<Utc>,
        app_open_count: u32,
        previous_session_end: Option<DateTime<Utc>>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            start_time: now,
            last_active_time: now,
            total_session_time_ms: None,
            is_active: true,
            app_open_count,
            features_used: BTreeSet::new(),
            session_type: kind,
            previous_session_end,
            source,
            background_started_at: None,
            background_ms: 0,
            end_reason: None,
            feature_started_at: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.end_reason {
            Some(reason) => SessionPhase::Ended(reason.end_kind()),
            None if self.is_active => SessionPhase::Active,
            None => SessionPhase::Backgrounded,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_reason.is_some()
    }

    /// Last sign of life: the latest heartbeat, or the move to the
    /// background if that came after it.
    pub fn last_seen(&self) -> DateTime<Utc> {
        match self.background_started_at {
            Some(started) => started.max(self.last_active_time),
            None => self.last_active_time,
        }
    }

    /// End of the session for boundary purposes: the recorded end for an
    /// ended session, the last sign of life for one that is still open.
    pub fn effective_end(&self) -> DateTime<Utc> {
        if self.is_ended() {
            self.previous_session_end.unwrap_or(self.last_active_time)
        } else {
            self.last_seen()
        }
    }

    /// Closes any open background span at `now` and reactivates.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.background_started_at.take() {
            self.background_ms = self
                .background_ms
                .saturating_add(millis(elapsed(started, now)));
        }
        self.is_active = true;
        self.last_active_time = now;
    }

    /// Freezes the session at `end`.
    pub fn finish(&mut self, reason: EndReason, end: DateTime<Utc>) {
        if let Some(started) = self.background_started_at.take() {
            self.background_ms = self
                .background_ms
                .saturating_add(millis(elapsed(started, end)));
        }
        self.total_session_time_ms = Some(millis(elapsed(self.start_time, end)));
        self.is_active = false;
        self.end_reason = Some(reason);
        self.previous_session_end = Some(end);
        self.feature_started_at.clear();
    }

    /// Reopens an ended session that is being resumed within the gap.
    pub fn reopen(&mut self) {
        self.end_reason = None;
        self.total_session_time_ms = None;
    }

    /// Metrics as of `now`. Ended sessions use their frozen duration.
    pub fn metrics(&self, now: DateTime<Utc>) -> SessionMetrics {
        let total = match self.total_session_time_ms {
            Some(ms) => std::time::Duration::from_millis(ms),
            None => elapsed(self.start_time, now),
        };
        let open_background = self
            .background_started_at
            .map(|started| elapsed(started, now))
            .unwrap_or_default();
        let background = (std::time::Duration::from_millis(self.background_ms) + open_background)
            .min(total);

        SessionMetrics {
            total_duration: total,
            active_duration: total - background,
            background_duration: background,
            features_used: self.features_used.len(),
            app_open_count: self.app_open_count,
            session_quality: SessionQuality::score(total, self.features_used.len()),
        }
    }
}
