use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engagement: EngagementConfig,

    #[serde(default)]
    pub onboarding: OnboardingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "tether_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// A start after a longer gap than this since the previous session ended
    /// opens a new session instead of resuming the old one.
    #[serde(default = "default_session_gap_secs")]
    pub session_gap_secs: u64,

    /// Returning to the foreground after a longer background stay than this
    /// ends the session and starts another.
    #[serde(default = "default_background_timeout_secs")]
    pub background_timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_session_gap_secs() -> u64 {
    30 * 60
}

fn default_background_timeout_secs() -> u64 {
    30 * 60
}

fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            session_gap_secs: default_session_gap_secs(),
            background_timeout_secs: default_background_timeout_secs(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl EngagementConfig {
    pub fn session_gap(&self) -> Duration {
        Duration::from_secs(self.session_gap_secs)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_secs(self.background_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        // A zero period would make tokio::time::interval panic.
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

/// What happens when a milestone that already has a timestamp is recorded
/// again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestonePolicy {
    /// Keep the first timestamp and emit the funnel event once.
    #[default]
    FirstWriteWins,
    /// Overwrite the timestamp and emit the funnel event on every write.
    LastWriteWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingConfig {
    /// Returning to the foreground after a longer background stay than this
    /// abandons the signup funnel. Independent of the engagement timeouts.
    #[serde(default = "default_background_threshold_secs")]
    pub background_threshold_secs: u64,

    #[serde(default)]
    pub milestone_policy: MilestonePolicy,
}

fn default_background_threshold_secs() -> u64 {
    5 * 60
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            background_threshold_secs: default_background_threshold_secs(),
            milestone_policy: MilestonePolicy::default(),
        }
    }
}

impl OnboardingConfig {
    pub fn background_threshold(&self) -> Duration {
        Duration::from_secs(self.background_threshold_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreProvider {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub provider: StoreProvider,

    /// Directory for the file store. If empty or unset, uses `~/.tether/store`.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_events_out_path")]
    pub path: String,
    #[serde(default = "default_events_out_capacity")]
    pub channel_capacity: usize,
}

fn default_events_out_path() -> String {
    "./events.jsonl".to_string()
}

fn default_events_out_capacity() -> usize {
    2048
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_out_path(),
            channel_capacity: default_events_out_capacity(),
        }
    }
}
