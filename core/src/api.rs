//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `tether_core::api` instead of reaching into internal modules.

pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::{
    get_tether_data_dir, load_default, load_explicit, load_from_path, EngagementConfig,
    EventsOutConfig, LoggingConfig, MilestonePolicy, OnboardingConfig, StoreConfig, StoreProvider,
    TrackerConfig,
};
pub use crate::context::{Services, ServicesFactory, TrackerContext, Trackers};
pub use crate::engagement::{
    engagement_score, EndReason, EngagementSession, OpenSource, SessionKind, SessionMetrics,
    SessionQuality, UserSessionManager,
};
pub use crate::error::TrackerError;
pub use crate::events_out::{start_events_out, EventsOutTx};
pub use crate::lifecycle::{
    AppLifecycleSignal, AppLifecycleState, BroadcastLifecycle, LifecycleSubscription,
};
pub use crate::onboarding::{
    Milestone, OnboardingResult, OnboardingSession, OnboardingSessionManager, SignupUserData,
    BACKGROUND_TIMEOUT_REASON,
};
pub use crate::sink::{
    names, props, EventSink, FanoutSink, Properties, RecordingSink, SharedSink, TrackedEvent,
    TracingSink,
};
pub use crate::state::{EndKind, SessionPhase};
pub use crate::store::{keys, MemoryStore, PersistentStore, SharedStore};
